//! Lock-free open-addressed counting hash with bit-packed cells.
//!
//! Layout. Each slot is split across three planes so every hot-path atomic
//! is a single-word CAS:
//!
//! - **state plane**: 2-bit fields, 32 per word: EMPTY, SET (primary),
//!   SET_LARGE (overflowed primary), LARGE (continuation).
//! - **key plane**: per slot `[reprobe offset | key remainder]`, packed
//!   back to back; fields may straddle words.
//! - **counter plane**: `counter_len`-bit fields, ⌊64/counter_len⌋ per
//!   word, the tail bits of each word left unused so a counter never
//!   straddles.
//!
//! Hashing. `w = M·key` through the invertible bit matrix; the low `lsize`
//! bits of `w` are the home bucket, the high `2k − lsize` bits are stored
//! as the key remainder. The full key is recovered from
//! `(slot, reprobe offset, remainder)` through the inverse matrix, so it is
//! never stored.
//!
//! Claiming. A slot is claimed by a state CAS EMPTY→SET (or EMPTY→LARGE),
//! after which the winner publishes the key fields. A same-key adder that
//! races the publication window can miss the match and claim a second
//! primary further along the probe sequence; lookups sum every matching
//! primary and the dump path folds equal keys after sorting, so counts are
//! never lost; at worst a slot is wasted.
//!
//! Overflow. A primary counter saturates at its field maximum; the excess
//! moves into LARGE continuation cells claimed along the same probe
//! sequence, identified by the primary's reprobe index. A continuation's
//! value is the sum of its counter field and the word-aligned pieces of its
//! freed remainder field, each piece an independent saturating counter.
//! Readers racing an overflow can observe a lower-bounded count; dumps
//! quiesce writers first.

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::hash::matrix::BinMatrix;
use crate::mem::bits::BitArray;
use crate::mer::Mer;

/// Cell states (2 bits).
const EMPTY: u64 = 0;
const SET: u64 = 1;
const SET_LARGE: u64 = 2;
const LARGE: u64 = 3;

/// Outcome of an add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The full amount was recorded.
    Added,
    /// The probe sequence (or a continuation chain) is exhausted;
    /// `pending` is the part of the amount that was not recorded.
    Full { pending: u64 },
}

/// Size and width parameters of one array.
#[derive(Debug, Clone, Copy)]
pub struct HashConfig {
    /// Mer length; keys are `2k` bits.
    pub k: u32,
    /// Table capacity is `1 << lsize` slots.
    pub lsize: u32,
    /// Primary counter width in bits (1..=32).
    pub counter_len: u32,
    /// Reprobe budget; clamped to the slot count.
    pub max_reprobe: u32,
}

impl HashConfig {
    pub fn validate(&self) -> Result<()> {
        if self.k == 0 || self.k > crate::mer::MAX_K {
            return Err(Error::Config(format!(
                "k must be in 1..={}, got {}",
                crate::mer::MAX_K,
                self.k
            )));
        }
        if self.lsize > 2 * self.k || self.lsize > 63 {
            return Err(Error::Config(format!(
                "lsize {} out of range (max {} for k = {})",
                self.lsize,
                (2 * self.k).min(63),
                self.k
            )));
        }
        if !(1..=32).contains(&self.counter_len) {
            return Err(Error::Config(format!(
                "counter length must be in 1..=32 bits, got {}",
                self.counter_len
            )));
        }
        Ok(())
    }
}

/// One reconstructed entry from a slice walk.
#[derive(Debug, Clone)]
pub struct SliceEntry {
    pub mer: Mer,
    pub count: u64,
    pub home: u64,
}

pub struct HashArray {
    k: u32,
    key_bits: u32,
    lsize: u32,
    size: u64,
    size_mask: u64,
    counter_len: u32,
    counters_per_word: u64,
    max_reprobe: u32,
    offset_bits: u32,
    rem_bits: u32,
    entry_bits: u64,
    reprobes: Vec<u64>,
    matrix: BinMatrix,
    inverse: BinMatrix,
    states: BitArray,
    keys: BitArray,
    counters: BitArray,
}

/// Inline scratch for hashed-key words (heap only past k = 128).
type KeyWords = SmallVec<[u64; 4]>;

impl HashArray {
    /// Allocate an empty array using a fresh matrix drawn from `seed`.
    pub fn new(cfg: HashConfig, seed: u64) -> Result<HashArray> {
        cfg.validate()?;
        let (matrix, inverse) = BinMatrix::random_invertible(2 * cfg.k, seed);
        Self::with_matrix(cfg, matrix, inverse)
    }

    /// Allocate an empty array around an existing matrix (growth keeps the
    /// matrix and just takes one more position bit).
    pub fn with_matrix(cfg: HashConfig, matrix: BinMatrix, inverse: BinMatrix) -> Result<HashArray> {
        cfg.validate()?;
        debug_assert_eq!(matrix.dim(), 2 * cfg.k);
        let key_bits = 2 * cfg.k;
        let size = 1u64 << cfg.lsize;
        let max_reprobe = cfg.max_reprobe.min((size - 1).min(u32::MAX as u64) as u32);
        let offset_bits = if max_reprobe == 0 {
            0
        } else {
            64 - (max_reprobe as u64).leading_zeros()
        };
        let rem_bits = key_bits - cfg.lsize;
        let entry_bits = (offset_bits + rem_bits) as u64;
        let reprobes: Vec<u64> = (0..=max_reprobe as u64).map(|r| r * (r + 1) / 2).collect();

        Ok(HashArray {
            k: cfg.k,
            key_bits,
            lsize: cfg.lsize,
            size,
            size_mask: size - 1,
            counter_len: cfg.counter_len,
            counters_per_word: 64 / cfg.counter_len as u64,
            max_reprobe,
            offset_bits,
            rem_bits,
            entry_bits,
            reprobes,
            matrix,
            inverse,
            states: BitArray::new(size.div_ceil(32) * 64)?,
            keys: BitArray::new(size * entry_bits.max(1))?,
            counters: BitArray::new(size.div_ceil(64 / cfg.counter_len as u64) * 64)?,
        })
    }

    #[inline]
    pub fn k(&self) -> u32 {
        self.k
    }

    #[inline]
    pub fn lsize(&self) -> u32 {
        self.lsize
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn counter_len(&self) -> u32 {
        self.counter_len
    }

    #[inline]
    pub fn max_reprobe(&self) -> u32 {
        self.max_reprobe
    }

    #[inline]
    pub fn matrix(&self) -> &BinMatrix {
        &self.matrix
    }

    /// Largest slot displacement the reprobe table can produce.
    #[inline]
    pub fn probe_span(&self) -> u64 {
        self.reprobes[self.max_reprobe as usize]
    }

    // ── plane addressing ────────────────────────────────────────────────

    #[inline]
    fn state_off(&self, s: u64) -> u64 {
        (s / 32) * 64 + (s % 32) * 2
    }

    #[inline]
    fn counter_off(&self, s: u64) -> u64 {
        (s / self.counters_per_word) * 64 + (s % self.counters_per_word) * self.counter_len as u64
    }

    #[inline]
    fn entry_off(&self, s: u64) -> u64 {
        s * self.entry_bits
    }

    #[inline]
    fn state(&self, s: u64) -> u64 {
        self.states.get(self.state_off(s), 2)
    }

    #[inline]
    fn cas_state(&self, s: u64, from: u64, to: u64) -> std::result::Result<(), u64> {
        self.states.cas(self.state_off(s), 2, from, to)
    }

    #[inline]
    fn slot(&self, home: u64, r: u32) -> u64 {
        (home + self.reprobes[r as usize]) & self.size_mask
    }

    // ── hashing and key fields ──────────────────────────────────────────

    /// Hash a mer: home bucket plus the stored remainder words.
    fn hash_mer(&self, mer: &Mer) -> (u64, KeyWords) {
        let wpr = BinMatrix::words_per_row(self.key_bits);
        let mut w: KeyWords = SmallVec::from_elem(0, wpr);
        self.matrix.mul_vec(mer.words(), &mut w);
        let home = w[0] & self.size_mask;
        (home, self.shift_out_position(&w))
    }

    /// `w >> lsize`, truncated to the remainder width.
    fn shift_out_position(&self, w: &[u64]) -> KeyWords {
        let nwords = (self.rem_bits as usize).div_ceil(64).max(1);
        let mut rem: KeyWords = SmallVec::from_elem(0, nwords);
        if self.rem_bits == 0 {
            return rem;
        }
        let sh = self.lsize;
        for (i, r) in rem.iter_mut().enumerate() {
            let mut v = w.get(i).copied().unwrap_or(0) >> sh;
            if sh > 0 {
                if let Some(hi) = w.get(i + 1) {
                    v |= hi << (64 - sh);
                }
            }
            *r = v;
        }
        let top = self.rem_bits % 64;
        if top != 0 {
            let last = rem.len() - 1;
            rem[last] &= (1u64 << top) - 1;
        }
        rem
    }

    /// Write `[offset | remainder]` for slot `s` (publication after a claim).
    fn publish_key(&self, s: u64, r: u32, rem: &[u64]) -> Result<()> {
        let base = self.entry_off(s);
        if self.offset_bits > 0 {
            self.keys.set(base, self.offset_bits, r as u64)?;
        }
        let mut off = base + self.offset_bits as u64;
        let mut left = self.rem_bits;
        let mut i = 0;
        while left > 0 {
            let take = left.min(64);
            self.keys.set(off, take, rem[i])?;
            off += take as u64;
            left -= take;
            i += 1;
        }
        Ok(())
    }

    #[inline]
    fn read_offset(&self, s: u64) -> u32 {
        if self.offset_bits == 0 {
            0
        } else {
            self.keys.get(self.entry_off(s), self.offset_bits) as u32
        }
    }

    /// Compare the stored key fields of `s` against `(r, rem)`.
    fn key_matches(&self, s: u64, r: u32, rem: &[u64]) -> bool {
        if self.read_offset(s) != r {
            return false;
        }
        let mut off = self.entry_off(s) + self.offset_bits as u64;
        let mut left = self.rem_bits;
        let mut i = 0;
        while left > 0 {
            let take = left.min(64);
            if self.keys.get(off, take) != rem[i] {
                return false;
            }
            off += take as u64;
            left -= take;
            i += 1;
        }
        true
    }

    fn read_rem(&self, s: u64) -> KeyWords {
        let nwords = (self.rem_bits as usize).div_ceil(64).max(1);
        let mut rem: KeyWords = SmallVec::from_elem(0, nwords);
        let mut off = self.entry_off(s) + self.offset_bits as u64;
        let mut left = self.rem_bits;
        let mut i = 0;
        while left > 0 {
            let take = left.min(64);
            rem[i] = self.keys.get(off, take);
            off += take as u64;
            left -= take;
            i += 1;
        }
        rem
    }

    /// Rebuild the mer whose remainder is stored at `s` with home `home`.
    fn recover_mer(&self, home: u64, rem: &[u64]) -> Mer {
        let wpr = BinMatrix::words_per_row(self.key_bits);
        let mut w: KeyWords = SmallVec::from_elem(0, wpr);
        // w = (rem << lsize) | home
        let sh = self.lsize;
        w[0] = home;
        if self.rem_bits > 0 {
            for i in 0..wpr {
                let mut v = if sh == 0 {
                    rem.get(i).copied().unwrap_or(0)
                } else {
                    let lo = rem.get(i).copied().unwrap_or(0) << sh;
                    let hi = if i > 0 {
                        rem.get(i - 1).copied().unwrap_or(0) >> (64 - sh)
                    } else {
                        0
                    };
                    lo | hi
                };
                if i == 0 {
                    v |= home;
                }
                w[i] |= v;
            }
        }
        let top = self.key_bits % 64;
        if top != 0 {
            let last = w.len() - 1;
            w[last] &= (1u64 << top) - 1;
        }
        let mut key: KeyWords = SmallVec::from_elem(0, wpr);
        self.inverse.mul_vec(&w, &mut key);
        Mer::from_words(self.k, &key)
    }

    // ── counters ────────────────────────────────────────────────────────

    #[inline]
    fn counter_get(&self, s: u64) -> u64 {
        self.counters.get(self.counter_off(s), self.counter_len)
    }

    #[inline]
    fn counter_add(&self, s: u64, v: u64) -> Result<u64> {
        self.counters.saturating_add(self.counter_off(s), self.counter_len, v)
    }

    /// Continuations need the primary-index tag to fit inside the freed
    /// remainder field; degenerate geometries fall back to saturating
    /// primaries (the dump-and-continue path absorbs the difference).
    #[inline]
    fn chain_possible(&self) -> bool {
        self.offset_bits > 0 && self.rem_bits >= self.offset_bits
    }

    /// Word-aligned pieces of a LARGE cell's value area (the remainder
    /// field minus the primary-index tag). Empty when continuations are
    /// impossible for this geometry.
    fn value_parts(&self, s: u64) -> SmallVec<[(u64, u32); 4]> {
        let mut parts = SmallVec::new();
        if !self.chain_possible() {
            return parts;
        }
        let mut off = self.entry_off(s) + 2 * self.offset_bits as u64;
        let mut left = self.rem_bits - self.offset_bits;
        while left > 0 {
            let room = 64 - (off % 64) as u32;
            let take = left.min(room);
            parts.push((off, take));
            off += take as u64;
            left -= take;
        }
        parts
    }

    /// Add `v` to a continuation cell; returns what did not fit.
    fn large_add(&self, s: u64, v: u64) -> Result<u64> {
        let mut left = self.counter_add(s, v)?;
        if left == 0 {
            return Ok(0);
        }
        for (off, len) in self.value_parts(s) {
            left = self.counters_plane_add(&self.keys, off, len, left)?;
            if left == 0 {
                break;
            }
        }
        Ok(left)
    }

    #[inline]
    fn counters_plane_add(&self, plane: &BitArray, off: u64, len: u32, v: u64) -> Result<u64> {
        plane.saturating_add(off, len, v)
    }

    /// Total stored in a continuation cell.
    fn large_value(&self, s: u64) -> u64 {
        let mut total = self.counter_get(s);
        for (off, len) in self.value_parts(s) {
            total = total.saturating_add(self.keys.get(off, len));
        }
        total
    }

    /// Does the LARGE cell at `s` (probe index `r`) continue the primary at
    /// probe index `rp`?
    fn large_matches(&self, s: u64, r: u32, rp: u32) -> bool {
        if !self.chain_possible() {
            return false;
        }
        if self.read_offset(s) != r {
            return false;
        }
        let id_off = self.entry_off(s) + self.offset_bits as u64;
        self.keys.get(id_off, self.offset_bits) as u32 == rp
    }

    /// Claim-and-publish a continuation cell identity.
    fn publish_large(&self, s: u64, r: u32, rp: u32) -> Result<()> {
        let base = self.entry_off(s);
        self.keys.set(base, self.offset_bits, r as u64)?;
        self.keys
            .set(base + self.offset_bits as u64, self.offset_bits, rp as u64)?;
        Ok(())
    }

    // ── add / lookup ────────────────────────────────────────────────────

    /// Record `v` occurrences of `mer`. Linearizable per cell; `Full`
    /// reports the unrecorded part so the caller can retry after growing
    /// or dumping.
    pub fn add(&self, mer: &Mer, v: u64) -> Result<AddOutcome> {
        debug_assert_eq!(mer.k(), self.k);
        let (home, rem) = self.hash_mer(mer);
        for r in 0..=self.max_reprobe {
            let s = self.slot(home, r);
            loop {
                match self.state(s) {
                    EMPTY => match self.cas_state(s, EMPTY, SET) {
                        Ok(()) => {
                            self.publish_key(s, r, &rem)?;
                            return self.finish_add(s, home, r, v);
                        }
                        Err(_) => continue, // lost the claim, re-inspect
                    },
                    SET | SET_LARGE => {
                        if self.key_matches(s, r, &rem) {
                            return self.finish_add(s, home, r, v);
                        }
                        break;
                    }
                    _ => break, // LARGE: someone's continuation
                }
            }
        }
        Ok(AddOutcome::Full { pending: v })
    }

    fn finish_add(&self, s: u64, home: u64, r: u32, v: u64) -> Result<AddOutcome> {
        let excess = self.counter_add(s, v)?;
        if excess == 0 {
            return Ok(AddOutcome::Added);
        }
        // Promote before the continuation is published; a racing reader
        // sees a saturated primary and a lower-bounded count.
        let _ = self.cas_state(s, SET, SET_LARGE);
        let pending = self.chain_add(home, r, excess)?;
        if pending > 0 {
            Ok(AddOutcome::Full { pending })
        } else {
            Ok(AddOutcome::Added)
        }
    }

    /// Push `v` into the continuation chain of the primary at probe index
    /// `rp`; returns what found no room.
    fn chain_add(&self, home: u64, rp: u32, mut v: u64) -> Result<u64> {
        if !self.chain_possible() {
            return Ok(v);
        }
        for r in rp + 1..=self.max_reprobe {
            let s = self.slot(home, r);
            loop {
                let claimed = match self.state(s) {
                    EMPTY => match self.cas_state(s, EMPTY, LARGE) {
                        Ok(()) => {
                            self.publish_large(s, r, rp)?;
                            true
                        }
                        Err(_) => continue,
                    },
                    LARGE => self.large_matches(s, r, rp),
                    _ => false,
                };
                if claimed {
                    v = self.large_add(s, v)?;
                }
                break;
            }
            if v == 0 {
                return Ok(0);
            }
        }
        Ok(v)
    }

    /// Aggregated count for `mer`, `None` when absent.
    ///
    /// Walks the whole probe window and sums every matching primary, so a
    /// key duplicated by a publication race still reads its full count.
    pub fn get(&self, mer: &Mer) -> Option<u64> {
        debug_assert_eq!(mer.k(), self.k);
        let (home, rem) = self.hash_mer(mer);
        let mut total: Option<u64> = None;
        for r in 0..=self.max_reprobe {
            let s = self.slot(home, r);
            match self.state(s) {
                EMPTY => break,
                st @ (SET | SET_LARGE) => {
                    if self.key_matches(s, r, &rem) {
                        let mut c = self.counter_get(s);
                        if st == SET_LARGE {
                            c = c.saturating_add(self.chain_sum(home, r));
                        }
                        total = Some(total.unwrap_or(0).saturating_add(c));
                    }
                }
                _ => {}
            }
        }
        total
    }

    fn chain_sum(&self, home: u64, rp: u32) -> u64 {
        let mut total = 0u64;
        if !self.chain_possible() {
            return total;
        }
        for r in rp + 1..=self.max_reprobe {
            let s = self.slot(home, r);
            if self.state(s) == LARGE && self.large_matches(s, r, rp) {
                total = total.saturating_add(self.large_value(s));
            }
        }
        total
    }

    // ── iteration, zeroing, growth ──────────────────────────────────────

    /// Visit every primary whose home bucket lies in `[lo, hi)`, in slot
    /// order (callers sort by home). Walks `probe_span` slots past `hi` to
    /// pick up displaced entries; wrapping past the table end reaches the
    /// entries whose probe sequence wrapped.
    pub fn for_each_entry<F: FnMut(SliceEntry)>(&self, lo: u64, hi: u64, mut f: F) {
        debug_assert!(lo < hi && hi <= self.size);
        let walk_end = (hi + self.probe_span() + 1).min(lo + self.size);
        for idx in lo..walk_end {
            let s = idx & self.size_mask;
            let st = self.state(s);
            if st != SET && st != SET_LARGE {
                continue;
            }
            let r = self.read_offset(s);
            if r > self.max_reprobe {
                continue;
            }
            let disp = self.reprobes[r as usize] & self.size_mask;
            let home = (s.wrapping_sub(disp)) & self.size_mask;
            if home < lo || home >= hi {
                continue;
            }
            let rem = self.read_rem(s);
            let mut count = self.counter_get(s);
            if st == SET_LARGE {
                count = count.saturating_add(self.chain_sum(home, r));
            }
            if count == 0 {
                continue;
            }
            f(SliceEntry {
                mer: self.recover_mer(home, &rem),
                count,
                home,
            });
        }
    }

    /// Collect, sort by `(home, key)` and fold duplicates for one slice.
    pub fn gather_slice(&self, lo: u64, hi: u64, out: &mut Vec<SliceEntry>) {
        out.clear();
        self.for_each_entry(lo, hi, |e| out.push(e));
        out.sort_unstable_by(|a, b| (a.home, &a.mer).cmp(&(b.home, &b.mer)));
        out.dedup_by(|dup, keep| {
            if dup.home == keep.home && dup.mer == keep.mer {
                keep.count = keep.count.saturating_add(dup.count);
                true
            } else {
                false
            }
        });
    }

    /// Clear every plane field of slots `[lo, hi)`. Callers must have
    /// quiesced writers.
    pub fn zero_slice(&self, lo: u64, hi: u64) -> Result<()> {
        for s in lo..hi {
            if self.entry_bits > 0 {
                self.keys.clear(self.entry_off(s), self.offset_bits)?;
                let mut off = self.entry_off(s) + self.offset_bits as u64;
                let mut left = self.rem_bits;
                while left > 0 {
                    let take = left.min(64);
                    self.keys.clear(off, take)?;
                    off += take as u64;
                    left -= take;
                }
            }
            self.counters.clear(self.counter_off(s), self.counter_len)?;
            self.states.clear(self.state_off(s), 2)?;
        }
        Ok(())
    }

    /// Re-insert every entry into `next` (a table grown from this one).
    pub fn reinsert_into(&self, next: &HashArray) -> Result<AddOutcome> {
        debug_assert_eq!(self.k, next.k);
        let mut overflow = 0u64;
        self.for_each_entry(0, self.size, |e| {
            if overflow > 0 {
                return;
            }
            match next.add(&e.mer, e.count) {
                Ok(AddOutcome::Added) => {}
                Ok(AddOutcome::Full { pending }) => overflow = pending.max(1),
                Err(_) => overflow = overflow.max(1),
            }
        });
        if overflow > 0 {
            Ok(AddOutcome::Full { pending: overflow })
        } else {
            Ok(AddOutcome::Added)
        }
    }

    /// Raw plane words, in dump order (state, key, counter).
    pub fn raw_planes(&self) -> [&BitArray; 3] {
        [&self.states, &self.keys, &self.counters]
    }

    /// Rebuild an array from a raw image: geometry, matrix and the three
    /// plane word vectors, exactly as `raw_planes` exposes them.
    pub fn from_raw(
        cfg: HashConfig,
        matrix: BinMatrix,
        inverse: BinMatrix,
        planes: [&[u64]; 3],
    ) -> Result<HashArray> {
        let ary = Self::with_matrix(cfg, matrix, inverse)?;
        for (plane, words) in ary.raw_planes().iter().zip(planes) {
            if plane.words().len() != words.len() {
                return Err(Error::Config(
                    "raw image does not match the declared geometry".into(),
                ));
            }
            for (a, w) in plane.words().iter().zip(words) {
                a.store(*w, std::sync::atomic::Ordering::Relaxed);
            }
        }
        Ok(ary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(k: u32, lsize: u32, counter_len: u32) -> HashArray {
        HashArray::new(
            HashConfig {
                k,
                lsize,
                counter_len,
                max_reprobe: 62,
            },
            99,
        )
        .unwrap()
    }

    fn mer(s: &str) -> Mer {
        Mer::from_str_mer(s).unwrap()
    }

    #[test]
    fn add_then_get_round_trips() {
        let h = array(5, 8, 7);
        let m = mer("ACGTA");
        assert_eq!(h.add(&m, 1).unwrap(), AddOutcome::Added);
        assert_eq!(h.add(&m, 2).unwrap(), AddOutcome::Added);
        assert_eq!(h.get(&m), Some(3));
        assert_eq!(h.get(&mer("TTTTT")), None);
    }

    #[test]
    fn distinct_keys_do_not_collide_logically() {
        let h = array(4, 6, 7);
        let mers: Vec<Mer> = ["ACGT", "TTAA", "GGGG", "CATG", "AAAC"]
            .iter()
            .map(|s| mer(s))
            .collect();
        for (i, m) in mers.iter().enumerate() {
            h.add(m, (i + 1) as u64).unwrap();
        }
        for (i, m) in mers.iter().enumerate() {
            assert_eq!(h.get(m), Some((i + 1) as u64), "{m}");
        }
    }

    #[test]
    fn counter_overflow_spills_into_continuations() {
        // 7-bit primary: 300 pushes the counter well past 127.
        let h = array(9, 6, 7);
        let m = mer("ACGTACGTA");
        for _ in 0..300 {
            assert_eq!(h.add(&m, 1).unwrap(), AddOutcome::Added);
        }
        assert_eq!(h.get(&m), Some(300));
    }

    #[test]
    fn bulk_add_equals_repeated_add() {
        let h = array(9, 6, 7);
        let m = mer("GATTACAGA");
        assert_eq!(h.add(&m, 5_000).unwrap(), AddOutcome::Added);
        assert_eq!(h.get(&m), Some(5_000));
    }

    #[test]
    fn chain_capacity_exhaustion_reports_full() {
        // Tiny remainders leave almost no continuation room; a huge bulk
        // add must come back as Full with the unabsorbed rest.
        let h = array(4, 6, 7);
        let m = mer("ACGT");
        match h.add(&m, 1_000_000).unwrap() {
            AddOutcome::Full { pending } => {
                let absorbed = h.get(&m).unwrap();
                assert_eq!(absorbed + pending, 1_000_000);
            }
            AddOutcome::Added => panic!("2-bit value areas cannot hold a million"),
        }
    }

    #[test]
    fn single_slot_table_fills_on_second_key() {
        let h = HashArray::new(
            HashConfig {
                k: 3,
                lsize: 0,
                counter_len: 7,
                max_reprobe: 62,
            },
            1,
        )
        .unwrap();
        assert_eq!(h.size(), 1);
        assert_eq!(h.add(&mer("ACG"), 1).unwrap(), AddOutcome::Added);
        assert_eq!(
            h.add(&mer("TGA"), 1).unwrap(),
            AddOutcome::Full { pending: 1 }
        );
        assert_eq!(h.get(&mer("ACG")), Some(1));
    }

    #[test]
    fn full_reports_pending_amount() {
        // 4 slots, many distinct keys.
        let h = HashArray::new(
            HashConfig {
                k: 6,
                lsize: 2,
                counter_len: 7,
                max_reprobe: 62,
            },
            7,
        )
        .unwrap();
        let keys = ["AAAAAA", "CCCCCC", "GGGGGG", "TTTTTT", "ACACAC", "GTGTGT"];
        let mut full = 0;
        for s in keys {
            if let AddOutcome::Full { pending } = h.add(&mer(s), 3).unwrap() {
                assert_eq!(pending, 3);
                full += 1;
            }
        }
        assert!(full >= 1, "6 keys into 4 slots must report full");
    }

    #[test]
    fn iteration_recovers_keys_and_counts() {
        let h = array(5, 4, 7);
        let input = [("ACGTA", 3u64), ("TTTTT", 1), ("GATTA", 200), ("CCCCC", 7)];
        for (s, n) in input {
            h.add(&mer(s), n).unwrap();
        }
        let mut got: Vec<(String, u64)> = Vec::new();
        let mut entries = Vec::new();
        h.gather_slice(0, h.size(), &mut entries);
        for e in &entries {
            got.push((e.mer.to_string(), e.count));
        }
        got.sort();
        let mut want: Vec<(String, u64)> =
            input.iter().map(|(s, n)| (s.to_string(), *n)).collect();
        want.sort();
        assert_eq!(got, want);
        // Slice order is home order.
        assert!(entries.windows(2).all(|w| w[0].home <= w[1].home));
    }

    #[test]
    fn slices_partition_the_table() {
        let h = array(6, 8, 7);
        for i in 0..60u64 {
            // Distinct 6-mers from the counter value.
            let mut m = Mer::new(6);
            for b in 0..6 {
                m.shift_left(((i >> (2 * b)) & 3) as u8);
            }
            h.add(&m, i + 1).unwrap();
        }
        let mut all = Vec::new();
        h.gather_slice(0, h.size(), &mut all);
        let mut pieces = Vec::new();
        let step = h.size() / 8;
        for c in 0..8 {
            let lo = c * step;
            let hi = if c == 7 { h.size() } else { (c + 1) * step };
            let mut part = Vec::new();
            h.gather_slice(lo, hi, &mut part);
            pieces.extend(part);
        }
        assert_eq!(all.len(), pieces.len());
        let key = |e: &SliceEntry| (e.home, e.mer.clone(), e.count);
        let mut a: Vec<_> = all.iter().map(key).collect();
        let mut b: Vec<_> = pieces.iter().map(key).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn zeroed_table_counts_again() {
        let h = array(5, 6, 7);
        h.add(&mer("ACGTA"), 5).unwrap();
        h.zero_slice(0, h.size()).unwrap();
        assert_eq!(h.get(&mer("ACGTA")), None);
        h.add(&mer("ACGTA"), 2).unwrap();
        assert_eq!(h.get(&mer("ACGTA")), Some(2));
    }

    #[test]
    fn reinsert_preserves_counts_across_growth() {
        let old = array(5, 4, 7);
        let input = [("ACGTA", 200u64), ("TTTTT", 1), ("GATTA", 9)];
        for (s, n) in input {
            old.add(&mer(s), n).unwrap();
        }
        let next = HashArray::with_matrix(
            HashConfig {
                k: 5,
                lsize: 5,
                counter_len: 7,
                max_reprobe: 62,
            },
            old.matrix().clone(),
            old.matrix().inverse().unwrap(),
        )
        .unwrap();
        assert_eq!(old.reinsert_into(&next).unwrap(), AddOutcome::Added);
        for (s, n) in input {
            assert_eq!(next.get(&mer(s)), Some(n), "{s}");
        }
    }

    #[test]
    fn concurrent_adds_sum_correctly() {
        use std::sync::Arc;
        let h = Arc::new(array(8, 10, 7));
        let mers: Vec<Mer> = ["ACGTACGT", "TTTTAAAA", "GGGGCCCC", "GATTACAG"]
            .iter()
            .map(|s| mer(s))
            .collect();
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let h = Arc::clone(&h);
                let mers = mers.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        for m in &mers {
                            h.add(m, 1).unwrap();
                        }
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        for m in &mers {
            assert_eq!(h.get(m), Some(2000), "{m}");
        }
    }
}
