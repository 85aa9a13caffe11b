//! Fixed-length 2-bit packed k-mers.
//!
//! A mer of length k occupies 2k bits across little-endian 64-bit words
//! (word 0 = least significant); the first base of the string sits in the
//! highest bit pair, so numeric order equals lexicographic string order.
//! Up to k = 64 the words stay inline (no allocation).

use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::mer::codes::{base_char, dna_code, DnaCode};

/// Largest supported mer length.
pub const MAX_K: u32 = 4096;

/// A length-k DNA word, 2 bits per base.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Mer {
    k: u32,
    words: SmallVec<[u64; 2]>,
}

impl Mer {
    /// The all-A mer of length `k`.
    pub fn new(k: u32) -> Mer {
        debug_assert!((1..=MAX_K).contains(&k));
        Mer {
            k,
            words: SmallVec::from_elem(0, Self::word_count(k)),
        }
    }

    /// Number of 64-bit words needed for `k` bases.
    #[inline]
    pub fn word_count(k: u32) -> usize {
        (2 * k as usize).div_ceil(64)
    }

    /// Bits occupied in the most significant word (1..=64).
    #[inline]
    fn top_bits(&self) -> u32 {
        let r = (2 * self.k) % 64;
        if r == 0 {
            64
        } else {
            r
        }
    }

    #[inline]
    fn top_mask(&self) -> u64 {
        let tb = self.top_bits();
        if tb == 64 {
            u64::MAX
        } else {
            (1u64 << tb) - 1
        }
    }

    #[inline]
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Backing words, least significant first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Rebuild a mer from backing words (extra high bits are masked off).
    pub fn from_words(k: u32, words: &[u64]) -> Mer {
        let mut m = Mer::new(k);
        for (dst, src) in m.words.iter_mut().zip(words) {
            *dst = *src;
        }
        let top = m.words.len() - 1;
        m.words[top] &= m.top_mask();
        m
    }

    /// Parse a mer from its string form; k is the string length.
    pub fn from_str_mer(s: &str) -> Result<Mer> {
        let k = s.len() as u32;
        if !(1..=MAX_K).contains(&k) {
            return Err(Error::Config(format!(
                "mer length must be in 1..={MAX_K}, got {k}"
            )));
        }
        let mut m = Mer::new(k);
        for b in s.bytes() {
            match dna_code(b) {
                DnaCode::Base(c) => m.shift_left(c),
                _ => {
                    return Err(Error::Config(format!(
                        "invalid base '{}' in mer string",
                        b as char
                    )))
                }
            }
        }
        Ok(m)
    }

    /// The 2-bit code of base `i`, counting from the first (leftmost) base.
    #[inline]
    pub fn base(&self, i: u32) -> u8 {
        debug_assert!(i < self.k);
        self.get_bits(2 * (self.k - 1 - i) as u64, 2) as u8
    }

    /// Drop the first base, append `code` as the new last base.
    pub fn shift_left(&mut self, code: u8) {
        let mut carry = (code & 3) as u64;
        for w in self.words.iter_mut() {
            let out = *w >> 62;
            *w = (*w << 2) | carry;
            carry = out;
        }
        let top = self.words.len() - 1;
        self.words[top] &= self.top_mask();
    }

    /// Drop the last base, prepend `code` as the new first base.
    pub fn shift_right(&mut self, code: u8) {
        let n = self.words.len();
        for w in 0..n - 1 {
            self.words[w] = (self.words[w] >> 2) | (self.words[w + 1] << 62);
        }
        self.words[n - 1] >>= 2;
        let top_off = 2 * (self.k as u64 - 1);
        self.set_bits(top_off, 2, (code & 3) as u64);
    }

    /// The reverse complement, as a new mer.
    pub fn reverse_complement(&self) -> Mer {
        let n = self.words.len();
        let mut rc = Mer::new(self.k);
        // Pair-reverse and complement the whole register, then shift the
        // result down past the unused high bits.
        for i in 0..n {
            rc.words[i] = word_reverse_complement(self.words[n - 1 - i]);
        }
        let pad = 64 * n as u32 - 2 * self.k;
        rc.shift_right_bits(pad);
        let top = n - 1;
        rc.words[top] &= rc.top_mask();
        rc
    }

    /// Whole-value right shift by `bits` (< 64 * word count).
    fn shift_right_bits(&mut self, bits: u32) {
        if bits == 0 {
            return;
        }
        let n = self.words.len();
        let word_shift = (bits / 64) as usize;
        let bit_shift = bits % 64;
        for i in 0..n {
            let src = i + word_shift;
            let mut v = if src < n { self.words[src] } else { 0 };
            if bit_shift > 0 {
                v >>= bit_shift;
                if src + 1 < n {
                    v |= self.words[src + 1] << (64 - bit_shift);
                }
            }
            self.words[i] = v;
        }
    }

    /// The lexicographic minimum of this mer and its reverse complement.
    pub fn canonical(&self) -> Mer {
        let rc = self.reverse_complement();
        if rc < *self {
            rc
        } else {
            self.clone()
        }
    }

    /// Read `len ≤ 64` bits at bit offset `off` (from the LSB).
    pub fn get_bits(&self, off: u64, len: u32) -> u64 {
        debug_assert!(len <= 64 && off + len as u64 <= 64 * self.words.len() as u64);
        if len == 0 {
            return 0;
        }
        let word = (off / 64) as usize;
        let shift = (off % 64) as u32;
        let mask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
        let mut v = self.words[word] >> shift;
        if shift + len > 64 {
            v |= self.words[word + 1] << (64 - shift);
        }
        v & mask
    }

    /// Write `len ≤ 64` bits at bit offset `off`.
    pub fn set_bits(&mut self, off: u64, len: u32, value: u64) {
        debug_assert!(len <= 64 && off + len as u64 <= 64 * self.words.len() as u64);
        if len == 0 {
            return;
        }
        let word = (off / 64) as usize;
        let shift = (off % 64) as u32;
        let mask = if len == 64 { u64::MAX } else { (1u64 << len) - 1 };
        let value = value & mask;
        self.words[word] = (self.words[word] & !(mask << shift)) | (value << shift);
        if shift + len > 64 {
            let spill = 64 - shift;
            let hi_mask = mask >> spill;
            self.words[word + 1] =
                (self.words[word + 1] & !hi_mask) | (value >> spill);
        }
        let top = self.words.len() - 1;
        self.words[top] &= self.top_mask();
    }

    /// Number of key bytes in the on-disk record form.
    #[inline]
    pub fn key_bytes(k: u32) -> usize {
        (2 * k as usize).div_ceil(8)
    }

    /// Append the little-endian record form (⌈2k/8⌉ bytes).
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        let nb = Self::key_bytes(self.k);
        for i in 0..nb {
            let word = i / 8;
            let sh = (i % 8) * 8;
            out.push((self.words[word] >> sh) as u8);
        }
    }

    /// Rebuild a mer from its little-endian record form.
    pub fn from_le_bytes(k: u32, bytes: &[u8]) -> Mer {
        debug_assert_eq!(bytes.len(), Self::key_bytes(k));
        let mut m = Mer::new(k);
        for (i, b) in bytes.iter().enumerate() {
            let word = i / 8;
            let sh = (i % 8) * 8;
            m.words[word] |= (*b as u64) << sh;
        }
        let top = m.words.len() - 1;
        m.words[top] &= m.top_mask();
        m
    }
}

impl Ord for Mer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        debug_assert_eq!(self.k, other.k);
        // Numeric comparison, most significant word first.
        for (a, b) in self.words.iter().rev().zip(other.words.iter().rev()) {
            match a.cmp(b) {
                std::cmp::Ordering::Equal => continue,
                ord => return ord,
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl PartialOrd for Mer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Mer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for i in 0..self.k {
            write!(f, "{}", base_char(self.base(i)) as char)?;
        }
        Ok(())
    }
}

/// Reverse complement of one packed word: swap bit pairs end to end, then
/// complement.
#[inline]
fn word_reverse_complement(mut w: u64) -> u64 {
    w = ((w >> 2) & 0x3333_3333_3333_3333) | ((w & 0x3333_3333_3333_3333) << 2);
    w = ((w >> 4) & 0x0F0F_0F0F_0F0F_0F0F) | ((w & 0x0F0F_0F0F_0F0F_0F0F) << 4);
    w = w.swap_bytes();
    !w
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_rc(s: &str) -> String {
        s.chars()
            .rev()
            .map(|c| match c {
                'A' => 'T',
                'C' => 'G',
                'G' => 'C',
                'T' => 'A',
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn string_round_trip_across_k_boundaries() {
        for s in [
            "A",
            "T",
            "ACG",
            "ACGTACGTACGTACGTACGTACGTACGTACG",  // k = 31
            "ACGTACGTACGTACGTACGTACGTACGTACGT", // k = 32
            &"GATTACA".repeat(9),               // k = 63
            &"ACGT".repeat(20),                 // k = 80, multi-word
        ] {
            let m = Mer::from_str_mer(s).unwrap();
            assert_eq!(m.to_string(), *s, "k = {}", s.len());
        }
    }

    #[test]
    fn shift_left_keeps_window() {
        let mut m = Mer::from_str_mer("AACGT").unwrap();
        m.shift_left(3); // T
        assert_eq!(m.to_string(), "ACGTT");
        m.shift_left(0); // A
        assert_eq!(m.to_string(), "CGTTA");
    }

    #[test]
    fn shift_right_prepends() {
        let mut m = Mer::from_str_mer("ACGTA").unwrap();
        m.shift_right(3); // T becomes first base
        assert_eq!(m.to_string(), "TACGT");
    }

    #[test]
    fn reverse_complement_matches_naive() {
        for s in [
            "A",
            "ACGT",
            "GATTACA",
            "ACGTACGTACGTACGTACGTACGTACGTACG",
            "ACGTACGTACGTACGTACGTACGTACGTACGT",
            &"GATTACA".repeat(9),
            &"TTGACGTA".repeat(10), // k = 80
        ] {
            let m = Mer::from_str_mer(s).unwrap();
            assert_eq!(m.reverse_complement().to_string(), naive_rc(s), "{s}");
        }
    }

    #[test]
    fn rc_is_an_involution() {
        let m = Mer::from_str_mer("GATTACAGATTACAGATTACA").unwrap();
        assert_eq!(m.reverse_complement().reverse_complement(), m);
    }

    #[test]
    fn canonical_is_idempotent_and_minimal() {
        // RC(GTA) = TAC, which sorts above GTA, so GTA is already canonical.
        let m = Mer::from_str_mer("GTA").unwrap();
        let c = m.canonical();
        assert_eq!(c.to_string(), "GTA");
        assert_eq!(c.canonical(), c);
        // The larger spelling of the pair folds onto it.
        assert_eq!(Mer::from_str_mer("TAC").unwrap().canonical(), c);
        // A self-complementary mer is its own canonical form.
        let p = Mer::from_str_mer("ACGT").unwrap();
        assert_eq!(p.canonical(), p);
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a = Mer::from_str_mer(&"ACGT".repeat(20)).unwrap();
        let mut s = "ACGT".repeat(19);
        s.push_str("ACGG");
        let b = Mer::from_str_mer(&s).unwrap();
        assert!(b < a);
        assert!(a == a.clone());
    }

    #[test]
    fn le_bytes_round_trip() {
        for s in ["ACG", "ACGTACGTACGTACGTACGTACGTACGTACG", &"CAT".repeat(40)] {
            let m = Mer::from_str_mer(s).unwrap();
            let mut bytes = Vec::new();
            m.write_le_bytes(&mut bytes);
            assert_eq!(bytes.len(), Mer::key_bytes(m.k()));
            assert_eq!(Mer::from_le_bytes(m.k(), &bytes), m);
        }
    }

    #[test]
    fn get_set_bits_round_trip() {
        let mut m = Mer::new(40); // 80 bits, two words
        m.set_bits(60, 10, 0x2A5);
        assert_eq!(m.get_bits(60, 10), 0x2A5);
        m.set_bits(0, 2, 3);
        assert_eq!(m.to_string().chars().last(), Some('T'));
    }

    #[test]
    fn rejects_bad_strings() {
        assert!(Mer::from_str_mer("").is_err());
        assert!(Mer::from_str_mer("ACGN").is_err());
        assert!(Mer::from_str_mer("AC-T").is_err());
    }
}
