//! Bucket-ordered snapshotting of the live array.
//!
//! The table is cut into `threads × 100` home-bucket slices. Dumper threads
//! claim slice ids with an atomic fetch-add and gather each slice into a
//! private buffer; a token ring serializes the writes so sections land in
//! the file in slice order, which makes the whole file non-decreasing in
//! bucket position. Gathering overlaps with other threads' writes, so the
//! wall-clock cost is dominated by the slowest gather, not the sum.
//!
//! The caller holds the grow/dump barrier for the duration, so writers are
//! quiesced; when zero-on-dump is requested the table is cleared in
//! parallel after the last section is written and counting resumes on an
//! empty array.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;
use xxhash_rust::xxh64::Xxh64;

use crate::dump::header::{DumpFooter, DumpFormat, FileHeader};
use crate::dump::token_ring::TokenRing;
use crate::error::{Error, Result};
use crate::hash::array::{HashArray, SliceEntry};

/// Inclusive count bounds applied to dumped records.
#[derive(Debug, Clone, Copy)]
pub struct DumpBounds {
    pub min: u64,
    pub max: u64,
}

impl Default for DumpBounds {
    fn default() -> Self {
        DumpBounds {
            min: 0,
            max: u64::MAX,
        }
    }
}

impl DumpBounds {
    #[inline]
    pub fn contains(&self, count: u64) -> bool {
        count >= self.min && count <= self.max
    }
}

/// Record encoding of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFormat {
    Binary,
    Text,
}

/// Snapshot writer; one instance describes one dump's parameters.
pub struct SortedDumper {
    threads: usize,
    value_bytes: u32,
    bounds: DumpBounds,
    body: BodyFormat,
    zero_on_dump: bool,
}

struct OutState<'w> {
    out: &'w mut (dyn Write + Send),
    hasher: Xxh64,
    body_bytes: u64,
}

impl SortedDumper {
    pub fn new(threads: usize, value_bytes: u32) -> SortedDumper {
        SortedDumper {
            threads: threads.max(1),
            value_bytes: value_bytes.clamp(1, 8),
            bounds: DumpBounds::default(),
            body: BodyFormat::Binary,
            zero_on_dump: true,
        }
    }

    pub fn bounds(mut self, bounds: DumpBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn body(mut self, body: BodyFormat) -> Self {
        self.body = body;
        self
    }

    pub fn zero_on_dump(mut self, zero: bool) -> Self {
        self.zero_on_dump = zero;
        self
    }

    /// Largest value the declared width can carry; larger counts saturate.
    #[inline]
    fn max_value(&self) -> u64 {
        if self.value_bytes >= 8 {
            u64::MAX
        } else {
            (1u64 << (8 * self.value_bytes)) - 1
        }
    }

    /// Snapshot `ary` into `out`. Records appear in non-decreasing bucket
    /// position; binary bodies get the completion footer.
    pub fn dump<W: Write + Send>(&self, ary: &HashArray, out: &mut W) -> Result<()> {
        let format = match self.body {
            BodyFormat::Binary => DumpFormat::BinarySorted,
            BodyFormat::Text => DumpFormat::TextSorted,
        };
        let header = FileHeader::for_array(format, ary, self.value_bytes);
        header
            .write(out)
            .map_err(|e| Error::io("<dump>", e))?;

        let threads = self.threads;
        let n_slices = (threads as u64 * 100).min(ary.size());
        let next = AtomicU64::new(0);
        let ring = TokenRing::new(threads);
        let failed = AtomicBool::new(false);
        let first_err: Mutex<Option<Error>> = Mutex::new(None);
        let out_state = Mutex::new(OutState {
            out: out as &mut (dyn Write + Send),
            hasher: Xxh64::new(0),
            body_bytes: 0,
        });

        let slice_bounds = |id: u64| -> (u64, u64) {
            let size = ary.size() as u128;
            let lo = (id as u128 * size / n_slices as u128) as u64;
            let hi = ((id + 1) as u128 * size / n_slices as u128) as u64;
            (lo, hi)
        };
        let slice_bounds = &slice_bounds;

        // Dumper threads block on the ring, so they get their own OS
        // threads rather than rayon workers.
        std::thread::scope(|s| {
            for t in 0..threads {
                let ring = &ring;
                let next = &next;
                let failed = &failed;
                let first_err = &first_err;
                let out_state = &out_state;
                s.spawn(move || {
                    let mut entries: Vec<SliceEntry> = Vec::new();
                    let mut record_buf: Vec<u8> = Vec::new();
                    let mut have_buffer = false;
                    loop {
                        ring.wait(t);
                        if have_buffer && !failed.load(Ordering::Relaxed) {
                            let mut st = out_state.lock().unwrap();
                            if let Err(e) = write_section(&mut st, &record_buf, self.body) {
                                first_err.lock().unwrap().get_or_insert(e);
                                failed.store(true, Ordering::Relaxed);
                            }
                        }
                        have_buffer = false;
                        let id = next.fetch_add(1, Ordering::Relaxed);
                        ring.pass(t);
                        if id >= n_slices {
                            break;
                        }
                        if failed.load(Ordering::Relaxed) {
                            continue;
                        }
                        let (lo, hi) = slice_bounds(id);
                        ary.gather_slice(lo, hi, &mut entries);
                        record_buf.clear();
                        self.encode_section(&entries, &mut record_buf);
                        have_buffer = true;
                    }
                });
            }
        });

        if let Some(e) = first_err.into_inner().unwrap() {
            return Err(e);
        }

        let OutState {
            out,
            hasher,
            body_bytes,
        } = out_state.into_inner().unwrap();
        if self.body == BodyFormat::Binary {
            let footer = DumpFooter {
                body_bytes,
                checksum: hasher.digest(),
            };
            footer.write(out).map_err(|e| Error::io("<dump>", e))?;
        }
        out.flush().map_err(|e| Error::io("<dump>", e))?;

        if self.zero_on_dump {
            let n = n_slices;
            (0..n)
                .into_par_iter()
                .try_for_each(|id| {
                    let (lo, hi) = slice_bounds(id);
                    ary.zero_slice(lo, hi)
                })?;
        }
        Ok(())
    }

    /// Serialize one gathered slice into `buf`, applying the count bounds
    /// and the declared value width.
    fn encode_section(&self, entries: &[SliceEntry], buf: &mut Vec<u8>) {
        let max_value = self.max_value();
        for e in entries {
            if !self.bounds.contains(e.count) {
                continue;
            }
            let value = e.count.min(max_value);
            match self.body {
                BodyFormat::Binary => {
                    e.mer.write_le_bytes(buf);
                    buf.extend_from_slice(&value.to_le_bytes()[..self.value_bytes as usize]);
                }
                BodyFormat::Text => {
                    buf.extend_from_slice(e.mer.to_string().as_bytes());
                    buf.push(b' ');
                    buf.extend_from_slice(value.to_string().as_bytes());
                    buf.push(b'\n');
                }
            }
        }
    }
}

fn write_section(st: &mut OutState, bytes: &[u8], body: BodyFormat) -> Result<()> {
    st.out
        .write_all(bytes)
        .map_err(|e| Error::io("<dump>", e))?;
    if body == BodyFormat::Binary {
        st.hasher.update(bytes);
    }
    st.body_bytes += bytes.len() as u64;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::array::HashConfig;
    use crate::mer::Mer;

    fn filled_array() -> HashArray {
        let h = HashArray::new(
            HashConfig {
                k: 5,
                lsize: 4,
                counter_len: 7,
                max_reprobe: 62,
            },
            21,
        )
        .unwrap();
        for (s, n) in [("ACGTA", 3u64), ("TTTTT", 1), ("GATTA", 300), ("CCCCC", 7)] {
            h.add(&Mer::from_str_mer(s).unwrap(), n).unwrap();
        }
        h
    }

    #[test]
    fn binary_dump_has_header_records_and_footer() {
        let ary = filled_array();
        let mut buf = Vec::new();
        SortedDumper::new(2, 4)
            .zero_on_dump(false)
            .dump(&ary, &mut buf)
            .unwrap();

        let mut cursor = std::io::Cursor::new(&buf);
        let header = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(header.format, DumpFormat::BinarySorted);
        assert_eq!(header.k, 5);
        let record_len = (header.key_bytes + header.value_bytes) as usize;
        let body_len = buf.len() - header.byte_len() as usize - 24;
        assert_eq!(body_len % record_len, 0);
        assert_eq!(body_len / record_len, 4);

        let tail: [u8; 24] = buf[buf.len() - 24..].try_into().unwrap();
        let footer = DumpFooter::parse(&tail).unwrap();
        assert_eq!(footer.body_bytes as usize, body_len);
    }

    #[test]
    fn text_dump_lists_every_record() {
        let ary = filled_array();
        let mut buf = Vec::new();
        SortedDumper::new(1, 4)
            .body(BodyFormat::Text)
            .zero_on_dump(false)
            .dump(&ary, &mut buf)
            .unwrap();
        let text = String::from_utf8_lossy(&buf);
        for want in ["ACGTA 3", "TTTTT 1", "GATTA 300", "CCCCC 7"] {
            assert!(text.contains(want), "missing '{want}' in:\n{text}");
        }
    }

    #[test]
    fn bounds_filter_records() {
        let ary = filled_array();
        let mut buf = Vec::new();
        SortedDumper::new(1, 4)
            .body(BodyFormat::Text)
            .bounds(DumpBounds { min: 2, max: 10 })
            .zero_on_dump(false)
            .dump(&ary, &mut buf)
            .unwrap();
        let text = String::from_utf8_lossy(&buf);
        assert!(text.contains("ACGTA 3") && text.contains("CCCCC 7"));
        assert!(!text.contains("TTTTT") && !text.contains("GATTA"));
    }

    #[test]
    fn value_width_saturates_counts() {
        let ary = filled_array();
        let mut buf = Vec::new();
        SortedDumper::new(1, 1)
            .body(BodyFormat::Text)
            .zero_on_dump(false)
            .dump(&ary, &mut buf)
            .unwrap();
        // 300 saturates to 255 at 1 value byte.
        assert!(String::from_utf8_lossy(&buf).contains("GATTA 255"));
    }

    #[test]
    fn zero_on_dump_clears_the_table() {
        let ary = filled_array();
        let mut buf = Vec::new();
        SortedDumper::new(2, 4).dump(&ary, &mut buf).unwrap();
        let mut left = Vec::new();
        ary.gather_slice(0, ary.size(), &mut left);
        assert!(left.is_empty());
    }

    #[test]
    fn empty_array_dumps_header_and_footer_only() {
        let ary = HashArray::new(
            HashConfig {
                k: 5,
                lsize: 4,
                counter_len: 7,
                max_reprobe: 62,
            },
            3,
        )
        .unwrap();
        let mut buf = Vec::new();
        SortedDumper::new(3, 4).dump(&ary, &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(&buf);
        let header = FileHeader::read(&mut cursor).unwrap();
        assert_eq!(buf.len() as u64, header.byte_len() + 24);
    }
}
