//! Fold equal keys across sorted snapshots into one sorted stream.
//!
//! All inputs must come from the same hash function (equal k, lsize and
//! serialized matrix rows): records then arrive in the shared
//! `(bucket position, key)` order and a min-heap of one cursor per file
//! interleaves them; runs of equal keys fold according to the requested
//! operation. A cursor is READY while its file has records and is dropped
//! from the heap once EXHAUSTED.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::Write;
use std::path::PathBuf;

use smallvec::SmallVec;
use xxhash_rust::xxh64::Xxh64;

use crate::dump::header::{DumpFooter, FileHeader};
use crate::dump::reader::SortedReader;
use crate::dump::sorted::DumpBounds;
use crate::error::{Error, Result};
use crate::mer::Mer;

/// Fold operation over the counts of one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldOp {
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeSummary {
    pub records_in: u64,
    pub records_out: u64,
}

/// Pairwise-style totals for the Jaccard estimate over N inputs:
/// Σ min over files (0 when a key misses one) and Σ max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JaccardTotals {
    pub intersection: u64,
    pub union: u64,
}

impl JaccardTotals {
    pub fn index(&self) -> f64 {
        if self.union == 0 {
            0.0
        } else {
            self.intersection as f64 / self.union as f64
        }
    }
}

struct HeapItem {
    pos: u64,
    mer: Mer,
    count: u64,
    src: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.pos == other.pos && self.mer == other.mer && self.src == other.src
    }
}
impl Eq for HeapItem {}
impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.pos, &self.mer, self.src).cmp(&(other.pos, &other.mer, other.src))
    }
}

/// One group of records sharing `(pos, mer)`, with per-source counts in
/// source order.
type Group = (u64, Mer, SmallVec<[(usize, u64); 4]>);

struct KWay {
    readers: Vec<SortedReader>,
    heap: BinaryHeap<Reverse<HeapItem>>,
    records_in: u64,
}

impl KWay {
    fn open(inputs: &[PathBuf]) -> Result<(KWay, FileHeader)> {
        if inputs.is_empty() {
            return Err(Error::Merge("no input files".into()));
        }
        let mut readers = Vec::with_capacity(inputs.len());
        for path in inputs {
            let r = SortedReader::open(path)?;
            if !r.complete {
                return Err(Error::Merge(format!(
                    "'{}' is a partial dump (missing completion footer)",
                    path.display()
                )));
            }
            readers.push(r);
        }
        let first = readers[0].header.clone();
        for r in &readers[1..] {
            let h = &r.header;
            if h.k != first.k || h.lsize != first.lsize || h.rows != first.rows {
                return Err(Error::Merge(format!(
                    "'{}' was produced with a different hash function than '{}'",
                    r.path().display(),
                    readers[0].path().display()
                )));
            }
        }

        let mut kway = KWay {
            readers,
            heap: BinaryHeap::with_capacity(inputs.len()),
            records_in: 0,
        };
        for i in 0..kway.readers.len() {
            kway.advance(i)?;
        }
        Ok((kway, first))
    }

    /// Refill the heap from source `i`; an exhausted cursor just drops out.
    fn advance(&mut self, i: usize) -> Result<()> {
        if let Some((mer, count)) = self.readers[i].next_record()? {
            let pos = self.readers[i].position_of(&mer);
            self.records_in += 1;
            self.heap.push(Reverse(HeapItem {
                pos,
                mer,
                count,
                src: i,
            }));
        }
        Ok(())
    }

    /// Pop the next run of equal `(pos, mer)` records.
    fn next_group(&mut self) -> Result<Option<Group>> {
        let Some(Reverse(head)) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(head.src)?;
        let mut counts: SmallVec<[(usize, u64); 4]> = SmallVec::new();
        counts.push((head.src, head.count));
        while let Some(Reverse(peek)) = self.heap.peek() {
            if peek.pos != head.pos || peek.mer != head.mer {
                break;
            }
            let Reverse(item) = self.heap.pop().expect("peeked");
            self.advance(item.src)?;
            // The same source can contribute twice only through a dump
            // with duplicate keys; fold those immediately.
            match counts.last_mut() {
                Some((src, c)) if *src == item.src => *c = c.saturating_add(item.count),
                _ => counts.push((item.src, item.count)),
            }
        }
        Ok(Some((head.pos, head.mer, counts)))
    }
}

/// Merge `inputs` into `out` with `op`, filtering folded counts through
/// `bounds`. `value_bytes` overrides the output width (default: the widest
/// input). SUM folds in 64-bit saturating arithmetic and saturates once
/// more to the output width when written.
pub fn merge_sorted<W: Write>(
    inputs: &[PathBuf],
    out: &mut W,
    op: FoldOp,
    bounds: DumpBounds,
    value_bytes: Option<u32>,
) -> Result<MergeSummary> {
    let (mut kway, first) = KWay::open(inputs)?;
    let value_bytes = value_bytes
        .unwrap_or_else(|| kway.readers.iter().map(|r| r.header.value_bytes).max().unwrap())
        .clamp(1, 8);
    let max_value = if value_bytes >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * value_bytes)) - 1
    };

    let header = FileHeader {
        value_bytes,
        ..first
    };
    let io = |e| Error::io("<merge>", e);
    header.write(out).map_err(io)?;

    let mut hasher = Xxh64::new(0);
    let mut body_bytes = 0u64;
    let mut records_out = 0u64;
    let mut record = Vec::with_capacity(header.key_bytes as usize + 8);

    while let Some((_pos, mer, counts)) = kway.next_group()? {
        let folded = match op {
            FoldOp::Sum => counts.iter().fold(0u64, |a, (_, c)| a.saturating_add(*c)),
            FoldOp::Min => counts.iter().map(|(_, c)| *c).min().unwrap_or(0),
            FoldOp::Max => counts.iter().map(|(_, c)| *c).max().unwrap_or(0),
        };
        if !bounds.contains(folded) {
            continue;
        }
        record.clear();
        mer.write_le_bytes(&mut record);
        record.extend_from_slice(&folded.min(max_value).to_le_bytes()[..value_bytes as usize]);
        out.write_all(&record).map_err(io)?;
        hasher.update(&record);
        body_bytes += record.len() as u64;
        records_out += 1;
    }

    DumpFooter {
        body_bytes,
        checksum: hasher.digest(),
    }
    .write(out)
    .map_err(io)?;
    out.flush().map_err(io)?;
    Ok(MergeSummary {
        records_in: kway.records_in,
        records_out,
    })
}

/// Jaccard totals over `inputs`: for each key, min and max of its counts
/// across all files (a key absent from any file contributes 0 to the
/// intersection side).
pub fn jaccard(inputs: &[PathBuf]) -> Result<JaccardTotals> {
    let (mut kway, _) = KWay::open(inputs)?;
    let n = inputs.len();
    let mut totals = JaccardTotals::default();
    while let Some((_pos, _mer, counts)) = kway.next_group()? {
        let min = counts.iter().map(|(_, c)| *c).min().unwrap_or(0);
        let max = counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
        if counts.len() == n {
            totals.intersection = totals.intersection.saturating_add(min);
        }
        totals.union = totals.union.saturating_add(max);
    }
    Ok(totals)
}
