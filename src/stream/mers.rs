//! Rolling mer windows over the parser's buffers.
//!
//! Keeps a forward window and (when canonicalizing) its reverse complement
//! rolling in lockstep; a break mark resets the fill count, and a window is
//! emitted once k valid bases are in. Finite and not restartable: the
//! stream ends when the pool closes.

use crate::mer::codes::{dna_code, DnaCode};
use crate::mer::Mer;
use crate::stream::pool::{CooperativePool, PoolJob};

pub struct MerStream<'p> {
    pool: &'p CooperativePool,
    k: u32,
    canonical: bool,
    job: Option<PoolJob<'p>>,
    pos: usize,
    fwd: Mer,
    rev: Mer,
    filled: u32,
}

impl<'p> MerStream<'p> {
    pub fn new(pool: &'p CooperativePool, k: u32, canonical: bool) -> MerStream<'p> {
        MerStream {
            pool,
            k,
            canonical,
            job: None,
            pos: 0,
            fwd: Mer::new(k),
            rev: Mer::new(k),
            filled: 0,
        }
    }

    /// The next (possibly canonicalized) mer, or `None` at end of input.
    ///
    /// The returned reference lives until the next call.
    pub fn next_mer(&mut self) -> Option<&Mer> {
        loop {
            if self.job.is_none() {
                self.job = Some(self.pool.next()?);
                let job = self.job.as_ref().expect("just set");
                self.pos = job.start;
                // The seam replays the previous chunk's tail, so the
                // window always restarts at a chunk boundary.
                self.filled = 0;
            }

            let mut emitted = false;
            {
                let job = self.job.as_ref().expect("checked above");
                while self.pos < job.end {
                    let b = job.data[self.pos];
                    self.pos += 1;
                    match dna_code(b) {
                        DnaCode::Base(c) => {
                            self.fwd.shift_left(c);
                            if self.canonical {
                                self.rev.shift_right(3 - c);
                            }
                            self.filled = (self.filled + 1).min(self.k);
                            if self.filled == self.k {
                                emitted = true;
                                break;
                            }
                        }
                        _ => self.filled = 0,
                    }
                }
            }
            if emitted {
                return Some(if self.canonical && self.rev < self.fwd {
                    &self.rev
                } else {
                    &self.fwd
                });
            }
            self.job = None; // chunk exhausted; buffer returns to the pool
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FirstError;
    use crate::stream::parser::{AmbigPolicy, SeqParser};
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::Arc;

    fn count_mers(content: &str, k: u32, canonical: bool) -> HashMap<String, u64> {
        count_mers_cap(content, k, canonical, 4096)
    }

    fn count_mers_cap(
        content: &str,
        k: u32,
        canonical: bool,
        cap: usize,
    ) -> HashMap<String, u64> {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("in.fa");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        let parser = SeqParser::new(k, AmbigPolicy::Break, vec![path]);
        let pool = CooperativePool::new(Box::new(parser), 4, cap, Arc::new(FirstError::new()));
        let mut mers = MerStream::new(&pool, k, canonical);
        let mut counts = HashMap::new();
        while let Some(m) = mers.next_mer() {
            *counts.entry(m.to_string()).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn all_windows_of_a_plain_record() {
        let counts = count_mers(">r\nACGTACGT\n", 3, false);
        let want: HashMap<String, u64> = [
            ("ACG".to_string(), 2),
            ("CGT".to_string(), 2),
            ("GTA".to_string(), 1),
            ("TAC".to_string(), 1),
        ]
        .into();
        assert_eq!(counts, want);
    }

    #[test]
    fn canonical_windows_fold_reverse_complements() {
        // ACG/CGT and GTA/TAC are reverse-complement pairs; the smaller
        // spelling of each pair absorbs both counts.
        let counts = count_mers(">r\nACGTACGT\n", 3, true);
        let want: HashMap<String, u64> =
            [("ACG".to_string(), 4), ("GTA".to_string(), 2)].into();
        assert_eq!(counts, want);
    }

    #[test]
    fn breaks_reset_the_window() {
        let counts = count_mers(">r\nNNACGTACGTNN\n", 4, false);
        let want: HashMap<String, u64> = [
            ("ACGT".to_string(), 2),
            ("CGTA".to_string(), 1),
            ("GTAC".to_string(), 1),
            ("TACG".to_string(), 1),
        ]
        .into();
        assert_eq!(counts, want);
    }

    #[test]
    fn single_record_shorter_than_k_yields_nothing() {
        assert!(count_mers(">r\nACG\n", 5, false).is_empty());
    }

    #[test]
    fn exact_length_record_yields_one_window() {
        let counts = count_mers(">r\nAAAAA\n", 5, false);
        let want: HashMap<String, u64> = [("AAAAA".to_string(), 1)].into();
        assert_eq!(counts, want);
    }

    #[test]
    fn chunk_boundaries_do_not_lose_windows() {
        let seq = "ACGTGGTACCATTGCA".repeat(8); // 128 bases
        let content = format!(">r\n{seq}\n");
        let whole = count_mers(&content, 7, false);
        let tiny_chunks = count_mers_cap(&content, 7, false, 16);
        assert_eq!(whole, tiny_chunks);
        let total: u64 = whole.values().sum();
        assert_eq!(total, (seq.len() - 6) as u64);
    }

    #[test]
    fn windows_never_span_records() {
        let counts = count_mers(">a\nAAAT\n>b\nTTTA\n", 4, false);
        let want: HashMap<String, u64> =
            [("AAAT".to_string(), 1), ("TTTA".to_string(), 1)].into();
        assert_eq!(counts, want);
    }
}
