//! The counting driver: worker threads pulling windows from the
//! cooperative pool into the shared hash, spilling sorted snapshots when
//! the table fills, and producing one sorted output at the end.
//!
//! Intermediate snapshots are written to `TMPDIR` (via `tempfile`, so they
//! disappear with the run) at full counter width and without bounds; the
//! user's `[min, max]` filter and declared output width apply only to the
//! final output, where a SUM merge folds the snapshots back together.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempPath;

use crate::dump::reader::SortedReader;
use crate::dump::sorted::{BodyFormat, DumpBounds, SortedDumper};
use crate::dump::{DumpFormat, FileHeader};
use crate::error::{Error, FirstError, Result};
use crate::hash::array::{HashArray, HashConfig};
use crate::hash::shared::{CountingHash, GrowthPolicy, SpillFn};
use crate::merge::{merge_sorted, FoldOp};
use crate::mer::MAX_K;
use crate::notify;
use crate::stream::mers::MerStream;
use crate::stream::parser::{AmbigPolicy, SeqParser};
use crate::stream::pool::CooperativePool;
use crate::util::count_cores;

/// Parser chunk size; 3 × threads buffers of this many bytes circulate.
const BUF_CAPACITY: usize = 4096;

/// Full configuration of one counting run.
#[derive(Debug, Clone)]
pub struct CountConfig {
    pub k: u32,
    /// Requested initial table size in slots (rounded up to a power of two).
    pub size: u64,
    /// Worker threads; 0 = one per core.
    pub threads: usize,
    pub canonical: bool,
    pub counter_len: u32,
    /// Counter width of the final output records, in bytes.
    pub value_bytes: u32,
    pub max_reprobe: u32,
    pub growth: GrowthPolicy,
    pub ambig: AmbigPolicy,
    pub matrix_seed: u64,
    /// Count bounds applied to the final output.
    pub bounds: DumpBounds,
    pub text_output: bool,
    /// Reuse capacity after an intermediate dump (the normal case).
    pub zero_on_dump: bool,
}

impl Default for CountConfig {
    fn default() -> Self {
        CountConfig {
            k: 25,
            size: 10 << 20,
            threads: 0,
            canonical: false,
            counter_len: 7,
            value_bytes: 4,
            max_reprobe: 62,
            growth: GrowthPolicy::default(),
            ambig: AmbigPolicy::Break,
            matrix_seed: 0x6b6d_6572,
            bounds: DumpBounds::default(),
            text_output: false,
            zero_on_dump: true,
        }
    }
}

impl CountConfig {
    pub fn threads(&self) -> usize {
        if self.threads == 0 {
            count_cores()
        } else {
            self.threads
        }
    }

    /// lsize for the requested slot count, clamped to the key space (a
    /// table bigger than 4^k slots buys nothing).
    fn lsize(&self) -> u32 {
        let requested = 64 - self.size.max(1).next_power_of_two().leading_zeros() - 1;
        requested.min((2 * self.k).min(63))
    }

    pub fn hash_config(&self) -> HashConfig {
        HashConfig {
            k: self.k,
            lsize: self.lsize(),
            counter_len: self.counter_len,
            max_reprobe: self.max_reprobe,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 || self.k > MAX_K {
            return Err(Error::Config(format!("k must be in 1..={MAX_K}, got {}", self.k)));
        }
        if self.size == 0 {
            return Err(Error::Config("hash size must be positive".into()));
        }
        if !(1..=8).contains(&self.value_bytes) {
            return Err(Error::Config(format!(
                "output counter width must be 1..=8 bytes, got {}",
                self.value_bytes
            )));
        }
        self.hash_config().validate()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CountSummary {
    /// Intermediate snapshots spilled to TMPDIR (0 = direct dump).
    pub snapshots: usize,
}

/// Count every k-mer of `inputs` into `output`.
pub fn count_to_path(cfg: &CountConfig, inputs: Vec<PathBuf>, output: &Path) -> Result<CountSummary> {
    cfg.validate()?;
    if inputs.is_empty() {
        return Err(Error::Config("no input files".into()));
    }
    let threads = cfg.threads();
    let hash = CountingHash::new(cfg.hash_config(), cfg.matrix_seed, cfg.growth)?;
    let errors = Arc::new(FirstError::new());
    let parser = SeqParser::new(cfg.k, cfg.ambig, inputs);
    let pool = CooperativePool::new(
        Box::new(parser),
        3 * threads,
        BUF_CAPACITY,
        Arc::clone(&errors),
    );

    // Spills run under the grow/dump barrier; full-width, unfiltered
    // records keep the later SUM merge exact.
    let spill_files: Mutex<Vec<TempPath>> = Mutex::new(Vec::new());
    let spill = |ary: &HashArray| -> Result<()> {
        if !cfg.zero_on_dump {
            return Err(Error::Capacity(
                "table full, growth exhausted and zero-on-dump disabled".into(),
            ));
        }
        let path = spill_snapshot(ary, threads)?;
        spill_files.lock().unwrap().push(path);
        Ok(())
    };
    let spill: &SpillFn<'_> = &spill;

    std::thread::scope(|s| {
        for _ in 0..threads {
            s.spawn(|| {
                let mut mers = MerStream::new(&pool, cfg.k, cfg.canonical);
                while let Some(m) = mers.next_mer() {
                    if let Err(e) = hash.add(m, 1, spill) {
                        errors.record(e);
                        break;
                    }
                }
            });
        }
    });
    if let Some(e) = errors.take() {
        return Err(e);
    }

    let ary = hash.into_array();
    let mut snapshots = spill_files.into_inner().unwrap();
    let summary = CountSummary {
        snapshots: snapshots.len(),
    };

    if snapshots.is_empty() {
        // Everything fit in memory: dump straight to the output.
        let file = File::create(output).map_err(|e| Error::io(output, e))?;
        let mut out = BufWriter::new(file);
        let body = if cfg.text_output {
            BodyFormat::Text
        } else {
            BodyFormat::Binary
        };
        SortedDumper::new(threads, cfg.value_bytes)
            .bounds(cfg.bounds)
            .body(body)
            .zero_on_dump(false)
            .dump(&ary, &mut out)?;
        return Ok(summary);
    }

    notify!(
        3,
        "merging {} spilled snapshots plus the live table",
        snapshots.len()
    );
    snapshots.push(spill_snapshot(&ary, threads)?);
    let paths: Vec<PathBuf> = snapshots.iter().map(|p| p.to_path_buf()).collect();

    if cfg.text_output {
        let merged = tempfile::NamedTempFile::new()
            .map_err(|e| Error::io(std::env::temp_dir(), e))?;
        let mut out = BufWriter::new(merged.as_file());
        merge_sorted(
            &paths,
            &mut out,
            FoldOp::Sum,
            cfg.bounds,
            Some(cfg.value_bytes),
        )?;
        out.flush().map_err(|e| Error::io(merged.path(), e))?;
        drop(out);
        render_text(merged.path(), output)?;
    } else {
        let file = File::create(output).map_err(|e| Error::io(output, e))?;
        let mut out = BufWriter::new(file);
        merge_sorted(
            &paths,
            &mut out,
            FoldOp::Sum,
            cfg.bounds,
            Some(cfg.value_bytes),
        )?;
    }
    // `TempPath` drops delete the snapshots here.
    Ok(summary)
}

/// Dump the quiesced table into a fresh TMPDIR snapshot at full width.
fn spill_snapshot(ary: &HashArray, threads: usize) -> Result<TempPath> {
    let tmp = tempfile::Builder::new()
        .prefix("kmercount-")
        .suffix(".kc")
        .tempfile()
        .map_err(|e| Error::io(std::env::temp_dir(), e))?;
    let (file, path) = tmp.into_parts();
    let mut out = BufWriter::new(file);
    SortedDumper::new(threads, 8).dump(ary, &mut out)?;
    out.flush().map_err(|e| Error::io(&*path, e))?;
    Ok(path)
}

/// Rewrite a binary sorted file as its text form.
fn render_text(src: &Path, output: &Path) -> Result<()> {
    let mut reader = SortedReader::open(src)?;
    let file = File::create(output).map_err(|e| Error::io(output, e))?;
    let mut out = BufWriter::new(file);
    let header = FileHeader {
        format: DumpFormat::TextSorted,
        ..reader.header.clone()
    };
    header.write(&mut out).map_err(|e| Error::io(output, e))?;
    while let Some((mer, count)) = reader.next_record()? {
        writeln!(out, "{mer} {count}").map_err(|e| Error::io(output, e))?;
    }
    out.flush().map_err(|e| Error::io(output, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write as _;

    fn write_fasta(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    fn read_counts(path: &Path) -> HashMap<String, u64> {
        let mut r = SortedReader::open(path).unwrap();
        let mut m = HashMap::new();
        while let Some((mer, c)) = r.next_record().unwrap() {
            *m.entry(mer.to_string()).or_insert(0) += c;
        }
        m
    }

    fn small_cfg(k: u32) -> CountConfig {
        CountConfig {
            k,
            size: 1 << 10,
            threads: 2,
            ..CountConfig::default()
        }
    }

    #[test]
    fn counts_a_simple_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_fasta(&dir, "in.fa", ">r\nACGTACGT\n");
        let out = dir.path().join("out.kc");
        count_to_path(&small_cfg(3), vec![input], &out).unwrap();
        let want: HashMap<String, u64> = [
            ("ACG".to_string(), 2),
            ("CGT".to_string(), 2),
            ("GTA".to_string(), 1),
            ("TAC".to_string(), 1),
        ]
        .into();
        assert_eq!(read_counts(&out), want);
    }

    #[test]
    fn canonical_counting_folds_pairs() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_fasta(&dir, "in.fa", ">r\nACGTACGT\n");
        let out = dir.path().join("out.kc");
        let cfg = CountConfig {
            canonical: true,
            ..small_cfg(3)
        };
        count_to_path(&cfg, vec![input], &out).unwrap();
        let want: HashMap<String, u64> =
            [("ACG".to_string(), 4), ("GTA".to_string(), 2)].into();
        assert_eq!(read_counts(&out), want);
    }

    #[test]
    fn leading_and_trailing_ns_do_not_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_fasta(&dir, "in.fa", ">r\nNNACGTACGTNN\n");
        let out = dir.path().join("out.kc");
        count_to_path(&small_cfg(4), vec![input], &out).unwrap();
        let want: HashMap<String, u64> = [
            ("ACGT".to_string(), 2),
            ("CGTA".to_string(), 1),
            ("GTAC".to_string(), 1),
            ("TACG".to_string(), 1),
        ]
        .into();
        assert_eq!(read_counts(&out), want);
    }

    #[test]
    fn tiny_table_spills_and_merges_exactly() {
        let dir = tempfile::TempDir::new().unwrap();
        // 40 distinct 6-mers, far more than 8 slots without growth.
        let seq = "ACGTGGTACCATTGCAACGGTCATGCAATTGGCCATGCATGACGTTGCA";
        let input = write_fasta(&dir, "in.fa", &format!(">r\n{seq}\n"));
        let reference = {
            let out = dir.path().join("ref.kc");
            count_to_path(&small_cfg(6), vec![input.clone()], &out).unwrap();
            read_counts(&out)
        };
        let out = dir.path().join("spilled.kc");
        let cfg = CountConfig {
            size: 8,
            threads: 2,
            growth: GrowthPolicy {
                enabled: false,
                max_grows: 0,
            },
            ..small_cfg(6)
        };
        let summary = count_to_path(&cfg, vec![input], &out).unwrap();
        assert!(summary.snapshots >= 1, "8 slots must spill");
        assert_eq!(read_counts(&out), reference);
        let total: u64 = reference.values().sum();
        assert_eq!(total, (seq.len() - 5) as u64);
    }

    #[test]
    fn min_bound_filters_final_output_only() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_fasta(&dir, "in.fa", ">r\nAAAAAACGT\n");
        let out = dir.path().join("out.kc");
        let cfg = CountConfig {
            bounds: DumpBounds {
                min: 2,
                max: u64::MAX,
            },
            ..small_cfg(3)
        };
        count_to_path(&cfg, vec![input], &out).unwrap();
        // Only AAA occurs twice or more.
        let counts = read_counts(&out);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts["AAA"], 4);
    }

    #[test]
    fn empty_input_yields_valid_empty_dump() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = write_fasta(&dir, "in.fa", "");
        let out = dir.path().join("out.kc");
        count_to_path(&small_cfg(5), vec![input], &out).unwrap();
        let r = SortedReader::open(&out).unwrap();
        assert!(r.complete);
        assert_eq!(r.record_count(), 0);
    }

    #[test]
    fn bad_config_is_rejected_before_work() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.kc");
        let cfg = CountConfig {
            k: 0,
            ..CountConfig::default()
        };
        assert!(matches!(
            count_to_path(&cfg, vec![PathBuf::from("x.fa")], &out),
            Err(Error::Config(_))
        ));
        // Counter width of zero bits is meaningless.
        let cfg = CountConfig {
            counter_len: 0,
            ..CountConfig::default()
        };
        assert!(matches!(
            count_to_path(&cfg, vec![PathBuf::from("x.fa")], &out),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn oversized_tables_clamp_to_the_key_space() {
        // 2^20 slots for k = 2 clamps to 4^2 = 16 slots instead of failing.
        let cfg = CountConfig {
            k: 2,
            size: 1 << 20,
            ..CountConfig::default()
        };
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.hash_config().lsize, 4);
    }

    #[test]
    fn missing_input_surfaces_as_io_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("out.kc");
        let err = count_to_path(
            &small_cfg(5),
            vec![PathBuf::from("/no/such/file.fa")],
            &out,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
        assert_eq!(err.exit_code(), 2);
    }
}
