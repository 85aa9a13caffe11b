// e2e/merge_ops.rs - merging snapshots across separate counting runs.
//
// Runs share a matrix seed so their snapshots are mergeable; the SUM of
// two disjoint runs must equal one run over the concatenated input.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use kmercount::count::{count_to_path, CountConfig};
use kmercount::dump::sorted::DumpBounds;
use kmercount::dump::SortedReader;
use kmercount::merge::{jaccard, merge_sorted, FoldOp};
use tempfile::TempDir;

fn write_fasta(dir: &TempDir, name: &str, seq: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(format!(">r\n{seq}\n").as_bytes())
        .unwrap();
    path
}

fn count(dir: &TempDir, name: &str, inputs: Vec<PathBuf>) -> PathBuf {
    let out = dir.path().join(name);
    let cfg = CountConfig {
        k: 4,
        size: 1 << 10,
        threads: 2,
        ..CountConfig::default()
    };
    count_to_path(&cfg, inputs, &out).unwrap();
    out
}

fn read_counts(path: &Path) -> HashMap<String, u64> {
    let mut r = SortedReader::open(path).unwrap();
    let mut m = HashMap::new();
    while let Some((mer, c)) = r.next_record().unwrap() {
        m.insert(mer.to_string(), c);
    }
    m
}

#[test]
fn sum_of_disjoint_runs_equals_run_of_union() {
    let dir = TempDir::new().unwrap();
    let a_in = write_fasta(&dir, "a.fa", "ACGTGGTACCATT");
    let b_in = write_fasta(&dir, "b.fa", "TTGCAACGGTCAT");

    let a = count(&dir, "a.kc", vec![a_in.clone()]);
    let b = count(&dir, "b.kc", vec![b_in.clone()]);
    let both = count(&dir, "both.kc", vec![a_in, b_in]);

    let merged = dir.path().join("merged.kc");
    merge_sorted(
        &[a, b],
        &mut std::fs::File::create(&merged).unwrap(),
        FoldOp::Sum,
        DumpBounds::default(),
        None,
    )
    .unwrap();

    assert_eq!(read_counts(&merged), read_counts(&both));
}

#[test]
fn min_max_and_jaccard_over_overlapping_runs() {
    let dir = TempDir::new().unwrap();
    // Shared 4-mers between the two sequences.
    let a_in = write_fasta(&dir, "a.fa", "ACGTACGT");
    let b_in = write_fasta(&dir, "b.fa", "ACGTTTTT");
    let a = count(&dir, "a.kc", vec![a_in]);
    let b = count(&dir, "b.kc", vec![b_in]);

    let min_out = dir.path().join("min.kc");
    merge_sorted(
        &[a.clone(), b.clone()],
        &mut std::fs::File::create(&min_out).unwrap(),
        FoldOp::Min,
        DumpBounds::default(),
        None,
    )
    .unwrap();
    let mins = read_counts(&min_out);
    // ACGT appears in both runs once; min keeps 1.
    assert_eq!(mins["ACGT"], 1);

    let max_out = dir.path().join("max.kc");
    merge_sorted(
        &[a.clone(), b.clone()],
        &mut std::fs::File::create(&max_out).unwrap(),
        FoldOp::Max,
        DumpBounds::default(),
        None,
    )
    .unwrap();
    let maxs = read_counts(&max_out);
    assert_eq!(maxs["TTTT"], 2, "TTTT twice in b, absent in a");

    let t = jaccard(&[a, b]).unwrap();
    assert!(t.intersection >= 1);
    assert!(t.union > t.intersection);
    assert!(t.index() > 0.0 && t.index() < 1.0);
}

#[test]
fn different_seeds_do_not_merge() {
    let dir = TempDir::new().unwrap();
    let a_in = write_fasta(&dir, "a.fa", "ACGTACGTAC");
    let b_in = write_fasta(&dir, "b.fa", "ACGTACGTAC");
    let a = count(&dir, "a.kc", vec![a_in]);

    let b = dir.path().join("b.kc");
    let cfg = CountConfig {
        k: 4,
        size: 1 << 10,
        threads: 2,
        matrix_seed: 1234,
        ..CountConfig::default()
    };
    count_to_path(&cfg, vec![b_in], &b).unwrap();

    let err = merge_sorted(
        &[a, b],
        &mut Vec::new(),
        FoldOp::Sum,
        DumpBounds::default(),
        None,
    )
    .unwrap_err();
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn merging_a_partial_dump_is_refused() {
    let dir = TempDir::new().unwrap();
    let a_in = write_fasta(&dir, "a.fa", "ACGTACGTAC");
    let a = count(&dir, "a.kc", vec![a_in]);

    let truncated = dir.path().join("cut.kc");
    let bytes = std::fs::read(&a).unwrap();
    std::fs::write(&truncated, &bytes[..bytes.len() - 10]).unwrap();

    let err = merge_sorted(
        &[a, truncated],
        &mut Vec::new(),
        FoldOp::Sum,
        DumpBounds::default(),
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("partial"));
}
