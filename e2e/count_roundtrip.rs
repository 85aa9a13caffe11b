// e2e/count_roundtrip.rs - end-to-end counting through the library API.
//
// Counts small synthetic inputs and checks the sorted output against
// hand-computed multisets, across k boundaries, input formats and
// spill/merge paths.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use kmercount::count::{count_to_path, CountConfig};
use kmercount::dump::sorted::DumpBounds;
use kmercount::dump::SortedReader;
use kmercount::hash::shared::GrowthPolicy;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::File::create(&path)
        .unwrap()
        .write_all(content.as_bytes())
        .unwrap();
    path
}

fn read_counts(path: &Path) -> HashMap<String, u64> {
    let mut r = SortedReader::open(path).unwrap();
    assert!(r.complete, "output must carry a completion footer");
    let mut m = HashMap::new();
    while let Some((mer, c)) = r.next_record().unwrap() {
        let prev = m.insert(mer.to_string(), c);
        assert!(prev.is_none(), "duplicate key {mer} in output");
    }
    m
}

/// Reference counter: every k-window over runs of ACGT.
fn naive_counts(seqs: &[&str], k: usize, canonical: bool) -> HashMap<String, u64> {
    let mut m = HashMap::new();
    for seq in seqs {
        for run in seq.split(|c| !"ACGT".contains(c)) {
            if run.len() < k {
                continue;
            }
            for i in 0..=run.len() - k {
                let window = &run[i..i + k];
                let key = if canonical {
                    let rc: String = window
                        .chars()
                        .rev()
                        .map(|c| match c {
                            'A' => 'T',
                            'C' => 'G',
                            'G' => 'C',
                            _ => 'A',
                        })
                        .collect();
                    std::cmp::min(window.to_string(), rc)
                } else {
                    window.to_string()
                };
                *m.entry(key).or_insert(0) += 1;
            }
        }
    }
    m
}

fn cfg(k: u32) -> CountConfig {
    CountConfig {
        k,
        size: 1 << 12,
        threads: 2,
        ..CountConfig::default()
    }
}

#[test]
fn multi_record_fasta_matches_reference() {
    let dir = TempDir::new().unwrap();
    let seqs = ["ACGTGGTACCATTGCA", "TTTTGGGGCCCCAAAA", "GATTACA"];
    let content: String = seqs.iter().map(|s| format!(">r\n{s}\n")).collect();
    let input = write_file(&dir, "in.fa", &content);
    for k in [1u32, 3, 7] {
        let out = dir.path().join(format!("out{k}.kc"));
        count_to_path(&cfg(k), vec![input.clone()], &out).unwrap();
        assert_eq!(
            read_counts(&out),
            naive_counts(&seqs, k as usize, false),
            "k = {k}"
        );
    }
}

#[test]
fn canonical_counting_matches_reference() {
    let dir = TempDir::new().unwrap();
    let seqs = ["ACGTGGTACCATTGCAACGGTCATG"];
    let input = write_file(&dir, "in.fa", &format!(">r\n{}\n", seqs[0]));
    let out = dir.path().join("out.kc");
    let c = CountConfig {
        canonical: true,
        ..cfg(5)
    };
    count_to_path(&c, vec![input], &out).unwrap();
    assert_eq!(read_counts(&out), naive_counts(&seqs, 5, true));
}

#[test]
fn large_k_spans_multiple_words() {
    let dir = TempDir::new().unwrap();
    let seq = "ACGTGGTACCATTGCAACGGTCATGCAATTGGCCATGCATGACGTTGCAACGGTCATGCAATTGGCCATGCATG";
    let input = write_file(&dir, "in.fa", &format!(">r\n{seq}\n"));
    for k in [31u32, 32, 63, 70] {
        let out = dir.path().join(format!("out{k}.kc"));
        count_to_path(&cfg(k), vec![input.clone()], &out).unwrap();
        let counts = read_counts(&out);
        assert_eq!(
            counts,
            naive_counts(&[seq], k as usize, false),
            "k = {k}"
        );
        // Every key string round-trips at full length.
        assert!(counts.keys().all(|s| s.len() == k as usize));
    }
}

#[test]
fn fastq_and_fasta_inputs_concatenate() {
    let dir = TempDir::new().unwrap();
    let fa = write_file(&dir, "a.fa", ">x\nAAATTT\n");
    let fq = write_file(&dir, "b.fq", "@y\nGGGCCC\n+\nIIIIII\n");
    let out = dir.path().join("out.kc");
    count_to_path(&cfg(3), vec![fa, fq], &out).unwrap();
    assert_eq!(
        read_counts(&out),
        naive_counts(&["AAATTT", "GGGCCC"], 3, false)
    );
}

#[test]
fn high_multiplicity_counts_survive_counter_overflow() {
    let dir = TempDir::new().unwrap();
    // 600 records of the same 5-mer: far past the 7-bit primary counter.
    let input = write_file(&dir, "in.fa", &">r\nAACGT\n".repeat(600));
    let out = dir.path().join("out.kc");
    count_to_path(&cfg(5), vec![input], &out).unwrap();
    let counts = read_counts(&out);
    assert_eq!(counts["AACGT"], 600);
}

#[test]
fn spill_path_equals_in_memory_path() {
    let dir = TempDir::new().unwrap();
    let seq = "ACGTGGTACCATTGCAACGGTCATGCAATTGGCCATGCATGACGTTGCA".repeat(3);
    let input = write_file(&dir, "in.fa", &format!(">r\n{seq}\n"));

    let big = dir.path().join("big.kc");
    count_to_path(&cfg(8), vec![input.clone()], &big).unwrap();

    let small = dir.path().join("small.kc");
    let tiny = CountConfig {
        size: 16,
        growth: GrowthPolicy {
            enabled: false,
            max_grows: 0,
        },
        ..cfg(8)
    };
    let summary = count_to_path(&tiny, vec![input], &small).unwrap();
    assert!(summary.snapshots > 0, "16 slots must spill");
    assert_eq!(read_counts(&big), read_counts(&small));
}

#[test]
fn bounds_apply_to_the_final_output() {
    let dir = TempDir::new().unwrap();
    let input = write_file(&dir, "in.fa", ">r\nAAAAAAACGACG\n");
    let out = dir.path().join("out.kc");
    let c = CountConfig {
        bounds: DumpBounds { min: 2, max: 4 },
        ..cfg(3)
    };
    count_to_path(&c, vec![input], &out).unwrap();
    let counts = read_counts(&out);
    // AAA occurs 5 times (above max), ACG twice, others once.
    assert_eq!(counts.len(), 1);
    assert_eq!(counts["ACG"], 2);
}

#[test]
fn output_is_sorted_by_bucket_position() {
    let dir = TempDir::new().unwrap();
    let seq = "ACGTGGTACCATTGCAACGGTCATGCAATTGG";
    let input = write_file(&dir, "in.fa", &format!(">r\n{seq}\n"));
    let out = dir.path().join("out.kc");
    count_to_path(&cfg(4), vec![input], &out).unwrap();
    let mut r = SortedReader::open(&out).unwrap();
    let mut last = 0u64;
    while let Some((mer, _)) = r.next_record().unwrap() {
        let pos = r.position_of(&mer);
        assert!(pos >= last, "position order violated at {mer}");
        last = pos;
    }
}
