// e2e/cli_integration.rs - black-box tests of the `kmercount` binary.
//
// Drives the compiled binary with std::process::Command and checks
// outputs and exit codes: 0 success, 1 user/input error, 2 I/O error.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Locate the binary produced by Cargo.
fn kmercount_bin() -> PathBuf {
    if let Ok(p) = std::env::var("CARGO_BIN_EXE_kmercount") {
        return PathBuf::from(p);
    }
    let mut p = std::env::current_exe().unwrap();
    p.pop();
    if p.ends_with("deps") {
        p.pop();
    }
    p.push("kmercount");
    p
}

fn make_input(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn run_count(dir: &TempDir, input: &PathBuf, out_name: &str) -> PathBuf {
    let out = dir.path().join(out_name);
    let status = Command::new(kmercount_bin())
        .args([
            "count",
            "-k",
            "3",
            "-s",
            "1k",
            "-t",
            "2",
            "-o",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ])
        .status()
        .expect("failed to run kmercount count");
    assert!(status.success(), "count should exit 0");
    out
}

// ── count → dump round trip ──────────────────────────────────────────────────

#[test]
fn count_then_dump_lists_the_kmers() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "in.fa", ">r\nACGTACGT\n");
    let out = run_count(&dir, &input, "out.kc");
    assert!(out.exists());

    let output = Command::new(kmercount_bin())
        .args(["dump", "--column", out.to_str().unwrap()])
        .output()
        .expect("failed to run kmercount dump");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for line in ["ACG 2", "CGT 2", "GTA 1", "TAC 1"] {
        assert!(text.contains(line), "missing '{line}' in:\n{text}");
    }
}

// ── histo ────────────────────────────────────────────────────────────────────

#[test]
fn histo_bins_counts() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "in.fa", ">r\nAAAAACGT\n");
    let out = run_count(&dir, &input, "out.kc");

    let output = Command::new(kmercount_bin())
        .args([
            "histo",
            "-l",
            "1",
            "-h",
            "5",
            "-i",
            "1",
            "-f",
            out.to_str().unwrap(),
        ])
        .output()
        .expect("failed to run kmercount histo");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    // AAA:3, AAC/ACG/CGT:1 → three mers with count 1, one with count 3.
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines, vec!["1 3", "2 0", "3 1", "4 0", "5 0"]);
}

// ── info ─────────────────────────────────────────────────────────────────────

#[test]
fn info_prints_header_fields() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "in.fa", ">r\nACGTACGT\n");
    let out = run_count(&dir, &input, "out.kc");

    let output = Command::new(kmercount_bin())
        .args(["info", out.to_str().unwrap()])
        .output()
        .expect("failed to run kmercount info");
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("binary/sorted"));
    assert!(text.contains("mer-len     3"));
    assert!(text.contains("records     4"));
    assert!(text.contains("checksum ok"));
}

// ── merge ────────────────────────────────────────────────────────────────────

#[test]
fn merge_sums_two_runs() {
    let dir = TempDir::new().unwrap();
    let a_in = make_input(&dir, "a.fa", ">r\nAAAA\n");
    let b_in = make_input(&dir, "b.fa", ">r\nAAAT\n");
    let a = run_count(&dir, &a_in, "a.kc");
    let b = run_count(&dir, &b_in, "b.kc");

    let merged = dir.path().join("sum.kc");
    let status = Command::new(kmercount_bin())
        .args([
            "merge",
            "--op",
            "sum",
            "-o",
            merged.to_str().unwrap(),
            a.to_str().unwrap(),
            b.to_str().unwrap(),
        ])
        .status()
        .expect("failed to run kmercount merge");
    assert!(status.success());

    let output = Command::new(kmercount_bin())
        .args(["dump", "--column", merged.to_str().unwrap()])
        .output()
        .unwrap();
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("AAA 3"), "AAA twice in a, once in b:\n{text}");
    assert!(text.contains("AAT 1"));
}

// ── stdin input ──────────────────────────────────────────────────────────────

#[test]
fn count_reads_stdin_with_dash() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.kc");
    let mut child = Command::new(kmercount_bin())
        .args([
            "count", "-k", "3", "-s", "1k", "-o",
            out.to_str().unwrap(), "-",
        ])
        .stdin(Stdio::piped())
        .spawn()
        .expect("failed to spawn kmercount");
    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(b">r\nACGTACGT\n").unwrap();
    drop(stdin); // close the pipe so the parser sees EOF
    let status = child.wait().unwrap();
    assert!(status.success());
    assert!(out.exists());
}

// ── exit codes ───────────────────────────────────────────────────────────────

#[test]
fn missing_input_file_exits_2() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out.kc");
    let status = Command::new(kmercount_bin())
        .args([
            "count", "-k", "3", "-s", "1k", "-o",
            out.to_str().unwrap(),
            "/no/such/input.fa",
        ])
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(2));
}

#[test]
fn invalid_k_exits_1() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "in.fa", ">r\nACGT\n");
    let out = dir.path().join("out.kc");
    let status = Command::new(kmercount_bin())
        .args([
            "count", "-k", "0", "-s", "1k", "-o",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ])
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn malformed_input_exits_1() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "junk.fa", "definitely not fasta\n");
    let out = dir.path().join("out.kc");
    let status = Command::new(kmercount_bin())
        .args([
            "count", "-k", "3", "-s", "1k", "-o",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ])
        .stderr(Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn text_output_mode_writes_readable_dump() {
    let dir = TempDir::new().unwrap();
    let input = make_input(&dir, "in.fa", ">r\nAAAAA\n");
    let out = dir.path().join("out.txt");
    let status = Command::new(kmercount_bin())
        .args([
            "count", "-k", "5", "-s", "1k", "--text", "-o",
            out.to_str().unwrap(),
            input.to_str().unwrap(),
        ])
        .status()
        .unwrap();
    assert!(status.success());
    // The parameter block after the format line is binary; read bytes.
    let bytes = std::fs::read(&out).unwrap();
    assert!(bytes.starts_with(b"format:text/sorted\n"));
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("AAAAA 1"));
}
