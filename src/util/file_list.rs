//! Input-list expansion for sequence files.
//!
//! The `count` command accepts files, directories and the `-` stdin marker.
//! Directories are walked recursively with [`walkdir`] and only entries with
//! a recognized sequence-file extension are kept; symlinks are never
//! followed, which keeps cyclic trees from looping forever.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Marker accepted in input lists for "read standard input".
pub const STDIN_MARK: &str = "-";

/// Extensions recognized when expanding a directory.
const SEQ_EXTENSIONS: &[&str] = &["fa", "fasta", "fna", "fq", "fastq"];

fn is_sequence_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SEQ_EXTENSIONS.iter().any(|s| e.eq_ignore_ascii_case(s)))
        .unwrap_or(false)
}

/// Expand a mixed list of files, directories and `-` into a flat input list.
///
/// - `-` and regular-file paths are forwarded unchanged (order preserved).
/// - Directories are walked recursively; only regular files with a sequence
///   extension are kept, in sorted order so runs are reproducible.
/// - An unreadable directory entry aborts the expansion with an `io::Error`.
pub fn expand_inputs(inputs: &[String]) -> io::Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if input != STDIN_MARK && path.is_dir() {
            let mut found = Vec::new();
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    e.io_error()
                        .map(|io| io::Error::new(io.kind(), io.to_string()))
                        .unwrap_or_else(|| io::Error::other(e.to_string()))
                })?;
                if entry.file_type().is_file() && is_sequence_file(entry.path()) {
                    found.push(entry.into_path());
                }
            }
            result.extend(found);
        } else {
            result.push(PathBuf::from(input));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.fa"), b">r\nACGT\n").unwrap();
        fs::write(root.join("sub/b.fastq"), b"@r\nACGT\n+\nIIII\n").unwrap();
        fs::write(root.join("notes.txt"), b"not a sequence").unwrap();
        dir
    }

    #[test]
    fn expands_directory_and_filters_extensions() {
        let dir = make_tree();
        let inputs = vec![dir.path().to_string_lossy().into_owned()];
        let list = expand_inputs(&inputs).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|p| is_sequence_file(p)));
    }

    #[test]
    fn passes_files_and_stdin_through() {
        let dir = make_tree();
        let file = dir.path().join("a.fa");
        let inputs = vec![
            STDIN_MARK.to_owned(),
            file.to_string_lossy().into_owned(),
            "missing.txt".to_owned(),
        ];
        let list = expand_inputs(&inputs).unwrap();
        // Non-directory inputs are forwarded unchanged, existing or not.
        assert_eq!(list.len(), 3);
        assert_eq!(list[0], PathBuf::from(STDIN_MARK));
        assert_eq!(list[1], file);
    }

    #[test]
    fn empty_inputs_yield_empty_list() {
        assert!(expand_inputs(&[]).unwrap().is_empty());
    }
}
