//! The `dump` subcommand: render a binary sorted index as text.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::cli::args::DumpArgs;
use crate::dump::SortedReader;
use crate::error::{Error, Result};

pub fn run(args: &DumpArgs) -> Result<()> {
    let mut reader = SortedReader::open(&args.file)?;

    let stdout = std::io::stdout();
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| Error::io(path, e))?,
        )),
        None => Box::new(BufWriter::new(stdout.lock())),
    };

    let sep = if args.tab { '\t' } else { ' ' };
    let err_path = args.output.clone().unwrap_or_else(|| "<stdout>".into());
    while let Some((mer, count)) = reader.next_record()? {
        if count < args.lower || count > args.upper {
            continue;
        }
        if args.column {
            writeln!(out, "{mer}{sep}{count}")
        } else {
            writeln!(out, ">{count}\n{mer}")
        }
        .map_err(|e| Error::io(&err_path, e))?;
    }
    out.flush().map_err(|e| Error::io(&err_path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::DumpArgs;
    use crate::dump::sorted::SortedDumper;
    use crate::hash::array::{HashArray, HashConfig};
    use crate::mer::Mer;

    fn dump_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let ary = HashArray::new(
            HashConfig {
                k: 4,
                lsize: 6,
                counter_len: 7,
                max_reprobe: 62,
            },
            5,
        )
        .unwrap();
        for (s, n) in [("ACGT", 5u64), ("TTAA", 1)] {
            ary.add(&Mer::from_str_mer(s).unwrap(), n).unwrap();
        }
        let path = dir.path().join("in.kc");
        let mut f = File::create(&path).unwrap();
        SortedDumper::new(1, 4).dump(&ary, &mut f).unwrap();
        path
    }

    #[test]
    fn column_and_fasta_like_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dump_file(&dir);
        let out = dir.path().join("out.txt");
        run(&DumpArgs {
            file: file.clone(),
            column: true,
            tab: true,
            lower: 0,
            upper: u64::MAX,
            output: Some(out.clone()),
        })
        .unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains("ACGT\t5"));
        assert!(text.contains("TTAA\t1"));

        run(&DumpArgs {
            file,
            column: false,
            tab: false,
            lower: 2,
            upper: u64::MAX,
            output: Some(out.clone()),
        })
        .unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains(">5\nACGT"));
        assert!(!text.contains("TTAA"), "lower bound filters TTAA");
    }
}
