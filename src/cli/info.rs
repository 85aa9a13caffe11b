//! The `info` subcommand: describe an index file's header.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom, Write};

use crate::cli::args::InfoArgs;
use crate::dump::header::{read_format_line, read_u32, FileHeader};
use crate::dump::{DumpFormat, SortedReader};
use crate::error::{Error, Result};

pub fn run(args: &InfoArgs) -> Result<()> {
    if args.skip_header {
        return copy_body(args);
    }

    let file = File::open(&args.file).map_err(|e| Error::io(&args.file, e))?;
    let mut input = BufReader::new(file);
    let format = read_format_line(&mut input)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut emit = |name: &str, value: String| {
        writeln!(out, "{name:<11} {value}").map_err(|e| Error::io("<stdout>", e))
    };
    emit("format", format.tag().to_string())?;

    match format {
        DumpFormat::BinaryRaw => {
            // Raw headers carry just the table geometry.
            let k = read_u32(&mut input)?;
            let lsize = read_u32(&mut input)?;
            let counter_len = read_u32(&mut input)?;
            let max_reprobe = read_u32(&mut input)?;
            emit("mer-len", k.to_string())?;
            emit("lsize", lsize.to_string())?;
            emit("counter-len", format!("{counter_len} bits"))?;
            emit("max-reprobe", max_reprobe.to_string())?;
        }
        DumpFormat::BinarySorted | DumpFormat::TextSorted => {
            input
                .seek(SeekFrom::Start(0))
                .map_err(|e| Error::io(&args.file, e))?;
            let header = FileHeader::read(&mut input)?;
            emit("mer-len", header.k.to_string())?;
            emit("key-bytes", header.key_bytes.to_string())?;
            emit("value-bytes", header.value_bytes.to_string())?;
            emit("lsize", header.lsize.to_string())?;
            emit("max-reprobe", header.max_reprobe.to_string())?;
            if format == DumpFormat::BinarySorted {
                let mut reader = SortedReader::open(&args.file)?;
                emit("records", reader.record_count().to_string())?;
                let status = if !reader.complete {
                    "partial (no completion footer)"
                } else if reader.verify_checksum()? {
                    "complete (checksum ok)"
                } else {
                    "corrupt (checksum mismatch)"
                };
                emit("status", status.to_string())?;
            }
        }
    }
    Ok(())
}

/// `--skip-header`: stream everything after the header to stdout.
fn copy_body(args: &InfoArgs) -> Result<()> {
    let file = File::open(&args.file).map_err(|e| Error::io(&args.file, e))?;
    let mut input = BufReader::new(file);
    let header = FileHeader::read(&mut input)?;
    input
        .seek(SeekFrom::Start(header.byte_len()))
        .map_err(|e| Error::io(&args.file, e))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    std::io::copy(&mut input, &mut out).map_err(|e| Error::io(&args.file, e))?;
    Ok(())
}
