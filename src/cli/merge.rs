//! The `merge` subcommand.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::cli::args::{MergeArgs, MergeOpArg};
use crate::dump::DumpBounds;
use crate::error::{Error, Result};
use crate::merge::{jaccard, merge_sorted, FoldOp};
use crate::notify;

pub fn run(args: &MergeArgs) -> Result<()> {
    if let MergeOpArg::Jaccard = args.op {
        let totals = jaccard(&args.files)?;
        let file = File::create(&args.output).map_err(|e| Error::io(&args.output, e))?;
        let mut out = BufWriter::new(file);
        writeln!(
            out,
            "intersection\t{}\nunion\t{}\njaccard\t{:.6}",
            totals.intersection,
            totals.union,
            totals.index()
        )
        .map_err(|e| Error::io(&args.output, e))?;
        out.flush().map_err(|e| Error::io(&args.output, e))?;
        return Ok(());
    }

    let op = match args.op {
        MergeOpArg::Sum => FoldOp::Sum,
        MergeOpArg::Min => FoldOp::Min,
        MergeOpArg::Max => FoldOp::Max,
        MergeOpArg::Jaccard => unreachable!("handled above"),
    };
    let file = File::create(&args.output).map_err(|e| Error::io(&args.output, e))?;
    let mut out = BufWriter::new(file);
    let summary = merge_sorted(
        &args.files,
        &mut out,
        op,
        DumpBounds {
            min: args.min,
            max: args.max,
        },
        args.out_counter_len,
    )?;
    notify!(
        2,
        "merged {} records from {} files into {} records",
        summary.records_in,
        args.files.len(),
        summary.records_out
    );
    Ok(())
}
