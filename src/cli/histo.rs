//! The `histo` subcommand: histogram of counts in a sorted index.
//!
//! Bins cover `[low, high]` in steps of `increment`; counts below `low`
//! land in the first bin and counts above `high` in the last. By default
//! only populated bins print; `-f` prints them all.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::cli::args::HistoArgs;
use crate::dump::SortedReader;
use crate::error::{Error, Result};

/// Bin layout and totals, separated from I/O for testing.
pub struct Histogram {
    low: u64,
    increment: u64,
    bins: Vec<u64>,
}

impl Histogram {
    pub fn new(low: u64, high: u64, increment: u64) -> Result<Histogram> {
        if low < 1 {
            return Err(Error::Config("low bound must be >= 1".into()));
        }
        if high < low {
            return Err(Error::Config("high bound must be >= the low bound".into()));
        }
        if increment < 1 {
            return Err(Error::Config("increment must be >= 1".into()));
        }
        let n = (high - low) / increment + 1;
        Ok(Histogram {
            low,
            increment,
            bins: vec![0; n as usize],
        })
    }

    #[inline]
    pub fn record(&mut self, count: u64) {
        let idx = if count < self.low {
            0
        } else {
            (((count - self.low) / self.increment) as usize).min(self.bins.len() - 1)
        };
        self.bins[idx] += 1;
    }

    /// `(column, frequency)` per bin, in order.
    pub fn rows(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.bins
            .iter()
            .enumerate()
            .map(|(i, f)| (self.low + i as u64 * self.increment, *f))
    }
}

pub fn run(args: &HistoArgs) -> Result<()> {
    let mut histo = Histogram::new(args.low, args.high, args.increment)?;
    let mut reader = SortedReader::open(&args.file)?;
    while let Some((_, count)) = reader.next_record()? {
        histo.record(count);
    }

    let stdout = std::io::stdout();
    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| Error::io(path, e))?,
        )),
        None => Box::new(BufWriter::new(stdout.lock())),
    };
    let err_path = args.output.clone().unwrap_or_else(|| "<stdout>".into());
    for (col, freq) in histo.rows() {
        if freq > 0 || args.full {
            writeln!(out, "{col} {freq}").map_err(|e| Error::io(&err_path, e))?;
        }
    }
    out.flush().map_err(|e| Error::io(&err_path, e))?;
    Ok(())
}
