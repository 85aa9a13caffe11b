//! Argument parsing for the `kmercount` subcommands.
//!
//! Size-like values accept `k`/`M`/`G` binary suffixes (`-s 100M`).

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::util::parse_size;

fn size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).ok_or_else(|| format!("'{s}' is not a size (expected digits with optional k/M/G)"))
}

#[derive(Parser, Debug)]
#[command(
    name = "kmercount",
    version,
    about = "Count k-mers in FASTA/FASTQ files into a sorted on-disk index"
)]
pub struct Cli {
    /// More progress output on stderr (repeatable).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Less output on stderr (repeatable).
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Notification level from the default of 2 and the -v/-q counts.
    pub fn notify_level(&self) -> u32 {
        (2 + self.verbose as i32 - self.quiet as i32).clamp(0, 4) as u32
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Count k-mers of the inputs into a sorted index file.
    Count(CountArgs),
    /// Print a sorted index as text.
    Dump(DumpArgs),
    /// Merge sorted index files into one.
    Merge(MergeArgs),
    /// Histogram of the counts in a sorted index.
    Histo(HistoArgs),
    /// Show the header of an index file.
    Info(InfoArgs),
}

/// How to treat N and the IUPAC ambiguity letters.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AmbigArg {
    /// Break the window (default).
    #[default]
    Break,
    /// Map them to A.
    A,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    /// Input files, directories (expanded recursively), or '-' for stdin.
    #[arg(required = true)]
    pub inputs: Vec<String>,

    /// Mer length.
    #[arg(short = 'k', long = "mer-len")]
    pub k: u32,

    /// Initial hash size in entries (suffixes k/M/G).
    #[arg(short = 's', long = "size", value_parser = size_arg)]
    pub size: u64,

    /// Worker threads (0 = one per core).
    #[arg(short = 't', long = "threads", default_value_t = 0)]
    pub threads: usize,

    /// Count canonical forms (min of mer and reverse complement).
    #[arg(short = 'C', long = "canonical")]
    pub canonical: bool,

    /// Output file.
    #[arg(short = 'o', long = "output", default_value = "mer_counts.kc")]
    pub output: PathBuf,

    /// Keep only counts >= this in the output.
    #[arg(short = 'm', long = "min", default_value_t = 0)]
    pub min: u64,

    /// Keep only counts <= this in the output.
    #[arg(short = 'L', long = "max", default_value_t = u64::MAX)]
    pub max: u64,

    /// In-memory counter width in bits.
    #[arg(long = "counter-len", default_value_t = 7)]
    pub counter_len: u32,

    /// Output counter width in bytes (counts saturate).
    #[arg(long = "out-counter-len", default_value_t = 4)]
    pub out_counter_len: u32,

    /// Maximum reprobe budget of the hash.
    #[arg(long = "reprobes", default_value_t = 62)]
    pub reprobes: u32,

    /// Never grow the hash; spill to disk when full.
    #[arg(long = "no-grow")]
    pub no_grow: bool,

    /// Doublings allowed before spilling takes over.
    #[arg(long = "max-grows", default_value_t = 4)]
    pub max_grows: u32,

    /// Treatment of ambiguity codes (N, R, Y, ...).
    #[arg(long = "ambiguous", value_enum, default_value = "break")]
    pub ambiguous: AmbigArg,

    /// Seed of the hash matrix (runs with equal seeds merge).
    #[arg(long = "matrix-seed", default_value_t = 0x6b6d_6572)]
    pub matrix_seed: u64,

    /// Write the output as text instead of binary.
    #[arg(long = "text")]
    pub text: bool,
}

#[derive(Args, Debug)]
pub struct DumpArgs {
    /// Sorted index file.
    pub file: PathBuf,

    /// Column output: `mer count` per line (default is FASTA-like).
    #[arg(short = 'c', long = "column")]
    pub column: bool,

    /// Separate columns with a tab instead of a space.
    #[arg(long = "tab")]
    pub tab: bool,

    /// Skip counts below this.
    #[arg(short = 'L', long = "lower-count", default_value_t = 0)]
    pub lower: u64,

    /// Skip counts above this.
    #[arg(short = 'U', long = "upper-count", default_value_t = u64::MAX)]
    pub upper: u64,

    /// Output file (default stdout).
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
}

/// Fold operation for `merge`.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeOpArg {
    #[default]
    Sum,
    Min,
    Max,
    Jaccard,
}

#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Sorted index files produced with the same k and matrix seed.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output file.
    #[arg(short = 'o', long = "output", default_value = "mer_counts_merged.kc")]
    pub output: PathBuf,

    /// Fold operation for counts of the same mer.
    #[arg(long = "op", value_enum, default_value = "sum")]
    pub op: MergeOpArg,

    /// Keep only folded counts >= this.
    #[arg(short = 'm', long = "min", default_value_t = 0)]
    pub min: u64,

    /// Keep only folded counts <= this.
    #[arg(short = 'L', long = "max", default_value_t = u64::MAX)]
    pub max: u64,

    /// Output counter width in bytes (default: widest input).
    #[arg(long = "out-counter-len")]
    pub out_counter_len: Option<u32>,
}

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct HistoArgs {
    /// Sorted index file.
    pub file: PathBuf,

    /// Smallest count bin.
    #[arg(short = 'l', long = "low", default_value_t = 1)]
    pub low: u64,

    /// Largest count bin (larger counts clamp into it). `-h` is taken by
    /// this option; use `--help` for help.
    #[arg(short = 'h', long = "high", default_value_t = 10_000)]
    pub high: u64,

    /// Bin width.
    #[arg(short = 'i', long = "increment", default_value_t = 1)]
    pub increment: u64,

    /// Print empty bins too.
    #[arg(short = 'f', long = "full")]
    pub full: bool,

    /// Output file (default stdout).
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Print help.
    #[arg(long = "help", action = ArgAction::HelpLong)]
    pub help: Option<bool>,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Index file (sorted or raw).
    pub file: PathBuf,

    /// Copy the body (everything after the header) to stdout instead.
    #[arg(long = "skip-header")]
    pub skip_header: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_args_parse_with_sizes() {
        let cli = Cli::try_parse_from([
            "kmercount", "count", "-k", "25", "-s", "100M", "-t", "8", "-C", "-o", "out.kc",
            "in.fa",
        ])
        .unwrap();
        let Command::Count(a) = cli.command else {
            panic!("expected count");
        };
        assert_eq!(a.k, 25);
        assert_eq!(a.size, 100 << 20);
        assert_eq!(a.threads, 8);
        assert!(a.canonical);
        assert_eq!(a.inputs, vec!["in.fa".to_string()]);
    }

    #[test]
    fn verbosity_flags_adjust_the_level() {
        let cli =
            Cli::try_parse_from(["kmercount", "-v", "count", "-k", "3", "-s", "1k", "x.fa"])
                .unwrap();
        assert_eq!(cli.notify_level(), 3);
        let cli =
            Cli::try_parse_from(["kmercount", "-qq", "count", "-k", "3", "-s", "1k", "x.fa"])
                .unwrap();
        assert_eq!(cli.notify_level(), 0);
    }

    #[test]
    fn bad_size_is_a_parse_error() {
        assert!(Cli::try_parse_from(["kmercount", "count", "-k", "3", "-s", "10Q", "x.fa"])
            .is_err());
    }

    #[test]
    fn merge_op_values() {
        let cli = Cli::try_parse_from([
            "kmercount", "merge", "--op", "jaccard", "-o", "out", "a.kc", "b.kc",
        ])
        .unwrap();
        let Command::Merge(a) = cli.command else {
            panic!("expected merge");
        };
        assert_eq!(a.op, MergeOpArg::Jaccard);
        assert_eq!(a.files.len(), 2);
    }

    #[test]
    fn missing_required_input_fails() {
        assert!(Cli::try_parse_from(["kmercount", "count", "-k", "3", "-s", "1k"]).is_err());
        assert!(Cli::try_parse_from(["kmercount", "merge"]).is_err());
    }
}
