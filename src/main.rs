//! Binary entry point for the `kmercount` command-line tool.
//!
//! Parses the subcommand, sets the global notification level from the
//! `-v`/`-q` flags, dispatches, and maps the error taxonomy onto process
//! exit codes: 0 success, 1 user/input error, 2 I/O error, 3 internal
//! invariant violation.

use clap::Parser;

use kmercount::cli::{count, dump, histo, info, merge, Cli, Command};
use kmercount::notify::set_notify_level;

fn main() {
    let cli = Cli::parse();
    set_notify_level(cli.notify_level());

    let result = match &cli.command {
        Command::Count(args) => count::run(args),
        Command::Dump(args) => dump::run(args),
        Command::Merge(args) => merge::run(args),
        Command::Histo(args) => histo::run(args),
        Command::Info(args) => info::run(args),
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("kmercount: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
