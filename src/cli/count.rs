//! The `count` subcommand.

use crate::cli::args::{AmbigArg, CountArgs};
use crate::count::{count_to_path, CountConfig};
use crate::dump::DumpBounds;
use crate::error::{Error, Result};
use crate::hash::shared::GrowthPolicy;
use crate::notify;
use crate::stream::parser::AmbigPolicy;
use crate::util::expand_inputs;

pub fn run(args: &CountArgs) -> Result<()> {
    let inputs = expand_inputs(&args.inputs).map_err(|e| Error::io("<inputs>", e))?;
    if inputs.is_empty() {
        return Err(Error::Config("no sequence files among the inputs".into()));
    }

    let cfg = CountConfig {
        k: args.k,
        size: args.size,
        threads: args.threads,
        canonical: args.canonical,
        counter_len: args.counter_len,
        value_bytes: args.out_counter_len,
        max_reprobe: args.reprobes,
        growth: GrowthPolicy {
            enabled: !args.no_grow,
            max_grows: args.max_grows,
        },
        ambig: match args.ambiguous {
            AmbigArg::Break => AmbigPolicy::Break,
            AmbigArg::A => AmbigPolicy::MapToA,
        },
        matrix_seed: args.matrix_seed,
        bounds: DumpBounds {
            min: args.min,
            max: args.max,
        },
        text_output: args.text,
        zero_on_dump: true,
    };

    notify!(
        3,
        "counting {}-mers from {} inputs into {}",
        cfg.k,
        inputs.len(),
        args.output.display()
    );
    let summary = count_to_path(&cfg, inputs, &args.output)?;
    notify!(
        2,
        "wrote {} ({} intermediate snapshots)",
        args.output.display(),
        summary.snapshots
    );
    Ok(())
}
