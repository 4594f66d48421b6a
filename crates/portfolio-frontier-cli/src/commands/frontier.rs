use clap::Args;
use serde_json::Value;
use tracing::info;

use portfolio_frontier_core::frontier::{self, FrontierInput};

use crate::input;

/// Arguments for a full frontier run
#[derive(Args)]
pub struct FrontierArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Include every accepted portfolio in the output
    #[arg(long)]
    pub samples: bool,

    /// Override the seed from the input document
    #[arg(long)]
    pub seed: Option<u64>,
}

pub fn run_frontier(args: FrontierArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut run: FrontierInput = input::load(args.input.as_deref(), "frontier run")?;
    if let Some(seed) = args.seed {
        run.config.seed = Some(seed);
    }

    let output = frontier::run_frontier(&run)?;
    info!(
        seed = output.result.seed,
        micros = output.metadata.computation_time_us,
        "frontier run finished"
    );

    let mut value = serde_json::to_value(output)?;
    if !args.samples {
        strip_samples(&mut value);
    }
    Ok(value)
}

/// Drop the per-strategy sample populations, keeping the counts.
fn strip_samples(value: &mut Value) {
    let strategies = value
        .get_mut("result")
        .and_then(|r| r.get_mut("strategies"))
        .and_then(Value::as_array_mut);
    if let Some(strategies) = strategies {
        for s in strategies.iter_mut().filter_map(Value::as_object_mut) {
            s.remove("samples");
        }
    }
}
