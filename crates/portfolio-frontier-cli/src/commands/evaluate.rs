use clap::Args;
use serde_json::Value;

use portfolio_frontier_core::metrics::{self, EvaluateInput};

use crate::input;

/// Arguments for scoring one allocation
#[derive(Args)]
pub struct EvaluateArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_evaluate(args: EvaluateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let eval: EvaluateInput = input::load(args.input.as_deref(), "portfolio evaluation")?;
    let result = metrics::evaluate_allocation(&eval)?;
    Ok(serde_json::to_value(result)?)
}
