use clap::Args;
use serde_json::Value;

use portfolio_frontier_core::estimation::{self, PriceHistoryInput};

use crate::input;

/// Arguments for estimating statistics from price history
#[derive(Args)]
pub struct EstimateArgs {
    /// Path to JSON or YAML input file
    #[arg(long)]
    pub input: Option<String>,

    /// Override the annualization factor (trading periods per year)
    #[arg(long)]
    pub periods_per_year: Option<f64>,
}

pub fn run_estimate(args: EstimateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut history: PriceHistoryInput = input::load(args.input.as_deref(), "statistics estimation")?;
    if let Some(periods) = args.periods_per_year {
        history.periods_per_year = periods;
    }
    let result = estimation::estimate_statistics(&history)?;
    Ok(serde_json::to_value(result)?)
}
