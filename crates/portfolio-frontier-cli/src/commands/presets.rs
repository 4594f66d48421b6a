use serde_json::Value;

use portfolio_frontier_core::constraints::presets;

/// The built-in strategies, in the order a run without strategies uses them.
pub fn run_presets() -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::to_value(presets::standard_strategies())?)
}
