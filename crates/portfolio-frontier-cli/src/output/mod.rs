pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;
use std::io::{self, Write};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Pretty-print JSON to stdout.
fn print_json(value: &Value) {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = serde_json::to_writer_pretty(&mut out, value)
        .map_err(io::Error::from)
        .and_then(|_| writeln!(out));
    if let Err(e) = written {
        eprintln!("JSON serialization error: {e}");
    }
}

/// One summary row per strategy of a frontier result.
pub(crate) const STRATEGY_COLUMNS: [&str; 7] = [
    "strategy",
    "status",
    "accepted",
    "attempts",
    "expected_return",
    "volatility",
    "sharpe",
];

/// Flatten `result.strategies` into rows matching [`STRATEGY_COLUMNS`].
/// Returns None when the value is not a frontier result.
pub(crate) fn strategy_rows(result: &Value) -> Option<Vec<Vec<String>>> {
    let strategies = result.get("strategies")?.as_array()?;
    let rows = strategies
        .iter()
        .map(|s| {
            let metric = |key: &str| {
                s.get("optimal")
                    .and_then(|o| o.get("metrics"))
                    .and_then(|m| m.get(key))
                    .and_then(Value::as_f64)
                    .map(|v| format!("{v:.6}"))
                    .unwrap_or_default()
            };
            vec![
                plain(s.get("name")),
                plain(s.get("status")),
                plain(s.get("accepted")),
                plain(s.get("attempts")),
                metric("expected_return"),
                metric("volatility"),
                metric("sharpe"),
            ]
        })
        .collect();
    Some(rows)
}

/// Rows of `result.weight_comparison`: asset followed by one weight per strategy.
pub(crate) fn comparison_rows(result: &Value) -> Option<(Vec<String>, Vec<Vec<String>>)> {
    let rows = result.get("weight_comparison")?.as_array()?;
    let strategies: Vec<String> = result
        .get("strategies")?
        .as_array()?
        .iter()
        .filter(|s| s.get("optimal").is_some_and(|o| !o.is_null()))
        .filter_map(|s| s.get("name").and_then(Value::as_str).map(str::to_string))
        .collect();

    let mut header = vec!["asset".to_string()];
    header.extend(strategies.iter().cloned());

    let body = rows
        .iter()
        .map(|row| {
            let mut cells = vec![plain(row.get("asset"))];
            for name in &strategies {
                cells.push(
                    row.get("weights")
                        .and_then(|w| w.get(name))
                        .and_then(Value::as_f64)
                        .map(|v| format!("{v:.4}"))
                        .unwrap_or_default(),
                );
            }
            cells
        })
        .collect();
    Some((header, body))
}

fn plain(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(v) => v.to_string(),
    }
}
