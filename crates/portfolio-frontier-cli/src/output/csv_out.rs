use serde_json::Value;
use std::io;

use super::{strategy_rows, STRATEGY_COLUMNS};

/// Write output as CSV to stdout.
///
/// Frontier results become one row per strategy; other results are written
/// as field/value pairs, and arrays as one row per element.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let written = match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => match strategy_rows(result) {
                Some(rows) => write_rows(&mut wtr, &STRATEGY_COLUMNS, rows),
                None => write_fields(&mut wtr, result.as_object().unwrap_or(map)),
            },
            None => write_fields(&mut wtr, map),
        },
        Value::Array(arr) => write_array(&mut wtr, arr),
        _ => wtr.write_record([format_csv_value(value)]),
    };

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        eprintln!("CSV write error: {e}");
    }
}

type CsvOut<'a> = csv::Writer<io::StdoutLock<'a>>;

fn write_rows(wtr: &mut CsvOut<'_>, header: &[&str], rows: Vec<Vec<String>>) -> csv::Result<()> {
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(&row)?;
    }
    Ok(())
}

fn write_fields(wtr: &mut CsvOut<'_>, map: &serde_json::Map<String, Value>) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        wtr.write_record([key.as_str(), &format_csv_value(val)])?;
    }
    Ok(())
}

fn write_array(wtr: &mut CsvOut<'_>, arr: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = arr.first() else {
        for item in arr {
            wtr.write_record([format_csv_value(item)])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    wtr.write_record(&headers)?;
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
            .collect();
        wtr.write_record(&row)?;
    }
    Ok(())
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
