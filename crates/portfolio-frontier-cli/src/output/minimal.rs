use serde_json::Value;

/// Print just the key answer from the output.
///
/// Frontier results print one `strategy sharpe` line per strategy. Other
/// results print the first well-known field present, falling back to the
/// first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Some(strategies) = result_obj.get("strategies").and_then(Value::as_array) {
        for s in strategies {
            let name = s.get("name").and_then(Value::as_str).unwrap_or("?");
            let sharpe = s
                .get("optimal")
                .and_then(|o| o.get("metrics"))
                .and_then(|m| m.get("sharpe"));
            match sharpe {
                Some(v) => println!("{name} {}", format_minimal(v)),
                None => println!("{name} infeasible"),
            }
        }
        return;
    }

    let priority_keys = [
        "sharpe",
        "expected_returns",
        "expected_return",
        "volatility",
        "observations",
    ];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            if let Some(val) = map.get(*key).filter(|v| !v.is_null()) {
                println!("{}", format_minimal(val));
                return;
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{key}: {}", format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
