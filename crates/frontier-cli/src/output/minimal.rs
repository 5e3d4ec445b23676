use serde_json::{Map, Value};

/// Print just the key answer value from the output.
///
/// Heuristic: look for well-known result fields in order of priority,
/// then fall back to the first field in the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    let priority_keys = ["allocation_summary", "best_index", "assets", "ratio"];

    if let Value::Object(map) = result_obj {
        for key in &priority_keys {
            let Some(val) = map.get(*key) else {
                continue;
            };
            match *key {
                "best_index" => println!("{}", best_point(map, val)),
                "assets" => println!("{}", asset_line(val)),
                _ if val.is_null() => continue,
                _ => println!("{}", format_minimal(val)),
            }
            return;
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

/// Frontier: the best-ratio sample.
fn best_point(map: &Map<String, Value>, index: &Value) -> String {
    let best = index
        .as_u64()
        .and_then(|i| map.get("points")?.get(i as usize));
    match best {
        Some(p) => format!(
            "ratio={} volatility={} expected_return={}",
            format_minimal(&p["ratio"]),
            format_minimal(&p["volatility"]),
            format_minimal(&p["expected_return"])
        ),
        None => "no valid samples".to_string(),
    }
}

/// Statistics: `AAPL mean=... vol=...; MSFT ...`.
fn asset_line(assets: &Value) -> String {
    match assets {
        Value::Array(items) => items
            .iter()
            .map(|a| {
                format!(
                    "{} mean={} vol={}",
                    format_minimal(&a["asset"]),
                    format_minimal(&a["mean_return"]),
                    format_minimal(&a["volatility"])
                )
            })
            .collect::<Vec<_>>()
            .join("; "),
        other => format_minimal(other),
    }
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
