use serde_json::{Map, Value};
use std::io;

use super::lookup;

type Writer<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// Frontier and allocation results write the sampled point cloud, one row
/// per portfolio, ready for charting. Optimization results write the weight
/// table and statistics the per-asset summary; anything else is written as
/// field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(result @ Value::Object(res)) => {
                if let Some(Value::Array(points)) =
                    lookup(result, "frontier.points").or_else(|| res.get("points"))
                {
                    write_points_csv(&mut wtr, points, &asset_names(res));
                } else if let Some(Value::Array(weights)) = res.get("optimal_weights") {
                    write_array_csv(&mut wtr, weights);
                } else if let Some(Value::Array(assets)) = res.get("assets") {
                    write_array_csv(&mut wtr, assets);
                } else {
                    write_fields_csv(&mut wtr, res);
                }
            }
            _ => write_fields_csv(&mut wtr, map),
        },
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

/// Asset names in weight order, when the result carries them.
fn asset_names(result: &Map<String, Value>) -> Vec<String> {
    match result.get("optimal_weights") {
        Some(Value::Array(allocs)) => allocs
            .iter()
            .filter_map(|a| a.get("asset").and_then(Value::as_str).map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

fn write_points_csv(wtr: &mut Writer<'_>, points: &[Value], names: &[String]) {
    let n_weights = points
        .first()
        .and_then(|p| p.get("weights"))
        .and_then(Value::as_array)
        .map_or(0, |w| w.len());

    let mut headers: Vec<String> = vec![
        "volatility".into(),
        "expected_return".into(),
        "ratio".into(),
    ];
    headers.extend((0..n_weights).map(|i| match names.get(i) {
        Some(name) if names.len() == n_weights => name.clone(),
        _ => format!("w{}", i + 1),
    }));
    let _ = wtr.write_record(&headers);

    for p in points {
        let mut row: Vec<String> = ["volatility", "expected_return", "ratio"]
            .iter()
            .map(|k| p.get(*k).map(format_csv_value).unwrap_or_default())
            .collect();
        if let Some(Value::Array(w)) = p.get("weights") {
            row.extend(w.iter().map(format_csv_value));
        }
        let _ = wtr.write_record(&row);
    }
}

fn write_fields_csv(wtr: &mut Writer<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_array_csv(wtr: &mut Writer<'_>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
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
