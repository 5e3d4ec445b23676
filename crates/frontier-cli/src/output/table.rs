use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

/// Scalars go in a Field/Value table; nested objects are flattened one
/// level with dotted keys; lists of records (weights, per-asset statistics)
/// get their own table. Sampled frontier points are only counted.
fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    let Value::Object(res_map) = result else {
        print_flat_object(envelope);
        return;
    };

    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut record_lists: Vec<(String, &Vec<Value>)> = Vec::new();

    for (key, val) in res_map {
        match val {
            Value::Object(inner) => {
                for (sub, sub_val) in inner {
                    let name = format!("{}.{}", key, sub);
                    push_field(&mut builder, &mut record_lists, name, sub_val);
                }
            }
            _ => push_field(&mut builder, &mut record_lists, key.clone(), val),
        }
    }
    println!("{}", Table::from(builder));

    for (name, records) in record_lists {
        println!("\n{}:", name);
        print_array_table(records);
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn push_field<'a>(
    builder: &mut Builder,
    record_lists: &mut Vec<(String, &'a Vec<Value>)>,
    name: String,
    value: &'a Value,
) {
    match value {
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_object) => {
            if name.ends_with("points") {
                builder.push_record([name, format!("{} sampled portfolios", items.len())]);
            } else {
                record_lists.push((name, items));
            }
        }
        _ => builder.push_record([name, format_value(value)]),
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) if arr.iter().all(|v| !v.is_array() && !v.is_object()) => {
            arr.iter().map(format_value).collect::<Vec<_>>().join(", ")
        }
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
