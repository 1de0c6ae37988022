use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::scalar_text;

/// Format output as a table using the tabled crate.
///
/// `{"result": {...}}` envelopes print as field/value pairs, `{"results": [...]}`
/// batch output as one row per entity.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result);
            } else if let Some(Value::Array(rows)) = map.get("results") {
                print_array_table(rows);
                if let Some(summary) = map.get("summary") {
                    println!();
                    print_result_table(summary);
                }
                if let Some(Value::Array(viz)) = map.get("visualization") {
                    if !viz.is_empty() {
                        println!("\nNPV distribution:");
                        print_array_table(viz);
                    }
                }
            } else {
                print_flat_object(map);
            }
            print_footer(map);
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{value}"),
    }
}

fn print_result_table(result: &Value) {
    match result {
        Value::Object(res_map) => print_flat_object(res_map),
        Value::Array(arr) => print_array_table(arr),
        other => println!("{}", scalar_text(other, "-")),
    }
}

fn print_footer(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {w}");
            }
        }
    }
    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {meth}");
    }
}

fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        match val {
            // nested statistics such as percentiles get one row per entry
            Value::Object(inner) => {
                for (k, v) in inner {
                    builder.push_record([format!("{key}.{k}"), scalar_text(v, "-")]);
                }
            }
            _ => builder.push_record([key.clone(), cell_text(val)]),
        }
    }
    println!("{}", Table::from(builder));
}

fn print_array_table(arr: &[Value]) {
    let Some(Value::Object(first)) = arr.first() else {
        if arr.is_empty() {
            println!("(empty)");
        }
        for item in arr {
            println!("{}", cell_text(item));
        }
        return;
    };

    let headers: Vec<String> = first.keys().cloned().collect();
    let mut builder = Builder::default();
    builder.push_record(headers.clone());
    for map in arr.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(h).map(cell_text).unwrap_or_default())
            .collect();
        builder.push_record(row);
    }
    println!("{}", Table::from(builder));
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(|v| scalar_text(v, "-"))
            .collect::<Vec<_>>()
            .join(", "),
        other => scalar_text(other, "-"),
    }
}
