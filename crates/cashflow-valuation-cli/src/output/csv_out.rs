use serde_json::Value;
use std::io;

use super::scalar_text;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    let written = match value {
        Value::Object(map) => match (map.get("result"), map.get("results")) {
            (Some(Value::Object(result)), _) => write_pairs(&mut wtr, result),
            (_, Some(Value::Array(rows))) => write_rows(&mut wtr, rows),
            _ => write_pairs(&mut wtr, map),
        },
        Value::Array(arr) => write_rows(&mut wtr, arr),
        _ => wtr.write_record([scalar_text(value, "")]),
    };

    if let Err(e) = written.and_then(|_| wtr.flush().map_err(csv::Error::from)) {
        tracing::error!(error = %e, "CSV output failed");
    }
}

/// Two-column CSV: field, value. Nested objects flatten to `parent.child`.
fn write_pairs<W: io::Write>(
    wtr: &mut csv::Writer<W>,
    map: &serde_json::Map<String, Value>,
) -> csv::Result<()> {
    wtr.write_record(["field", "value"])?;
    for (key, val) in map {
        match val {
            Value::Object(inner) => {
                for (k, v) in inner {
                    wtr.write_record([format!("{key}.{k}"), scalar_text(v, "")])?;
                }
            }
            _ => wtr.write_record([key.clone(), scalar_text(val, "")])?,
        }
    }
    Ok(())
}

fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) -> csv::Result<()> {
    let Some(Value::Object(first)) = rows.first() else {
        for item in rows {
            wtr.write_record([scalar_text(item, "")])?;
        }
        return Ok(());
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    wtr.write_record(&headers)?;
    for map in rows.iter().filter_map(Value::as_object) {
        let row: Vec<String> = headers
            .iter()
            .map(|h| map.get(*h).map(|v| scalar_text(v, "")).unwrap_or_default())
            .collect();
        wtr.write_record(&row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(f: impl FnOnce(&mut csv::Writer<Vec<u8>>) -> csv::Result<()>) -> String {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        f(&mut wtr).unwrap();
        String::from_utf8(wtr.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_rows_keep_field_order_of_first_object() {
        let rows = vec![
            json!({"entity_id": "001004", "mean_npv": 12.5, "error": null}),
            json!({"entity_id": "001045", "mean_npv": null, "error": "no cash flows"}),
        ];
        let out = render(|w| write_rows(w, &rows));
        assert_eq!(
            out,
            "entity_id,mean_npv,error\n001004,12.5000,\n001045,,no cash flows\n"
        );
    }

    #[test]
    fn test_pairs_flatten_nested_objects() {
        let map = json!({"mean_npv": 1.0, "percentiles": {"p5": 0.5}});
        let out = render(|w| write_pairs(w, map.as_object().unwrap()));
        assert_eq!(out, "field,value\nmean_npv,1.0000\npercentiles.p5,0.5000\n");
    }
}
