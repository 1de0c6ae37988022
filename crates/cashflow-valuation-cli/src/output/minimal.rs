use serde_json::Value;

use super::scalar_text;

/// Key answer of each command, most decisive first.
const PRIORITY_KEYS: &[&str] = &[
    "recommendation",
    "npv",
    "mean_npv",
    "value",
    "terminal_mean",
    "summary",
];

/// Print just the key answer value from the output.
///
/// Falls back to the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        let key_value = PRIORITY_KEYS
            .iter()
            .find_map(|k| map.get(*k).filter(|v| !v.is_null()));
        if let Some(val) = key_value {
            println!("{}", scalar_text(val, "null"));
            return;
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{key}: {}", scalar_text(val, "null"));
            return;
        }
    }

    println!("{}", scalar_text(result_obj, "null"));
}
