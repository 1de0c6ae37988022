pub mod csv_out;
pub mod export;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Scalar rendering shared by the text formatters; `null` becomes `null_text`.
pub(crate) fn scalar_text(value: &Value, null_text: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => format_float(f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => null_text.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Money and rates read best at a fixed precision; tiny rates keep significant digits.
fn format_float(f: f64) -> String {
    if f != 0.0 && f.abs() < 1e-3 {
        format!("{f:.6e}")
    } else {
        format!("{f:.4}")
    }
}
