use cashflow_valuation_core::pipeline::ExportRow;
use std::io;

/// Write batch rows as CSV, one line per entity in the given order.
pub fn write_export(path: &str, rows: &[ExportRow]) -> Result<(), Box<dyn std::error::Error>> {
    let file = std::fs::File::create(path)
        .map_err(|e| format!("Failed to create '{path}': {e}"))?;
    write_rows(file, rows)?;
    Ok(())
}

fn write_rows<W: io::Write>(writer: W, rows: &[ExportRow]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
