//! CSV export

use chrono::SecondsFormat;
use obd_protocol::Snapshot;
use std::io::{self, Write};

/// Write `snapshots` as CSV and return the number of data rows.
///
/// Columns are `timestamp` followed by every metric name in first-seen
/// order. A metric that was unavailable or not polled is an empty cell.
pub fn write_csv<W: Write>(writer: &mut W, snapshots: &[Snapshot]) -> io::Result<usize> {
    let mut columns: Vec<&str> = Vec::new();
    for name in snapshots.iter().flat_map(|s| s.names()) {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }

    write!(writer, "timestamp")?;
    for column in &columns {
        write!(writer, ",{}", escape(column))?;
    }
    writeln!(writer)?;

    for snapshot in snapshots {
        write!(
            writer,
            "{}",
            snapshot.timestamp().to_rfc3339_opts(SecondsFormat::Millis, true)
        )?;
        for column in &columns {
            match snapshot.value(column) {
                Some(value) => write!(writer, ",{}", value)?,
                None => write!(writer, ",")?,
            }
        }
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(snapshots.len())
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
