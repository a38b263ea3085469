//! CSV and plain-text renderings of a [`FrequencyTable`]

use std::fmt::Write;

use crate::dataset::{FrequencyTable, ReturnPeriod, TableKind};

pub const CSV_HEADERS: [&str; 7] = ["Duration", "2-yr", "5-yr", "10-yr", "25-yr", "50-yr", "100-yr"];

/// `rainfall_<kind>_<lat>_<lon>.csv`, with the coordinate text embedded as typed
pub fn export_filename(kind: TableKind, latitude: &str, longitude: &str) -> String {
    format!("rainfall_{}_{}_{}.csv", kind.label(), latitude, longitude)
}

/// Header row then one row per duration, newline separated, no trailing newline
pub fn table_to_csv(table: &FrequencyTable) -> String {
    let mut csv = CSV_HEADERS.join(",");
    for record in table.records() {
        csv.push('\n');
        csv.push_str(record.duration.label());
        for period in ReturnPeriod::ALL {
            let _ = write!(csv, ",{}", record.value(period));
        }
    }
    csv
}

/// Aligned table for terminals
pub fn table_to_text(table: &FrequencyTable) -> String {
    let kind = table.kind();
    let title = match kind {
        TableKind::Intensity => "Intensity",
        TableKind::Depth => "Depth",
    };
    let mut text = format!("Precipitation Frequency Estimates: {} ({})\n", title, kind.unit());
    let _ = write!(text, "{:<10}", CSV_HEADERS[0]);
    for header in &CSV_HEADERS[1..] {
        let _ = write!(text, "{:>9}", header);
    }
    for record in table.records() {
        let _ = write!(text, "\n{:<10}", record.duration.label());
        for period in ReturnPeriod::ALL {
            let _ = write!(text, "{:>9.2}", record.value(period));
        }
    }
    text
}
