//! Label/value row decoding
//!
//! The source export is not a header-plus-rows table. Each spreadsheet row
//! lays several independent pairs side by side:
//!
//! ```text
//! Flag Urgente:,SIM ⚠️,Score Risco:,ALTO
//! ```
//!
//! Cells `0,1` are a label and its value, cells `2,3` the next pair, and so
//! on. Section headings in the dashboard start with an emoji marker and are
//! dropped, as are pairs missing either side.

use crate::models::RawRow;
use crate::normalize::normalize_label;
use tracing::trace;

/// Leading glyphs of decorative section headings.
pub const DECORATIVE_MARKERS: [char; 7] = ['🚨', '💡', '👤', '📋', '📊', '🎫', '📝'];

/// Decode one row of cells into its label/value pairs.
///
/// Returns `None` when no pair survives.
pub fn decode_row<S: AsRef<str>>(cells: &[S]) -> Option<RawRow> {
    let mut row = RawRow::new();

    for pair in cells.chunks_exact(2) {
        let label = pair[0].as_ref().trim();
        let value = pair[1].as_ref().trim();
        let label = label.strip_suffix(':').unwrap_or(label);

        if label.is_empty() || value.is_empty() || is_decorative(label) {
            continue;
        }

        let key = normalize_label(label);
        if key.is_empty() {
            trace!(label, "label normalizes to an empty key, skipping pair");
            continue;
        }
        row.insert(key, value);
    }

    (!row.is_empty()).then_some(row)
}

/// Decode every row, keeping row order and omitting rows with no pairs.
pub fn decode_rows<I, R, S>(rows: I) -> Vec<RawRow>
where
    I: IntoIterator<Item = R>,
    R: AsRef<[S]>,
    S: AsRef<str>,
{
    rows.into_iter()
        .filter_map(|cells| decode_row(cells.as_ref()))
        .collect()
}

fn is_decorative(label: &str) -> bool {
    label.starts_with(DECORATIVE_MARKERS)
}
