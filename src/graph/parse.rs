use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::utils::time::date_to_graph_name;

// Matches `"2024-01-01":"3600.00"` as well as unquoted numbers and whitespace around the colon.
// Anything around the pairs is ignored.
static ENTRY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([0-9]{4}-[0-9]{2}-[0-9]{2})"\s*:\s*"?(-?[0-9]+(?:\.[0-9]+)?)"?"#)
        .expect("entry pattern is valid")
});

/// Scans a graph body for the entry of `date`. Bodies without a usable entry count as a day
/// with nothing recorded.
pub fn find_value(body: &str, date: NaiveDate) -> f64 {
    let date = date_to_graph_name(date);
    for captures in ENTRY_PATTERN.captures_iter(body) {
        if captures[1] != date {
            continue;
        }
        match captures[2].parse::<f64>() {
            Ok(v) => return v,
            Err(e) => warn!("Illegal value {} for {date}: {e}", &captures[2]),
        }
    }
    0.0
}
