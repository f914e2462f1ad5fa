use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// A finished stretch of tracked time attributed to a single calendar date. The duration is the
/// total for that date as of the moment the record was emitted, not a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitRecord {
    pub date: NaiveDate,
    pub duration_millis: u64,
}

impl SplitRecord {
    pub fn new(date: NaiveDate, duration: Duration) -> Self {
        Self {
            date,
            duration_millis: duration.num_milliseconds().max(0) as u64,
        }
    }

    /// Value in the unit the graph service stores.
    pub fn value_seconds(&self) -> f64 {
        self.duration_millis as f64 / 1000.0
    }
}
