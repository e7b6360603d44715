//! Time/value series for downstream plotting and export.
//!
//! A series pairs each record's timestamp with the value at one measurement path.
//! Records where either side is absent or cannot be coerced are excluded and
//! counted, never treated as errors.
//!
//! Timestamps come from the first present of `time`, `timestamp`, `ts` and are
//! parsed as RFC 3339, as `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC), or as an
//! epoch number (seconds, or milliseconds when larger than 10^11).

use crate::paths::{enumerate_paths_all, get_value};
use crate::record::Record;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;

/// Fields tried, in order, for a record's timestamp.
pub const TIME_FIELDS: &[&str] = &["time", "timestamp", "ts"];

/// Paths that are bookkeeping rather than measurements.
const NON_MEASUREMENTS: &[&str] = &["device_id", "time", "device", "Device"];

/// Epoch values above this are read as milliseconds.
const EPOCH_MILLIS_THRESHOLD: f64 = 1e11;

/// One point of a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// When the reading was taken.
    pub time: DateTime<Utc>,
    /// The reading.
    pub value: f64,
}

/// A series plus the number of records that could not contribute to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    /// The measurement path this series was built from.
    pub path: String,
    /// Points sorted by time; ties keep record order.
    pub points: Vec<SeriesPoint>,
    /// Records excluded for a missing or unparseable time or value.
    pub excluded: usize,
}

impl Series {
    /// Whether no record contributed a point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Candidate measurement paths across `records`, bookkeeping fields removed.
#[must_use]
pub fn measurement_paths<'a>(records: impl IntoIterator<Item = &'a Record>) -> BTreeSet<String> {
    let mut paths = enumerate_paths_all(records);
    paths.retain(|p| !NON_MEASUREMENTS.contains(&p.as_str()));
    paths
}

/// Build the series for `path` over `records`.
#[must_use]
pub fn extract_series<'a>(records: impl IntoIterator<Item = &'a Record>, path: &str) -> Series {
    let mut series = Series {
        path: path.to_string(),
        ..Series::default()
    };
    for r in records {
        let time = TIME_FIELDS
            .iter()
            .find_map(|f| get_value(r, f))
            .and_then(parse_time);
        let value = get_value(r, path).and_then(coerce_f64);
        match (time, value) {
            (Some(time), Some(value)) => series.points.push(SeriesPoint { time, value }),
            _ => series.excluded += 1,
        }
    }
    series.points.sort_by_key(|p| p.time);
    series
}

/// Numeric reading of a JSON value: numbers, numeric strings, booleans as 0/1.
#[must_use]
pub fn coerce_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Timestamp reading of a JSON value.
#[must_use]
pub fn parse_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Number(n) => n.as_f64().and_then(from_epoch),
        Value::String(s) => parse_time_str(s.trim()),
        _ => None,
    }
}

fn parse_time_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<f64>().ok().and_then(from_epoch)
}

fn from_epoch(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() {
        return None;
    }
    let millis = if n.abs() > EPOCH_MILLIS_THRESHOLD { n } else { n * 1000.0 };
    DateTime::from_timestamp_millis(millis.round() as i64)
}
