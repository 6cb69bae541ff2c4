//! Cell-level value handling over polars `AnyValue`.
//!
//! The tables this toolkit builds carry data-dependent column sets, so
//! cells travel as a tagged union with typed readings. `decode_cell` is
//! the single `AnyValue` decoder; everything downstream — column
//! accessors, builders, the `any_to_*` shorthands — reads through
//! [`CellValue`] instead of re-matching `AnyValue` variants.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use polars::prelude::*;

/// An owned cell: text, float, int, bool, timestamp, or null.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Text(String),
    Float(f64),
    Int(i64),
    Bool(bool),
    Timestamp(NaiveDateTime),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Render for display and composite keys. Nulls render empty; floats
    /// in their shortest round-trip form; timestamps to the second.
    pub fn render(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Float(v) => format_numeric(*v),
            CellValue::Int(n) => n.to_string(),
            CellValue::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            CellValue::Timestamp(ts) => ts.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }

    /// Numeric reading: ints and bools widen, text parses, the rest is
    /// `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Float(v) => Some(*v),
            CellValue::Int(n) => Some(*n as f64),
            CellValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            CellValue::Text(s) => parse_f64(s),
            _ => None,
        }
    }

    /// Integer reading; floats truncate.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CellValue::Int(n) => Some(*n),
            CellValue::Float(v) => Some(*v as i64),
            CellValue::Bool(b) => Some(i64::from(*b)),
            CellValue::Text(s) => parse_i64(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(*b),
            CellValue::Null => None,
            other => other.as_i64().map(|n| n != 0),
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

/// Decode one polars cell into the tagged union.
///
/// Temporal cells resolve to naive wall-clock values (zone metadata is
/// handled at load time); unsigned values that overflow `i64` and
/// unrepresentable epochs decode to null.
pub fn decode_cell(value: AnyValue<'_>) -> CellValue {
    match value {
        AnyValue::Null => CellValue::Null,
        AnyValue::Boolean(b) => CellValue::Bool(b),
        AnyValue::String(s) => CellValue::Text(s.to_string()),
        AnyValue::StringOwned(s) => CellValue::Text(s.to_string()),
        AnyValue::Float32(v) => CellValue::Float(f64::from(v)),
        AnyValue::Float64(v) => CellValue::Float(v),
        AnyValue::Int8(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int16(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int32(v) => CellValue::Int(i64::from(v)),
        AnyValue::Int64(v) => CellValue::Int(v),
        AnyValue::UInt8(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt16(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt32(v) => CellValue::Int(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v)
            .map(CellValue::Int)
            .unwrap_or(CellValue::Null),
        AnyValue::Datetime(v, unit, _) => datetime_from_epoch(v, unit)
            .map(CellValue::Timestamp)
            .unwrap_or(CellValue::Null),
        AnyValue::DatetimeOwned(v, unit, _) => datetime_from_epoch(v, unit)
            .map(CellValue::Timestamp)
            .unwrap_or(CellValue::Null),
        AnyValue::Date(days) => date_from_epoch_days(days)
            .map(CellValue::Timestamp)
            .unwrap_or(CellValue::Null),
        other => {
            let text = other.to_string();
            if text.is_empty() {
                CellValue::Null
            } else {
                CellValue::Text(text)
            }
        }
    }
}

/// String rendering of a cell; null renders empty.
pub fn any_to_string(value: AnyValue<'_>) -> String {
    decode_cell(value).render()
}

/// Numeric reading of a cell.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    decode_cell(value).as_f64()
}

/// Integer reading of a cell.
pub fn any_to_i64(value: AnyValue<'_>) -> Option<i64> {
    decode_cell(value).as_i64()
}

/// Temporal reading of a cell.
pub fn any_to_datetime(value: AnyValue<'_>) -> Option<NaiveDateTime> {
    decode_cell(value).as_timestamp()
}

/// Shortest round-trip rendering; whole floats drop the fraction.
pub fn format_numeric(v: f64) -> String {
    format!("{v}")
}

fn parse_trimmed<T: std::str::FromStr>(value: &str) -> Option<T> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse().ok()
}

/// Parses a string as `f64`; blank and invalid input read as `None`.
pub fn parse_f64(value: &str) -> Option<f64> {
    parse_trimmed(value)
}

/// Parses a string as `i64`; blank and invalid input read as `None`.
pub fn parse_i64(value: &str) -> Option<i64> {
    parse_trimmed(value)
}

fn datetime_from_epoch(value: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let (secs, nanos) = match unit {
        TimeUnit::Nanoseconds => (
            value.div_euclid(1_000_000_000),
            value.rem_euclid(1_000_000_000) as u32,
        ),
        TimeUnit::Microseconds => (
            value.div_euclid(1_000_000),
            (value.rem_euclid(1_000_000) * 1_000) as u32,
        ),
        TimeUnit::Milliseconds => (
            value.div_euclid(1_000),
            (value.rem_euclid(1_000) * 1_000_000) as u32,
        ),
    };
    DateTime::from_timestamp(secs, nanos).map(|dt| dt.naive_utc())
}

fn date_from_epoch_days(days: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .unwrap()
        .checked_add_signed(Duration::days(i64::from(days)))
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_covers_the_cell_kinds() {
        assert_eq!(decode_cell(AnyValue::Null), CellValue::Null);
        assert_eq!(decode_cell(AnyValue::Int32(-7)), CellValue::Int(-7));
        assert_eq!(decode_cell(AnyValue::Float64(2.5)), CellValue::Float(2.5));
        assert_eq!(decode_cell(AnyValue::Boolean(true)), CellValue::Bool(true));
        assert_eq!(
            decode_cell(AnyValue::String("icu")),
            CellValue::Text("icu".to_string())
        );
        // u64 past the i64 range has no integer reading
        assert_eq!(decode_cell(AnyValue::UInt64(u64::MAX)), CellValue::Null);
    }

    #[test]
    fn render_matches_loader_conventions() {
        assert_eq!(CellValue::Null.render(), "");
        assert_eq!(CellValue::Int(-7).render(), "-7");
        assert_eq!(CellValue::Float(1.50).render(), "1.5");
        assert_eq!(CellValue::Bool(true).render(), "true");
        assert_eq!(any_to_string(AnyValue::String("ward")), "ward");
    }

    #[test]
    fn numeric_readings_widen_and_parse() {
        assert_eq!(CellValue::Int(42).as_f64(), Some(42.0));
        assert_eq!(CellValue::Text("3.5".to_string()).as_f64(), Some(3.5));
        assert_eq!(CellValue::Text("x".to_string()).as_f64(), None);
        assert_eq!(CellValue::Null.as_f64(), None);
        assert_eq!(CellValue::Float(3.9).as_i64(), Some(3)); // truncated
        assert_eq!(CellValue::Bool(true).as_bool(), Some(true));
        assert_eq!(CellValue::Int(0).as_bool(), Some(false));
    }

    #[test]
    fn format_numeric_shortest_form() {
        assert_eq!(format_numeric(1.0), "1");
        assert_eq!(format_numeric(0.0), "0");
        assert_eq!(format_numeric(2.50), "2.5");
    }

    #[test]
    fn parse_helpers_reject_blank_input() {
        assert_eq!(parse_f64(""), None);
        assert_eq!(parse_f64("  3.14  "), Some(3.14));
        assert_eq!(parse_i64("  -100  "), Some(-100));
        assert_eq!(parse_i64("invalid"), None);
    }

    #[test]
    fn datetime_epoch_units_agree() {
        let micros = 1_704_103_200_000_000i64; // 2024-01-01 10:00:00
        let from_us = datetime_from_epoch(micros, TimeUnit::Microseconds).unwrap();
        let from_ms = datetime_from_epoch(micros / 1_000, TimeUnit::Milliseconds).unwrap();
        let from_ns = datetime_from_epoch(micros * 1_000, TimeUnit::Nanoseconds).unwrap();
        assert_eq!(from_us, from_ms);
        assert_eq!(from_us, from_ns);
        assert_eq!(from_us.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 10:00");
    }

    #[test]
    fn date_cells_land_at_midnight() {
        let cell = decode_cell(AnyValue::Date(19723)); // 2024-01-01
        let dt = cell.as_timestamp().unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-01-01 00:00:00");
    }
}
