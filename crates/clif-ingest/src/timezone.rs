//! Timestamp parsing and site-timezone normalization.
//!
//! CLIF extracts store timestamps either as zone-aware parquet columns
//! (UTC instants) or as naive local strings. After loading, every `dttm`
//! column is a naive datetime in the site's wall clock: zone-aware values
//! are converted into the caller's `site_tz`, naive values are assumed to
//! already be local and pass through unchanged.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone as _};
use chrono_tz::Tz;
use polars::prelude::{AnyValue, DataFrame, DataType as PlDataType, NamedFrom, Series};
use tracing::debug;

use crate::polars_utils::any_to_datetime;

/// A parsed timestamp plus whether the source text carried a UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTimestamp {
    /// Wall-clock value; UTC when `zone_aware`, otherwise as written.
    pub naive: NaiveDateTime,
    pub zone_aware: bool,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parse a timestamp string in the formats CLIF extracts use.
///
/// Offset-carrying forms (RFC 3339) normalize to UTC; naive forms are
/// returned as written. Bare dates parse to midnight.
pub fn parse_timestamp(raw: &str) -> Option<ParsedTimestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(ParsedTimestamp {
            naive: dt.naive_utc(),
            zone_aware: true,
        });
    }
    if let Ok(dt) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %z") {
        return Some(ParsedTimestamp {
            naive: dt.naive_utc(),
            zone_aware: true,
        });
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(ParsedTimestamp {
                naive,
                zone_aware: false,
            });
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| ParsedTimestamp {
            naive,
            zone_aware: false,
        });
    }
    None
}

/// Normalize the named timestamp columns of a frame to naive site-local
/// datetimes.
///
/// `utc_columns` lists columns whose values are UTC instants (zone-aware
/// parquet columns, or CSV columns whose text carried offsets). Without a
/// `site_tz` those stay as UTC wall clock; naive columns always pass
/// through untouched.
pub fn convert_to_site_tz(
    df: &mut DataFrame,
    dttm_columns: &[String],
    utc_columns: &BTreeSet<String>,
    site_tz: Option<Tz>,
) -> Result<()> {
    for name in dttm_columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let zone_aware = utc_columns.contains(name)
            || matches!(column.dtype(), PlDataType::Datetime(_, Some(_)));
        let mut values: Vec<Option<NaiveDateTime>> = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            values.push(any_to_datetime(column.get(idx).unwrap_or(AnyValue::Null)));
        }
        let converted = match (zone_aware, site_tz) {
            (true, Some(tz)) => {
                debug!(column = name.as_str(), tz = %tz, "converting zone-aware timestamps to site zone");
                values
                    .into_iter()
                    .map(|v| v.map(|naive| tz.from_utc_datetime(&naive).naive_local()))
                    .collect::<Vec<_>>()
            }
            (false, Some(tz)) => {
                debug!(
                    column = name.as_str(),
                    tz = %tz,
                    "naive timestamps assumed already in site zone"
                );
                values
            }
            _ => values,
        };
        df.with_column(Series::new(name.as_str().into(), converted))?;
    }
    Ok(())
}
