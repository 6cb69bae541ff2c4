//! Temporal keys shared by the builders.
//!
//! Sources align on `combo_id`, the hospitalization id joined with the
//! minute-truncated event timestamp. Equality is always at minute
//! granularity, never finer, even when source timestamps carry seconds.

use chrono::{NaiveDateTime, Timelike};

/// Truncate a timestamp to the start of its minute.
pub fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

/// Truncate a timestamp to the start of its hour.
pub fn truncate_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    truncate_to_minute(ts).with_minute(0).unwrap_or(ts)
}

/// Whole hours elapsed from `origin` to `ts` (both hour-truncated).
pub fn hours_between(origin: NaiveDateTime, ts: NaiveDateTime) -> i64 {
    (ts - origin).num_hours()
}

/// The composite join key `{hospitalization_id}_{YYYYMMDDhhmm}`.
pub fn combo_id(hospitalization_id: &str, ts: NaiveDateTime) -> String {
    format!("{}_{}", hospitalization_id, ts.format("%Y%m%d%H%M"))
}

/// The per-day key `{hospitalization_id}_day_{day_number}`.
pub fn hosp_day_key(hospitalization_id: &str, day_number: i64) -> String {
    format!("{hospitalization_id}_day_{day_number}")
}

/// Replace anything outside `[A-Za-z0-9_]` so a value can be used in a
/// derived column name.
pub fn sanitize_column_name(raw: &str) -> String {
    raw.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '_' { ch } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn minute_truncation_drops_seconds() {
        assert_eq!(
            truncate_to_minute(dt("2024-01-01 10:00:45")),
            dt("2024-01-01 10:00:00")
        );
    }

    #[test]
    fn combo_id_is_minute_granular() {
        let a = combo_id("H1", truncate_to_minute(dt("2024-01-01 10:00:05")));
        let b = combo_id("H1", truncate_to_minute(dt("2024-01-01 10:00:55")));
        assert_eq!(a, "H1_202401011000");
        assert_eq!(a, b);
    }

    #[test]
    fn hours_between_hour_buckets() {
        let origin = truncate_to_hour(dt("2024-01-01 10:17:00"));
        let later = truncate_to_hour(dt("2024-01-01 13:42:00"));
        assert_eq!(hours_between(origin, later), 3);
    }

    #[test]
    fn sanitize_keeps_word_characters() {
        assert_eq!(sanitize_column_name("high flow nc"), "high_flow_nc");
        assert_eq!(sanitize_column_name("ph-7.5"), "ph_7_5");
    }
}
