//! End-to-end scenarios for the hourly aggregator.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use polars::prelude::{AnyValue, Column, DataFrame, IntoColumn, NamedFrom, Series};

use clif_core::{AggregationConfig, convert_hourly, truncate_to_hour};
use clif_ingest::{any_to_datetime, any_to_f64, any_to_i64, any_to_string};

fn dt(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

fn string_col(name: &str, values: &[&str]) -> Column {
    let parsed: Vec<Option<String>> = values
        .iter()
        .map(|v| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        })
        .collect();
    Series::new(name.into(), parsed).into_column()
}

fn f64_col(name: &str, values: &[Option<f64>]) -> Column {
    Series::new(name.into(), values.to_vec()).into_column()
}

fn i64_col(name: &str, values: &[Option<i64>]) -> Column {
    Series::new(name.into(), values.to_vec()).into_column()
}

fn dt_col(name: &str, values: &[&str]) -> Column {
    let parsed: Vec<Option<NaiveDateTime>> =
        values.iter().map(|v| (!v.is_empty()).then(|| dt(v))).collect();
    Series::new(name.into(), parsed).into_column()
}

fn config(entries: &[(&str, &[&str])]) -> AggregationConfig {
    let mut map = BTreeMap::new();
    for (method, columns) in entries {
        map.insert(
            method.to_string(),
            columns.iter().map(|c| c.to_string()).collect(),
        );
    }
    map
}

fn get_string(df: &DataFrame, column: &str, row: usize) -> String {
    any_to_string(df.column(column).unwrap().get(row).unwrap_or(AnyValue::Null))
}

fn get_f64(df: &DataFrame, column: &str, row: usize) -> Option<f64> {
    any_to_f64(df.column(column).unwrap().get(row).unwrap_or(AnyValue::Null))
}

fn get_i64(df: &DataFrame, column: &str, row: usize) -> Option<i64> {
    any_to_i64(df.column(column).unwrap().get(row).unwrap_or(AnyValue::Null))
}

/// Wide fixture: H1 with three rows in the 10:00 hour and one at 13:42,
/// H2 with a single row.
fn wide_fixture() -> DataFrame {
    DataFrame::new(vec![
        string_col("hospitalization_id", &["H1", "H1", "H1", "H1", "H2"]),
        dt_col(
            "event_time",
            &[
                "2024-01-01 10:17:00",
                "2024-01-01 10:30:00",
                "2024-01-01 10:45:00",
                "2024-01-01 13:42:00",
                "2024-01-01 08:05:00",
            ],
        ),
        string_col("patient_id", &["P1", "P1", "P1", "P1", "P2"]),
        i64_col("day_number", &[Some(1), Some(1), Some(1), Some(1), Some(1)]),
        f64_col(
            "heart_rate",
            &[Some(80.0), Some(90.0), None, Some(70.0), Some(65.0)],
        ),
        f64_col(
            "norepinephrine",
            &[None, Some(5.0), None, None, None],
        ),
        string_col("device_category", &["imv", "nippv", "imv", "", "imv"]),
    ])
    .unwrap()
}

#[test]
fn boolean_reduction_flags_any_non_null() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[("boolean", &["norepinephrine"]), ("mean", &["heart_rate"])]),
    )
    .unwrap();

    // H1 nth 0 has one non-null norepinephrine
    assert_eq!(get_string(&hourly, "hospitalization_id", 0), "H1");
    assert_eq!(get_i64(&hourly, "nth_hour", 0), Some(0));
    assert_eq!(get_i64(&hourly, "norepinephrine_boolean", 0), Some(1));
    // H1 nth 3 has none
    assert_eq!(get_i64(&hourly, "norepinephrine_boolean", 1), Some(0));
    // H2 has none
    assert_eq!(get_i64(&hourly, "norepinephrine_boolean", 2), Some(0));
}

#[test]
fn nth_hour_aligns_to_each_hospitalizations_origin() {
    let hourly = convert_hourly(&wide_fixture(), &config(&[("max", &["heart_rate"])])).unwrap();

    assert_eq!(hourly.height(), 3);
    // rows sorted by (hospitalization_id, nth_hour)
    assert_eq!(get_string(&hourly, "hospitalization_id", 0), "H1");
    assert_eq!(get_i64(&hourly, "nth_hour", 0), Some(0));
    assert_eq!(
        any_to_datetime(hourly.column("event_time_hour").unwrap().get(0).unwrap()),
        Some(dt("2024-01-01 10:00:00"))
    );
    assert_eq!(get_i64(&hourly, "hour_bucket", 0), Some(10));

    assert_eq!(get_i64(&hourly, "nth_hour", 1), Some(3));
    assert_eq!(get_i64(&hourly, "hour_bucket", 1), Some(13));

    assert_eq!(get_string(&hourly, "hospitalization_id", 2), "H2");
    assert_eq!(get_i64(&hourly, "nth_hour", 2), Some(0));
    assert_eq!(get_i64(&hourly, "hour_bucket", 2), Some(8));
}

#[test]
fn numeric_reductions_ignore_nulls() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[
            ("max", &["heart_rate"]),
            ("min", &["heart_rate"]),
            ("mean", &["heart_rate"]),
            ("median", &["heart_rate"]),
        ]),
    )
    .unwrap();

    assert_eq!(get_f64(&hourly, "heart_rate_max", 0), Some(90.0));
    assert_eq!(get_f64(&hourly, "heart_rate_min", 0), Some(80.0));
    assert_eq!(get_f64(&hourly, "heart_rate_mean", 0), Some(85.0));
    assert_eq!(get_f64(&hourly, "heart_rate_median", 0), Some(85.0));
}

#[test]
fn first_and_last_take_non_null_ends() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[("first", &["heart_rate"]), ("last", &["heart_rate"])]),
    )
    .unwrap();

    assert_eq!(get_f64(&hourly, "heart_rate_first", 0), Some(80.0));
    assert_eq!(get_f64(&hourly, "heart_rate_last", 0), Some(90.0));
}

#[test]
fn unlisted_columns_carry_forward_with_c_suffix() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[("boolean", &["norepinephrine"])]),
    )
    .unwrap();

    // heart_rate and device_category were not configured
    assert!(hourly.column("heart_rate_c").is_ok());
    assert!(hourly.column("heart_rate_first").is_err());
    assert_eq!(get_f64(&hourly, "heart_rate_c", 0), Some(80.0));
    assert_eq!(get_string(&hourly, "device_category_c", 0), "imv");
    // grouping columns are never suffixed
    assert!(hourly.column("patient_id_c").is_err());
}

#[test]
fn one_hot_covers_all_observed_values_on_every_row() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[("one_hot_encode", &["device_category"])]),
    )
    .unwrap();

    assert!(hourly.column("device_category_imv").is_ok());
    assert!(hourly.column("device_category_nippv").is_ok());
    // H1 nth 0 saw both devices
    assert_eq!(get_i64(&hourly, "device_category_imv", 0), Some(1));
    assert_eq!(get_i64(&hourly, "device_category_nippv", 0), Some(1));
    // H1 nth 3 saw neither; columns still present and zero
    assert_eq!(get_i64(&hourly, "device_category_imv", 1), Some(0));
    assert_eq!(get_i64(&hourly, "device_category_nippv", 1), Some(0));
    // H2 saw imv only
    assert_eq!(get_i64(&hourly, "device_category_imv", 2), Some(1));
    assert_eq!(get_i64(&hourly, "device_category_nippv", 2), Some(0));
}

#[test]
fn unknown_methods_and_columns_are_skipped() {
    let hourly = convert_hourly(
        &wide_fixture(),
        &config(&[
            ("stddev", &["heart_rate"]),
            ("max", &["heart_rate", "no_such_column"]),
        ]),
    )
    .unwrap();

    assert!(hourly.column("heart_rate_max").is_ok());
    assert!(hourly.column("heart_rate_stddev").is_err());
    assert!(hourly.column("no_such_column_max").is_err());
}

#[test]
fn empty_input_keeps_schema() {
    let wide = DataFrame::new(vec![
        string_col("hospitalization_id", &[]),
        dt_col("event_time", &[]),
        string_col("patient_id", &[]),
        i64_col("day_number", &[]),
        f64_col("heart_rate", &[]),
    ])
    .unwrap();
    let hourly = convert_hourly(&wide, &config(&[("max", &["heart_rate"])])).unwrap();
    assert_eq!(hourly.height(), 0);
    assert!(hourly.column("hospitalization_id").is_ok());
    assert!(hourly.column("nth_hour").is_ok());
    assert!(hourly.column("hour_bucket").is_ok());
    assert!(hourly.column("heart_rate_max").is_ok());
}

#[test]
fn missing_required_columns_are_fatal() {
    let wide = DataFrame::new(vec![
        string_col("hospitalization_id", &["H1"]),
        dt_col("event_time", &["2024-01-01 10:00:00"]),
    ])
    .unwrap();
    assert!(convert_hourly(&wide, &config(&[])).is_err());
}

#[test]
fn hourly_rows_never_exceed_wide_rows() {
    let wide = wide_fixture();
    let hourly = convert_hourly(&wide, &config(&[("first", &["heart_rate"])])).unwrap();
    assert!(hourly.height() <= wide.height());

    // every hourly bucket appears in the wide table under the same truncation
    let wide_hours: Vec<(String, NaiveDateTime)> = (0..wide.height())
        .map(|row| {
            let id = get_string(&wide, "hospitalization_id", row);
            let ts = any_to_datetime(wide.column("event_time").unwrap().get(row).unwrap()).unwrap();
            (id, truncate_to_hour(ts))
        })
        .collect();
    for row in 0..hourly.height() {
        let id = get_string(&hourly, "hospitalization_id", row);
        let hour =
            any_to_datetime(hourly.column("event_time_hour").unwrap().get(row).unwrap()).unwrap();
        assert!(wide_hours.contains(&(id, hour)));
    }
}

#[test]
fn nth_hour_is_non_decreasing_within_hospitalization() {
    let hourly = convert_hourly(&wide_fixture(), &config(&[("max", &["heart_rate"])])).unwrap();
    let mut previous: Option<(String, i64)> = None;
    for row in 0..hourly.height() {
        let id = get_string(&hourly, "hospitalization_id", row);
        let nth = get_i64(&hourly, "nth_hour", row).unwrap();
        if let Some((prev_id, prev_nth)) = &previous {
            if prev_id == &id {
                assert!(nth > *prev_nth);
            }
        }
        previous = Some((id, nth));
    }
}
