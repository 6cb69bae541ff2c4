//! Hourly aggregation of the wide event table.
//!
//! Rows bucket into `(hospitalization_id, event_time_hour)` groups;
//! `nth_hour` counts hours since each hospitalization's first bucket. The
//! caller names reductions per column; everything else is carried forward
//! as the first non-null value in the hour with a `_c` suffix.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{NaiveDateTime, Timelike};
use polars::prelude::{AnyValue, Column, DataFrame};
use tracing::warn;

use clif_ingest::{any_to_f64, any_to_string};
use clif_model::ClifError;

use crate::column::ColumnData;
use crate::combo::{hours_between, truncate_to_hour};
use crate::frame::{column_names, datetime_column, has_column, string_column};

/// Reductions a caller can request per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AggregationMethod {
    Max,
    Min,
    Mean,
    Median,
    First,
    Last,
    Boolean,
    OneHotEncode,
}

impl AggregationMethod {
    /// All methods in output order.
    pub const ALL: [AggregationMethod; 8] = [
        AggregationMethod::Max,
        AggregationMethod::Min,
        AggregationMethod::Mean,
        AggregationMethod::Median,
        AggregationMethod::First,
        AggregationMethod::Last,
        AggregationMethod::Boolean,
        AggregationMethod::OneHotEncode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationMethod::Max => "max",
            AggregationMethod::Min => "min",
            AggregationMethod::Mean => "mean",
            AggregationMethod::Median => "median",
            AggregationMethod::First => "first",
            AggregationMethod::Last => "last",
            AggregationMethod::Boolean => "boolean",
            AggregationMethod::OneHotEncode => "one_hot_encode",
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            AggregationMethod::Max => "_max",
            AggregationMethod::Min => "_min",
            AggregationMethod::Mean => "_mean",
            AggregationMethod::Median => "_median",
            AggregationMethod::First => "_first",
            AggregationMethod::Last => "_last",
            AggregationMethod::Boolean => "_boolean",
            AggregationMethod::OneHotEncode => "",
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AggregationMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max" => Ok(AggregationMethod::Max),
            "min" => Ok(AggregationMethod::Min),
            "mean" => Ok(AggregationMethod::Mean),
            "median" => Ok(AggregationMethod::Median),
            "first" => Ok(AggregationMethod::First),
            "last" => Ok(AggregationMethod::Last),
            "boolean" => Ok(AggregationMethod::Boolean),
            "one_hot_encode" => Ok(AggregationMethod::OneHotEncode),
            _ => Err(format!("unknown aggregation method: {s}")),
        }
    }
}

/// Method name to source columns, as deserialized from the caller's spec.
pub type AggregationConfig = BTreeMap<String, Vec<String>>;

/// Columns the grouping owns; never carried implicitly.
const GROUP_COLUMNS: &[&str] = &[
    "hospitalization_id",
    "event_time_hour",
    "nth_hour",
    "hour_bucket",
    "patient_id",
    "day_number",
    "first_event_hour",
    "event_time",
];

/// Marker distinguishing an implicit carry-forward from a caller-requested
/// `first`.
const CARRY_SUFFIX: &str = "_c";

struct HourlyRow {
    hospitalization_id: String,
    hour: NaiveDateTime,
    nth_hour: i64,
    row_indexes: Vec<usize>,
}

/// Aggregate a wide event table into hourly buckets.
///
/// Fatal when the input lacks `event_time`, `hospitalization_id`, or
/// `day_number`; unknown methods and columns are logged and skipped.
pub fn convert_hourly(wide: &DataFrame, config: &AggregationConfig) -> Result<DataFrame> {
    for column in ["event_time", "hospitalization_id", "day_number"] {
        if !has_column(wide, column) {
            return Err(ClifError::MissingColumn {
                table: "wide".to_string(),
                column: column.to_string(),
            }
            .into());
        }
    }

    let hosp_ids = string_column(wide, "hospitalization_id")?;
    let event_times = datetime_column(wide, "event_time")?;

    // Hour bucketing and per-hospitalization origin alignment.
    let mut first_hours: BTreeMap<&str, NaiveDateTime> = BTreeMap::new();
    for (id, ts) in hosp_ids.iter().zip(&event_times) {
        let Some(ts) = ts else { continue };
        let hour = truncate_to_hour(*ts);
        first_hours
            .entry(id.as_str())
            .and_modify(|current| {
                if hour < *current {
                    *current = hour;
                }
            })
            .or_insert(hour);
    }

    let mut groups: BTreeMap<(String, i64), HourlyRow> = BTreeMap::new();
    let mut skipped_rows = 0usize;
    for idx in 0..wide.height() {
        let Some(ts) = event_times[idx] else {
            skipped_rows += 1;
            continue;
        };
        let hour = truncate_to_hour(ts);
        let id = hosp_ids[idx].as_str();
        let nth_hour = hours_between(first_hours[id], hour);
        groups
            .entry((id.to_string(), nth_hour))
            .or_insert_with(|| HourlyRow {
                hospitalization_id: id.to_string(),
                hour,
                nth_hour,
                row_indexes: Vec::new(),
            })
            .row_indexes
            .push(idx);
    }
    if skipped_rows > 0 {
        warn!(rows = skipped_rows, "rows without event_time excluded from hourly aggregation");
    }

    let plan = resolve_plan(wide, config);
    build_hourly_frame(wide, &groups, &plan)
}

struct AggregationPlan {
    /// `(method, column, output name)` in output order; one-hot excluded.
    reductions: Vec<(AggregationMethod, String, String)>,
    one_hot: Vec<String>,
}

fn resolve_plan(wide: &DataFrame, config: &AggregationConfig) -> AggregationPlan {
    let all_columns = column_names(wide);
    let mut configured: BTreeSet<&str> = BTreeSet::new();
    let mut methods: BTreeMap<AggregationMethod, Vec<String>> = BTreeMap::new();

    for (method_name, columns) in config {
        let Ok(method) = method_name.parse::<AggregationMethod>() else {
            warn!(method = method_name.as_str(), "unknown aggregation method; skipping");
            continue;
        };
        let mut valid = Vec::new();
        for column in columns {
            if !all_columns.contains(column) {
                warn!(column = column.as_str(), "aggregation names an unknown column; skipping");
                continue;
            }
            configured.insert(column.as_str());
            valid.push(column.clone());
        }
        methods.entry(method).or_default().extend(valid);
    }

    // Everything unnamed and non-grouping is carried forward.
    let implicit: Vec<String> = all_columns
        .iter()
        .filter(|name| {
            !configured.contains(name.as_str()) && !GROUP_COLUMNS.contains(&name.as_str())
        })
        .cloned()
        .collect();

    let mut reductions = Vec::new();
    let mut one_hot = Vec::new();
    for method in AggregationMethod::ALL {
        let Some(columns) = methods.get(&method) else {
            if method == AggregationMethod::First && !implicit.is_empty() {
                for column in &implicit {
                    reductions.push((method, column.clone(), format!("{column}{CARRY_SUFFIX}")));
                }
            }
            continue;
        };
        if method == AggregationMethod::OneHotEncode {
            one_hot.extend(columns.iter().cloned());
            continue;
        }
        for column in columns {
            reductions.push((method, column.clone(), format!("{column}{}", method.suffix())));
        }
        if method == AggregationMethod::First {
            for column in &implicit {
                reductions.push((method, column.clone(), format!("{column}{CARRY_SUFFIX}")));
            }
        }
    }
    AggregationPlan { reductions, one_hot }
}

fn build_hourly_frame(
    wide: &DataFrame,
    groups: &BTreeMap<(String, i64), HourlyRow>,
    plan: &AggregationPlan,
) -> Result<DataFrame> {
    let mut hosp_out: Vec<Option<String>> = Vec::with_capacity(groups.len());
    let mut hour_out: Vec<Option<NaiveDateTime>> = Vec::with_capacity(groups.len());
    let mut nth_out: Vec<Option<i64>> = Vec::with_capacity(groups.len());
    let mut bucket_out: Vec<Option<i64>> = Vec::with_capacity(groups.len());

    let carry_patient = has_column(wide, "patient_id");
    let mut patient_builder = carry_patient.then(|| {
        wide.column("patient_id")
            .map(|c| ColumnData::for_dtype(c.dtype()))
            .unwrap_or_else(|_| ColumnData::text())
    });
    let mut day_builder = wide
        .column("day_number")
        .map(|c| ColumnData::for_dtype(c.dtype()))
        .unwrap_or_else(|_| ColumnData::int());

    let mut reduction_builders: Vec<ColumnData> = plan
        .reductions
        .iter()
        .map(|(method, column, _)| match method {
            AggregationMethod::Max
            | AggregationMethod::Min
            | AggregationMethod::Mean
            | AggregationMethod::Median => ColumnData::float(),
            AggregationMethod::Boolean => ColumnData::int(),
            AggregationMethod::First | AggregationMethod::Last => wide
                .column(column)
                .map(|c| ColumnData::for_dtype(c.dtype()))
                .unwrap_or_else(|_| ColumnData::text()),
            AggregationMethod::OneHotEncode => ColumnData::int(),
        })
        .collect();

    // One-hot column set closes over every distinct value in the input, so
    // all groups emit the same columns.
    let mut one_hot_values: Vec<(String, Vec<String>)> = Vec::new();
    for column in &plan.one_hot {
        let mut distinct = BTreeSet::new();
        let series = wide.column(column)?;
        for idx in 0..wide.height() {
            let value = any_to_string(series.get(idx).unwrap_or(AnyValue::Null));
            if !value.is_empty() {
                distinct.insert(crate::combo::sanitize_column_name(&value));
            }
        }
        one_hot_values.push((column.clone(), distinct.into_iter().collect()));
    }
    let mut one_hot_builders: Vec<Vec<Vec<Option<i64>>>> = one_hot_values
        .iter()
        .map(|(_, values)| values.iter().map(|_| Vec::new()).collect())
        .collect();

    for group in groups.values() {
        hosp_out.push(Some(group.hospitalization_id.clone()));
        hour_out.push(Some(group.hour));
        nth_out.push(Some(group.nth_hour));
        bucket_out.push(Some(i64::from(group.hour.hour())));

        if let Some(builder) = patient_builder.as_mut() {
            push_first(wide, "patient_id", &group.row_indexes, builder)?;
        }
        push_first(wide, "day_number", &group.row_indexes, &mut day_builder)?;

        for ((method, column, _), builder) in
            plan.reductions.iter().zip(reduction_builders.iter_mut())
        {
            apply_reduction(wide, *method, column, &group.row_indexes, builder)?;
        }

        for ((column, values), builders) in one_hot_values.iter().zip(one_hot_builders.iter_mut())
        {
            let series = wide.column(column)?;
            let mut present: BTreeSet<String> = BTreeSet::new();
            for &idx in &group.row_indexes {
                let value = any_to_string(series.get(idx).unwrap_or(AnyValue::Null));
                if !value.is_empty() {
                    present.insert(crate::combo::sanitize_column_name(&value));
                }
            }
            for (value, cells) in values.iter().zip(builders.iter_mut()) {
                cells.push(Some(i64::from(present.contains(value))));
            }
        }
    }

    let mut columns: Vec<Column> = Vec::new();
    columns.push(ColumnData::Text(hosp_out).finish("hospitalization_id"));
    columns.push(ColumnData::Timestamp(hour_out).finish("event_time_hour"));
    columns.push(ColumnData::Int(nth_out).finish("nth_hour"));
    columns.push(ColumnData::Int(bucket_out).finish("hour_bucket"));
    if let Some(builder) = patient_builder {
        columns.push(builder.finish("patient_id"));
    }
    columns.push(day_builder.finish("day_number"));
    for ((_, _, name), builder) in plan.reductions.iter().zip(reduction_builders) {
        columns.push(builder.finish(name));
    }
    for ((column, values), builders) in one_hot_values.iter().zip(one_hot_builders) {
        for (value, cells) in values.iter().zip(builders) {
            columns.push(ColumnData::Int(cells).finish(&format!("{column}_{value}")));
        }
    }

    Ok(DataFrame::new(columns)?)
}

fn push_first(
    wide: &DataFrame,
    column: &str,
    rows: &[usize],
    builder: &mut ColumnData,
) -> Result<()> {
    let series = wide.column(column)?;
    for &idx in rows {
        let value = series.get(idx).unwrap_or(AnyValue::Null);
        if !matches!(value, AnyValue::Null) {
            builder.push_any(value);
            return Ok(());
        }
    }
    builder.push_null();
    Ok(())
}

fn apply_reduction(
    wide: &DataFrame,
    method: AggregationMethod,
    column: &str,
    rows: &[usize],
    builder: &mut ColumnData,
) -> Result<()> {
    let series = wide.column(column)?;
    match method {
        AggregationMethod::Max | AggregationMethod::Min | AggregationMethod::Mean
        | AggregationMethod::Median => {
            let mut values: Vec<f64> = Vec::new();
            for &idx in rows {
                if let Some(v) = any_to_f64(series.get(idx).unwrap_or(AnyValue::Null)) {
                    values.push(v);
                }
            }
            let result = reduce_numeric(method, &mut values);
            match result {
                Some(v) => builder.push_any(AnyValue::Float64(v)),
                None => builder.push_null(),
            }
        }
        AggregationMethod::First => {
            push_first(wide, column, rows, builder)?;
        }
        AggregationMethod::Last => {
            let mut last: Option<usize> = None;
            for &idx in rows {
                if !matches!(series.get(idx).unwrap_or(AnyValue::Null), AnyValue::Null) {
                    last = Some(idx);
                }
            }
            match last {
                Some(idx) => builder.push_any(series.get(idx).unwrap_or(AnyValue::Null)),
                None => builder.push_null(),
            }
        }
        AggregationMethod::Boolean => {
            let any_value = rows
                .iter()
                .any(|&idx| !matches!(series.get(idx).unwrap_or(AnyValue::Null), AnyValue::Null));
            builder.push_any(AnyValue::Int64(i64::from(any_value)));
        }
        AggregationMethod::OneHotEncode => unreachable!("one-hot handled separately"),
    }
    Ok(())
}

fn reduce_numeric(method: AggregationMethod, values: &mut Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    match method {
        AggregationMethod::Max => values.iter().copied().reduce(f64::max),
        AggregationMethod::Min => values.iter().copied().reduce(f64::min),
        AggregationMethod::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        AggregationMethod::Median => {
            values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            let mid = values.len() / 2;
            if values.len() % 2 == 1 {
                Some(values[mid])
            } else {
                Some((values[mid - 1] + values[mid]) / 2.0)
            }
        }
        _ => None,
    }
}
