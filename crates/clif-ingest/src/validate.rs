//! Advisory schema validation for loaded tables.
//!
//! Checks mirror the CLIF data-dictionary contract: required columns,
//! identifier uniqueness on the registration tables, categorical values
//! against the permissible sets, vitals against per-category numeric
//! ranges, and timestamp parseability. Findings never abort a load.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::{AnyValue, DataFrame};

use clif_model::{CheckKind, DataType, TableSchema, ValidationIssue, ValidationReport};

use crate::polars_utils::{any_to_f64, any_to_string};
use crate::timezone::parse_timestamp;

const SAMPLE_VALUES: usize = 5;

pub fn validate_table(schema: &TableSchema, df: &DataFrame) -> ValidationReport {
    let mut report = ValidationReport::new(&schema.table_name);
    check_required_columns(schema, df, &mut report);
    check_duplicate_ids(schema, df, &mut report);
    check_categories(schema, df, &mut report);
    check_vital_ranges(schema, df, &mut report);
    check_timestamps(schema, df, &mut report);
    report
}

fn check_required_columns(schema: &TableSchema, df: &DataFrame, report: &mut ValidationReport) {
    for name in &schema.required_columns {
        if df.column(name).is_err() {
            report.push(ValidationIssue::error(
                CheckKind::MissingColumn,
                Some(name),
                format!("required column {name} is missing"),
            ));
        }
    }
}

/// Identifier uniqueness applies to the registration tables only; event
/// tables repeat their hospitalization ids by design.
fn check_duplicate_ids(schema: &TableSchema, df: &DataFrame, report: &mut ValidationReport) {
    let id_column = match schema.table_name.as_str() {
        "patient" => "patient_id",
        "hospitalization" => "hospitalization_id",
        _ => return,
    };
    let Ok(column) = df.column(id_column) else {
        return;
    };
    let mut seen = BTreeSet::new();
    let mut duplicates = 0u64;
    for idx in 0..df.height() {
        let value = any_to_string(column.get(idx).unwrap_or(AnyValue::Null));
        if value.is_empty() {
            continue;
        }
        if !seen.insert(value) {
            duplicates += 1;
        }
    }
    if duplicates > 0 {
        report.push(
            ValidationIssue::error(
                CheckKind::DuplicateId,
                Some(id_column),
                format!("{duplicates} duplicate {id_column} values"),
            )
            .with_count(duplicates),
        );
    }
}

fn check_categories(schema: &TableSchema, df: &DataFrame, report: &mut ValidationReport) {
    for column_spec in &schema.columns {
        let Some(permissible) = &column_spec.permissible_values else {
            continue;
        };
        let Ok(column) = df.column(&column_spec.name) else {
            continue;
        };
        let allowed: BTreeSet<&str> = permissible.iter().map(String::as_str).collect();
        let mut invalid: BTreeMap<String, u64> = BTreeMap::new();
        for idx in 0..df.height() {
            let value = any_to_string(column.get(idx).unwrap_or(AnyValue::Null));
            if value.is_empty() || allowed.contains(value.as_str()) {
                continue;
            }
            *invalid.entry(value).or_insert(0) += 1;
        }
        if invalid.is_empty() {
            continue;
        }
        let total: u64 = invalid.values().sum();
        let sample: Vec<&str> = invalid.keys().take(SAMPLE_VALUES).map(String::as_str).collect();
        report.push(
            ValidationIssue::error(
                CheckKind::InvalidCategory,
                Some(&column_spec.name),
                format!(
                    "{} value(s) outside the permissible set for {}: {}",
                    total,
                    column_spec.name,
                    sample.join(", ")
                ),
            )
            .with_count(total),
        );
    }
}

fn check_vital_ranges(schema: &TableSchema, df: &DataFrame, report: &mut ValidationReport) {
    let Some(ranges) = &schema.vital_ranges else {
        return;
    };
    let (Ok(categories), Ok(values)) = (df.column("vital_category"), df.column("vital_value"))
    else {
        return;
    };
    let mut out_of_range: BTreeMap<String, u64> = BTreeMap::new();
    for idx in 0..df.height() {
        let category = any_to_string(categories.get(idx).unwrap_or(AnyValue::Null));
        let Some((lo, hi)) = ranges.get(&category) else {
            continue;
        };
        let Some(value) = any_to_f64(values.get(idx).unwrap_or(AnyValue::Null)) else {
            continue;
        };
        if value < *lo || value > *hi {
            *out_of_range.entry(category).or_insert(0) += 1;
        }
    }
    for (category, count) in out_of_range {
        let (lo, hi) = ranges[&category];
        report.push(
            ValidationIssue::warning(
                CheckKind::OutOfRange,
                Some("vital_value"),
                format!("{count} {category} value(s) outside [{lo}, {hi}]"),
            )
            .with_count(count),
        );
    }
}

/// Timestamp columns that failed to parse during load surface here as
/// string columns with unparseable cells.
fn check_timestamps(schema: &TableSchema, df: &DataFrame, report: &mut ValidationReport) {
    for column_spec in &schema.columns {
        if column_spec.data_type != DataType::Datetime {
            continue;
        }
        let Ok(column) = df.column(&column_spec.name) else {
            continue;
        };
        if !matches!(column.dtype(), polars::prelude::DataType::String) {
            continue;
        }
        let mut bad = 0u64;
        for idx in 0..df.height() {
            let value = any_to_string(column.get(idx).unwrap_or(AnyValue::Null));
            if !value.is_empty() && parse_timestamp(&value).is_none() {
                bad += 1;
            }
        }
        if bad > 0 {
            report.push(
                ValidationIssue::warning(
                    CheckKind::BadTimestamp,
                    Some(&column_spec.name),
                    format!("{bad} unparseable timestamp value(s) in {}", column_spec.name),
                )
                .with_count(bad),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clif_model::schema_for;
    use polars::prelude::{Column, IntoColumn, NamedFrom, Series};

    fn string_col(name: &str, values: Vec<&str>) -> Column {
        Series::new(
            name.into(),
            values.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        )
        .into_column()
    }

    fn f64_col(name: &str, values: Vec<Option<f64>>) -> Column {
        Series::new(name.into(), values).into_column()
    }

    #[test]
    fn flags_missing_required_columns() {
        let schema = schema_for("vitals").unwrap();
        let df = DataFrame::new(vec![string_col("hospitalization_id", vec!["H1"])]).unwrap();
        let report = validate_table(schema, &df);
        assert!(report.has_errors());
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.check == CheckKind::MissingColumn
                    && i.column.as_deref() == Some("vital_category"))
        );
    }

    #[test]
    fn flags_duplicate_hospitalization_ids() {
        let schema = schema_for("hospitalization").unwrap();
        let df = DataFrame::new(vec![
            string_col("hospitalization_id", vec!["H1", "H1", "H2"]),
            string_col("patient_id", vec!["P1", "P1", "P2"]),
        ])
        .unwrap();
        let report = validate_table(schema, &df);
        let issue = report
            .issues
            .iter()
            .find(|i| i.check == CheckKind::DuplicateId)
            .unwrap();
        assert_eq!(issue.count, Some(1));
    }

    #[test]
    fn flags_invalid_categories_and_ranges() {
        let schema = schema_for("vitals").unwrap();
        let df = DataFrame::new(vec![
            string_col("hospitalization_id", vec!["H1", "H1", "H1"]),
            string_col("vital_category", vec!["heart_rate", "pulse", "spo2"]),
            f64_col("vital_value", vec![Some(80.0), Some(70.0), Some(150.0)]),
        ])
        .unwrap();
        let report = validate_table(schema, &df);
        assert!(
            report
                .issues
                .iter()
                .any(|i| i.check == CheckKind::InvalidCategory && i.count == Some(1))
        );
        // spo2 of 150 exceeds the [0, 100] range
        assert!(
            report
                .range_issues()
                .any(|i| i.message.contains("spo2") && i.count == Some(1))
        );
    }
}
