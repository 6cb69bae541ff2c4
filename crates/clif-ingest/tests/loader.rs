//! Loader round-trips through real files on disk.

use std::fs;

use polars::prelude::AnyValue;

use clif_ingest::{LoadOptions, TableFormat, any_to_datetime, any_to_f64, any_to_string, load_table};

fn write_vitals_csv(dir: &std::path::Path) {
    let csv = "\
hospitalization_id,recorded_dttm,vital_category,vital_value
H1,2024-01-01 10:00:00,heart_rate,80
H1,2024-01-01 10:30:00,heart_rate,82
H2,2024-01-01 09:15:00,spo2,97
H2,2024-01-01 09:15:00,sbp,
";
    fs::write(dir.join("clif_vitals.csv"), csv).unwrap();
}

#[test]
fn loads_typed_csv() {
    let dir = tempfile::tempdir().unwrap();
    write_vitals_csv(dir.path());

    let options = LoadOptions::new("vitals", dir.path(), TableFormat::Csv);
    let loaded = load_table(&options).unwrap();
    assert_eq!(loaded.record_count(), 4);

    let values = loaded.data.column("vital_value").unwrap();
    assert_eq!(any_to_f64(values.get(0).unwrap()), Some(80.0));
    assert_eq!(any_to_f64(values.get(3).unwrap()), None);

    let recorded = loaded.data.column("recorded_dttm").unwrap();
    let first = any_to_datetime(recorded.get(0).unwrap()).unwrap();
    assert_eq!(first.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 10:00");

    assert!(!loaded.report.has_errors());
}

#[test]
fn filters_and_sampling_apply_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_vitals_csv(dir.path());

    let mut options = LoadOptions::new("vitals", dir.path(), TableFormat::Csv)
        .with_filter("hospitalization_id", vec!["H1".to_string()]);
    options.sample_size = Some(1);
    let loaded = load_table(&options).unwrap();
    assert_eq!(loaded.record_count(), 1);
    let ids = loaded.data.column("hospitalization_id").unwrap();
    assert_eq!(any_to_string(ids.get(0).unwrap()), "H1");
}

#[test]
fn projection_keeps_identity_columns() {
    let dir = tempfile::tempdir().unwrap();
    write_vitals_csv(dir.path());

    let options = LoadOptions::new("vitals", dir.path(), TableFormat::Csv)
        .with_columns(vec!["vital_value".to_string(), "no_such_column".to_string()]);
    let loaded = load_table(&options).unwrap();
    let names: Vec<String> = loaded
        .data
        .get_column_names_owned()
        .into_iter()
        .map(|n| n.to_string())
        .collect();
    assert_eq!(names, vec!["hospitalization_id", "vital_value"]);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let options = LoadOptions::new("labs", dir.path(), TableFormat::Csv);
    assert!(load_table(&options).is_err());
}

#[test]
fn offset_timestamps_convert_to_site_zone() {
    let dir = tempfile::tempdir().unwrap();
    let csv = "\
hospitalization_id,recorded_dttm,vital_category,vital_value
H1,2024-01-01T15:30:00+00:00,heart_rate,80
";
    fs::write(dir.path().join("clif_vitals.csv"), csv).unwrap();

    let options = LoadOptions::new("vitals", dir.path(), TableFormat::Csv)
        .with_site_tz(chrono_tz::America::Chicago);
    let loaded = load_table(&options).unwrap();
    let recorded = loaded.data.column("recorded_dttm").unwrap();
    let first = any_to_datetime(recorded.get(0).unwrap_or(AnyValue::Null)).unwrap();
    assert_eq!(first.format("%H:%M").to_string(), "09:30");
}
