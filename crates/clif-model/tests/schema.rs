use clif_model::{
    CheckKind, DataType, Severity, ValidationIssue, ValidationReport, schema_for,
};

#[test]
fn data_type_parses_dictionary_spellings() {
    assert_eq!("VARCHAR".parse::<DataType>().unwrap(), DataType::Varchar);
    assert_eq!("datetime".parse::<DataType>().unwrap(), DataType::Datetime);
    assert_eq!(" Double ".parse::<DataType>().unwrap(), DataType::Double);
    assert!("TIMESTAMP".parse::<DataType>().is_err());
}

#[test]
fn required_columns_match_flags() {
    let schema = schema_for("labs").unwrap();
    assert!(schema.required_columns.contains(&"lab_category".to_string()));
    assert!(schema.required_columns.contains(&"lab_value_numeric".to_string()));
    assert!(!schema.required_columns.contains(&"lab_name".to_string()));
}

#[test]
fn category_columns_carry_permissible_values() {
    let schema = schema_for("adt").unwrap();
    let spec = schema.column("location_category").unwrap();
    assert!(spec.is_category_column);
    let values = spec.permissible_values.as_ref().unwrap();
    assert!(values.iter().any(|v| v == "icu"));
    assert!(values.iter().any(|v| v == "ward"));
}

#[test]
fn report_counts_by_severity() {
    let mut report = ValidationReport::new("vitals");
    report.push(ValidationIssue::error(
        CheckKind::MissingColumn,
        Some("vital_value"),
        "missing required column",
    ));
    report.push(
        ValidationIssue::warning(CheckKind::OutOfRange, Some("vital_value"), "3 values above range")
            .with_count(3),
    );
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.warning_count(), 1);
    assert!(report.has_errors());
    assert_eq!(report.range_issues().count(), 1);
    assert_eq!(report.issues[1].severity, Severity::Warning);
}

#[test]
fn report_serializes_round_trip() {
    let mut report = ValidationReport::new("adt");
    report.push(ValidationIssue::error(
        CheckKind::InvalidCategory,
        Some("location_category"),
        "unexpected value 'icu2'",
    ));
    let json = serde_json::to_string(&report).unwrap();
    let back: ValidationReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back.table_name, "adt");
    assert_eq!(back.issues.len(), 1);
    assert_eq!(back.issues[0].check, CheckKind::InvalidCategory);
}
