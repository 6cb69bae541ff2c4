//! Event-source descriptors for the wide-dataset builder.
//!
//! Each optional table contributes event timestamps; the pivotable ones
//! additionally name a category column and a value column. The descriptor
//! records timestamp fallbacks for sites whose extracts predate the current
//! data dictionary.

/// How a source participates in the wide dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSourceKind {
    /// Long-form category/value rows pivoted into one column per category.
    Pivot,
    /// Already-wide rows copied column-for-column at matching timestamps.
    Wide,
}

/// Descriptor for one event table.
#[derive(Debug, Clone)]
pub struct EventSource {
    pub table_name: &'static str,
    pub kind: EventSourceKind,
    pub timestamp_column: &'static str,
    /// Tried in order when the primary timestamp column is absent.
    pub timestamp_fallbacks: &'static [&'static str],
    pub category_column: Option<&'static str>,
    pub value_column: Option<&'static str>,
    /// Alternates for the value column, tried in order.
    pub value_fallbacks: &'static [&'static str],
    /// Auxiliary text columns pivoted alongside the numeric value, as
    /// `(source column, output suffix)` pairs.
    pub aux_value_columns: &'static [(&'static str, &'static str)],
}

impl EventSource {
    /// Resolve the timestamp column against an actual column list.
    pub fn resolve_timestamp<'a>(&self, columns: &'a [String]) -> Option<&'a str> {
        let has = |name: &str| {
            columns
                .iter()
                .find(|c| c.as_str() == name)
                .map(|c| c.as_str())
        };
        has(self.timestamp_column)
            .or_else(|| self.timestamp_fallbacks.iter().find_map(|alt| has(alt)))
    }

    /// Resolve the value column against an actual column list.
    pub fn resolve_value<'a>(&self, columns: &'a [String]) -> Option<&'a str> {
        let has = |name: &str| {
            columns
                .iter()
                .find(|c| c.as_str() == name)
                .map(|c| c.as_str())
        };
        self.value_column
            .and_then(has)
            .or_else(|| self.value_fallbacks.iter().find_map(|alt| has(alt)))
    }
}

const SOURCES: &[EventSource] = &[
    EventSource {
        table_name: "vitals",
        kind: EventSourceKind::Pivot,
        timestamp_column: "recorded_dttm",
        timestamp_fallbacks: &["recorded_dttm_min"],
        category_column: Some("vital_category"),
        value_column: Some("vital_value"),
        value_fallbacks: &[],
        aux_value_columns: &[],
    },
    EventSource {
        table_name: "labs",
        kind: EventSourceKind::Pivot,
        timestamp_column: "lab_result_dttm",
        timestamp_fallbacks: &["lab_collect_dttm", "recorded_dttm", "lab_order_dttm"],
        category_column: Some("lab_category"),
        value_column: Some("lab_value_numeric"),
        value_fallbacks: &[],
        aux_value_columns: &[],
    },
    EventSource {
        table_name: "medication_admin_continuous",
        kind: EventSourceKind::Pivot,
        timestamp_column: "admin_dttm",
        timestamp_fallbacks: &[],
        category_column: Some("med_category"),
        value_column: Some("med_dose"),
        value_fallbacks: &[],
        aux_value_columns: &[],
    },
    EventSource {
        table_name: "patient_assessments",
        kind: EventSourceKind::Pivot,
        timestamp_column: "recorded_dttm",
        timestamp_fallbacks: &[],
        category_column: Some("assessment_category"),
        value_column: Some("numerical_value"),
        value_fallbacks: &["assessment_value"],
        aux_value_columns: &[("categorical_value", "categorical")],
    },
    EventSource {
        table_name: "respiratory_support",
        kind: EventSourceKind::Wide,
        timestamp_column: "recorded_dttm",
        timestamp_fallbacks: &[],
        category_column: None,
        value_column: None,
        value_fallbacks: &[],
        aux_value_columns: &[],
    },
];

/// Descriptor lookup for the optional event tables.
pub fn event_source_for(table_name: &str) -> Option<&'static EventSource> {
    SOURCES.iter().find(|s| s.table_name == table_name)
}

/// Names of every optional event table, in canonical order.
pub fn optional_table_names() -> Vec<&'static str> {
    SOURCES.iter().map(|s| s.table_name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labs_fallback_order() {
        let source = event_source_for("labs").unwrap();
        let columns = vec![
            "hospitalization_id".to_string(),
            "lab_collect_dttm".to_string(),
            "lab_order_dttm".to_string(),
        ];
        assert_eq!(source.resolve_timestamp(&columns), Some("lab_collect_dttm"));
    }

    #[test]
    fn assessments_value_fallback() {
        let source = event_source_for("patient_assessments").unwrap();
        let columns = vec![
            "hospitalization_id".to_string(),
            "assessment_value".to_string(),
        ];
        assert_eq!(source.resolve_value(&columns), Some("assessment_value"));
    }

    #[test]
    fn respiratory_support_is_wide() {
        let source = event_source_for("respiratory_support").unwrap();
        assert_eq!(source.kind, EventSourceKind::Wide);
        assert!(source.category_column.is_none());
    }
}
