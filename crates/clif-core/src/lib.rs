//! Core dataset builders for CLIF event tables.
//!
//! The two derived artifacts — the wide event table and its hourly
//! aggregation — plus the vasopressor unit-conversion step that rewrites
//! infusion doses before aggregation.

pub mod column;
pub mod combo;
pub mod frame;
pub mod hourly;
pub mod units;
pub mod wide;

pub use column::{CellValue, ColumnData};
pub use combo::{combo_id, hosp_day_key, sanitize_column_name, truncate_to_hour, truncate_to_minute};
pub use hourly::{AggregationConfig, AggregationMethod, convert_hourly};
pub use units::{DoseUnit, MassUnit, TimeBase, VASOACTIVE_CATEGORIES, convert_vaso_units};
pub use wide::{
    BaseTables, CohortSelector, OutputTarget, WideOptions, build_wide, write_artifact,
};
