//! Table loading and validation for CLIF data directories.

pub mod loader;
pub mod polars_utils;
pub mod timezone;
pub mod validate;

pub use loader::{LoadOptions, LoadedTable, TableFormat, load_table};
pub use polars_utils::{
    CellValue, any_to_datetime, any_to_f64, any_to_i64, any_to_string, decode_cell,
    format_numeric, parse_f64, parse_i64,
};
pub use timezone::{ParsedTimestamp, convert_to_site_tz, parse_timestamp};
pub use validate::validate_table;
