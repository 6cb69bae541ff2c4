//! Column accessors over polars frames, shared by the builders.
//!
//! Every accessor is a typed view over one [`read_cells`] pass, so frame
//! scans decode each cell exactly once and all readings stay consistent
//! with the [`CellValue`] union.

use anyhow::Result;
use chrono::NaiveDateTime;
use polars::prelude::{AnyValue, BooleanChunked, DataFrame, NewChunkedArray};

use clif_ingest::{CellValue, decode_cell};

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.column(name).is_ok()
}

/// All column names as owned strings.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names_owned()
        .into_iter()
        .map(|name| name.to_string())
        .collect()
}

/// One pass over a column, decoding every cell into the tagged union.
pub fn read_cells(df: &DataFrame, name: &str) -> Result<Vec<CellValue>> {
    let column = df.column(name)?;
    let mut cells = Vec::with_capacity(df.height());
    for idx in 0..df.height() {
        cells.push(decode_cell(column.get(idx).unwrap_or(AnyValue::Null)));
    }
    Ok(cells)
}

/// Rendered and trimmed; nulls read as empty strings.
pub fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(read_cells(df, name)?
        .iter()
        .map(|cell| cell.render().trim().to_string())
        .collect())
}

/// Trimmed text with nulls and blanks as `None`.
pub fn opt_string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    Ok(read_cells(df, name)?
        .iter()
        .map(|cell| {
            let text = cell.render();
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
        .collect())
}

pub fn numeric_column_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(read_cells(df, name)?.iter().map(CellValue::as_f64).collect())
}

pub fn datetime_column(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDateTime>>> {
    Ok(read_cells(df, name)?
        .iter()
        .map(CellValue::as_timestamp)
        .collect())
}

/// Keep only the rows whose index passes the predicate.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("mask".into(), keep);
    Ok(df.filter(&mask)?)
}
