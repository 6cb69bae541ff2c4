//! Tagged column builder for data-dependent output schemas.
//!
//! The wide table's column set is discovered from the data, so output
//! columns accumulate cell by cell into one of five typed vectors and
//! only become a polars `Series` at the end. Cells arrive as the shared
//! [`CellValue`] union; each builder takes its kind's reading of the cell
//! and nulls what has none.

use polars::prelude::{AnyValue, Column, DataType as PlDataType, IntoColumn, NamedFrom, Series};

pub use clif_ingest::CellValue;
use clif_ingest::decode_cell;

/// Accumulates one output column of a fixed cell kind.
#[derive(Debug, Clone)]
pub enum ColumnData {
    Text(Vec<Option<String>>),
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    Bool(Vec<Option<bool>>),
    Timestamp(Vec<Option<chrono::NaiveDateTime>>),
}

impl ColumnData {
    pub fn text() -> Self {
        ColumnData::Text(Vec::new())
    }

    pub fn float() -> Self {
        ColumnData::Float(Vec::new())
    }

    pub fn int() -> Self {
        ColumnData::Int(Vec::new())
    }

    pub fn timestamp() -> Self {
        ColumnData::Timestamp(Vec::new())
    }

    /// Pick a builder matching a source column's dtype.
    pub fn for_dtype(dtype: &PlDataType) -> Self {
        match dtype {
            PlDataType::Boolean => ColumnData::Bool(Vec::new()),
            PlDataType::Float32 | PlDataType::Float64 => ColumnData::Float(Vec::new()),
            PlDataType::Int8
            | PlDataType::Int16
            | PlDataType::Int32
            | PlDataType::Int64
            | PlDataType::UInt8
            | PlDataType::UInt16
            | PlDataType::UInt32
            | PlDataType::UInt64 => ColumnData::Int(Vec::new()),
            PlDataType::Date | PlDataType::Datetime(_, _) => ColumnData::Timestamp(Vec::new()),
            _ => ColumnData::Text(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Text(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Int(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_null(&mut self) {
        match self {
            ColumnData::Text(v) => v.push(None),
            ColumnData::Float(v) => v.push(None),
            ColumnData::Int(v) => v.push(None),
            ColumnData::Bool(v) => v.push(None),
            ColumnData::Timestamp(v) => v.push(None),
        }
    }

    /// Push this builder's reading of a cell; kinds without one null out.
    pub fn push_cell(&mut self, cell: &CellValue) {
        match self {
            ColumnData::Text(v) => {
                let text = cell.render();
                v.push(if text.is_empty() { None } else { Some(text) });
            }
            ColumnData::Float(v) => v.push(cell.as_f64()),
            ColumnData::Int(v) => v.push(cell.as_i64()),
            ColumnData::Bool(v) => v.push(cell.as_bool()),
            ColumnData::Timestamp(v) => v.push(cell.as_timestamp()),
        }
    }

    /// Decode a raw polars cell and push it.
    pub fn push_any(&mut self, value: AnyValue<'_>) {
        self.push_cell(&decode_cell(value));
    }

    /// Pad with nulls up to `len`.
    pub fn pad_to(&mut self, len: usize) {
        while self.len() < len {
            self.push_null();
        }
    }

    pub fn finish(self, name: &str) -> Column {
        match self {
            ColumnData::Text(v) => Series::new(name.into(), v).into_column(),
            ColumnData::Float(v) => Series::new(name.into(), v).into_column(),
            ColumnData::Int(v) => Series::new(name.into(), v).into_column(),
            ColumnData::Bool(v) => Series::new(name.into(), v).into_column(),
            ColumnData::Timestamp(v) => Series::new(name.into(), v).into_column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clif_ingest::any_to_f64;

    #[test]
    fn builder_matches_dtype() {
        assert!(matches!(
            ColumnData::for_dtype(&PlDataType::Float64),
            ColumnData::Float(_)
        ));
        assert!(matches!(
            ColumnData::for_dtype(&PlDataType::String),
            ColumnData::Text(_)
        ));
        assert!(matches!(
            ColumnData::for_dtype(&PlDataType::Boolean),
            ColumnData::Bool(_)
        ));
    }

    #[test]
    fn push_any_coerces_numbers() {
        let mut builder = ColumnData::float();
        builder.push_any(AnyValue::Int64(3));
        builder.push_any(AnyValue::Null);
        builder.push_any(AnyValue::Float64(2.5));
        let column = builder.finish("x");
        assert_eq!(column.len(), 3);
        assert_eq!(any_to_f64(column.get(0).unwrap()), Some(3.0));
        assert_eq!(any_to_f64(column.get(1).unwrap()), None);
    }

    #[test]
    fn push_cell_takes_the_builders_reading() {
        let mut builder = ColumnData::text();
        builder.push_cell(&decode_cell(AnyValue::String("icu")));
        builder.push_cell(&CellValue::Float(2.5));
        builder.push_cell(&CellValue::Null);
        assert_eq!(builder.len(), 3);
        let column = builder.finish("location");
        assert_eq!(
            clif_ingest::any_to_string(column.get(1).unwrap()),
            "2.5"
        );
        assert!(matches!(column.get(2).unwrap(), AnyValue::Null));
    }
}
