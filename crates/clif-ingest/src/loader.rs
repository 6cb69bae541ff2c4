//! Table loading from a CLIF data directory.
//!
//! Each table lives in a single `clif_{table}.{parquet|csv}` file. Parquet
//! goes through the polars reader; CSV is read row-wise and built into a
//! typed frame against the registry schema. After projection, filtering and
//! sampling, timestamp columns are normalized to the site timezone and the
//! schema validator attaches an advisory report.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use chrono_tz::Tz;
use csv::ReaderBuilder;
use polars::prelude::{
    BooleanChunked, Column, DataFrame, IntoColumn, NamedFrom, NewChunkedArray, ParquetReader,
    SerReader, Series,
};
use tracing::{debug, warn};

use clif_model::{ClifError, DataType, TableSchema, ValidationReport, schema_for};

use crate::polars_utils::{any_to_string, parse_f64, parse_i64};
use crate::timezone::{convert_to_site_tz, parse_timestamp};
use crate::validate::validate_table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Parquet,
    Csv,
}

impl TableFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            TableFormat::Parquet => "parquet",
            TableFormat::Csv => "csv",
        }
    }
}

impl FromStr for TableFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "parquet" => Ok(TableFormat::Parquet),
            "csv" => Ok(TableFormat::Csv),
            _ => Err(format!("unsupported table format: {s}")),
        }
    }
}

/// Options for loading one table.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub table_name: String,
    pub table_path: PathBuf,
    pub format: TableFormat,
    /// Row cap applied after filtering.
    pub sample_size: Option<usize>,
    /// Column projection; identity columns are always re-added.
    pub columns: Option<Vec<String>>,
    /// Equality/set filters, column name to accepted values.
    pub filters: BTreeMap<String, Vec<String>>,
    /// IANA zone the site's wall clocks run in.
    pub site_tz: Option<Tz>,
}

impl LoadOptions {
    pub fn new(table_name: &str, table_path: &Path, format: TableFormat) -> Self {
        Self {
            table_name: table_name.to_string(),
            table_path: table_path.to_path_buf(),
            format,
            sample_size: None,
            columns: None,
            filters: BTreeMap::new(),
            site_tz: None,
        }
    }

    pub fn with_site_tz(mut self, tz: Tz) -> Self {
        self.site_tz = Some(tz);
        self
    }

    pub fn with_filter(mut self, column: &str, values: Vec<String>) -> Self {
        self.filters.insert(column.to_string(), values);
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn file_path(&self) -> PathBuf {
        self.table_path
            .join(format!("clif_{}.{}", self.table_name, self.format.extension()))
    }
}

/// A loaded table: the frame plus its advisory validation report.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table_name: String,
    pub data: DataFrame,
    pub report: ValidationReport,
}

impl LoadedTable {
    pub fn record_count(&self) -> usize {
        self.data.height()
    }
}

/// Load one table per the options.
pub fn load_table(options: &LoadOptions) -> Result<LoadedTable> {
    let path = options.file_path();
    if !path.exists() {
        return Err(ClifError::MissingTable(format!(
            "{} ({})",
            options.table_name,
            path.display()
        ))
        .into());
    }
    let schema = schema_for(&options.table_name);

    let (mut df, mut utc_columns) = match options.format {
        TableFormat::Parquet => {
            let file = File::open(&path)
                .with_context(|| format!("open parquet: {}", path.display()))?;
            let df = ParquetReader::new(file)
                .finish()
                .with_context(|| format!("read parquet: {}", path.display()))?;
            (df, BTreeSet::new())
        }
        TableFormat::Csv => read_csv_frame(&path, schema)
            .with_context(|| format!("read csv: {}", path.display()))?,
    };
    debug!(
        table = options.table_name.as_str(),
        rows = df.height(),
        "loaded {}",
        path.display()
    );

    if let Some(requested) = &options.columns {
        df = project_columns(&df, requested, schema, &options.table_name)?;
        utc_columns.retain(|name| df.column(name).is_ok());
    }

    if !options.filters.is_empty() {
        df = apply_filters(&df, &options.filters, &options.table_name)?;
    }

    if let Some(limit) = options.sample_size {
        df = df.head(Some(limit));
    }

    let dttm_columns = dttm_column_names(&df, schema);
    convert_to_site_tz(&mut df, &dttm_columns, &utc_columns, options.site_tz)?;

    let report = match schema {
        Some(schema) => validate_table(schema, &df),
        None => {
            warn!(table = options.table_name.as_str(), "no registered schema; skipping validation");
            ValidationReport::new(&options.table_name)
        }
    };

    Ok(LoadedTable {
        table_name: options.table_name.clone(),
        data: df,
        report,
    })
}

/// Timestamp columns of a frame: anything the schema types as DATETIME plus
/// any column whose name contains `dttm`.
fn dttm_column_names(df: &DataFrame, schema: Option<&TableSchema>) -> Vec<String> {
    let mut names = Vec::new();
    for name in df.get_column_names_owned() {
        let name = name.to_string();
        let typed = schema
            .and_then(|s| s.column(&name))
            .map(|c| c.data_type == DataType::Datetime)
            .unwrap_or(false);
        if typed || name.contains("dttm") {
            names.push(name);
        }
    }
    names
}

fn project_columns(
    df: &DataFrame,
    requested: &[String],
    schema: Option<&TableSchema>,
    table_name: &str,
) -> Result<DataFrame> {
    let mut keep: Vec<String> = Vec::new();
    if let Some(schema) = schema {
        for identity in schema.identity_columns() {
            if df.column(identity).is_ok() {
                keep.push(identity.to_string());
            }
        }
    }
    for name in requested {
        if keep.iter().any(|k| k == name) {
            continue;
        }
        if df.column(name).is_ok() {
            keep.push(name.clone());
        } else {
            warn!(
                table = table_name,
                column = name.as_str(),
                "projection names a column that does not exist; dropping"
            );
        }
    }
    let columns: Vec<Column> = keep
        .iter()
        .map(|name| df.column(name).cloned())
        .collect::<std::result::Result<_, _>>()?;
    Ok(DataFrame::new(columns)?)
}

fn apply_filters(
    df: &DataFrame,
    filters: &BTreeMap<String, Vec<String>>,
    table_name: &str,
) -> Result<DataFrame> {
    let mut keep = vec![true; df.height()];
    for (column_name, values) in filters {
        let Ok(column) = df.column(column_name) else {
            warn!(
                table = table_name,
                column = column_name.as_str(),
                "filter names a column that does not exist; ignoring"
            );
            continue;
        };
        let accepted: BTreeSet<&str> = values.iter().map(String::as_str).collect();
        for (idx, flag) in keep.iter_mut().enumerate() {
            if !*flag {
                continue;
            }
            let value = any_to_string(column.get(idx).unwrap_or(polars::prelude::AnyValue::Null));
            if !accepted.contains(value.as_str()) {
                *flag = false;
            }
        }
    }
    let mask = BooleanChunked::from_slice("mask".into(), &keep);
    Ok(df.filter(&mask)?)
}

/// Read a CSV file into a typed frame per the registry schema.
///
/// Returns the frame and the set of timestamp columns whose text carried
/// UTC offsets (they hold UTC wall clock and still need zone conversion).
fn read_csv_frame(
    path: &Path,
    schema: Option<&TableSchema>,
) -> Result<(DataFrame, BTreeSet<String>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("open csv: {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("read csv headers")?
        .iter()
        .map(|h| h.trim().trim_matches('\u{feff}').to_string())
        .collect();

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("read record: {}", path.display()))?;
        let row: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
        if row.iter().all(|value| value.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    let mut columns: Vec<Column> = Vec::with_capacity(headers.len());
    let mut utc_columns = BTreeSet::new();
    for (idx, name) in headers.iter().enumerate() {
        let data_type = schema
            .and_then(|s| s.column(name))
            .map(|c| c.data_type)
            .unwrap_or(DataType::Varchar);
        fn cell(row: &Vec<String>, idx: usize) -> &str {
            row.get(idx).map(String::as_str).unwrap_or("")
        }
        let column = match data_type {
            DataType::Double => {
                let values: Vec<Option<f64>> = rows.iter().map(|r| parse_f64(cell(r, idx))).collect();
                Series::new(name.as_str().into(), values).into_column()
            }
            DataType::Integer => {
                let values: Vec<Option<i64>> = rows.iter().map(|r| parse_i64(cell(r, idx))).collect();
                Series::new(name.as_str().into(), values).into_column()
            }
            DataType::Boolean => {
                let values: Vec<Option<bool>> =
                    rows.iter().map(|r| parse_bool(cell(r, idx))).collect();
                Series::new(name.as_str().into(), values).into_column()
            }
            DataType::Datetime => {
                let mut zone_aware = false;
                let values: Vec<Option<NaiveDateTime>> = rows
                    .iter()
                    .map(|r| {
                        parse_timestamp(cell(r, idx)).map(|parsed| {
                            zone_aware |= parsed.zone_aware;
                            parsed.naive
                        })
                    })
                    .collect();
                if zone_aware {
                    utc_columns.insert(name.clone());
                }
                Series::new(name.as_str().into(), values).into_column()
            }
            DataType::Varchar => {
                let values: Vec<Option<String>> = rows
                    .iter()
                    .map(|r| {
                        let value = cell(r, idx);
                        if value.is_empty() {
                            None
                        } else {
                            Some(value.to_string())
                        }
                    })
                    .collect();
                Series::new(name.as_str().into(), values).into_column()
            }
        };
        columns.push(column);
    }
    Ok((DataFrame::new(columns)?, utc_columns))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "" => None,
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}
