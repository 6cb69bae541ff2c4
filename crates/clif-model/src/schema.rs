use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic column type carried by a table descriptor.
///
/// These mirror the types used in the CLIF data dictionary; the loader maps
/// them onto concrete columnar dtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Varchar,
    Datetime,
    Double,
    Integer,
    Boolean,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Varchar => "VARCHAR",
            DataType::Datetime => "DATETIME",
            DataType::Double => "DOUBLE",
            DataType::Integer => "INTEGER",
            DataType::Boolean => "BOOLEAN",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "VARCHAR" => Ok(DataType::Varchar),
            "DATETIME" => Ok(DataType::Datetime),
            "DOUBLE" => Ok(DataType::Double),
            "INTEGER" => Ok(DataType::Integer),
            "BOOLEAN" => Ok(DataType::Boolean),
            _ => Err(format!("unknown data type: {s}")),
        }
    }
}

/// A single column in a table descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub required: bool,
    pub is_category_column: bool,
    pub is_group_column: bool,
    /// Closed value set for categorical columns.
    pub permissible_values: Option<Vec<String>>,
}

impl ColumnSpec {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            required: false,
            is_category_column: false,
            is_group_column: false,
            permissible_values: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn group(mut self) -> Self {
        self.is_group_column = true;
        self
    }

    pub fn category(mut self, values: &[&str]) -> Self {
        self.is_category_column = true;
        self.permissible_values = Some(values.iter().map(|v| v.to_string()).collect());
        self
    }
}

/// Descriptor for one CLIF table: column set, required/category/group
/// column lists, and (for vitals) the expected units and plausible numeric
/// ranges per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnSpec>,
    pub required_columns: Vec<String>,
    pub category_columns: Vec<String>,
    pub group_columns: Vec<String>,
    pub vital_units: Option<BTreeMap<String, String>>,
    pub vital_ranges: Option<BTreeMap<String, (f64, f64)>>,
}

impl TableSchema {
    pub fn new(table_name: &str, columns: Vec<ColumnSpec>) -> Self {
        let required_columns = columns
            .iter()
            .filter(|c| c.required)
            .map(|c| c.name.clone())
            .collect();
        let category_columns = columns
            .iter()
            .filter(|c| c.is_category_column)
            .map(|c| c.name.clone())
            .collect();
        let group_columns = columns
            .iter()
            .filter(|c| c.is_group_column)
            .map(|c| c.name.clone())
            .collect();
        Self {
            table_name: table_name.to_string(),
            columns,
            required_columns,
            category_columns,
            group_columns,
            vital_units: None,
            vital_ranges: None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Names of all columns typed as timestamps.
    pub fn datetime_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.data_type == DataType::Datetime)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Identity columns that joins depend on; re-added by the wide builder
    /// even when a caller projection omits them.
    pub fn identity_columns(&self) -> Vec<&str> {
        self.group_columns.iter().map(|c| c.as_str()).collect()
    }
}
