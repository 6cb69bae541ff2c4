use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClifError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("required table not loaded: {0}")]
    MissingTable(String),
    #[error("table {table} is missing required column {column}")]
    MissingColumn { table: String, column: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ClifError>;
