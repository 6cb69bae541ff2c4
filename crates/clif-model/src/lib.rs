//! Data model for CLIF clinical event tables.
//!
//! This crate provides the table descriptors, event-source descriptors,
//! validation-report types, and error types shared by the loader and the
//! dataset builders.
//!
//! # Modules
//!
//! - [`schema`] - column and table descriptor types
//! - [`registry`] - static descriptors for every CLIF table
//! - [`sources`] - event-source descriptors for the wide builder
//! - [`validation`] - advisory validation reports
//! - [`error`] - error types

pub mod error;
pub mod registry;
pub mod schema;
pub mod sources;
pub mod validation;

pub use error::{ClifError, Result};
pub use registry::{known_tables, schema_for};
pub use schema::{ColumnSpec, DataType, TableSchema};
pub use sources::{EventSource, EventSourceKind, event_source_for, optional_table_names};
pub use validation::{CheckKind, Severity, ValidationIssue, ValidationReport};
