//! Advisory validation reports attached to loaded tables.
//!
//! Validation never blocks a build: the loader runs the checks and the
//! report rides along with the frame for callers to inspect or persist.

use serde::{Deserialize, Serialize};

/// Severity of a validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// The kind of check that produced an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    MissingColumn,
    DuplicateId,
    InvalidCategory,
    OutOfRange,
    BadTimestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub check: CheckKind,
    /// Column the issue refers to, when applicable.
    pub column: Option<String>,
    pub message: String,
    pub severity: Severity,
    /// Number of offending rows or values.
    pub count: Option<u64>,
}

impl ValidationIssue {
    pub fn error(check: CheckKind, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            check,
            column: column.map(|c| c.to_string()),
            message: message.into(),
            severity: Severity::Error,
            count: None,
        }
    }

    pub fn warning(check: CheckKind, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            check,
            column: column.map(|c| c.to_string()),
            message: message.into(),
            severity: Severity::Warning,
            count: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}

/// Validation findings for one loaded table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(rename = "table")]
    pub table_name: String,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// Issues produced by the vitals range check.
    pub fn range_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.check == CheckKind::OutOfRange)
    }
}
