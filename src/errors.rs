//! Error types for the tabular data pipeline
//!
//! Fatal conditions are modelled as `TabularError` variants; recoverable
//! conditions are accumulated as `Warning` records so callers can inspect
//! them deterministically instead of scraping a log stream.

use thiserror::Error;

/// Errors that can occur while building an annotated table group
#[derive(Error, Debug)]
pub enum TabularError {
    /// Malformed quoting while tokenizing. Always fatal.
    #[error("tokenize error at source row {row}: {message}")]
    Tokenize { row: usize, message: String },

    /// Structural metadata violation (missing required property, unresolvable
    /// column reference, invalid foreign-key shape). Always fatal.
    #[error("schema error: {0}")]
    Schema(String),

    /// Embedded and supplied table descriptions disagree on URL or shape.
    #[error("incompatible metadata: {0}")]
    IncompatibleMetadata(String),

    /// A raw cell string failed its datatype's parse/format/constraint rules.
    /// Fatal only under strict mode.
    #[error("cell conversion error in column '{column}' row {row}: {message}")]
    CellConversion {
        column: String,
        row: usize,
        message: String,
    },

    /// Duplicate primary key, or a foreign key matching zero or multiple rows.
    /// Fatal only under strict mode.
    #[error("referential integrity error: {0}")]
    ReferentialIntegrity(String),

    /// A referenced dialect/schema document could not be dereferenced.
    #[error("fetch error: {0}")]
    Fetch(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TabularError>;

/// A recoverable diagnostic raised during normalization or annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    /// Dotted path of the offending property (e.g. `tables.0.tableSchema.columns.2.name`)
    pub path: String,
    /// Human-readable description
    pub message: String,
}

impl Warning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
