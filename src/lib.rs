//! Tabular data on the web - parsing, metadata and annotation
//!
//! Provides the pieces needed to turn delimited text plus a metadata
//! document into an annotated table group:
//! - Dialect-driven tokenizing (quoting, escaping, comments, trim)
//! - Metadata document normalization (property families, inheritance,
//!   JSON-LD-compatible common properties)
//! - Datatype descriptors with formats and value constraints
//! - The structural resolver: cell parsing, URI template expansion,
//!   primary- and foreign-key integrity

pub mod datatypes;
pub mod dialect;
pub mod errors;
pub mod fetch;
pub mod metadata;
pub mod model;
pub mod properties;
pub mod resolver;
pub mod tokenizer;
pub mod uri_template;

// Re-export commonly used types
pub use datatypes::{BaseType, Datatype, ParsedValue};
pub use dialect::{Dialect, TrimMode};
pub use errors::{Result, TabularError, Warning};
pub use fetch::{DocumentFetcher, MapFetcher, NoFetch};
pub use metadata::normalize_document;
pub use model::{
    Cell, CellErrorReport, CellValue, Column, ColumnIdx, ForeignKey, Row, RowIdx, Table,
    TableGroup, TableIdx, TypedValue,
};
pub use resolver::{ResolveOutcome, Resolver, TableSource};
pub use tokenizer::{Record, Tokenizer};
