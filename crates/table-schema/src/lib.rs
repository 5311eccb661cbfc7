//! Table definitions for binlog interpretation.
//!
//! This crate holds the schema model that row images are decoded against:
//!
//! - `ColumnDefinition`, `KeyDefinition`, `TableDefinition` - the per-table model
//! - `SchemaRegistry` - thread-safe registry of the definitions in force at the
//!   current binlog position
//! - `ddl` - replays parsed DDL statements against the registry
//! - `snapshot` - JSON dump/load of table definitions
//! - `introspect` - loads definitions from `information_schema`

pub mod ddl;
pub mod definition;
pub mod introspect;
pub mod registry;
pub mod snapshot;
pub mod types;

pub use ddl::{apply_statement, DdlError, DdlOutcome};
pub use definition::{
    ColumnDefinition, InsertPosition, KeyColumn, KeyDefinition, TableDefinition, TableIdentity,
};
pub use registry::{SchemaRegistry, SchemaSource};
pub use types::{FieldType, UNKNOWN_DATA_TYPE};

/// Error type for schema operations.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    /// Error reading or writing a snapshot file
    #[error("Failed to access schema file: {0}")]
    Io(#[from] std::io::Error),

    /// Error encoding or decoding a snapshot file
    #[error("Invalid schema file: {0}")]
    Json(#[from] serde_json::Error),

    /// Error talking to the source database
    #[error("Failed to query information_schema: {0}")]
    Database(#[from] mysql_async::Error),

    /// A row returned by `information_schema` lacked a field
    #[error("Missing {field} in information_schema row")]
    MissingField { field: &'static str },

    /// Table not found in the registry
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not found in table definition
    #[error("Column '{column}' not found in table '{table}'")]
    ColumnNotFound { table: String, column: String },

    /// Column added twice
    #[error("Column '{column}' already exists in table '{table}'")]
    DuplicateColumn { table: String, column: String },
}
