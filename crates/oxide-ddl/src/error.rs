//! Error types for the schema diff pipeline.
//!
//! Schema-construction problems are collected as [`SchemaError`] values and
//! handed back to the caller. Everything that aborts a diff run is a
//! [`DdlError`].

use serde::{Deserialize, Serialize};

/// A problem found while building an entity store from an interim schema.
///
/// These are collected, not thrown: the caller decides whether to abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchemaError {
    /// Two tables share a name.
    #[error("Table '{table}' is defined more than once")]
    ConflictTable {
        /// Table name.
        table: String,
    },

    /// Two columns of one table share a name.
    #[error("Column '{column}' is defined more than once in table '{table}'")]
    ConflictColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// Two indexes share a name (index names are schema-wide in SQLite).
    #[error("Index '{name}' on table '{table}' conflicts with an existing index")]
    ConflictIndex {
        /// Table of the rejected index.
        table: String,
        /// Index name.
        name: String,
    },

    /// Two foreign keys share a name.
    #[error("Foreign key '{name}' on table '{table}' conflicts with an existing constraint")]
    ConflictFk {
        /// Table of the rejected foreign key.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Two primary keys share a name, or a table declares two primary keys.
    #[error("Primary key '{name}' on table '{table}' conflicts with an existing constraint")]
    ConflictPk {
        /// Table of the rejected primary key.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Two unique constraints share a name.
    #[error("Unique constraint '{name}' on table '{table}' conflicts with an existing constraint")]
    ConflictUnique {
        /// Table of the rejected constraint.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Two check constraints share a name.
    #[error("Check constraint '{name}' on table '{table}' conflicts with an existing constraint")]
    ConflictCheck {
        /// Table of the rejected constraint.
        table: String,
        /// Constraint name.
        name: String,
    },

    /// Two views share a name.
    #[error("View '{view}' is defined more than once")]
    ConflictView {
        /// View name.
        view: String,
    },

    /// A table has no columns.
    #[error("Table '{table}' has no columns")]
    TableNoColumns {
        /// Table name.
        table: String,
    },

    /// An entity references a table that is not part of the schema.
    #[error("{kind} '{name}' references unknown table '{table}'")]
    UnknownTable {
        /// Entity kind (e.g. "column", "index").
        kind: String,
        /// Entity name.
        name: String,
        /// The missing table.
        table: String,
    },
}

fn bullet_list(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Errors that abort a diff run.
#[derive(Debug, thiserror::Error)]
pub enum DdlError {
    /// The schema could not be turned into an entity store.
    #[error("Invalid schema:\n{}", bullet_list(.0))]
    InvalidSchema(Vec<SchemaError>),

    /// A lookup that must match at most one entity matched several.
    #[error("Expected at most one {kind}, found {count}")]
    AmbiguousLookup {
        /// Entity kind.
        kind: &'static str,
        /// Number of matches.
        count: usize,
    },

    /// The rename resolver was cancelled (e.g. the user aborted a prompt).
    #[error("Rename resolution was cancelled")]
    ResolverCancelled,

    /// The rename resolver failed.
    #[error("Rename resolution failed: {0}")]
    Resolver(String),

    /// The resolver returned a classification that does not match its input.
    #[error("Invalid rename resolution: {0}")]
    InvalidResolution(String),

    /// A rename could not be parsed.
    #[error("Invalid rename '{0}', expected 'from->to'")]
    InvalidRename(String),

    /// No convertor handles a statement type. This is a planner bug.
    #[error("No convertor registered for statement '{0}'")]
    NoConvertor(&'static str),

    /// More than one convertor handles a statement type. This is a registry bug.
    #[error("{count} convertors registered for statement '{statement}'")]
    AmbiguousConvertor {
        /// Statement type.
        statement: &'static str,
        /// Number of matching convertors.
        count: usize,
    },

    /// A convertor was handed a statement it does not handle.
    #[error("Convertor '{convertor}' cannot convert statement '{statement}'")]
    ConvertorMismatch {
        /// Convertor name.
        convertor: &'static str,
        /// Statement type.
        statement: &'static str,
    },

    /// A managed view has no definition to create it from.
    #[error("View '{0}' has no definition")]
    MissingViewDefinition(String),

    /// A snapshot belongs to another dialect.
    #[error("Snapshot dialect '{found}' does not match '{expected}'")]
    DialectMismatch {
        /// Dialect this crate handles.
        expected: String,
        /// Dialect found in the file.
        found: String,
    },

    /// IO error (reading/writing snapshots, journals, migrations).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for diff operations.
pub type Result<T> = std::result::Result<T, DdlError>;
