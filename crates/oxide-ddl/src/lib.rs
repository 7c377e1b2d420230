//! Schema diffing and DDL planning for SQLite.
//!
//! `oxide-ddl` compares two schema states and produces the ordered DDL that
//! migrates one into the other:
//! - Every schema object is an entity in a typed store
//! - Created and dropped entities are paired into renames by a pluggable
//!   resolver, and renames cascade to every dependent entity
//! - Changes SQLite cannot perform in place rebuild the table and copy its rows
//! - Planned statements are converted to SQL by a registry of convertors
//!
//! # Architecture
//!
//! - **Store** - Keyed entity collections with conflict detection
//! - **Diff** - Created/dropped sets and per-field alters between two stores
//! - **Resolver** - Rename decisions (explicit, similarity-based, interactive)
//! - **SQLite** - Entity model, propagation, planner and convertors
//! - **Snapshot** - Schema snapshots and the migration journal
//!
//! # Example
//!
//! ```rust
//! use oxide_ddl::prelude::*;
//! use oxide_ddl::sqlite::interim::InterimColumn;
//!
//! # tokio_test::block_on(async {
//! let before = InterimSchema::new().table(
//!     "users",
//!     vec![InterimColumn::new("users", "id", "integer").primary_key()],
//! );
//! let after = InterimSchema::new().table(
//!     "users",
//!     vec![
//!         InterimColumn::new("users", "id", "integer").primary_key(),
//!         InterimColumn::new("users", "age", "integer"),
//!     ],
//! );
//!
//! let resolver = PredeterminedResolver::none();
//! let result = ddl_diff(
//!     build_ddl(&before).unwrap(),
//!     build_ddl(&after).unwrap(),
//!     &resolver,
//!     &resolver,
//!     DiffMode::Generate,
//! )
//! .await
//! .unwrap();
//!
//! assert_eq!(
//!     result.sql_statements,
//!     vec!["ALTER TABLE \"users\" ADD COLUMN \"age\" integer;"]
//! );
//! # });
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the SQL between two schemas
//! oxide-ddl diff --from before.json --to after.json --rename users.name->users.full_name
//!
//! # Write the next migration against the latest snapshot
//! oxide-ddl generate --to schema.json --name add_email
//!
//! # Validate a schema
//! oxide-ddl check --schema schema.json
//! ```

pub mod config;
pub mod diff;
pub mod error;
pub mod resolver;
pub mod snapshot;
pub mod sqlite;
pub mod store;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{DiffConfig, DiffMode};
    pub use crate::diff::{diff, split, Change, DiffType, Diffed};
    pub use crate::error::{DdlError, Result, SchemaError};
    pub use crate::resolver::{
        ChainResolver, HeuristicResolver, PredeterminedResolver, PromptChoice, PromptResolver,
        RenamePrompt, Renameable, Renamed, Resolver, ResolverInput, ResolverOutput,
    };
    pub use crate::snapshot::{migration_tag, Journal, JournalEntry, MigrationDir, Snapshot};
    pub use crate::sqlite::ddl::{Column, Table};
    pub use crate::sqlite::{
        build_ddl, ddl_diff, ddl_diff_with_config, interim_to_ddl, migration_sql,
        ConvertorRegistry, DiffResult, InterimSchema, JsonStatement, RecreateReason, SqliteDdl,
    };
    pub use crate::store::{Entity, EntityKey, EntityStore};
}
