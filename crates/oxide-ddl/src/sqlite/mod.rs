//! SQLite dialect.
//!
//! Entity model, interim schema conversion, rename propagation, the
//! statement planner and the SQL convertor.

pub mod convertor;
pub mod ddl;
pub mod grammar;
pub mod interim;
pub mod planner;
pub mod propagate;
pub mod statements;

pub use convertor::{migration_sql, Convertor, ConvertorRegistry, STATEMENT_BREAKPOINT};
pub use ddl::{SqliteDdl, SqliteEntity, TableFull};
pub use interim::{build_ddl, interim_to_ddl, InterimSchema};
pub use planner::{ddl_diff, ddl_diff_with_config, DiffResult, RecreatePlan};
pub use statements::{JsonStatement, RecreateReason, StatementGroup};
