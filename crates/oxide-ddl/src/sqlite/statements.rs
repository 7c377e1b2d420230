//! Abstract DDL statements.
//!
//! The planner emits [`JsonStatement`]s; the convertor turns each one into
//! SQL. Statements serialize with a `type` tag so they can be shown to users
//! or stored next to the generated SQL.

use serde::{Deserialize, Serialize};

use super::ddl::{Column, ForeignKey, Index, TableFull, View};

/// Why a table has to be rebuilt instead of altered in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RecreateReason {
    /// The primary key was added, dropped or changed.
    PrimaryKeyChanged {
        /// Constraint name.
        name: String,
    },
    /// A foreign key was added, dropped or changed.
    ForeignKeyChanged {
        /// Constraint name.
        name: String,
    },
    /// A unique constraint was added, dropped or changed.
    UniqueChanged {
        /// Constraint name.
        name: String,
    },
    /// A check constraint was added, dropped or changed.
    CheckChanged {
        /// Constraint name.
        name: String,
    },
    /// An implicit index changed.
    AutoIndexChanged {
        /// Index name.
        name: String,
    },
    /// A STORED generated column was added.
    StoredColumnAdded {
        /// Column name.
        column: String,
    },
    /// A column with an expression default was added.
    ExpressionDefaultAdded {
        /// Column name.
        column: String,
    },
    /// A column became a STORED generated column.
    ColumnBecameStored {
        /// Column name.
        column: String,
    },
    /// A column changed in a way ALTER TABLE cannot express.
    ColumnAltered {
        /// Column name.
        column: String,
        /// Changed fields.
        fields: Vec<String>,
    },
}

impl std::fmt::Display for RecreateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PrimaryKeyChanged { name } => write!(f, "primary key '{name}' changed"),
            Self::ForeignKeyChanged { name } => write!(f, "foreign key '{name}' changed"),
            Self::UniqueChanged { name } => write!(f, "unique constraint '{name}' changed"),
            Self::CheckChanged { name } => write!(f, "check constraint '{name}' changed"),
            Self::AutoIndexChanged { name } => write!(f, "implicit index '{name}' changed"),
            Self::StoredColumnAdded { column } => {
                write!(f, "stored generated column '{column}' added")
            }
            Self::ExpressionDefaultAdded { column } => {
                write!(f, "column '{column}' with an expression default added")
            }
            Self::ColumnBecameStored { column } => {
                write!(f, "column '{column}' became a stored generated column")
            }
            Self::ColumnAltered { column, fields } => {
                write!(f, "column '{column}' altered ({})", fields.join(", "))
            }
        }
    }
}

/// A column rename absorbed by a table rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamedColumn {
    /// Name in the old table.
    pub from: String,
    /// Name in the new table.
    pub to: String,
}

/// A planned DDL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonStatement {
    /// Create a table with its constraints.
    CreateTable {
        /// Full table shape.
        table: TableFull,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        #[serde(rename = "tableName")]
        table_name: String,
    },
    /// Rename a table.
    RenameTable {
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a column, optionally with an inline REFERENCES clause.
    AddColumn {
        /// The new column.
        column: Column,
        /// Single-column foreign key on the new column.
        fk: Option<ForeignKey>,
    },
    /// Drop a column.
    DropColumn {
        /// The dropped column.
        column: Column,
    },
    /// Rename a column.
    RenameColumn {
        /// Table name.
        table: String,
        /// Old name.
        from: String,
        /// New name.
        to: String,
    },
    /// Drop and re-add a column whose generation clause changed.
    RecreateColumn {
        /// The column in its new shape.
        column: Column,
        /// Whether the column is part of the primary key.
        #[serde(rename = "isPk")]
        is_pk: bool,
    },
    /// Rebuild a table and copy its rows.
    RecreateTable {
        /// Table as it exists before the rebuild.
        from: TableFull,
        /// Table as it must look afterwards.
        to: TableFull,
        /// Why the table is rebuilt.
        reasons: Vec<RecreateReason>,
        /// Column renames performed by the copy.
        #[serde(rename = "renamedColumns")]
        renamed_columns: Vec<RenamedColumn>,
    },
    /// Create an index.
    CreateIndex {
        /// The index.
        index: Index,
    },
    /// Drop an index.
    DropIndex {
        /// The index.
        index: Index,
    },
    /// Create a view.
    CreateView {
        /// The view.
        view: View,
    },
    /// Drop a view.
    DropView {
        /// The view.
        view: View,
    },
}

impl JsonStatement {
    /// The statement's `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateTable { .. } => "create_table",
            Self::DropTable { .. } => "drop_table",
            Self::RenameTable { .. } => "rename_table",
            Self::AddColumn { .. } => "add_column",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::RecreateColumn { .. } => "recreate_column",
            Self::RecreateTable { .. } => "recreate_table",
            Self::CreateIndex { .. } => "create_index",
            Self::DropIndex { .. } => "drop_index",
            Self::CreateView { .. } => "create_view",
            Self::DropView { .. } => "drop_view",
        }
    }

    /// Returns a human-readable description of this statement.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { table } => format!("Create table '{}'", table.name),
            Self::DropTable { table_name } => format!("Drop table '{}'", table_name),
            Self::RenameTable { from, to } => format!("Rename table '{}' to '{}'", from, to),
            Self::AddColumn { column, .. } => {
                format!("Add column '{}' to table '{}'", column.name, column.table)
            }
            Self::DropColumn { column } => {
                format!("Drop column '{}' from table '{}'", column.name, column.table)
            }
            Self::RenameColumn { table, from, to } => {
                format!("Rename column '{}' to '{}' in table '{}'", from, to, table)
            }
            Self::RecreateColumn { column, .. } => {
                format!("Recreate column '{}' in table '{}'", column.name, column.table)
            }
            Self::RecreateTable { to, reasons, .. } => format!(
                "Recreate table '{}': {}",
                to.name,
                reasons
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
            Self::CreateIndex { index } => {
                format!("Create index '{}' on table '{}'", index.name, index.table)
            }
            Self::DropIndex { index } => format!("Drop index '{}'", index.name),
            Self::CreateView { view } => format!("Create view '{}'", view.name),
            Self::DropView { view } => format!("Drop view '{}'", view.name),
        }
    }
}

/// A statement together with the SQL it converts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementGroup {
    /// The abstract statement.
    #[serde(rename = "jsonStatement")]
    pub statement: JsonStatement,
    /// Its SQL.
    pub sql_statements: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_type_tag_matches_kind() {
        let statements = vec![
            JsonStatement::DropTable {
                table_name: "users".into(),
            },
            JsonStatement::RenameColumn {
                table: "users".into(),
                from: "name".into(),
                to: "full_name".into(),
            },
            JsonStatement::DropColumn {
                column: Column::new("users", "age", "integer"),
            },
        ];
        for statement in statements {
            let json = serde_json::to_value(&statement).unwrap();
            assert_eq!(json["type"], statement.kind());
        }
    }

    #[test]
    fn test_recreate_reason_display() {
        let reason = RecreateReason::ColumnAltered {
            column: "name".into(),
            fields: vec!["notNull".into(), "type".into()],
        };
        assert_eq!(reason.to_string(), "column 'name' altered (notNull, type)");

        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "column_altered");
    }

    #[test]
    fn test_description() {
        let statement = JsonStatement::RenameTable {
            from: "users".into(),
            to: "accounts".into(),
        };
        assert_eq!(statement.description(), "Rename table 'users' to 'accounts'");
    }
}
