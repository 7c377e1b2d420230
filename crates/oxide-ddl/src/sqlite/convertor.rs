//! SQL generation for SQLite.
//!
//! SQLite has limited ALTER TABLE support. Anything beyond renaming, adding
//! and dropping columns goes through the "table recreation" strategy: create
//! a new table, copy the data, drop the old table, rename the new table.

use std::collections::HashSet;

use tracing::debug;

use super::ddl::{Column, ForeignKey, Index, ReferentialAction, TableFull};
use super::grammar::{quote_identifier, recreate_shadow_name, render_default};
use super::statements::{JsonStatement, StatementGroup};
use crate::error::{DdlError, Result};

/// Separator between statements in a migration file with breakpoints.
pub const STATEMENT_BREAKPOINT: &str = "\n--> statement-breakpoint\n";

/// Turns one kind of [`JsonStatement`] into SQL.
pub trait Convertor {
    /// Name used in errors.
    fn name(&self) -> &'static str;

    /// Returns true if this convertor handles `statement`.
    fn can(&self, statement: &JsonStatement) -> bool;

    /// Produces the SQL for `statement`.
    fn convert(&self, statement: &JsonStatement) -> Result<Vec<String>>;
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_identifier(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a column definition.
fn column_definition(column: &Column, inline_pk: bool, inline_unique: bool) -> String {
    let mut sql = format!("{} {}", quote_identifier(&column.name), column.ty);
    if inline_pk {
        sql.push_str(" PRIMARY KEY");
        if column.autoincrement {
            sql.push_str(" AUTOINCREMENT");
        }
    }
    if let Some(default) = &column.default {
        sql.push_str(" DEFAULT ");
        sql.push_str(&render_default(default));
    }
    if let Some(generated) = &column.generated {
        sql.push_str(&format!(
            " GENERATED ALWAYS AS ({}) {}",
            generated.expression,
            generated.kind.to_sql()
        ));
    }
    if column.not_null {
        sql.push_str(" NOT NULL");
    }
    if inline_unique {
        sql.push_str(" UNIQUE");
    }
    sql
}

fn references(fk: &ForeignKey) -> String {
    let mut sql = format!(
        "REFERENCES {}({})",
        quote_identifier(&fk.table_to),
        quote_list(&fk.columns_to)
    );
    if fk.on_update != ReferentialAction::NoAction {
        sql.push_str(" ON UPDATE ");
        sql.push_str(fk.on_update.to_sql());
    }
    if fk.on_delete != ReferentialAction::NoAction {
        sql.push_str(" ON DELETE ");
        sql.push_str(fk.on_delete.to_sql());
    }
    sql
}

/// Renders CREATE TABLE for `table` under `name`.
fn create_table_sql(table: &TableFull, name: &str) -> String {
    let inline_pk = table
        .pk
        .as_ref()
        .filter(|pk| pk.columns.len() == 1 && !pk.name_explicit)
        .map(|pk| pk.columns[0].as_str());
    let inline_uniques: HashSet<&str> = table
        .uniques
        .iter()
        .filter(|u| u.columns.len() == 1 && !u.name_explicit)
        .map(|u| u.columns[0].as_str())
        .collect();

    let mut lines: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            column_definition(
                c,
                inline_pk == Some(c.name.as_str()),
                inline_uniques.contains(c.name.as_str()),
            )
        })
        .collect();

    if let Some(pk) = table.pk.as_ref().filter(|_| inline_pk.is_none()) {
        lines.push(format!(
            "CONSTRAINT {} PRIMARY KEY({})",
            quote_identifier(&pk.name),
            quote_list(&pk.columns)
        ));
    }
    for fk in &table.fks {
        lines.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) {}",
            quote_identifier(&fk.name),
            quote_list(&fk.columns),
            references(fk)
        ));
    }
    for unique in table
        .uniques
        .iter()
        .filter(|u| u.columns.len() != 1 || u.name_explicit)
    {
        lines.push(format!(
            "CONSTRAINT {} UNIQUE({})",
            quote_identifier(&unique.name),
            quote_list(&unique.columns)
        ));
    }
    for check in &table.checks {
        lines.push(format!(
            "CONSTRAINT {} CHECK({})",
            quote_identifier(&check.name),
            check.value
        ));
    }

    format!(
        "CREATE TABLE {} (\n\t{}\n);",
        quote_identifier(name),
        lines.join(",\n\t")
    )
}

fn add_column_sql(column: &Column, fk: Option<&ForeignKey>) -> String {
    let mut sql = format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_identifier(&column.table),
        column_definition(column, false, false)
    );
    if let Some(fk) = fk {
        sql.push(' ');
        sql.push_str(&references(fk));
    }
    sql.push(';');
    sql
}

fn drop_column_sql(column: &Column) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {};",
        quote_identifier(&column.table),
        quote_identifier(&column.name)
    )
}

fn create_index_sql(index: &Index) -> String {
    let columns = index
        .columns
        .iter()
        .map(|c| {
            if c.is_expression {
                c.value.clone()
            } else {
                quote_identifier(&c.value)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!(
        "CREATE {}INDEX {} ON {} ({})",
        if index.is_unique { "UNIQUE " } else { "" },
        quote_identifier(&index.name),
        quote_identifier(&index.table),
        columns
    );
    if let Some(condition) = &index.where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(condition);
    }
    sql.push(';');
    sql
}

/// Expands a table rebuild.
fn recreate_table_sql(
    from: &TableFull,
    to: &TableFull,
    renamed: &[super::statements::RenamedColumn],
) -> Vec<String> {
    let shadow = recreate_shadow_name(&to.name);
    let mut sql = vec![
        "PRAGMA foreign_keys=OFF;".to_string(),
        create_table_sql(to, &shadow),
    ];

    let (targets, sources): (Vec<String>, Vec<String>) = to
        .columns
        .iter()
        .filter(|c| c.generated.is_none() && from.column(&c.name).is_some())
        .map(|c| {
            let source = renamed
                .iter()
                .find(|r| r.to == c.name)
                .map_or(c.name.as_str(), |r| r.from.as_str());
            (quote_identifier(&c.name), quote_identifier(source))
        })
        .unzip();
    if !targets.is_empty() {
        sql.push(format!(
            "INSERT INTO {}({}) SELECT {} FROM {};",
            quote_identifier(&shadow),
            targets.join(", "),
            sources.join(", "),
            quote_identifier(&from.name)
        ));
    }

    sql.push(format!("DROP TABLE {};", quote_identifier(&from.name)));
    sql.push(format!(
        "ALTER TABLE {} RENAME TO {};",
        quote_identifier(&shadow),
        quote_identifier(&to.name)
    ));
    sql.push("PRAGMA foreign_keys=ON;".to_string());
    sql
}

/// Declares a convertor handling a single statement type.
macro_rules! convertor {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $pattern:pat => $body:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Convertor for $name {
            fn name(&self) -> &'static str {
                $kind
            }

            fn can(&self, statement: &JsonStatement) -> bool {
                statement.kind() == $kind
            }

            fn convert(&self, statement: &JsonStatement) -> Result<Vec<String>> {
                match statement {
                    $pattern => $body,
                    other => Err(DdlError::ConvertorMismatch {
                        convertor: $kind,
                        statement: other.kind(),
                    }),
                }
            }
        }
    };
}

convertor!(
    /// `CREATE TABLE`.
    CreateTableConvertor, "create_table",
    JsonStatement::CreateTable { table } => Ok(vec![create_table_sql(table, &table.name)])
);

convertor!(
    /// `DROP TABLE`.
    DropTableConvertor, "drop_table",
    JsonStatement::DropTable { table_name } => {
        Ok(vec![format!("DROP TABLE {};", quote_identifier(table_name))])
    }
);

convertor!(
    /// `ALTER TABLE .. RENAME TO`.
    RenameTableConvertor, "rename_table",
    JsonStatement::RenameTable { from, to } => Ok(vec![format!(
        "ALTER TABLE {} RENAME TO {};",
        quote_identifier(from),
        quote_identifier(to)
    )])
);

convertor!(
    /// `ALTER TABLE .. ADD COLUMN`.
    AddColumnConvertor, "add_column",
    JsonStatement::AddColumn { column, fk } => Ok(vec![add_column_sql(column, fk.as_ref())])
);

convertor!(
    /// `ALTER TABLE .. DROP COLUMN` (SQLite 3.35.0+).
    DropColumnConvertor, "drop_column",
    JsonStatement::DropColumn { column } => Ok(vec![drop_column_sql(column)])
);

convertor!(
    /// `ALTER TABLE .. RENAME COLUMN` (SQLite 3.25.0+).
    RenameColumnConvertor, "rename_column",
    JsonStatement::RenameColumn { table, from, to } => Ok(vec![format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {};",
        quote_identifier(table),
        quote_identifier(from),
        quote_identifier(to)
    )])
);

convertor!(
    /// Drops and re-adds a column.
    RecreateColumnConvertor, "recreate_column",
    JsonStatement::RecreateColumn { column, .. } => {
        Ok(vec![drop_column_sql(column), add_column_sql(column, None)])
    }
);

convertor!(
    /// Table rebuild.
    RecreateTableConvertor, "recreate_table",
    JsonStatement::RecreateTable { from, to, renamed_columns, .. } => {
        Ok(recreate_table_sql(from, to, renamed_columns))
    }
);

convertor!(
    /// `CREATE INDEX`.
    CreateIndexConvertor, "create_index",
    JsonStatement::CreateIndex { index } => Ok(vec![create_index_sql(index)])
);

convertor!(
    /// `DROP INDEX`.
    DropIndexConvertor, "drop_index",
    JsonStatement::DropIndex { index } => {
        Ok(vec![format!("DROP INDEX {};", quote_identifier(&index.name))])
    }
);

convertor!(
    /// `CREATE VIEW`.
    CreateViewConvertor, "create_view",
    JsonStatement::CreateView { view } => {
        let definition = view
            .definition
            .as_deref()
            .ok_or_else(|| DdlError::MissingViewDefinition(view.name.clone()))?;
        Ok(vec![format!(
            "CREATE VIEW {} AS {};",
            quote_identifier(&view.name),
            definition.trim_end().trim_end_matches(';')
        )])
    }
);

convertor!(
    /// `DROP VIEW`.
    DropViewConvertor, "drop_view",
    JsonStatement::DropView { view } => {
        Ok(vec![format!("DROP VIEW {};", quote_identifier(&view.name))])
    }
);

/// Dispatches statements to the convertor that handles them.
#[derive(Default)]
pub struct ConvertorRegistry {
    convertors: Vec<Box<dyn Convertor + Send + Sync>>,
}

impl std::fmt::Debug for ConvertorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.convertors.iter().map(|c| c.name()))
            .finish()
    }
}

impl ConvertorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a convertor.
    #[must_use]
    pub fn register(mut self, convertor: impl Convertor + Send + Sync + 'static) -> Self {
        self.convertors.push(Box::new(convertor));
        self
    }

    /// Registry with one convertor per SQLite statement type.
    #[must_use]
    pub fn sqlite() -> Self {
        Self::new()
            .register(CreateTableConvertor)
            .register(DropTableConvertor)
            .register(RenameTableConvertor)
            .register(AddColumnConvertor)
            .register(DropColumnConvertor)
            .register(RenameColumnConvertor)
            .register(RecreateColumnConvertor)
            .register(RecreateTableConvertor)
            .register(CreateIndexConvertor)
            .register(DropIndexConvertor)
            .register(CreateViewConvertor)
            .register(DropViewConvertor)
    }

    /// Converts one statement. Exactly one convertor must handle it.
    pub fn convert(&self, statement: &JsonStatement) -> Result<Vec<String>> {
        let matching: Vec<_> = self
            .convertors
            .iter()
            .filter(|c| c.can(statement))
            .collect();
        match matching.as_slice() {
            [] => Err(DdlError::NoConvertor(statement.kind())),
            [convertor] => convertor.convert(statement),
            many => Err(DdlError::AmbiguousConvertor {
                statement: statement.kind(),
                count: many.len(),
            }),
        }
    }

    /// Converts statements in order, returning the flat SQL list and the
    /// per-statement grouping.
    pub fn from_json(
        &self,
        statements: &[JsonStatement],
    ) -> Result<(Vec<String>, Vec<StatementGroup>)> {
        let mut sql = Vec::new();
        let mut groups = Vec::with_capacity(statements.len());
        for statement in statements {
            let converted = self.convert(statement)?;
            debug!(statement = statement.kind(), count = converted.len(), "Converted statement");
            sql.extend(converted.iter().cloned());
            groups.push(StatementGroup {
                statement: statement.clone(),
                sql_statements: converted,
            });
        }
        Ok((sql, groups))
    }
}

/// Joins SQL statements into the content of a migration file.
#[must_use]
pub fn migration_sql(sql: &[String], breakpoints: bool) -> String {
    let separator = if breakpoints { STATEMENT_BREAKPOINT } else { "\n" };
    sql.join(separator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::ddl::{
        CheckConstraint, ColumnDefault, GeneratedKind, IndexColumn, PrimaryKey,
        ReferentialAction, UniqueConstraint, View,
    };
    use crate::sqlite::statements::{RecreateReason, RenamedColumn};

    fn users() -> TableFull {
        TableFull {
            name: "users".into(),
            columns: vec![
                {
                    let mut id = Column::new("users", "id", "integer");
                    id.primary_key = true;
                    id.autoincrement = true;
                    id
                },
                {
                    let mut email = Column::new("users", "email", "text").not_null();
                    email.unique = true;
                    email
                },
                Column::new("users", "status", "text")
                    .default_value(ColumnDefault::literal("'active'")),
            ],
            pk: Some(PrimaryKey {
                table: "users".into(),
                name: "users_pk".into(),
                columns: vec!["id".into()],
                name_explicit: false,
            }),
            fks: vec![],
            uniques: vec![UniqueConstraint {
                table: "users".into(),
                name: "users_email_unique".into(),
                columns: vec!["email".into()],
                name_explicit: false,
            }],
            checks: vec![CheckConstraint {
                table: "users".into(),
                name: "status_check".into(),
                value: "status IN ('active', 'banned')".into(),
                name_explicit: true,
            }],
            indexes: vec![],
        }
    }

    #[test]
    fn test_create_table() {
        let sql = ConvertorRegistry::sqlite()
            .convert(&JsonStatement::CreateTable { table: users() })
            .unwrap();
        assert_eq!(
            sql,
            vec![concat!(
                "CREATE TABLE \"users\" (\n",
                "\t\"id\" integer PRIMARY KEY AUTOINCREMENT,\n",
                "\t\"email\" text NOT NULL UNIQUE,\n",
                "\t\"status\" text DEFAULT 'active',\n",
                "\tCONSTRAINT \"status_check\" CHECK(status IN ('active', 'banned'))\n",
                ");"
            )]
        );
    }

    #[test]
    fn test_create_table_with_table_constraints() {
        let table = TableFull {
            name: "members".into(),
            columns: vec![
                Column::new("members", "org_id", "integer").not_null(),
                Column::new("members", "user_id", "integer").not_null(),
            ],
            pk: Some(PrimaryKey {
                table: "members".into(),
                name: "members_pk".into(),
                columns: vec!["org_id".into(), "user_id".into()],
                name_explicit: false,
            }),
            fks: vec![{
                let mut fk = ForeignKey::new(
                    "members",
                    "members_user_fk",
                    vec!["user_id".into()],
                    "users",
                    vec!["id".into()],
                );
                fk.on_delete = ReferentialAction::Cascade;
                fk
            }],
            uniques: vec![],
            checks: vec![],
            indexes: vec![],
        };
        let sql = CreateTableConvertor
            .convert(&JsonStatement::CreateTable { table })
            .unwrap();
        assert_eq!(
            sql[0],
            concat!(
                "CREATE TABLE \"members\" (\n",
                "\t\"org_id\" integer NOT NULL,\n",
                "\t\"user_id\" integer NOT NULL,\n",
                "\tCONSTRAINT \"members_pk\" PRIMARY KEY(\"org_id\", \"user_id\"),\n",
                "\tCONSTRAINT \"members_user_fk\" FOREIGN KEY (\"user_id\") REFERENCES \"users\"(\"id\") ON DELETE CASCADE\n",
                ");"
            )
        );
    }

    #[test]
    fn test_add_column_with_reference() {
        let column = Column::new("posts", "author_id", "integer");
        let fk = ForeignKey::new(
            "posts",
            "fk",
            vec!["author_id".into()],
            "users",
            vec!["id".into()],
        );
        let sql = AddColumnConvertor
            .convert(&JsonStatement::AddColumn {
                column,
                fk: Some(fk),
            })
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"posts\" ADD COLUMN \"author_id\" integer REFERENCES \"users\"(\"id\");"
            ]
        );
    }

    #[test]
    fn test_recreate_table_copies_renamed_columns() {
        let from = TableFull {
            name: "users".into(),
            columns: vec![
                Column::new("users", "id", "integer"),
                Column::new("users", "full_name", "text"),
                Column::new("users", "legacy", "text"),
            ],
            pk: None,
            fks: vec![],
            uniques: vec![],
            checks: vec![],
            indexes: vec![],
        };
        let to = TableFull {
            columns: vec![
                Column::new("users", "id", "integer"),
                Column::new("users", "full_name", "text").not_null(),
                Column::new("users", "total", "integer")
                    .generated("id * 2", GeneratedKind::Virtual),
            ],
            ..from.clone()
        };
        let statement = JsonStatement::RecreateTable {
            from,
            to,
            reasons: vec![RecreateReason::ColumnAltered {
                column: "full_name".into(),
                fields: vec!["notNull".into()],
            }],
            renamed_columns: vec![RenamedColumn {
                from: "name".into(),
                to: "full_name".into(),
            }],
        };

        let sql = ConvertorRegistry::sqlite().convert(&statement).unwrap();
        assert_eq!(
            sql,
            vec![
                "PRAGMA foreign_keys=OFF;".to_string(),
                concat!(
                    "CREATE TABLE \"__new_users\" (\n",
                    "\t\"id\" integer,\n",
                    "\t\"full_name\" text NOT NULL,\n",
                    "\t\"total\" integer GENERATED ALWAYS AS (id * 2) VIRTUAL\n",
                    ");"
                )
                .to_string(),
                "INSERT INTO \"__new_users\"(\"id\", \"full_name\") SELECT \"id\", \"name\" FROM \"users\";"
                    .to_string(),
                "DROP TABLE \"users\";".to_string(),
                "ALTER TABLE \"__new_users\" RENAME TO \"users\";".to_string(),
                "PRAGMA foreign_keys=ON;".to_string(),
            ]
        );
    }

    #[test]
    fn test_simple_statements() {
        let registry = ConvertorRegistry::sqlite();
        let index = Index::new(
            "users",
            "users_email_idx",
            vec![IndexColumn::column("email"), IndexColumn::expression("lower(name)")],
        )
        .unique()
        .where_clause("deleted_at IS NULL");

        let cases = vec![
            (
                JsonStatement::RenameTable {
                    from: "users".into(),
                    to: "accounts".into(),
                },
                "ALTER TABLE \"users\" RENAME TO \"accounts\";",
            ),
            (
                JsonStatement::RenameColumn {
                    table: "users".into(),
                    from: "name".into(),
                    to: "full_name".into(),
                },
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\";",
            ),
            (
                JsonStatement::DropColumn {
                    column: Column::new("users", "age", "integer"),
                },
                "ALTER TABLE \"users\" DROP COLUMN \"age\";",
            ),
            (
                JsonStatement::DropTable {
                    table_name: "users".into(),
                },
                "DROP TABLE \"users\";",
            ),
            (
                JsonStatement::CreateIndex {
                    index: index.clone(),
                },
                "CREATE UNIQUE INDEX \"users_email_idx\" ON \"users\" (\"email\", lower(name)) WHERE deleted_at IS NULL;",
            ),
            (
                JsonStatement::DropIndex { index },
                "DROP INDEX \"users_email_idx\";",
            ),
            (
                JsonStatement::CreateView {
                    view: View::new("active", "SELECT * FROM users;"),
                },
                "CREATE VIEW \"active\" AS SELECT * FROM users;",
            ),
            (
                JsonStatement::DropView {
                    view: View::new("active", "SELECT 1"),
                },
                "DROP VIEW \"active\";",
            ),
        ];
        for (statement, expected) in cases {
            assert_eq!(registry.convert(&statement).unwrap(), vec![expected]);
        }
    }

    #[test]
    fn test_recreate_column_drops_and_adds() {
        let column = Column::new("users", "total", "integer")
            .generated("price * qty", GeneratedKind::Virtual);
        let sql = RecreateColumnConvertor
            .convert(&JsonStatement::RecreateColumn {
                column,
                is_pk: false,
            })
            .unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" DROP COLUMN \"total\";",
                "ALTER TABLE \"users\" ADD COLUMN \"total\" integer GENERATED ALWAYS AS (price * qty) VIRTUAL;",
            ]
        );
    }

    #[test]
    fn test_registry_errors() {
        let statement = JsonStatement::DropTable {
            table_name: "users".into(),
        };
        assert!(matches!(
            ConvertorRegistry::new().convert(&statement),
            Err(DdlError::NoConvertor("drop_table"))
        ));
        assert!(matches!(
            ConvertorRegistry::sqlite()
                .register(DropTableConvertor)
                .convert(&statement),
            Err(DdlError::AmbiguousConvertor { count: 2, .. })
        ));
        assert!(matches!(
            DropViewConvertor.convert(&statement),
            Err(DdlError::ConvertorMismatch { .. })
        ));

        let mut view = View::new("v", "SELECT 1");
        view.definition = None;
        assert!(matches!(
            CreateViewConvertor.convert(&JsonStatement::CreateView { view }),
            Err(DdlError::MissingViewDefinition(_))
        ));
    }

    #[test]
    fn test_from_json_groups_statements() {
        let statements = vec![
            JsonStatement::RenameTable {
                from: "a".into(),
                to: "b".into(),
            },
            JsonStatement::DropTable {
                table_name: "c".into(),
            },
        ];
        let (sql, groups) = ConvertorRegistry::sqlite().from_json(&statements).unwrap();
        assert_eq!(sql.len(), 2);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].sql_statements, vec!["DROP TABLE \"c\";"]);
    }

    #[test]
    fn test_migration_sql() {
        let sql = vec!["A;".to_string(), "B;".to_string()];
        assert_eq!(migration_sql(&sql, true), "A;\n--> statement-breakpoint\nB;");
        assert_eq!(migration_sql(&sql, false), "A;\nB;");
    }
}
