//! Interim schema: the flat, unvalidated entity lists produced by database
//! introspection or by a declarative schema parser, and their conversion
//! into a validated [`SqliteDdl`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ddl::{
    CheckConstraint, Column, ForeignKey, Generated, Index, IndexColumn, IndexOrigin, PrimaryKey,
    ReferentialAction, SqliteDdl, SqliteEntity, Table, UniqueConstraint, View,
};
use super::grammar;
use crate::error::{DdlError, Result, SchemaError};
use crate::store::{EntityKey, InsertStatus};

/// A column as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimColumn {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: String,
    /// NOT NULL constraint.
    #[serde(default)]
    pub not_null: bool,
    /// Column-level PRIMARY KEY.
    #[serde(default)]
    pub primary_key: bool,
    /// AUTOINCREMENT.
    #[serde(default)]
    pub autoincrement: bool,
    /// Raw DEFAULT clause text.
    #[serde(default)]
    pub default: Option<String>,
    /// Generation clause.
    #[serde(default)]
    pub generated: Option<Generated>,
    /// Column-level UNIQUE.
    #[serde(default)]
    pub unique: bool,
    /// Declared name of the column-level UNIQUE constraint.
    #[serde(default)]
    pub unique_name: Option<String>,
}

impl InterimColumn {
    /// Creates a nullable column.
    #[must_use]
    pub fn new(table: impl Into<String>, name: impl Into<String>, ty: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            ty: ty.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
            default: None,
            generated: None,
            unique: false,
            unique_name: None,
        }
    }

    /// Sets NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Marks the column as PRIMARY KEY.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as PRIMARY KEY AUTOINCREMENT.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.primary_key = true;
        self.autoincrement = true;
        self
    }

    /// Sets the raw DEFAULT clause.
    #[must_use]
    pub fn default(mut self, sql: impl Into<String>) -> Self {
        self.default = Some(sql.into());
        self
    }

    /// Marks the column as UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the generation clause.
    #[must_use]
    pub fn generated(mut self, generated: Generated) -> Self {
        self.generated = Some(generated);
        self
    }
}

/// A foreign key as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimForeignKey {
    /// Referencing table.
    pub table: String,
    /// Declared name.
    #[serde(default)]
    pub name: Option<String>,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub table_to: String,
    /// Referenced columns.
    pub columns_to: Vec<String>,
    /// ON DELETE action.
    #[serde(default)]
    pub on_delete: ReferentialAction,
    /// ON UPDATE action.
    #[serde(default)]
    pub on_update: ReferentialAction,
}

/// A primary or unique key as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimKey {
    /// Owning table.
    pub table: String,
    /// Declared name.
    #[serde(default)]
    pub name: Option<String>,
    /// Key columns.
    pub columns: Vec<String>,
}

/// A check constraint as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimCheck {
    /// Owning table.
    pub table: String,
    /// Declared name.
    #[serde(default)]
    pub name: Option<String>,
    /// Check expression.
    pub value: String,
}

/// An index as reported by a schema source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterimIndex {
    /// Owning table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Indexed columns and expressions.
    pub columns: Vec<IndexColumn>,
    /// UNIQUE index.
    #[serde(default)]
    pub is_unique: bool,
    /// Partial index condition.
    #[serde(default, rename = "where")]
    pub where_clause: Option<String>,
    /// Origin; implicit indexes are re-derived from unique constraints.
    #[serde(default)]
    pub origin: IndexOrigin,
}

/// Flat, unvalidated entity lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InterimSchema {
    /// Table names.
    pub tables: Vec<String>,
    /// Columns.
    pub columns: Vec<InterimColumn>,
    /// Indexes.
    pub indexes: Vec<InterimIndex>,
    /// Foreign keys.
    pub fks: Vec<InterimForeignKey>,
    /// Table-level primary keys.
    pub pks: Vec<InterimKey>,
    /// Table-level unique constraints.
    pub uniques: Vec<InterimKey>,
    /// Check constraints.
    pub checks: Vec<InterimCheck>,
    /// Views.
    pub views: Vec<View>,
}

impl InterimSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table with its columns.
    #[must_use]
    pub fn table(mut self, name: impl Into<String>, columns: Vec<InterimColumn>) -> Self {
        self.tables.push(name.into());
        self.columns.extend(columns);
        self
    }

    /// Adds an index.
    #[must_use]
    pub fn index(mut self, index: InterimIndex) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn fk(mut self, fk: InterimForeignKey) -> Self {
        self.fks.push(fk);
        self
    }

    /// Adds a table-level primary key.
    #[must_use]
    pub fn pk(mut self, pk: InterimKey) -> Self {
        self.pks.push(pk);
        self
    }

    /// Adds a table-level unique constraint.
    #[must_use]
    pub fn unique(mut self, unique: InterimKey) -> Self {
        self.uniques.push(unique);
        self
    }

    /// Adds a check constraint.
    #[must_use]
    pub fn check(mut self, check: InterimCheck) -> Self {
        self.checks.push(check);
        self
    }

    /// Adds a view.
    #[must_use]
    pub fn view(mut self, view: View) -> Self {
        self.views.push(view);
        self
    }

    /// Reads a schema from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Produces the interim schema of a live database.
#[allow(async_fn_in_trait)]
pub trait Introspector {
    /// Reads the current schema.
    async fn introspect(&self) -> Result<InterimSchema>;
}

/// Produces the interim schema of a declarative schema definition.
pub trait SchemaSource {
    /// Parses the definition.
    fn interim(&self) -> Result<InterimSchema>;
}

/// A schema source backed by an interim schema JSON file.
#[derive(Debug, Clone)]
pub struct JsonSchemaFile {
    path: PathBuf,
}

impl JsonSchemaFile {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SchemaSource for JsonSchemaFile {
    fn interim(&self) -> Result<InterimSchema> {
        InterimSchema::load(&self.path)
    }
}

/// Builds a [`SqliteDdl`] from an interim schema.
///
/// Invalid entities are left out of the store and reported; the caller must
/// check the returned errors before diffing. Column-level PRIMARY KEY and
/// UNIQUE are turned into constraint entities, and SQLite's implicit
/// indexes are derived from the unique constraints.
pub fn interim_to_ddl(schema: &InterimSchema) -> (SqliteDdl, Vec<SchemaError>) {
    let mut ddl = SqliteDdl::new();
    let mut errors = Vec::new();

    for name in &schema.tables {
        if ddl.tables.insert(Table::new(name)).is_conflict() {
            errors.push(SchemaError::ConflictTable {
                table: name.clone(),
            });
        }
    }

    let known = |ddl: &SqliteDdl, table: &str| {
        ddl.tables.contains_key(&EntityKey::Name(table.to_string()))
    };
    let unknown = |kind: &str, name: &str, table: &str| SchemaError::UnknownTable {
        kind: kind.to_string(),
        name: name.to_string(),
        table: table.to_string(),
    };

    // ---- columns ----
    let mut inline_pks: Vec<(String, Vec<String>)> = Vec::new();
    let mut inline_uniques: Vec<InterimKey> = Vec::new();
    for column in &schema.columns {
        if !known(&ddl, &column.table) {
            errors.push(unknown("column", &column.name, &column.table));
            continue;
        }
        let entity = Column {
            table: column.table.clone(),
            name: column.name.clone(),
            ty: grammar::normalize_type(&column.ty),
            not_null: column.not_null,
            primary_key: false,
            autoincrement: column.autoincrement,
            default: column.default.as_deref().map(grammar::canonical_default),
            generated: column.generated.clone(),
            unique: false,
        };
        if ddl.columns.insert(entity).is_conflict() {
            errors.push(SchemaError::ConflictColumn {
                table: column.table.clone(),
                column: column.name.clone(),
            });
            continue;
        }
        if column.primary_key {
            match inline_pks.iter_mut().find(|(table, _)| *table == column.table) {
                Some((_, columns)) => columns.push(column.name.clone()),
                None => inline_pks.push((column.table.clone(), vec![column.name.clone()])),
            }
        }
        if column.unique || column.unique_name.is_some() {
            inline_uniques.push(InterimKey {
                table: column.table.clone(),
                name: column.unique_name.clone(),
                columns: vec![column.name.clone()],
            });
        }
    }

    for table in ddl.tables.iter() {
        if ddl.columns.list(|c| c.table == table.name).is_empty() {
            errors.push(SchemaError::TableNoColumns {
                table: table.name.clone(),
            });
        }
    }

    // ---- primary keys ----
    let inline_pks = inline_pks.into_iter().map(|(table, columns)| InterimKey {
        table,
        name: None,
        columns,
    });
    for pk in schema.pks.iter().cloned().chain(inline_pks) {
        let name = pk.name.clone().unwrap_or_else(|| grammar::pk_name(&pk.table));
        if !known(&ddl, &pk.table) {
            errors.push(unknown("primary key", &name, &pk.table));
            continue;
        }
        let table_has_pk = !ddl.pks.list(|it| it.table == pk.table).is_empty();
        let entity = PrimaryKey {
            table: pk.table.clone(),
            name: name.clone(),
            columns: pk.columns.clone(),
            name_explicit: pk.name.is_some(),
        };
        if table_has_pk || insert_named(&mut ddl.pks, entity) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictPk {
                table: pk.table.clone(),
                name,
            });
        }
    }

    // ---- unique constraints ----
    for unique in schema.uniques.iter().chain(inline_uniques.iter()) {
        let name = unique
            .name
            .clone()
            .unwrap_or_else(|| grammar::unique_name(&unique.table, &unique.columns));
        if !known(&ddl, &unique.table) {
            errors.push(unknown("unique constraint", &name, &unique.table));
            continue;
        }
        let entity = UniqueConstraint {
            table: unique.table.clone(),
            name: name.clone(),
            columns: unique.columns.clone(),
            name_explicit: unique.name.is_some(),
        };
        if insert_named(&mut ddl.uniques, entity) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictUnique {
                table: unique.table.clone(),
                name,
            });
        }
    }

    mirror_column_flags(&mut ddl);

    // ---- indexes ----
    for index in &schema.indexes {
        if index.origin == IndexOrigin::Auto {
            debug!(index = %index.name, "Skipping implicit index, derived from unique constraints");
            continue;
        }
        if !known(&ddl, &index.table) {
            errors.push(unknown("index", &index.name, &index.table));
            continue;
        }
        let entity = Index {
            table: index.table.clone(),
            name: index.name.clone(),
            columns: index.columns.clone(),
            is_unique: index.is_unique,
            where_clause: index.where_clause.clone(),
            origin: IndexOrigin::Manual,
        };
        if insert_named(&mut ddl.indexes, entity) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictIndex {
                table: index.table.clone(),
                name: index.name.clone(),
            });
        }
    }
    for index in auto_indexes(&ddl) {
        if insert_named(&mut ddl.indexes, index.clone()) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictIndex {
                table: index.table,
                name: index.name,
            });
        }
    }

    // ---- foreign keys ----
    for fk in &schema.fks {
        let name = fk.name.clone().unwrap_or_else(|| {
            grammar::fk_name(&fk.table, &fk.columns, &fk.table_to, &fk.columns_to)
        });
        if !known(&ddl, &fk.table) {
            errors.push(unknown("foreign key", &name, &fk.table));
            continue;
        }
        let entity = ForeignKey {
            table: fk.table.clone(),
            name: name.clone(),
            columns: fk.columns.clone(),
            table_to: fk.table_to.clone(),
            columns_to: fk.columns_to.clone(),
            on_delete: fk.on_delete,
            on_update: fk.on_update,
            name_explicit: fk.name.is_some(),
        };
        if insert_named(&mut ddl.fks, entity) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictFk {
                table: fk.table.clone(),
                name,
            });
        }
    }

    // ---- checks ----
    let mut check_counts: HashMap<&str, usize> = HashMap::new();
    for check in &schema.checks {
        let n = check_counts.entry(check.table.as_str()).or_insert(0);
        *n += 1;
        let name = check
            .name
            .clone()
            .unwrap_or_else(|| grammar::check_name(&check.table, *n));
        if !known(&ddl, &check.table) {
            errors.push(unknown("check constraint", &name, &check.table));
            continue;
        }
        let entity = CheckConstraint {
            table: check.table.clone(),
            name: name.clone(),
            value: check.value.clone(),
            name_explicit: check.name.is_some(),
        };
        if insert_named(&mut ddl.checks, entity) == InsertStatus::Conflict {
            errors.push(SchemaError::ConflictCheck {
                table: check.table.clone(),
                name,
            });
        }
    }

    // ---- views ----
    for view in &schema.views {
        if ddl.views.insert(view.clone()).is_conflict() {
            errors.push(SchemaError::ConflictView {
                view: view.name.clone(),
            });
        }
    }

    debug!(
        tables = ddl.tables.len(),
        columns = ddl.columns.len(),
        errors = errors.len(),
        "Built schema from interim"
    );
    (ddl, errors)
}

/// Like [`interim_to_ddl`], failing with [`DdlError::InvalidSchema`] if any
/// entity was rejected.
pub fn build_ddl(schema: &InterimSchema) -> Result<SqliteDdl> {
    let (ddl, errors) = interim_to_ddl(schema);
    if errors.is_empty() {
        Ok(ddl)
    } else {
        Err(DdlError::InvalidSchema(errors))
    }
}

/// Rebuilds a [`SqliteDdl`] from already validated entities, such as the
/// content of a snapshot.
pub fn ddl_from_entities(entities: Vec<SqliteEntity>) -> (SqliteDdl, Vec<SchemaError>) {
    let mut ddl = SqliteDdl::new();
    let mut errors = Vec::new();
    for entity in entities {
        let error = conflict_error(&entity);
        if ddl.entities().insert(entity) == InsertStatus::Conflict {
            errors.push(error);
        }
    }
    (ddl, errors)
}

fn conflict_error(entity: &SqliteEntity) -> SchemaError {
    match entity {
        SqliteEntity::Table(it) => SchemaError::ConflictTable {
            table: it.name.clone(),
        },
        SqliteEntity::Column(it) => SchemaError::ConflictColumn {
            table: it.table.clone(),
            column: it.name.clone(),
        },
        SqliteEntity::Index(it) => SchemaError::ConflictIndex {
            table: it.table.clone(),
            name: it.name.clone(),
        },
        SqliteEntity::ForeignKey(it) => SchemaError::ConflictFk {
            table: it.table.clone(),
            name: it.name.clone(),
        },
        SqliteEntity::PrimaryKey(it) => SchemaError::ConflictPk {
            table: it.table.clone(),
            name: it.name.clone(),
        },
        SqliteEntity::Unique(it) => SchemaError::ConflictUnique {
            table: it.table.clone(),
            name: it.name.clone(),
        },
        SqliteEntity::Check(it) => SchemaError::ConflictCheck {
            table: it.table.clone(),
            name: it.name.clone(),
        },
        SqliteEntity::View(it) => SchemaError::ConflictView {
            view: it.name.clone(),
        },
    }
}

/// Constraint and index names are unique schema-wide.
fn insert_named<T>(store: &mut crate::store::EntityStore<T>, entity: T) -> InsertStatus
where
    T: crate::store::Entity + Named,
{
    store
        .insert_unique_by(entity, |it| EntityKey::Name(it.name().to_string()))
        .status
}

trait Named {
    fn name(&self) -> &str;
}

macro_rules! named {
    ($($ty:ty),+) => {$(
        impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        }
    )+};
}

named!(Index, ForeignKey, PrimaryKey, UniqueConstraint, CheckConstraint);

/// Sets `Column::primary_key` and `Column::unique` from single-column
/// constraints.
pub(crate) fn mirror_column_flags(ddl: &mut SqliteDdl) {
    let single = |columns: &[String]| match columns {
        [only] => Some(only.clone()),
        _ => None,
    };
    let pk_columns: HashSet<(String, String)> = ddl
        .pks
        .iter()
        .filter_map(|pk| single(&pk.columns).map(|c| (pk.table.clone(), c)))
        .collect();
    let unique_columns: HashSet<(String, String)> = ddl
        .uniques
        .iter()
        .filter_map(|u| single(&u.columns).map(|c| (u.table.clone(), c)))
        .collect();

    ddl.columns.update(
        |_| true,
        |column| {
            let key = (column.table.clone(), column.name.clone());
            column.primary_key = pk_columns.contains(&key);
            column.unique = unique_columns.contains(&key);
            if !column.primary_key {
                column.autoincrement = false;
            }
        },
    );
}

/// Implicit indexes SQLite creates for the unique constraints of each table,
/// numbered in constraint order.
pub(crate) fn auto_indexes(ddl: &SqliteDdl) -> Vec<Index> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    ddl.uniques
        .iter()
        .map(|unique| {
            let n = counts.entry(unique.table.as_str()).or_insert(0);
            *n += 1;
            Index {
                table: unique.table.clone(),
                name: grammar::auto_index_name(&unique.table, *n),
                columns: unique.columns.iter().map(IndexColumn::column).collect(),
                is_unique: true,
                where_clause: None,
                origin: IndexOrigin::Auto,
            }
        })
        .collect()
}
