//! SQLite entity model.
//!
//! One struct per entity kind, each stored in its own [`EntityStore`] inside
//! [`SqliteDdl`]. Field names serialize in camelCase so snapshots keep a
//! stable JSON shape.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};

use crate::diff::{self, Change};
use crate::resolver::Renameable;
use crate::store::{Entity, EntityKey, EntityStore, InsertStatus, TableBound};

/// A table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Table name.
    pub name: String,
}

impl Table {
    /// Creates a table entity.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Default value of a column, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefault {
    /// Literal SQL text (quoted strings keep their quotes) or expression body.
    pub value: String,
    /// Whether `value` is an expression, rendered inside parentheses.
    pub is_expression: bool,
}

impl ColumnDefault {
    /// A literal default such as `0`, `'draft'` or `NULL`.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_expression: false,
        }
    }

    /// An expression default such as `CURRENT_TIMESTAMP`.
    #[must_use]
    pub fn expression(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            is_expression: true,
        }
    }
}

/// Storage of a generated column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratedKind {
    /// Computed on write and stored.
    Stored,
    /// Computed on read.
    Virtual,
}

impl GeneratedKind {
    /// SQL keyword.
    #[must_use]
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::Stored => "STORED",
            Self::Virtual => "VIRTUAL",
        }
    }
}

/// Generation clause of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generated {
    /// Generating expression.
    #[serde(rename = "as")]
    pub expression: String,
    /// Storage kind.
    #[serde(rename = "type")]
    pub kind: GeneratedKind,
}

impl Generated {
    /// Returns true for `STORED` generated columns.
    #[must_use]
    pub fn is_stored(&self) -> bool {
        self.kind == GeneratedKind::Stored
    }
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Declared type, normalized to lowercase.
    #[serde(rename = "type")]
    pub ty: String,
    /// NOT NULL constraint.
    pub not_null: bool,
    /// The column is the sole column of its table's primary key.
    pub primary_key: bool,
    /// AUTOINCREMENT (only meaningful with `primary_key`).
    pub autoincrement: bool,
    /// Default value.
    pub default: Option<ColumnDefault>,
    /// Generation clause.
    pub generated: Option<Generated>,
    /// The column carries a single-column unique constraint.
    pub unique: bool,
}

impl Column {
    /// Creates a nullable column without default.
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
        }
    }

    /// Sets NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    /// Sets the generation clause.
    #[must_use]
    pub fn generated(mut self, expression: impl Into<String>, kind: GeneratedKind) -> Self {
        self.generated = Some(Generated {
            expression: expression.into(),
            kind,
        });
        self
    }

    /// Returns true for STORED generated columns.
    #[must_use]
    pub fn is_stored_generated(&self) -> bool {
        self.generated.as_ref().is_some_and(Generated::is_stored)
    }
}

/// One entry of an index column list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexColumn {
    /// Column name, or expression text.
    pub value: String,
    /// Whether `value` is an expression.
    pub is_expression: bool,
}

impl IndexColumn {
    /// A plain column reference.
    #[must_use]
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            value: name.into(),
            is_expression: false,
        }
    }

    /// An expression.
    #[must_use]
    pub fn expression(sql: impl Into<String>) -> Self {
        Self {
            value: sql.into(),
            is_expression: true,
        }
    }
}

/// How an index came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOrigin {
    /// Declared with CREATE INDEX.
    #[default]
    Manual,
    /// Created implicitly by SQLite for a UNIQUE constraint.
    Auto,
}

/// An index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Owning table.
    pub table: String,
    /// Index name, unique schema-wide.
    pub name: String,
    /// Indexed columns and expressions.
    pub columns: Vec<IndexColumn>,
    /// UNIQUE index.
    pub is_unique: bool,
    /// Partial index condition.
    #[serde(rename = "where")]
    pub where_clause: Option<String>,
    /// Manual or implicit.
    pub origin: IndexOrigin,
}

impl Index {
    /// Creates a manual, non-unique index.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<IndexColumn>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            columns,
            is_unique: false,
            where_clause: None,
            origin: IndexOrigin::Manual,
        }
    }

    /// Marks the index as UNIQUE.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }

    /// Sets the partial index condition.
    #[must_use]
    pub fn where_clause(mut self, condition: impl Into<String>) -> Self {
        self.where_clause = Some(condition.into());
        self
    }
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    /// No action (error if referenced row is deleted/updated).
    #[default]
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    /// Referencing table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Referencing columns.
    pub columns: Vec<String>,
    /// Referenced table.
    pub table_to: String,
    /// Referenced columns.
    pub columns_to: Vec<String>,
    /// ON DELETE action.
    pub on_delete: ReferentialAction,
    /// ON UPDATE action.
    pub on_update: ReferentialAction,
    /// Whether `name` was declared, as opposed to derived.
    pub name_explicit: bool,
}

impl ForeignKey {
    /// Creates a foreign key with an explicit name and no actions.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
        table_to: impl Into<String>,
        columns_to: Vec<String>,
    ) -> Self {
        Self {
            table: table.into(),
            name: name.into(),
            columns,
            table_to: table_to.into(),
            columns_to,
            on_delete: ReferentialAction::NoAction,
            on_update: ReferentialAction::NoAction,
            name_explicit: true,
        }
    }
}

/// A primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKey {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Key columns.
    pub columns: Vec<String>,
    /// Whether `name` was declared, as opposed to derived.
    pub name_explicit: bool,
}

/// A unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueConstraint {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Constrained columns.
    pub columns: Vec<String>,
    /// Whether `name` was declared, as opposed to derived.
    pub name_explicit: bool,
}

/// A check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConstraint {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Check expression.
    pub value: String,
    /// Whether `name` was declared, as opposed to derived.
    #[serde(default)]
    pub name_explicit: bool,
}

/// A view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct View {
    /// View name.
    pub name: String,
    /// SELECT body.
    pub definition: Option<String>,
    /// The view exists in the database but is not managed here.
    pub is_existing: bool,
}

impl View {
    /// Creates a managed view.
    #[must_use]
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: Some(definition.into()),
            is_existing: false,
        }
    }
}

// ============================================================================
// Alters
// ============================================================================

/// Field-level changes of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAlter {
    /// Owning table.
    pub table: String,
    /// Column name.
    pub name: String,
    /// Type change.
    #[serde(rename = "type")]
    pub ty: Option<Change<String>>,
    /// NOT NULL change.
    pub not_null: Option<Change<bool>>,
    /// Primary key membership change.
    pub primary_key: Option<Change<bool>>,
    /// AUTOINCREMENT change.
    pub autoincrement: Option<Change<bool>>,
    /// Default change.
    pub default: Option<Change<Option<ColumnDefault>>>,
    /// Generation clause change.
    pub generated: Option<Change<Option<Generated>>>,
    /// Unique flag change.
    pub unique: Option<Change<bool>>,
}

impl ColumnAlter {
    /// Names of the changed fields.
    #[must_use]
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let flags = [
            ("type", self.ty.is_some()),
            ("notNull", self.not_null.is_some()),
            ("primaryKey", self.primary_key.is_some()),
            ("autoincrement", self.autoincrement.is_some()),
            ("default", self.default.is_some()),
            ("generated", self.generated.is_some()),
            ("unique", self.unique.is_some()),
        ];
        for (name, changed) in flags {
            if changed {
                fields.push(name);
            }
        }
        fields
    }

    /// Changed fields that SQLite cannot alter in place.
    #[must_use]
    pub fn recreate_fields(&self) -> Vec<&'static str> {
        self.fields()
            .into_iter()
            .filter(|field| *field != "generated")
            .collect()
    }

    /// Returns true when a column turns into a STORED generated column.
    #[must_use]
    pub fn becomes_stored(&self) -> bool {
        self.generated.as_ref().is_some_and(|change| {
            let was_stored = change.from.as_ref().is_some_and(Generated::is_stored);
            let is_stored = change.to.as_ref().is_some_and(Generated::is_stored);
            is_stored && !was_stored
        })
    }
}

/// Field-level changes of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexAlter {
    /// Owning table.
    pub table: String,
    /// Index name.
    pub name: String,
    /// Column list change.
    pub columns: Option<Change<Vec<IndexColumn>>>,
    /// UNIQUE change.
    pub is_unique: Option<Change<bool>>,
    /// Condition change.
    #[serde(rename = "where")]
    pub where_clause: Option<Change<Option<String>>>,
    /// Origin change.
    pub origin: Option<Change<IndexOrigin>>,
}

/// Field-level changes of a foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyAlter {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Referencing columns change.
    pub columns: Option<Change<Vec<String>>>,
    /// Referenced table change.
    pub table_to: Option<Change<String>>,
    /// Referenced columns change.
    pub columns_to: Option<Change<Vec<String>>>,
    /// ON DELETE change.
    pub on_delete: Option<Change<ReferentialAction>>,
    /// ON UPDATE change.
    pub on_update: Option<Change<ReferentialAction>>,
}

/// Field-level changes of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryKeyAlter {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Key columns change.
    pub columns: Option<Change<Vec<String>>>,
}

/// Field-level changes of a unique constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueAlter {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Constrained columns change.
    pub columns: Option<Change<Vec<String>>>,
}

/// Field-level changes of a check constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAlter {
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
    /// Expression change.
    pub value: Option<Change<String>>,
}

/// Field-level changes of a view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewAlter {
    /// View name.
    pub name: String,
    /// Definition change.
    pub definition: Option<Change<Option<String>>>,
    /// Management change.
    pub is_existing: Option<Change<bool>>,
}

/// Builds a table-bound alter struct, returning `None` when no listed field
/// changed.
macro_rules! table_alter {
    ($alter:ident, $from:expr, $to:expr, { $($field:ident),+ $(,)? }) => {{
        let (from, to) = ($from, $to);
        let alter = $alter {
            table: to.table.clone(),
            name: to.name.clone(),
            $($field: Change::between(&from.$field, &to.$field),)+
        };
        ($(alter.$field.is_some())||+).then_some(alter)
    }};
}

// ============================================================================
// Entity impls
// ============================================================================

impl Entity for Table {
    const KIND: &'static str = "table";
    type Alter = Infallible;

    fn key(&self) -> EntityKey {
        EntityKey::Name(self.name.clone())
    }

    fn alter(_from: &Self, _to: &Self) -> Option<Self::Alter> {
        None
    }
}

impl Entity for Column {
    const KIND: &'static str = "column";
    type Alter = ColumnAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<ColumnAlter> {
        table_alter!(ColumnAlter, from, to, {
            ty, not_null, primary_key, autoincrement, default, generated, unique,
        })
    }
}

impl Entity for Index {
    const KIND: &'static str = "index";
    type Alter = IndexAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<IndexAlter> {
        table_alter!(IndexAlter, from, to, { columns, is_unique, where_clause, origin })
    }
}

impl Entity for ForeignKey {
    const KIND: &'static str = "foreign key";
    type Alter = ForeignKeyAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<ForeignKeyAlter> {
        table_alter!(ForeignKeyAlter, from, to, {
            columns, table_to, columns_to, on_delete, on_update,
        })
    }
}

impl Entity for PrimaryKey {
    const KIND: &'static str = "primary key";
    type Alter = PrimaryKeyAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<PrimaryKeyAlter> {
        table_alter!(PrimaryKeyAlter, from, to, { columns })
    }
}

impl Entity for UniqueConstraint {
    const KIND: &'static str = "unique constraint";
    type Alter = UniqueAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<UniqueAlter> {
        table_alter!(UniqueAlter, from, to, { columns })
    }
}

impl Entity for CheckConstraint {
    const KIND: &'static str = "check constraint";
    type Alter = CheckAlter;

    fn key(&self) -> EntityKey {
        EntityKey::scoped(&self.table, &self.name)
    }

    fn alter(from: &Self, to: &Self) -> Option<CheckAlter> {
        table_alter!(CheckAlter, from, to, { value })
    }
}

impl Entity for View {
    const KIND: &'static str = "view";
    type Alter = ViewAlter;

    fn key(&self) -> EntityKey {
        EntityKey::Name(self.name.clone())
    }

    fn alter(from: &Self, to: &Self) -> Option<ViewAlter> {
        let alter = ViewAlter {
            name: to.name.clone(),
            definition: Change::between(&from.definition, &to.definition),
            is_existing: Change::between(&from.is_existing, &to.is_existing),
        };
        (alter.definition.is_some() || alter.is_existing.is_some()).then_some(alter)
    }
}

macro_rules! table_bound {
    ($($ty:ty),+) => {$(
        impl TableBound for $ty {
            fn table(&self) -> &str {
                &self.table
            }

            fn set_table(&mut self, table: &str) {
                self.table = table.to_string();
            }
        }
    )+};
}

table_bound!(Column, Index, ForeignKey, PrimaryKey, UniqueConstraint, CheckConstraint);

impl Renameable for Table {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Renameable for Column {
    fn name(&self) -> &str {
        &self.name
    }

    fn scope(&self) -> Option<&str> {
        Some(&self.table)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Any SQLite entity, tagged with its kind. Snapshot serialization unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "entityType")]
pub enum SqliteEntity {
    /// A table.
    #[serde(rename = "tables")]
    Table(Table),
    /// A column.
    #[serde(rename = "columns")]
    Column(Column),
    /// An index.
    #[serde(rename = "indexes")]
    Index(Index),
    /// A foreign key.
    #[serde(rename = "fks")]
    ForeignKey(ForeignKey),
    /// A primary key.
    #[serde(rename = "pks")]
    PrimaryKey(PrimaryKey),
    /// A unique constraint.
    #[serde(rename = "uniques")]
    Unique(UniqueConstraint),
    /// A check constraint.
    #[serde(rename = "checks")]
    Check(CheckConstraint),
    /// A view.
    #[serde(rename = "views")]
    View(View),
}

/// All entity stores of one SQLite schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqliteDdl {
    /// Tables.
    pub tables: EntityStore<Table>,
    /// Columns.
    pub columns: EntityStore<Column>,
    /// Indexes, manual and implicit.
    pub indexes: EntityStore<Index>,
    /// Foreign keys.
    pub fks: EntityStore<ForeignKey>,
    /// Primary keys.
    pub pks: EntityStore<PrimaryKey>,
    /// Unique constraints.
    pub uniques: EntityStore<UniqueConstraint>,
    /// Check constraints.
    pub checks: EntityStore<CheckConstraint>,
    /// Views.
    pub views: EntityStore<View>,
}

/// Cross-kind view over the table-bound stores of a [`SqliteDdl`].
pub struct Entities<'a> {
    ddl: &'a mut SqliteDdl,
}

fn retarget<T: Entity + TableBound>(store: &mut EntityStore<T>, from: &str, to: &str) -> usize {
    store.update(|it| it.table() == from, |it| it.set_table(to))
}

impl Entities<'_> {
    /// Every entity bound to `table`, tables and views excluded.
    #[must_use]
    pub fn list_for_table(&self, table: &str) -> Vec<SqliteEntity> {
        let ddl = &*self.ddl;
        let on = |t: &str| t == table;
        let mut out = Vec::new();
        out.extend(
            ddl.columns
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::Column),
        );
        out.extend(
            ddl.indexes
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::Index),
        );
        out.extend(
            ddl.fks
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::ForeignKey),
        );
        out.extend(
            ddl.pks
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::PrimaryKey),
        );
        out.extend(
            ddl.uniques
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::Unique),
        );
        out.extend(
            ddl.checks
                .list(|it| on(&it.table))
                .into_iter()
                .cloned()
                .map(SqliteEntity::Check),
        );
        out
    }

    /// Moves every entity bound to `from` onto `to`. Returns the number of
    /// entities touched.
    pub fn update_table(&mut self, from: &str, to: &str) -> usize {
        let ddl = &mut *self.ddl;
        retarget(&mut ddl.columns, from, to)
            + retarget(&mut ddl.indexes, from, to)
            + retarget(&mut ddl.fks, from, to)
            + retarget(&mut ddl.pks, from, to)
            + retarget(&mut ddl.uniques, from, to)
            + retarget(&mut ddl.checks, from, to)
    }

    /// Inserts an entity of any kind under its natural key.
    pub fn insert(&mut self, entity: SqliteEntity) -> InsertStatus {
        let ddl = &mut *self.ddl;
        match entity {
            SqliteEntity::Table(it) => ddl.tables.insert(it).status,
            SqliteEntity::Column(it) => ddl.columns.insert(it).status,
            SqliteEntity::Index(it) => ddl.indexes.insert(it).status,
            SqliteEntity::ForeignKey(it) => ddl.fks.insert(it).status,
            SqliteEntity::PrimaryKey(it) => ddl.pks.insert(it).status,
            SqliteEntity::Unique(it) => ddl.uniques.insert(it).status,
            SqliteEntity::Check(it) => ddl.checks.insert(it).status,
            SqliteEntity::View(it) => ddl.views.insert(it).status,
        }
    }
}

/// A table together with everything bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableFull {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key.
    pub pk: Option<PrimaryKey>,
    /// Foreign keys.
    pub fks: Vec<ForeignKey>,
    /// Unique constraints.
    pub uniques: Vec<UniqueConstraint>,
    /// Check constraints.
    pub checks: Vec<CheckConstraint>,
    /// Indexes, manual and implicit.
    pub indexes: Vec<Index>,
}

impl TableFull {
    /// Looks a column up by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Every kind's alters between two schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alters {
    /// Column alters.
    pub columns: Vec<ColumnAlter>,
    /// Index alters.
    pub indexes: Vec<IndexAlter>,
    /// Foreign key alters.
    pub fks: Vec<ForeignKeyAlter>,
    /// Primary key alters.
    pub pks: Vec<PrimaryKeyAlter>,
    /// Unique constraint alters.
    pub uniques: Vec<UniqueAlter>,
    /// Check constraint alters.
    pub checks: Vec<CheckAlter>,
    /// View alters.
    pub views: Vec<ViewAlter>,
}

impl Alters {
    /// Returns true when no entity changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.indexes.is_empty()
            && self.fks.is_empty()
            && self.pks.is_empty()
            && self.uniques.is_empty()
            && self.checks.is_empty()
            && self.views.is_empty()
    }
}

impl SqliteDdl {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cross-kind view for code that works on "everything bound to a table".
    pub fn entities(&mut self) -> Entities<'_> {
        Entities { ddl: self }
    }

    /// Builds the full shape of a table, or `None` if the table is unknown.
    #[must_use]
    pub fn table_full(&self, name: &str) -> Option<TableFull> {
        self.tables.get(&EntityKey::Name(name.to_string()))?;
        let on = |t: &str| t == name;
        Some(TableFull {
            name: name.to_string(),
            columns: self.columns.list(|it| on(&it.table)).into_iter().cloned().collect(),
            pk: self.pks.list(|it| on(&it.table)).into_iter().next().cloned(),
            fks: self.fks.list(|it| on(&it.table)).into_iter().cloned().collect(),
            uniques: self.uniques.list(|it| on(&it.table)).into_iter().cloned().collect(),
            checks: self.checks.list(|it| on(&it.table)).into_iter().cloned().collect(),
            indexes: self.indexes.list(|it| on(&it.table)).into_iter().cloned().collect(),
        })
    }

    /// Flattens the schema into tagged entities, kind by kind.
    #[must_use]
    pub fn to_entities(&self) -> Vec<SqliteEntity> {
        let mut out = Vec::new();
        out.extend(self.tables.iter().cloned().map(SqliteEntity::Table));
        out.extend(self.columns.iter().cloned().map(SqliteEntity::Column));
        out.extend(self.indexes.iter().cloned().map(SqliteEntity::Index));
        out.extend(self.fks.iter().cloned().map(SqliteEntity::ForeignKey));
        out.extend(self.pks.iter().cloned().map(SqliteEntity::PrimaryKey));
        out.extend(self.uniques.iter().cloned().map(SqliteEntity::Unique));
        out.extend(self.checks.iter().cloned().map(SqliteEntity::Check));
        out.extend(self.views.iter().cloned().map(SqliteEntity::View));
        out
    }

    /// Computes every kind's alters from `self` to `to`.
    #[must_use]
    pub fn alters(&self, to: &SqliteDdl) -> Alters {
        Alters {
            columns: diff::alters(&self.columns, &to.columns),
            indexes: diff::alters(&self.indexes, &to.indexes),
            fks: diff::alters(&self.fks, &to.fks),
            pks: diff::alters(&self.pks, &to.pks),
            uniques: diff::alters(&self.uniques, &to.uniques),
            checks: diff::alters(&self.checks, &to.checks),
            views: diff::alters(&self.views, &to.views),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ddl() -> SqliteDdl {
        let mut ddl = SqliteDdl::new();
        ddl.tables.insert(Table::new("users"));
        ddl.tables.insert(Table::new("posts"));
        ddl.columns.insert(Column::new("users", "id", "integer"));
        ddl.columns.insert(Column::new("posts", "id", "integer"));
        ddl.columns.insert(Column::new("posts", "author_id", "integer"));
        ddl.fks.insert(ForeignKey::new(
            "posts",
            "posts_author_fk",
            vec!["author_id".into()],
            "users",
            vec!["id".into()],
        ));
        ddl.indexes.insert(Index::new(
            "posts",
            "posts_author_idx",
            vec![IndexColumn::column("author_id")],
        ));
        ddl
    }

    #[test]
    fn test_entities_update_table_touches_every_kind() {
        let mut ddl = ddl();
        let touched = ddl.entities().update_table("posts", "articles");

        assert_eq!(touched, 4);
        assert!(ddl.entities().list_for_table("posts").is_empty());
        assert_eq!(ddl.entities().list_for_table("articles").len(), 4);
        // Referenced table is not a binding.
        assert_eq!(ddl.fks.iter().next().unwrap().table_to, "users");
    }

    #[test]
    fn test_table_full_collects_bound_entities() {
        let ddl = ddl();
        let posts = ddl.table_full("posts").unwrap();

        assert_eq!(posts.columns.len(), 2);
        assert_eq!(posts.fks.len(), 1);
        assert_eq!(posts.indexes.len(), 1);
        assert!(posts.column("author_id").is_some());
        assert!(ddl.table_full("missing").is_none());
    }

    #[test]
    fn test_entity_json_shape() {
        let column = Column::new("users", "created_at", "text")
            .not_null()
            .default_value(ColumnDefault::expression("CURRENT_TIMESTAMP"));
        let json = serde_json::to_value(SqliteEntity::Column(column)).unwrap();

        assert_eq!(json["entityType"], "columns");
        assert_eq!(json["type"], "text");
        assert_eq!(json["notNull"], true);
        assert_eq!(json["default"]["isExpression"], true);
    }

    #[test]
    fn test_column_alter_fields() {
        let from = Column::new("users", "age", "integer");
        let to = Column::new("users", "age", "text")
            .not_null()
            .generated("1", GeneratedKind::Stored);

        let alter = Column::alter(&from, &to).unwrap();
        assert_eq!(alter.fields(), vec!["type", "notNull", "generated"]);
        assert_eq!(alter.recreate_fields(), vec!["type", "notNull"]);
        assert!(alter.becomes_stored());
        assert!(Column::alter(&from, &from).is_none());
    }

    #[test]
    fn test_view_alter() {
        let from = View::new("active", "SELECT 1");
        let mut to = View::new("active", "SELECT 2");
        to.is_existing = true;

        let alter = View::alter(&from, &to).unwrap();
        assert!(alter.definition.is_some());
        assert_eq!(
            alter.is_existing,
            Some(Change {
                from: false,
                to: true
            })
        );
    }

    #[test]
    fn test_ddl_alters_of_identical_schema_are_empty() {
        let ddl = ddl();
        assert!(ddl.alters(&ddl).is_empty());
    }
}
