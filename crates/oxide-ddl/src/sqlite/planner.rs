//! Statement planner for SQLite.
//!
//! Compares two [`SqliteDdl`]s and produces the ordered statements that turn
//! the first into the second:
//!
//! 1. tables are diffed and handed to the table resolver; renames are
//!    propagated before anything else is compared
//! 2. columns are diffed per table and handed to the column resolver
//! 3. dependent kinds (indexes, keys, checks) are diffed against the
//!    propagated schema
//! 4. every change SQLite cannot express with ALTER TABLE lands in a
//!    [`RecreatePlan`]; planned tables are rebuilt instead of altered
//! 5. statements are emitted in a fixed order and converted to SQL

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::convertor::ConvertorRegistry;
use super::ddl::{Column, ForeignKey, Index, IndexOrigin, SqliteDdl, Table, View};
use super::propagate;
use super::statements::{JsonStatement, RecreateReason, RenamedColumn, StatementGroup};
use crate::config::{DiffConfig, DiffMode};
use crate::diff::{self, Change, DiffType, Diffed};
use crate::error::Result;
use crate::resolver::{
    resolve_checked, ChainResolver, HeuristicResolver, PredeterminedResolver, Renamed, Resolver,
    ResolverInput,
};
use crate::store::EntityKey;

/// Outcome of a diff run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffResult {
    /// Planned statements, in execution order.
    pub statements: Vec<JsonStatement>,
    /// Flat SQL list.
    pub sql_statements: Vec<String>,
    /// Each statement with its SQL.
    pub groups: Vec<StatementGroup>,
    /// Resolved renames, `from->to`.
    pub renames: Vec<String>,
    /// Caveats for changes that may fail or behave differently than expected.
    /// Each one is logged at warn level by the planner.
    pub warnings: Vec<String>,
}

impl DiffResult {
    /// Returns true when the schemas are equivalent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Tables that must be rebuilt, with the reasons collected for each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecreatePlan {
    tables: Vec<(String, Vec<RecreateReason>)>,
}

impl RecreatePlan {
    /// Records a reason to rebuild `table`.
    pub fn add(&mut self, table: &str, reason: RecreateReason) {
        match self.tables.iter_mut().find(|(name, _)| name == table) {
            Some((_, reasons)) => {
                if !reasons.contains(&reason) {
                    reasons.push(reason);
                }
            }
            None => self.tables.push((table.to_string(), vec![reason])),
        }
    }

    /// Forgets `table`.
    pub fn remove(&mut self, table: &str) {
        self.tables.retain(|(name, _)| name != table);
    }

    /// Returns true if `table` is rebuilt.
    #[must_use]
    pub fn contains(&self, table: &str) -> bool {
        self.tables.iter().any(|(name, _)| name == table)
    }

    /// Reasons collected for `table`.
    #[must_use]
    pub fn reasons(&self, table: &str) -> Option<&[RecreateReason]> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, reasons)| reasons.as_slice())
    }

    /// Returns true if no table is rebuilt.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Applies a rename to the target schema as well, unless the old name has
/// been reused there by a new entity.
fn mirror_table_rename(ddl2: &mut SqliteDdl, from: &str, to: &str) {
    if ddl2.tables.contains_key(&EntityKey::Name(from.to_string())) {
        debug!(table = %from, "Old table name is reused, target schema left as is");
        return;
    }
    propagate::rename_table(ddl2, from, to);
}

fn mirror_column_rename(ddl2: &mut SqliteDdl, table: &str, from: &str, to: &str) {
    if ddl2.columns.contains_key(&EntityKey::scoped(table, from)) {
        debug!(
            table = %table,
            column = %from,
            "Old column name is reused, target schema left as is"
        );
        return;
    }
    propagate::rename_column(ddl2, table, from, to);
}

fn table_of<T>(diffs: &[Diffed<T>], table: impl Fn(&T) -> &str) -> Vec<(DiffType, String, &T)> {
    diffs
        .iter()
        .map(|d| (d.diff_type, table(&d.entity).to_string(), &d.entity))
        .collect()
}

/// Computes the statements turning `ddl1` into `ddl2`.
///
/// `tables` is consulted once with every created/dropped table, `columns`
/// once per table that exists on both sides and has created/dropped
/// columns. A failing or cancelled resolver aborts the run.
pub async fn ddl_diff<TR, CR>(
    ddl1: SqliteDdl,
    ddl2: SqliteDdl,
    tables: &TR,
    columns: &CR,
    mode: DiffMode,
) -> Result<DiffResult>
where
    TR: Resolver<Table>,
    CR: Resolver<Column>,
{
    let mut ddl1 = ddl1;
    let mut ddl2 = ddl2;
    let mut renames = Vec::new();
    let mut warnings = Vec::new();

    // ---- tables ----
    let (created, deleted) = diff::split(diff::diff(&ddl1.tables, &ddl2.tables));
    let resolved_tables = resolve_checked(tables, ResolverInput { created, deleted }).await?;
    for rename in &resolved_tables.renamed {
        let touched = propagate::rename_table(&mut ddl1, &rename.from.name, &rename.to.name);
        mirror_table_rename(&mut ddl2, &rename.from.name, &rename.to.name);
        info!(from = %rename.from.name, to = %rename.to.name, touched, "Table renamed");
        renames.push(rename.label());
    }
    let created_tables: HashSet<&str> = resolved_tables
        .created
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    let deleted_tables: HashSet<&str> = resolved_tables
        .deleted
        .iter()
        .map(|t| t.name.as_str())
        .collect();

    // ---- columns ----
    let mut column_groups: Vec<(String, ResolverInput<Column>)> = Vec::new();
    for d in diff::diff(&ddl1.columns, &ddl2.columns) {
        let table = d.entity.table.clone();
        if created_tables.contains(table.as_str()) || deleted_tables.contains(table.as_str()) {
            continue;
        }
        let index = match column_groups.iter().position(|(t, _)| *t == table) {
            Some(index) => index,
            None => {
                column_groups.push((
                    table,
                    ResolverInput {
                        created: Vec::new(),
                        deleted: Vec::new(),
                    },
                ));
                column_groups.len() - 1
            }
        };
        let input = &mut column_groups[index].1;
        match d.diff_type {
            DiffType::Create => input.created.push(d.entity),
            DiffType::Drop => input.deleted.push(d.entity),
        }
    }

    let mut columns_to_create: Vec<Column> = Vec::new();
    let mut columns_to_delete: Vec<Column> = Vec::new();
    let mut column_renames: Vec<Renamed<Column>> = Vec::new();
    for (table, input) in column_groups {
        let resolved = resolve_checked(columns, input).await?;
        for rename in &resolved.renamed {
            let touched =
                propagate::rename_column(&mut ddl1, &table, &rename.from.name, &rename.to.name);
            mirror_column_rename(&mut ddl2, &table, &rename.from.name, &rename.to.name);
            info!(
                table = %table,
                from = %rename.from.name,
                to = %rename.to.name,
                touched,
                "Column renamed"
            );
            renames.push(rename.label());
        }
        columns_to_create.extend(resolved.created);
        columns_to_delete.extend(resolved.deleted);
        column_renames.extend(resolved.renamed);
    }

    // ---- dependent kinds, against the propagated schema ----
    let indexes_diff = diff::diff(&ddl1.indexes, &ddl2.indexes);
    let pks_diff = diff::diff(&ddl1.pks, &ddl2.pks);
    let uniques_diff = diff::diff(&ddl1.uniques, &ddl2.uniques);
    let checks_diff = diff::diff(&ddl1.checks, &ddl2.checks);
    let fks_diff = diff::diff(&ddl1.fks, &ddl2.fks);
    let alters = ddl1.alters(&ddl2);

    // Single-column foreign keys on added columns travel with ADD COLUMN.
    let added: HashSet<(&str, &str)> = columns_to_create
        .iter()
        .filter(|c| !c.is_stored_generated())
        .map(|c| (c.table.as_str(), c.name.as_str()))
        .collect();
    let mut inline_fks: HashMap<(String, String), ForeignKey> = HashMap::new();
    for d in &fks_diff {
        let fk = &d.entity;
        if let (DiffType::Create, [column]) = (d.diff_type, fk.columns.as_slice()) {
            if added.contains(&(fk.table.as_str(), column.as_str())) {
                inline_fks.insert((fk.table.clone(), column.clone()), fk.clone());
            }
        }
    }

    // ---- recreate policy ----
    let mut plan = RecreatePlan::default();
    for (_, table, pk) in table_of(&pks_diff, |pk| pk.table.as_str()) {
        plan.add(&table, RecreateReason::PrimaryKeyChanged { name: pk.name.clone() });
    }
    for alter in &alters.pks {
        plan.add(&alter.table, RecreateReason::PrimaryKeyChanged { name: alter.name.clone() });
    }
    for (_, table, fk) in table_of(&fks_diff, |fk| fk.table.as_str()) {
        let inline = fk.columns.len() == 1
            && inline_fks
                .get(&(table.clone(), fk.columns[0].clone()))
                .is_some_and(|it| it == fk);
        if !inline {
            plan.add(&table, RecreateReason::ForeignKeyChanged { name: fk.name.clone() });
        }
    }
    for alter in &alters.fks {
        plan.add(&alter.table, RecreateReason::ForeignKeyChanged { name: alter.name.clone() });
    }
    for (_, table, unique) in table_of(&uniques_diff, |u| u.table.as_str()) {
        plan.add(&table, RecreateReason::UniqueChanged { name: unique.name.clone() });
    }
    for alter in &alters.uniques {
        plan.add(&alter.table, RecreateReason::UniqueChanged { name: alter.name.clone() });
    }
    for (_, table, check) in table_of(&checks_diff, |c| c.table.as_str()) {
        plan.add(&table, RecreateReason::CheckChanged { name: check.name.clone() });
    }
    for alter in &alters.checks {
        plan.add(&alter.table, RecreateReason::CheckChanged { name: alter.name.clone() });
    }
    for (_, table, index) in table_of(&indexes_diff, |i| i.table.as_str()) {
        if index.origin == IndexOrigin::Auto {
            plan.add(&table, RecreateReason::AutoIndexChanged { name: index.name.clone() });
        }
    }
    let auto_index_alters: HashSet<(&str, &str)> = alters
        .indexes
        .iter()
        .filter(|alter| {
            let key = EntityKey::scoped(&alter.table, &alter.name);
            [&ddl1, &ddl2].iter().any(|ddl| {
                ddl.indexes
                    .get(&key)
                    .is_some_and(|i| i.origin == IndexOrigin::Auto)
            })
        })
        .map(|alter| (alter.table.as_str(), alter.name.as_str()))
        .collect();
    for (table, name) in &auto_index_alters {
        plan.add(table, RecreateReason::AutoIndexChanged { name: name.to_string() });
    }
    for column in columns_to_create.iter().filter(|c| c.is_stored_generated()) {
        plan.add(
            &column.table,
            RecreateReason::StoredColumnAdded {
                column: column.name.clone(),
            },
        );
        warnings.push(format!(
            "Cannot ALTER TABLE ADD a STORED generated column '{}' to '{}'; \
             the table is recreated",
            column.name, column.table
        ));
    }
    // ADD COLUMN only accepts constant defaults.
    for column in columns_to_create
        .iter()
        .filter(|c| c.default.as_ref().is_some_and(|d| d.is_expression))
    {
        plan.add(
            &column.table,
            RecreateReason::ExpressionDefaultAdded {
                column: column.name.clone(),
            },
        );
        warnings.push(format!(
            "Cannot ALTER TABLE ADD column '{}' to '{}' with a non-constant default; \
             the table is recreated",
            column.name, column.table
        ));
    }
    for alter in &alters.columns {
        if alter.becomes_stored() {
            plan.add(
                &alter.table,
                RecreateReason::ColumnBecameStored {
                    column: alter.name.clone(),
                },
            );
        }
        let fields = alter.recreate_fields();
        if !fields.is_empty() {
            plan.add(
                &alter.table,
                RecreateReason::ColumnAltered {
                    column: alter.name.clone(),
                    fields: fields.into_iter().map(str::to_string).collect(),
                },
            );
        }
    }
    for table in created_tables.iter().chain(deleted_tables.iter()) {
        plan.remove(table);
    }

    // ---- statements ----
    let mut statements = Vec::new();

    for table in &resolved_tables.created {
        if let Some(full) = ddl2.table_full(&table.name) {
            statements.push(JsonStatement::CreateTable { table: full });
        }
    }

    for rename in &resolved_tables.renamed {
        statements.push(JsonStatement::RenameTable {
            from: rename.from.name.clone(),
            to: rename.to.name.clone(),
        });
    }

    for rename in column_renames.iter().filter(|r| !plan.contains(&r.to.table)) {
        statements.push(JsonStatement::RenameColumn {
            table: rename.to.table.clone(),
            from: rename.from.name.clone(),
            to: rename.to.name.clone(),
        });
    }

    for column in columns_to_create.iter().filter(|c| !plan.contains(&c.table)) {
        if column.not_null && column.default.is_none() && column.generated.is_none() {
            warnings.push(format!(
                "Column '{}' is added to '{}' as NOT NULL without a default value; \
                 SQLite rejects this ALTER TABLE",
                column.name, column.table
            ));
        }
        statements.push(JsonStatement::AddColumn {
            column: column.clone(),
            fk: inline_fks
                .get(&(column.table.clone(), column.name.clone()))
                .cloned(),
        });
    }

    for alter in alters
        .columns
        .iter()
        .filter(|a| a.generated.is_some() && !plan.contains(&a.table))
    {
        let Some(column) = ddl2.columns.get(&EntityKey::scoped(&alter.table, &alter.name)) else {
            continue;
        };
        let is_pk = ddl2
            .pks
            .iter()
            .any(|pk| pk.table == alter.table && pk.columns.contains(&alter.name));
        statements.push(JsonStatement::RecreateColumn {
            column: column.clone(),
            is_pk,
        });
    }

    let mut recreated: Vec<&str> = Vec::new();
    for table in ddl2.tables.iter().filter(|t| plan.contains(&t.name)) {
        let (Some(from), Some(to)) = (ddl1.table_full(&table.name), ddl2.table_full(&table.name))
        else {
            continue;
        };
        let reasons = plan.reasons(&table.name).unwrap_or_default().to_vec();
        for column in to
            .columns
            .iter()
            .filter(|c| c.not_null && c.default.is_none() && c.generated.is_none())
            .filter(|c| from.column(&c.name).is_none())
        {
            warnings.push(format!(
                "Column '{}' is added to '{}' as NOT NULL without a default value; \
                 copying existing rows into the recreated table will fail",
                column.name, table.name
            ));
        }
        let summary: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        info!(table = %table.name, reasons = %summary.join("; "), "Recreating table");
        statements.push(JsonStatement::RecreateTable {
            from,
            to,
            reasons,
            renamed_columns: column_renames
                .iter()
                .filter(|r| r.to.table == table.name)
                .map(|r| RenamedColumn {
                    from: r.from.name.clone(),
                    to: r.to.name.clone(),
                })
                .collect(),
        });
        recreated.push(&table.name);
    }

    let manual = |index: &Index| index.origin == IndexOrigin::Manual;
    let index_alter_keys: Vec<EntityKey> = alters
        .indexes
        .iter()
        .filter(|a| !auto_index_alters.contains(&(a.table.as_str(), a.name.as_str())))
        .filter(|a| !plan.contains(&a.table))
        .map(|a| EntityKey::scoped(&a.table, &a.name))
        .collect();

    for d in &indexes_diff {
        let index = &d.entity;
        if d.diff_type == DiffType::Drop
            && manual(index)
            && !plan.contains(&index.table)
            && !deleted_tables.contains(index.table.as_str())
        {
            statements.push(JsonStatement::DropIndex { index: index.clone() });
        }
    }
    for key in &index_alter_keys {
        if let Some(index) = ddl1.indexes.get(key) {
            statements.push(JsonStatement::DropIndex { index: index.clone() });
        }
    }

    for d in &indexes_diff {
        let index = &d.entity;
        if d.diff_type == DiffType::Create && manual(index) && !plan.contains(&index.table) {
            statements.push(JsonStatement::CreateIndex { index: index.clone() });
        }
    }
    for key in &index_alter_keys {
        if let Some(index) = ddl2.indexes.get(key) {
            statements.push(JsonStatement::CreateIndex { index: index.clone() });
        }
    }
    for table in &recreated {
        for index in ddl2.indexes.list(|i| i.table == *table && manual(i)) {
            statements.push(JsonStatement::CreateIndex { index: index.clone() });
        }
    }

    for table in &resolved_tables.deleted {
        statements.push(JsonStatement::DropTable {
            table_name: table.name.clone(),
        });
    }

    for column in columns_to_delete.iter().filter(|c| !plan.contains(&c.table)) {
        statements.push(JsonStatement::DropColumn {
            column: column.clone(),
        });
    }

    let (views_created, views_dropped) = diff::split(diff::diff(&ddl1.views, &ddl2.views));
    let mut drop_views: Vec<View> = views_dropped.into_iter().filter(|v| !v.is_existing).collect();
    let mut create_views: Vec<View> = views_created
        .into_iter()
        .filter(|v| !v.is_existing)
        .collect();
    for alter in &alters.views {
        let key = EntityKey::Name(alter.name.clone());
        let (Some(old), Some(new)) = (ddl1.views.get(&key), ddl2.views.get(&key)) else {
            continue;
        };
        match &alter.is_existing {
            Some(Change { from: false, to: true }) => drop_views.push(old.clone()),
            Some(Change { from: true, to: false }) => create_views.push(new.clone()),
            _ if alter.definition.is_some() && !new.is_existing => {
                if mode == DiffMode::Push {
                    debug!(
                        view = %alter.name,
                        "View definition changed, not re-created in push mode"
                    );
                } else {
                    drop_views.push(old.clone());
                    create_views.push(new.clone());
                }
            }
            _ => {}
        }
    }
    statements.extend(drop_views.into_iter().map(|view| JsonStatement::DropView { view }));
    statements.extend(create_views.into_iter().map(|view| JsonStatement::CreateView { view }));

    let (sql_statements, groups) = ConvertorRegistry::sqlite().from_json(&statements)?;
    for warning in &warnings {
        warn!("{}", warning);
    }
    info!(
        statements = statements.len(),
        sql = sql_statements.len(),
        renames = renames.len(),
        "Planned schema changes"
    );

    Ok(DiffResult {
        statements,
        sql_statements,
        groups,
        renames,
        warnings,
    })
}

fn column_shapes(ddl: &SqliteDdl) -> HashMap<String, Vec<(String, String)>> {
    let mut shapes: HashMap<String, Vec<(String, String)>> = HashMap::new();
    for column in ddl.columns.iter() {
        shapes
            .entry(column.table.clone())
            .or_default()
            .push((column.name.clone(), column.ty.clone()));
    }
    for shape in shapes.values_mut() {
        shape.sort();
    }
    shapes
}

/// Runs [`ddl_diff`] with resolvers built from `config`: explicit renames
/// first, then similarity-based detection when enabled. Detected table
/// renames require identical column names and types.
pub async fn ddl_diff_with_config(
    ddl1: SqliteDdl,
    ddl2: SqliteDdl,
    config: &DiffConfig,
) -> Result<DiffResult> {
    let explicit = PredeterminedResolver::parse(&config.renames)?;
    if !config.detect_renames {
        return ddl_diff(ddl1, ddl2, &explicit, &explicit, config.mode).await;
    }

    let before = column_shapes(&ddl1);
    let after = column_shapes(&ddl2);
    let tables = ChainResolver::new(
        explicit.clone(),
        HeuristicResolver::<Table>::new(config.rename_threshold).with_compat(
            move |old: &Table, new: &Table| before.get(&old.name) == after.get(&new.name),
        ),
    );
    let columns = ChainResolver::new(
        explicit,
        HeuristicResolver::<Column>::new(config.rename_threshold)
            .with_compat(|old: &Column, new: &Column| old.ty == new.ty),
    );
    ddl_diff(ddl1, ddl2, &tables, &columns, config.mode).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DdlError;
    use crate::resolver::{PromptChoice, PromptResolver, RenamePrompt};
    use crate::sqlite::ddl::{GeneratedKind, IndexColumn};
    use crate::sqlite::interim::{
        interim_to_ddl, InterimColumn, InterimForeignKey, InterimIndex, InterimKey,
        InterimSchema,
    };

    fn ddl(schema: InterimSchema) -> SqliteDdl {
        let (ddl, errors) = interim_to_ddl(&schema);
        assert!(errors.is_empty(), "{errors:?}");
        ddl
    }

    fn users(extra: Vec<InterimColumn>) -> InterimSchema {
        let mut columns = vec![
            InterimColumn::new("users", "id", "integer").primary_key(),
            InterimColumn::new("users", "name", "text"),
        ];
        columns.extend(extra);
        InterimSchema::new().table("users", columns)
    }

    async fn plain(a: InterimSchema, b: InterimSchema) -> DiffResult {
        let none = PredeterminedResolver::none();
        ddl_diff(ddl(a), ddl(b), &none, &none, DiffMode::Generate)
            .await
            .unwrap()
    }

    fn kinds(result: &DiffResult) -> Vec<&'static str> {
        result.statements.iter().map(JsonStatement::kind).collect()
    }

    fn email_index() -> InterimIndex {
        InterimIndex {
            table: "users".into(),
            name: "users_email_idx".into(),
            columns: vec![IndexColumn::column("email")],
            is_unique: false,
            where_clause: None,
            origin: IndexOrigin::Manual,
        }
    }

    #[test]
    fn test_recreate_plan_accumulates_reasons() {
        let mut plan = RecreatePlan::default();
        let reason = RecreateReason::UniqueChanged { name: "u".into() };
        plan.add("users", reason.clone());
        plan.add("users", reason.clone());
        plan.add("users", RecreateReason::CheckChanged { name: "c".into() });
        plan.add("posts", reason);

        assert_eq!(plan.reasons("users").map(<[_]>::len), Some(2));
        plan.remove("posts");
        assert!(!plan.contains("posts"));
        assert!(!plan.is_empty());
    }

    #[tokio::test]
    async fn test_identical_schemas_produce_nothing() {
        let schema = users(vec![InterimColumn::new("users", "email", "text").unique()])
            .index(email_index());
        let result = plain(schema.clone(), schema).await;
        assert!(result.is_empty());
        assert!(result.sql_statements.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_new_index_does_not_recreate() {
        let a = users(vec![InterimColumn::new("users", "email", "text")]);
        let b = a.clone().index(email_index());
        let result = plain(a, b).await;
        assert_eq!(kinds(&result), vec!["create_index"]);
    }

    #[tokio::test]
    async fn test_unique_change_recreates_table_and_its_indexes() {
        let a = users(vec![InterimColumn::new("users", "email", "text")]).index(email_index());
        let b = users(vec![InterimColumn::new("users", "email", "text").unique()])
            .index(email_index());
        let result = plain(a, b).await;

        assert_eq!(kinds(&result), vec!["recreate_table", "create_index"]);
        let JsonStatement::RecreateTable { reasons, .. } = &result.statements[0] else {
            panic!("expected recreate_table");
        };
        assert!(reasons.contains(&RecreateReason::UniqueChanged {
            name: "users_email_unique".into()
        }));
        assert!(reasons.contains(&RecreateReason::AutoIndexChanged {
            name: "sqlite_autoindex_users_1".into()
        }));
    }

    #[tokio::test]
    async fn test_fk_on_new_column_rides_with_add_column() {
        let posts = |extra: Vec<InterimColumn>| {
            let mut columns = vec![InterimColumn::new("posts", "id", "integer").primary_key()];
            columns.extend(extra);
            users(vec![]).table("posts", columns)
        };
        let a = posts(vec![]);
        let b = posts(vec![InterimColumn::new("posts", "author_id", "integer")]).fk(
            InterimForeignKey {
                table: "posts".into(),
                name: None,
                columns: vec!["author_id".into()],
                table_to: "users".into(),
                columns_to: vec!["id".into()],
                on_delete: Default::default(),
                on_update: Default::default(),
            },
        );

        let result = plain(a, b).await;
        assert_eq!(kinds(&result), vec!["add_column"]);
        assert_eq!(
            result.sql_statements,
            vec![
                "ALTER TABLE \"posts\" ADD COLUMN \"author_id\" integer REFERENCES \"users\"(\"id\");"
            ]
        );
    }

    #[tokio::test]
    async fn test_created_and_dropped_tables_are_not_recreated() {
        let a = users(vec![]).table(
            "legacy",
            vec![InterimColumn::new("legacy", "id", "integer").unique()],
        );
        let b = users(vec![])
            .table(
                "tags",
                vec![InterimColumn::new("tags", "id", "integer").primary_key()],
            )
            .index(InterimIndex {
                table: "tags".into(),
                name: "tags_idx".into(),
                columns: vec![IndexColumn::column("id")],
                is_unique: false,
                where_clause: None,
                origin: IndexOrigin::Manual,
            });

        let result = plain(a, b).await;
        assert_eq!(kinds(&result), vec!["create_table", "create_index", "drop_table"]);
    }

    #[tokio::test]
    async fn test_generated_column_changes() {
        let column = |kind| {
            InterimColumn::new("users", "upper_name", "text").generated(
                crate::sqlite::ddl::Generated {
                    expression: "upper(name)".into(),
                    kind,
                },
            )
        };
        let result = plain(users(vec![]), users(vec![column(GeneratedKind::Stored)])).await;
        assert_eq!(kinds(&result), vec!["recreate_table"]);
        assert_eq!(result.warnings.len(), 1);

        let result = plain(users(vec![]), users(vec![column(GeneratedKind::Virtual)])).await;
        assert_eq!(kinds(&result), vec!["add_column"]);

        let mut changed = column(GeneratedKind::Virtual);
        changed.generated = Some(crate::sqlite::ddl::Generated {
            expression: "lower(name)".into(),
            kind: GeneratedKind::Virtual,
        });
        let result = plain(
            users(vec![column(GeneratedKind::Virtual)]),
            users(vec![changed]),
        )
        .await;
        assert_eq!(kinds(&result), vec!["recreate_column"]);

        let result = plain(
            users(vec![column(GeneratedKind::Virtual)]),
            users(vec![column(GeneratedKind::Stored)]),
        )
        .await;
        let JsonStatement::RecreateTable { reasons, .. } = &result.statements[0] else {
            panic!("expected recreate_table");
        };
        assert_eq!(
            reasons,
            &vec![RecreateReason::ColumnBecameStored {
                column: "upper_name".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_composite_pk_change_recreates() {
        let members = |pk: Vec<&str>| {
            InterimSchema::new()
                .table(
                    "members",
                    vec![
                        InterimColumn::new("members", "org", "integer"),
                        InterimColumn::new("members", "user", "integer"),
                    ],
                )
                .pk(InterimKey {
                    table: "members".into(),
                    name: None,
                    columns: pk.into_iter().map(String::from).collect(),
                })
        };
        let result = plain(members(vec!["org"]), members(vec!["org", "user"])).await;
        assert_eq!(kinds(&result), vec!["recreate_table"]);
    }

    #[tokio::test]
    async fn test_views() {
        let with_view = |definition: &str, existing: bool| {
            let mut view = View::new("active_users", definition);
            view.is_existing = existing;
            users(vec![]).view(view)
        };

        let result = plain(with_view("SELECT 1", false), with_view("SELECT 2", false)).await;
        assert_eq!(kinds(&result), vec!["drop_view", "create_view"]);

        let none = PredeterminedResolver::none();
        let pushed = ddl_diff(
            ddl(with_view("SELECT 1", false)),
            ddl(with_view("SELECT 2", false)),
            &none,
            &none,
            DiffMode::Push,
        )
        .await
        .unwrap();
        assert!(pushed.is_empty());

        let result = plain(with_view("SELECT 1", false), with_view("SELECT 1", true)).await;
        assert_eq!(kinds(&result), vec!["drop_view"]);

        let result = plain(with_view("SELECT 1", true), with_view("SELECT 1", false)).await;
        assert_eq!(kinds(&result), vec!["create_view"]);

        let result = plain(users(vec![]), with_view("SELECT 1", true)).await;
        assert!(result.is_empty());
    }

    struct Cancel;

    impl RenamePrompt<Table> for Cancel {
        async fn choose(&self, _created: &Table, _deleted: &[Table]) -> Option<PromptChoice> {
            None
        }
    }

    #[tokio::test]
    async fn test_cancelled_resolver_aborts_without_statements() {
        let a = users(vec![]);
        let b = InterimSchema::new().table(
            "accounts",
            vec![InterimColumn::new("accounts", "id", "integer").primary_key()],
        );
        let result = ddl_diff(
            ddl(a),
            ddl(b),
            &PromptResolver::new(Cancel),
            &PredeterminedResolver::none(),
            DiffMode::Generate,
        )
        .await;
        assert!(matches!(result, Err(DdlError::ResolverCancelled)));
    }

    #[tokio::test]
    async fn test_detected_renames() {
        let a = users(vec![InterimColumn::new("users", "email", "text")]);
        let b = InterimSchema::new().table(
            "user",
            vec![
                InterimColumn::new("user", "id", "integer").primary_key(),
                InterimColumn::new("user", "name", "text"),
                InterimColumn::new("user", "email", "text"),
            ],
        );
        let config = DiffConfig::new().detect_renames(0.5);
        let result = ddl_diff_with_config(ddl(a), ddl(b), &config).await.unwrap();

        assert_eq!(result.renames, vec!["users->user"]);
        assert_eq!(kinds(&result), vec!["rename_table"]);
    }
}
