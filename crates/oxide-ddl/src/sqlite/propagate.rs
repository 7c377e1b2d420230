//! Rename propagation.
//!
//! Once a rename is resolved, every entity that refers to the old name is
//! rewritten so that dependent kinds diff cleanly. Derived constraint names
//! (those not declared explicitly) embed table and column names, so they are
//! regenerated as well.

use super::ddl::{IndexOrigin, SqliteDdl};
use super::grammar;

fn rename_in(columns: &mut [String], from: &str, to: &str) {
    for column in columns.iter_mut().filter(|c| c.as_str() == from) {
        *column = to.to_string();
    }
}

fn mentions(columns: &[String], name: &str) -> bool {
    columns.iter().any(|c| c == name)
}

/// Renames a table and rewrites every reference to it. Returns the number of
/// entities touched.
pub fn rename_table(ddl: &mut SqliteDdl, from: &str, to: &str) -> usize {
    let mut touched = ddl.tables.update(|t| t.name == from, |t| t.name = to.to_string());
    touched += ddl
        .fks
        .update(|fk| fk.table_to == from, |fk| fk.table_to = to.to_string());
    touched += ddl.entities().update_table(from, to);
    refresh_derived_names(ddl, to);
    touched
}

/// Renames a column of `table` and rewrites every reference to it. Returns
/// the number of entities touched.
pub fn rename_column(ddl: &mut SqliteDdl, table: &str, from: &str, to: &str) -> usize {
    let mut touched = ddl.columns.update(
        |c| c.table == table && c.name == from,
        |c| c.name = to.to_string(),
    );

    touched += ddl.indexes.update(
        |index| {
            index.table == table
                && (index.columns.iter().any(|c| {
                    if c.is_expression {
                        grammar::rename_identifier(&c.value, from, to) != c.value
                    } else {
                        c.value == from
                    }
                }) || index
                    .where_clause
                    .as_ref()
                    .is_some_and(|w| grammar::rename_identifier(w, from, to) != *w))
        },
        |index| {
            for column in &mut index.columns {
                if column.is_expression {
                    column.value = grammar::rename_identifier(&column.value, from, to);
                } else if column.value == from {
                    column.value = to.to_string();
                }
            }
            if let Some(condition) = &mut index.where_clause {
                *condition = grammar::rename_identifier(condition, from, to);
            }
        },
    );

    touched += ddl.fks.update(
        |fk| {
            (fk.table == table && mentions(&fk.columns, from))
                || (fk.table_to == table && mentions(&fk.columns_to, from))
        },
        |fk| {
            if fk.table == table {
                rename_in(&mut fk.columns, from, to);
            }
            if fk.table_to == table {
                rename_in(&mut fk.columns_to, from, to);
            }
        },
    );
    touched += ddl.pks.update(
        |pk| pk.table == table && mentions(&pk.columns, from),
        |pk| rename_in(&mut pk.columns, from, to),
    );
    touched += ddl.uniques.update(
        |u| u.table == table && mentions(&u.columns, from),
        |u| rename_in(&mut u.columns, from, to),
    );
    touched += ddl.checks.update(
        |c| c.table == table && grammar::rename_identifier(&c.value, from, to) != c.value,
        |c| c.value = grammar::rename_identifier(&c.value, from, to),
    );

    refresh_derived_names(ddl, table);
    touched
}

/// Regenerates the derived names of constraints on (or pointing at) `table`
/// and renumbers its unnamed checks and implicit indexes.
fn refresh_derived_names(ddl: &mut SqliteDdl, table: &str) {
    ddl.pks.update(
        |pk| pk.table == table && !pk.name_explicit,
        |pk| pk.name = grammar::pk_name(table),
    );
    ddl.uniques.update(
        |u| u.table == table && !u.name_explicit,
        |u| u.name = grammar::unique_name(&u.table, &u.columns),
    );
    ddl.fks.update(
        |fk| !fk.name_explicit && (fk.table == table || fk.table_to == table),
        |fk| fk.name = grammar::fk_name(&fk.table, &fk.columns, &fk.table_to, &fk.columns_to),
    );

    let mut n = 0;
    ddl.checks.update(
        |check| check.table == table,
        |check| {
            n += 1;
            if !check.name_explicit {
                check.name = grammar::check_name(table, n);
            }
        },
    );

    let mut n = 0;
    ddl.indexes.update(
        |index| index.table == table && index.origin == IndexOrigin::Auto,
        |index| {
            n += 1;
            index.name = grammar::auto_index_name(table, n);
        },
    );
}
