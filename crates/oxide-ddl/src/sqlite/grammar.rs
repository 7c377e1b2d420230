//! SQLite grammar rules shared by schema construction, propagation and SQL
//! generation: type affinity, default canonicalization, identifier quoting
//! and derived constraint names.

use std::sync::LazyLock;

use regex::Regex;

use super::ddl::ColumnDefault;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(\d+(\.\d*)?|\.\d+)([eE][+-]?\d+)?$").expect("valid number regex")
});

static STRING_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid string literal regex"));

/// Keywords SQLite accepts as bare default expressions.
const TIME_KEYWORDS: [&str; 3] = ["CURRENT_TIME", "CURRENT_DATE", "CURRENT_TIMESTAMP"];

/// SQLite column type affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeAffinity {
    /// INTEGER affinity.
    Integer,
    /// TEXT affinity.
    Text,
    /// BLOB affinity (also declared-type-less columns).
    Blob,
    /// REAL affinity.
    Real,
    /// NUMERIC affinity.
    Numeric,
}

/// Determines the affinity of a declared type, following the rules of
/// section 3.1 of the SQLite datatype documentation.
#[must_use]
pub fn affinity(ty: &str) -> TypeAffinity {
    let ty = ty.to_ascii_uppercase();
    if ty.contains("INT") {
        TypeAffinity::Integer
    } else if ty.contains("CHAR") || ty.contains("CLOB") || ty.contains("TEXT") {
        TypeAffinity::Text
    } else if ty.contains("BLOB") || ty.trim().is_empty() {
        TypeAffinity::Blob
    } else if ty.contains("REAL") || ty.contains("FLOA") || ty.contains("DOUB") {
        TypeAffinity::Real
    } else {
        TypeAffinity::Numeric
    }
}

/// Normalizes a declared type: lowercase, single spaces, no padding inside
/// parentheses.
#[must_use]
pub fn normalize_type(ty: &str) -> String {
    ty.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase()
        .replace(" (", "(")
        .replace("( ", "(")
        .replace(" )", ")")
        .replace(" ,", ",")
        .replace(", ", ",")
}

/// Quotes an identifier with double quotes.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string as an SQL literal.
#[must_use]
pub fn string_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Returns the content of `sql` without one pair of enclosing parentheses,
/// if the first `(` is closed by the last `)`.
fn strip_outer_parens(sql: &str) -> Option<&str> {
    let inner = sql.strip_prefix('(')?.strip_suffix(')')?;
    let mut depth = 0i32;
    let mut in_string = false;
    for c in inner.chars() {
        match c {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(inner)
}

fn is_string_literal(sql: &str) -> bool {
    STRING_LITERAL
        .find(sql)
        .is_some_and(|m| m.start() == 0 && m.end() == sql.len())
}

fn is_blob_literal(sql: &str) -> bool {
    (sql.starts_with("x'") || sql.starts_with("X'")) && is_string_literal(&sql[1..])
}

/// Canonicalizes the raw text of a DEFAULT clause, as written in a schema
/// definition or reported by `PRAGMA table_info`.
///
/// Enclosing parentheses are stripped, numbers lose a leading `+`, booleans
/// become `1`/`0`, `NULL` and the time keywords are uppercased. Anything
/// else is kept verbatim as an expression.
#[must_use]
pub fn canonical_default(raw: &str) -> ColumnDefault {
    let mut value = raw.trim();
    while let Some(inner) = strip_outer_parens(value) {
        value = inner.trim();
    }

    if is_string_literal(value) {
        return ColumnDefault::literal(value);
    }
    if is_blob_literal(value) {
        return ColumnDefault::literal(format!("X{}", &value[1..]));
    }
    if NUMBER.is_match(value) {
        return ColumnDefault::literal(value.trim_start_matches('+'));
    }

    let upper = value.to_ascii_uppercase();
    match upper.as_str() {
        "NULL" => ColumnDefault::literal("NULL"),
        "TRUE" => ColumnDefault::literal("1"),
        "FALSE" => ColumnDefault::literal("0"),
        keyword if TIME_KEYWORDS.contains(&keyword) => ColumnDefault::expression(upper),
        _ => ColumnDefault::expression(value.split_whitespace().collect::<Vec<_>>().join(" ")),
    }
}

/// Renders a default value for a DEFAULT clause.
#[must_use]
pub fn render_default(default: &ColumnDefault) -> String {
    if default.is_expression {
        format!("({})", default.value)
    } else {
        default.value.clone()
    }
}

/// Replaces whole-identifier occurrences of `from` with `to` in an SQL
/// expression. String literals are left untouched; matching is
/// case-insensitive like SQLite identifiers.
#[must_use]
pub fn rename_identifier(sql: &str, from: &str, to: &str) -> String {
    let Ok(pattern) = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(from))) else {
        return sql.to_string();
    };

    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for literal in STRING_LITERAL.find_iter(sql) {
        out.push_str(&pattern.replace_all(&sql[last..literal.start()], regex::NoExpand(to)));
        out.push_str(literal.as_str());
        last = literal.end();
    }
    out.push_str(&pattern.replace_all(&sql[last..], regex::NoExpand(to)));
    out
}

// ============================================================================
// Derived names
// ============================================================================

/// Name of a primary key without declared name.
#[must_use]
pub fn pk_name(table: &str) -> String {
    format!("{table}_pk")
}

/// Name of a unique constraint without declared name.
#[must_use]
pub fn unique_name(table: &str, columns: &[String]) -> String {
    format!("{table}_{}_unique", columns.join("_"))
}

/// Name of a foreign key without declared name.
#[must_use]
pub fn fk_name(table: &str, columns: &[String], table_to: &str, columns_to: &[String]) -> String {
    format!(
        "fk_{table}_{}_{table_to}_{}_fk",
        columns.join("_"),
        columns_to.join("_")
    )
}

/// Name of the `n`-th (1-based) check constraint without declared name.
#[must_use]
pub fn check_name(table: &str, n: usize) -> String {
    format!("{table}_check_{n}")
}

/// Name SQLite gives the `n`-th (1-based) implicit index of a table.
#[must_use]
pub fn auto_index_name(table: &str, n: usize) -> String {
    format!("sqlite_autoindex_{table}_{n}")
}

/// Temporary name of a table while it is being recreated.
#[must_use]
pub fn recreate_shadow_name(table: &str) -> String {
    format!("__new_{table}")
}
