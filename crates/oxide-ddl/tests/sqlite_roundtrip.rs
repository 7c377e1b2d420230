//! Applies planned migrations to an in-memory SQLite database.

use oxide_ddl::prelude::*;
use oxide_ddl::sqlite::ddl::{IndexColumn, View};
use oxide_ddl::sqlite::interim::{InterimColumn, InterimForeignKey, InterimIndex};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

async fn apply(pool: &SqlitePool, result: &DiffResult) {
    for sql in &result.sql_statements {
        sqlx::query(sql)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("{sql}: {e}"));
    }
}

async fn migrate(from: SqliteDdl, to: SqliteDdl, renames: &[&str]) -> DiffResult {
    let resolver = PredeterminedResolver::parse(renames).unwrap();
    ddl_diff(from, to, &resolver, &resolver, DiffMode::Generate)
        .await
        .unwrap()
}

fn author_fk(table: &str) -> InterimForeignKey {
    InterimForeignKey {
        table: table.into(),
        name: None,
        columns: vec!["author_id".into()],
        table_to: "users".into(),
        columns_to: vec!["id".into()],
        on_delete: Default::default(),
        on_update: Default::default(),
    }
}

fn before() -> InterimSchema {
    InterimSchema::new()
        .table(
            "users",
            vec![
                InterimColumn::new("users", "id", "integer").primary_key(),
                InterimColumn::new("users", "name", "text"),
            ],
        )
        .table(
            "posts",
            vec![
                InterimColumn::new("posts", "id", "integer").primary_key(),
                InterimColumn::new("posts", "author_id", "integer"),
                InterimColumn::new("posts", "title", "text"),
            ],
        )
        .fk(author_fk("posts"))
}

fn after() -> InterimSchema {
    InterimSchema::new()
        .table(
            "users",
            vec![
                InterimColumn::new("users", "id", "integer").primary_key(),
                InterimColumn::new("users", "full_name", "text").not_null(),
                InterimColumn::new("users", "email", "text").unique(),
            ],
        )
        .table(
            "articles",
            vec![
                InterimColumn::new("articles", "id", "integer").primary_key(),
                InterimColumn::new("articles", "author_id", "integer"),
                InterimColumn::new("articles", "title", "text"),
            ],
        )
        .fk(author_fk("articles"))
        .index(InterimIndex {
            table: "articles".into(),
            name: "articles_title_idx".into(),
            columns: vec![IndexColumn::column("title")],
            is_unique: false,
            where_clause: None,
            origin: Default::default(),
        })
        .view(View::new("article_titles", "SELECT title FROM articles"))
}

#[tokio::test]
async fn test_migration_preserves_rows() {
    let pool = create_test_pool().await;

    let create = migrate(SqliteDdl::new(), build_ddl(&before()).unwrap(), &[]).await;
    assert_eq!(
        create.statements.iter().map(JsonStatement::kind).collect::<Vec<_>>(),
        vec!["create_table", "create_table"]
    );
    apply(&pool, &create).await;

    sqlx::query("INSERT INTO users (id, name) VALUES (1, 'Ada')")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO posts (id, author_id, title) VALUES (1, 1, 'Notes')")
        .execute(&pool)
        .await
        .unwrap();

    let change = migrate(
        build_ddl(&before()).unwrap(),
        build_ddl(&after()).unwrap(),
        &["posts->articles", "users.name->users.full_name"],
    )
    .await;
    assert_eq!(
        change.statements.iter().map(JsonStatement::kind).collect::<Vec<_>>(),
        vec!["rename_table", "recreate_table", "create_index", "create_view"]
    );
    apply(&pool, &change).await;

    let users: Vec<(i64, String, Option<String>)> =
        sqlx::query_as("SELECT id, full_name, email FROM users")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(users, vec![(1, "Ada".to_string(), None)]);

    let titles: Vec<(String,)> = sqlx::query_as("SELECT title FROM article_titles")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(titles, vec![("Notes".to_string(),)]);

    let indexes: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = 'articles'",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(indexes, vec![("articles_title_idx".to_string(),)]);

    let violations = sqlx::query("PRAGMA foreign_key_check")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert!(violations.is_empty());
}

#[tokio::test]
async fn test_unique_constraint_is_enforced_after_recreate() {
    let pool = create_test_pool().await;
    apply(
        &pool,
        &migrate(SqliteDdl::new(), build_ddl(&before()).unwrap(), &[]).await,
    )
    .await;
    apply(
        &pool,
        &migrate(
            build_ddl(&before()).unwrap(),
            build_ddl(&after()).unwrap(),
            &["posts->articles", "users.name->users.full_name"],
        )
        .await,
    )
    .await;

    sqlx::query("INSERT INTO users (id, full_name, email) VALUES (1, 'Ada', 'ada@example.com')")
        .execute(&pool)
        .await
        .unwrap();
    let duplicate =
        sqlx::query("INSERT INTO users (id, full_name, email) VALUES (2, 'Bob', 'ada@example.com')")
            .execute(&pool)
            .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn test_expression_default_column_is_added_to_a_populated_table() {
    let pool = create_test_pool().await;
    let table = |columns: Vec<InterimColumn>| {
        build_ddl(&InterimSchema::new().table("t", columns)).unwrap()
    };
    let id = || InterimColumn::new("t", "id", "integer").primary_key();

    apply(&pool, &migrate(SqliteDdl::new(), table(vec![id()]), &[]).await).await;
    sqlx::query("INSERT INTO t (id) VALUES (1)")
        .execute(&pool)
        .await
        .unwrap();

    let change = migrate(
        table(vec![id()]),
        table(vec![
            id(),
            InterimColumn::new("t", "created_at", "text").default("(CURRENT_TIMESTAMP)"),
        ]),
        &[],
    )
    .await;
    assert_eq!(
        change.statements.iter().map(JsonStatement::kind).collect::<Vec<_>>(),
        vec!["recreate_table"]
    );
    apply(&pool, &change).await;

    let rows: Vec<(i64, Option<String>)> = sqlx::query_as("SELECT id, created_at FROM t")
        .fetch_all(&pool)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, 1);
    assert!(rows[0].1.is_some());
}
