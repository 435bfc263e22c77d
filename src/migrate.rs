//! Idempotent schema creation.
//!
//! Every statement is `CREATE ... IF NOT EXISTS`, so `econ init` (and every
//! command that calls [`run_migrations`]) can run against an existing store.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Reference tables. Vocabulary tables share one layout.
const REFERENCE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS usageflags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS valueflags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS flags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS itemclasses (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS itemtags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
];

/// Edge tables keyed by record key, so they outlive re-extraction.
const EDGE_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS element_categories (
        element_key TEXT NOT NULL,
        category_id INTEGER NOT NULL,
        PRIMARY KEY (element_key, category_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_tags (
        element_key TEXT NOT NULL,
        tag_id INTEGER NOT NULL,
        PRIMARY KEY (element_key, tag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_usageflags (
        element_key TEXT NOT NULL,
        usageflag_id INTEGER NOT NULL,
        PRIMARY KEY (element_key, usageflag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_valueflags (
        element_key TEXT NOT NULL,
        valueflag_id INTEGER NOT NULL,
        PRIMARY KEY (element_key, valueflag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_flags (
        element_key TEXT NOT NULL,
        flag_id INTEGER NOT NULL,
        value INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (element_key, flag_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_itemclasses (
        element_key TEXT PRIMARY KEY,
        itemclass_id INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS element_itemtags (
        element_key TEXT NOT NULL,
        itemtag_id INTEGER NOT NULL,
        PRIMARY KEY (element_key, itemtag_id)
    )
    "#,
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn apply_schema(pool: &SqlitePool) -> Result<()> {
    // Create records table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS type_elements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            element_key TEXT NOT NULL UNIQUE,
            name TEXT,
            source_file TEXT NOT NULL,
            source_folder TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create fields table. NULL field_order values never collide under
    // UNIQUE, so single-occurrence uniqueness is kept by the write path.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS type_element_fields (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            element_key TEXT NOT NULL,
            field_name TEXT NOT NULL,
            field_value TEXT,
            field_order INTEGER,
            attributes_json TEXT,
            UNIQUE (element_key, field_name, field_order)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_type_element_fields_key ON type_element_fields(element_key)",
    )
    .execute(pool)
    .await?;

    for statement in REFERENCE_TABLES.iter().chain(EDGE_TABLES) {
        sqlx::query(statement).execute(pool).await?;
    }

    // Create edit history ledger
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS edit_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            element_key TEXT NOT NULL,
            field_name TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            created_row INTEGER NOT NULL DEFAULT 0,
            changed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_edit_history_key ON edit_history(element_key, id)",
    )
    .execute(pool)
    .await?;

    // Create per-file sync checkpoints
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_files (
            source_folder TEXT NOT NULL,
            source_file TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            record_count INTEGER NOT NULL,
            synced_at INTEGER NOT NULL,
            PRIMARY KEY (source_folder, source_file)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
