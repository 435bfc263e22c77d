//! Store maintenance: table browsing and row edits, duplicate removal,
//! table wipes, and merging records from another store or from a loose XML
//! file.
//!
//! Every mutating entry point runs behind [`backup::guarded`], so a failure
//! leaves the store as it was before the command started.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use economy_harness_core::extract::extract_str;
use economy_harness_core::normalize::{record_key, Vocabulary};
use economy_harness_core::store::RecordStore;
use economy_harness_core::Error;

use crate::backup;
use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Provenance folder of records merged from loose XML files.
pub const MERGED_FOLDER: &str = "merged";

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub keep_id: i64,
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub rows: i64,
}

/// One page of a table, every value rendered as text (`None` for NULL).
#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub total: i64,
}

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub records_imported: usize,
    pub records_skipped: usize,
    pub groupings_created: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct MergeReport {
    pub added: usize,
    pub skipped: usize,
}

/// Double-quoted SQL identifier.
fn quoted(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

async fn has_table(pool: &SqlitePool, table: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Columns of a user table. Unknown and internal tables are rejected, so
/// the returned names are safe to interpolate (quoted) into SQL.
async fn table_columns(pool: &SqlitePool, table: &str) -> Result<Vec<String>> {
    if table.starts_with("sqlite_") {
        return Err(Error::validation(format!("'{}' is an internal table", table)).into());
    }
    if !has_table(pool, table).await? {
        return Err(Error::not_found(format!("table '{}'", table)).into());
    }
    let rows = sqlx::query(&format!("PRAGMA table_info({})", quoted(table)))
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(|r| r.get::<String, _>("name")).collect())
}

fn ensure_id_column(columns: &[String], table: &str, purpose: &str) -> Result<()> {
    if columns.iter().any(|c| c == "id") {
        return Ok(());
    }
    Err(Error::validation(format!("table '{}' has no id column; {}", table, purpose)).into())
}

async fn grouping_columns(pool: &SqlitePool, table: &str) -> Result<String> {
    let columns = table_columns(pool, table).await?;
    ensure_id_column(&columns, table, "duplicates cannot be ranked")?;
    let rest: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != "id")
        .map(|c| quoted(c))
        .collect();
    Ok(rest.join(", "))
}

/// Groups of rows equal in every column except `id`.
pub async fn find_duplicates(pool: &SqlitePool, table: &str) -> Result<Vec<DuplicateGroup>> {
    let group_by = grouping_columns(pool, table).await?;
    let table = quoted(table);
    let sql = format!(
        r#"
        SELECT MIN(id) AS keep_id, GROUP_CONCAT(id) AS ids
        FROM {table}
        GROUP BY {group_by}
        HAVING COUNT(*) > 1
        ORDER BY keep_id
        "#
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| {
            let ids: String = row.get("ids");
            let mut ids: Vec<i64> = ids.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            ids.sort_unstable();
            DuplicateGroup {
                keep_id: row.get("keep_id"),
                ids,
            }
        })
        .collect())
}

/// Delete duplicates, keeping the lowest id of each group. Returns the
/// number of rows deleted.
pub async fn dedupe(pool: &SqlitePool, table: &str) -> Result<u64> {
    let group_by = grouping_columns(pool, table).await?;
    let table = quoted(table);
    let sql = format!(
        r#"
        DELETE FROM {table}
        WHERE id NOT IN (SELECT MIN(id) FROM {table} GROUP BY {group_by})
        "#
    );
    let result = sqlx::query(&sql).execute(pool).await?;
    Ok(result.rows_affected())
}

/// Whether `econ sync` rebuilds the rows of `table` from source files.
fn is_synced_table(table: &str) -> bool {
    matches!(table, "type_elements" | "type_element_fields" | "element_flags")
        || Vocabulary::ALL.iter().any(|v| v.edge_table() == table)
}

/// Drop the per-file sync checkpoints after rows of a synced table were
/// removed or rewritten, so the next plain sync ingests every file again.
async fn invalidate_checkpoints(pool: &SqlitePool, table: &str) -> Result<()> {
    if !is_synced_table(table) || !has_table(pool, "source_files").await? {
        return Ok(());
    }
    let cleared = sqlx::query("DELETE FROM source_files")
        .execute(pool)
        .await?
        .rows_affected();
    tracing::info!(table, cleared, "sync checkpoints cleared");
    Ok(())
}

pub async fn delete_all(pool: &SqlitePool, table: &str) -> Result<u64> {
    table_columns(pool, table).await?;
    let result = sqlx::query(&format!("DELETE FROM {}", quoted(table)))
        .execute(pool)
        .await?;
    invalidate_checkpoints(pool, table).await?;
    Ok(result.rows_affected())
}

// ─── Table browsing and row edits ───

/// User tables with their row counts, by name.
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<TableInfo>> {
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .fetch_all(pool)
            .await?;
    let mut tables = Vec::with_capacity(names.len());
    for name in names.into_iter().filter(|n| !n.starts_with("sqlite_")) {
        let rows: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quoted(&name)))
            .fetch_one(pool)
            .await?;
        tables.push(TableInfo { name, rows });
    }
    Ok(tables)
}

/// Rows `offset..offset + limit` of a table in storage order.
pub async fn show_table(
    pool: &SqlitePool,
    table: &str,
    limit: i64,
    offset: i64,
) -> Result<TablePage> {
    let columns = table_columns(pool, table).await?;
    let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", quoted(table)))
        .fetch_one(pool)
        .await?;
    let select: Vec<String> = columns
        .iter()
        .map(|c| format!("CAST({} AS TEXT)", quoted(c)))
        .collect();
    let sql = format!(
        "SELECT {} FROM {} ORDER BY rowid LIMIT ? OFFSET ?",
        select.join(", "),
        quoted(table)
    );
    let fetched = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let mut rows = Vec::with_capacity(fetched.len());
    for row in &fetched {
        let values = (0..columns.len())
            .map(|i| row.try_get::<Option<String>, _>(i))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(values);
    }
    Ok(TablePage {
        columns,
        rows,
        total,
    })
}

/// Set one column of the row with the given `id`. `None` stores NULL.
pub async fn update_row(
    pool: &SqlitePool,
    table: &str,
    id: i64,
    column: &str,
    value: Option<&str>,
) -> Result<()> {
    let columns = table_columns(pool, table).await?;
    ensure_id_column(&columns, table, "rows cannot be addressed")?;
    if column == "id" {
        return Err(Error::validation("the id column cannot be edited").into());
    }
    if !columns.iter().any(|c| c == column) {
        return Err(Error::not_found(format!("column '{}' in table '{}'", column, table)).into());
    }
    let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", quoted(table), quoted(column));
    let result = match sqlx::query(&sql).bind(value).bind(id).execute(pool).await {
        Ok(result) => result,
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(Error::conflict(format!(
                "{}.{} = '{}' already exists",
                table,
                column,
                value.unwrap_or("NULL")
            ))
            .into());
        }
        Err(e) => return Err(e.into()),
    };
    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("row {} in table '{}'", id, table)).into());
    }
    invalidate_checkpoints(pool, table).await
}

/// Delete the row with the given `id`.
pub async fn delete_row(pool: &SqlitePool, table: &str, id: i64) -> Result<()> {
    let columns = table_columns(pool, table).await?;
    ensure_id_column(&columns, table, "rows cannot be addressed")?;
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?", quoted(table)))
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::not_found(format!("row {} in table '{}'", id, table)).into());
    }
    invalidate_checkpoints(pool, table).await
}

pub async fn guarded_update_row(
    config: &Config,
    table: &str,
    id: i64,
    column: &str,
    value: Option<&str>,
) -> Result<()> {
    backup::guarded(config, "update-row", || async {
        let pool = db::connect(config).await?;
        let result = update_row(&pool, table, id, column, value).await;
        pool.close().await;
        result
    })
    .await
}

pub async fn guarded_delete_row(config: &Config, table: &str, id: i64) -> Result<()> {
    backup::guarded(config, "delete-row", || async {
        let pool = db::connect(config).await?;
        let result = delete_row(&pool, table, id).await;
        pool.close().await;
        result
    })
    .await
}

pub async fn guarded_dedupe(config: &Config, table: &str) -> Result<u64> {
    backup::guarded(config, "dedupe", || async {
        let pool = db::connect(config).await?;
        let result = dedupe(&pool, table).await;
        pool.close().await;
        result
    })
    .await
}

pub async fn guarded_delete_all(config: &Config, table: &str) -> Result<u64> {
    backup::guarded(config, "delete-all", || async {
        let pool = db::connect(config).await?;
        let result = delete_all(&pool, table).await;
        pool.close().await;
        result
    })
    .await
}

// ─── Import from another store ───

/// Read a column of a foreign row. Decode failures become
/// `Error::MalformedInput` naming the row.
fn imported<'r, T>(row: &'r SqliteRow, column: &str, what: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(column).map_err(|e| {
        Error::malformed(format!("{}: cannot read column '{}': {}", what, column, e)).into()
    })
}

/// Epoch seconds from an integer column or from SQLite `CURRENT_TIMESTAMP`
/// text. Anything else, NULL included, becomes `now`.
fn imported_timestamp(row: &SqliteRow, column: &str, now: i64) -> i64 {
    if let Ok(Some(secs)) = row.try_get::<Option<i64>, _>(column) {
        return secs;
    }
    row.try_get::<Option<String>, _>(column)
        .ok()
        .flatten()
        .and_then(|text| {
            chrono::NaiveDateTime::parse_from_str(text.trim(), "%Y-%m-%d %H:%M:%S").ok()
        })
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or(now)
}

async fn other_names(
    other: &SqlitePool,
    sql: &str,
    key: &str,
) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(sql).bind(key).fetch_all(other).await?;
    Ok(names)
}

/// Merge records from another store. Records whose key already exists are
/// skipped. Vocabulary terms, flags, itemclasses, and itemtags are matched
/// by name and created when missing.
pub async fn import_database(pool: &SqlitePool, other: &SqlitePool) -> Result<ImportReport> {
    if !has_table(other, "type_elements").await? {
        return Err(Error::malformed("source store has no type_elements table").into());
    }
    let mut report = ImportReport::default();

    let existing: HashSet<String> = sqlx::query_scalar("SELECT element_key FROM type_elements")
        .fetch_all(pool)
        .await?
        .into_iter()
        .collect();

    let mut tx = pool.begin().await?;

    for table in ["itemclasses", "itemtags"] {
        if !has_table(other, table).await? {
            continue;
        }
        let rows = sqlx::query(&format!("SELECT name, description FROM {}", table))
            .fetch_all(other)
            .await?;
        for row in &rows {
            let name: String = imported(row, "name", table)?;
            let description: Option<String> = imported(row, "description", table)?;
            let result = sqlx::query(&format!(
                "INSERT OR IGNORE INTO {} (name, description, created_at) VALUES (?, ?, ?)",
                table
            ))
            .bind(&name)
            .bind(&description)
            .bind(chrono::Utc::now().timestamp())
            .execute(&mut *tx)
            .await?;
            report.groupings_created += result.rows_affected() as usize;
        }
    }

    let has_fields = has_table(other, "type_element_fields").await?;
    let has_flags = has_table(other, "element_flags").await? && has_table(other, "flags").await?;
    let has_itemclasses = has_table(other, "element_itemclasses").await?;
    let has_itemtags = has_table(other, "element_itemtags").await?;
    let mut vocab_present = Vec::new();
    for vocab in Vocabulary::ALL {
        if has_table(other, vocab.edge_table()).await? && has_table(other, vocab.table()).await? {
            vocab_present.push(vocab);
        }
    }

    let records = sqlx::query(
        "SELECT element_key, name, source_file, source_folder, created_at, updated_at FROM type_elements ORDER BY element_key",
    )
    .fetch_all(other)
    .await?;

    let now = chrono::Utc::now().timestamp();
    for record in &records {
        let key: String = imported(record, "element_key", "type_elements")?;
        if existing.contains(&key) {
            report.records_skipped += 1;
            continue;
        }
        let what = format!("record '{}'", key);

        sqlx::query(
            r#"
            INSERT INTO type_elements (element_key, name, source_file, source_folder, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&key)
        .bind(imported::<Option<String>>(record, "name", &what)?)
        .bind(imported::<Option<String>>(record, "source_file", &what)?.unwrap_or_default())
        .bind(imported::<Option<String>>(record, "source_folder", &what)?.unwrap_or_default())
        .bind(imported_timestamp(record, "created_at", now))
        .bind(imported_timestamp(record, "updated_at", now))
        .execute(&mut *tx)
        .await?;

        if has_fields {
            let fields = sqlx::query(
                r#"
                SELECT field_name, field_value, field_order, attributes_json
                FROM type_element_fields WHERE element_key = ? ORDER BY id
                "#,
            )
            .bind(&key)
            .fetch_all(other)
            .await?;
            for field in &fields {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO type_element_fields
                        (element_key, field_name, field_value, field_order, attributes_json)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&key)
                .bind(imported::<String>(field, "field_name", &what)?)
                .bind(imported::<Option<String>>(field, "field_value", &what)?)
                .bind(imported::<Option<i64>>(field, "field_order", &what)?)
                .bind(imported::<Option<String>>(field, "attributes_json", &what)?)
                .execute(&mut *tx)
                .await?;
            }
        }

        for vocab in &vocab_present {
            let sql = format!(
                "SELECT t.name FROM {} e JOIN {} t ON t.id = e.{} WHERE e.element_key = ?",
                vocab.edge_table(),
                vocab.table(),
                vocab.id_column()
            );
            for name in other_names(other, &sql, &key).await? {
                sqlx::query(&format!("INSERT OR IGNORE INTO {} (name) VALUES (?)", vocab.table()))
                    .bind(&name)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&format!(
                    "INSERT OR IGNORE INTO {edge} (element_key, {col}) SELECT ?, id FROM {table} WHERE name = ?",
                    edge = vocab.edge_table(),
                    col = vocab.id_column(),
                    table = vocab.table(),
                ))
                .bind(&key)
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            }
        }

        if has_flags {
            let flags = sqlx::query(
                "SELECT f.name, ef.value FROM element_flags ef JOIN flags f ON f.id = ef.flag_id WHERE ef.element_key = ?",
            )
            .bind(&key)
            .fetch_all(other)
            .await?;
            for flag in &flags {
                let name: String = imported(flag, "name", &what)?;
                let value: i64 = imported(flag, "value", &what)?;
                crate::sqlite_store::upsert_flag(&mut tx, &key, &name, value != 0).await?;
            }
        }

        if has_itemclasses {
            let sql = "SELECT c.name FROM element_itemclasses e JOIN itemclasses c ON c.id = e.itemclass_id WHERE e.element_key = ?";
            if let Some(name) = other_names(other, sql, &key).await?.into_iter().next() {
                sqlx::query(
                    "INSERT OR REPLACE INTO element_itemclasses (element_key, itemclass_id) SELECT ?, id FROM itemclasses WHERE name = ?",
                )
                .bind(&key)
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            }
        }

        if has_itemtags {
            let sql = "SELECT t.name FROM element_itemtags e JOIN itemtags t ON t.id = e.itemtag_id WHERE e.element_key = ?";
            for name in other_names(other, sql, &key).await? {
                sqlx::query(
                    "INSERT OR IGNORE INTO element_itemtags (element_key, itemtag_id) SELECT ?, id FROM itemtags WHERE name = ?",
                )
                .bind(&key)
                .bind(&name)
                .execute(&mut *tx)
                .await?;
            }
        }

        report.records_imported += 1;
    }

    tx.commit().await?;
    Ok(report)
}

pub async fn guarded_import(config: &Config, source: &Path) -> Result<ImportReport> {
    if !source.is_file() {
        return Err(Error::not_found(format!("database {}", source.display())).into());
    }
    backup::guarded(config, "import-db", || async {
        let other = db::connect_path(source, false).await?;
        let pool = match db::connect(config).await {
            Ok(pool) => pool,
            Err(e) => {
                other.close().await;
                return Err(e);
            }
        };
        let result = import_database(&pool, &other).await;
        pool.close().await;
        other.close().await;
        result
    })
    .await
}

// ─── Merge a loose XML file ───

/// Add records from an XML file, skipping keys that already exist.
pub async fn merge_xml(config: &Config, path: &Path) -> Result<MergeReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let records = extract_str(&text, &config.records.tag)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    backup::guarded(config, "merge-xml", || async {
        let pool = db::connect(config).await?;
        let store = SqliteStore::new(pool, config.records.flags);
        let mut report = MergeReport::default();
        let mut result = Ok(());
        for shape in &records {
            let key = record_key(shape, MERGED_FOLDER, &file);
            match store.get_record_meta(&key).await {
                Ok(Some(_)) => report.skipped += 1,
                Ok(None) => match store.save_record(&key, shape, &file, MERGED_FOLDER).await {
                    Ok(()) => report.added += 1,
                    Err(e) => {
                        result = Err(e.context(format!("saving record '{}'", key)));
                        break;
                    }
                },
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        store.close().await;
        result.map(|_| report)
    })
    .await
}

// ─── CLI entry points ───

pub async fn run_tables(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = list_tables(&pool).await;
    pool.close().await;
    let tables = result?;
    println!("{} tables", tables.len());
    for t in &tables {
        println!("  {:<28} {:>8} rows", t.name, t.rows);
    }
    Ok(())
}

const CELL_WIDTH: usize = 40;

fn cell_text(value: Option<&str>) -> String {
    let Some(value) = value else {
        return "NULL".to_string();
    };
    let flat = value.replace(['\r', '\n'], " ");
    if flat.chars().count() > CELL_WIDTH {
        let head: String = flat.chars().take(CELL_WIDTH - 3).collect();
        format!("{}...", head)
    } else {
        flat
    }
}

pub async fn run_table_show(config: &Config, table: &str, limit: u32, offset: u32) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = show_table(&pool, table, i64::from(limit), i64::from(offset)).await;
    pool.close().await;
    let page = result?;

    println!("{} ({} rows)", table, page.total);
    if page.rows.is_empty() {
        println!("No rows.");
        return Ok(());
    }
    let cells: Vec<Vec<String>> = page
        .rows
        .iter()
        .map(|row| row.iter().map(|v| cell_text(v.as_deref())).collect())
        .collect();
    let widths: Vec<usize> = page
        .columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .fold(name.chars().count(), usize::max)
        })
        .collect();
    let line = |values: &[String]| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<w$}", v, w = *w))
            .collect();
        println!("  {}", padded.join("  ").trim_end());
    };
    line(&page.columns);
    for row in &cells {
        line(row);
    }
    println!(
        "rows {}-{} of {}",
        offset as usize + 1,
        offset as usize + cells.len(),
        page.total
    );
    Ok(())
}

pub async fn run_update_row(
    config: &Config,
    table: &str,
    id: i64,
    column: &str,
    value: Option<&str>,
) -> Result<()> {
    guarded_update_row(config, table, id, column, value).await?;
    println!("update-row {} {}", table, id);
    println!("  {} = {}", column, value.unwrap_or("NULL"));
    println!("ok");
    Ok(())
}

pub async fn run_delete_row(config: &Config, table: &str, id: i64) -> Result<()> {
    guarded_delete_row(config, table, id).await?;
    println!("delete-row {} {}", table, id);
    println!("ok");
    Ok(())
}

pub async fn run_duplicates(config: &Config, table: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = find_duplicates(&pool, table).await;
    pool.close().await;
    let groups = result?;
    if groups.is_empty() {
        println!("No duplicates in '{}'.", table);
        return Ok(());
    }
    let redundant: usize = groups.iter().map(|g| g.ids.len() - 1).sum();
    println!("{} duplicate groups in '{}' ({} redundant rows)", groups.len(), table, redundant);
    for g in &groups {
        let ids: Vec<String> = g.ids.iter().map(|i| i.to_string()).collect();
        println!("  keep {:<8} ids [{}]", g.keep_id, ids.join(", "));
    }
    Ok(())
}

pub async fn run_dedupe(config: &Config, table: &str) -> Result<()> {
    let deleted = guarded_dedupe(config, table).await?;
    println!("dedupe {}", table);
    println!("  rows deleted: {}", deleted);
    println!("ok");
    Ok(())
}

pub async fn run_delete_all(config: &Config, table: &str) -> Result<()> {
    let deleted = guarded_delete_all(config, table).await?;
    println!("delete-all {}", table);
    println!("  rows deleted: {}", deleted);
    println!("ok");
    Ok(())
}

pub async fn run_import(config: &Config, source: &Path) -> Result<()> {
    let report = guarded_import(config, source).await?;
    println!("import-db {}", source.display());
    println!("  records imported: {}", report.records_imported);
    println!("  records skipped: {}", report.records_skipped);
    println!("  groupings created: {}", report.groupings_created);
    println!("ok");
    Ok(())
}

pub async fn run_merge_xml(config: &Config, path: &Path) -> Result<()> {
    let report = merge_xml(config, path).await?;
    println!("merge-xml {}", path.display());
    println!("  records added: {}", report.added);
    println!("  records skipped: {}", report.skipped);
    println!("ok");
    Ok(())
}
