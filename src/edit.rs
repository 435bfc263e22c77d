//! Single-field edits with an undo ledger.
//!
//! Every edit writes one `edit_history` row holding the previous and new
//! value. Itemclass and itemtag assignment changes are logged in the same
//! ledger under the reserved field names [`ITEMCLASS_FIELD`] and
//! [`ITEMTAGS_FIELD`]. `undo` reverts the newest entry for a record and
//! removes it, so repeated undos walk back through the history.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use economy_harness_core::normalize::is_reserved_key;
use economy_harness_core::Error;

use crate::config::Config;
use crate::db;

pub const ITEMCLASS_FIELD: &str = "@itemclass";
pub const ITEMTAGS_FIELD: &str = "@itemtags";

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub element_key: String,
    pub field_name: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_row: bool,
    pub changed_at: i64,
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> HistoryEntry {
    let created: i64 = row.get("created_row");
    HistoryEntry {
        id: row.get("id"),
        element_key: row.get("element_key"),
        field_name: row.get("field_name"),
        old_value: row.get("old_value"),
        new_value: row.get("new_value"),
        created_row: created != 0,
        changed_at: row.get("changed_at"),
    }
}

pub(crate) async fn ensure_record(tx: &mut Transaction<'_, Sqlite>, key: &str) -> Result<()> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM type_elements WHERE element_key = ?")
        .bind(key)
        .fetch_optional(&mut **tx)
        .await?;
    if exists.is_none() {
        return Err(Error::not_found(format!("record '{}'", key)).into());
    }
    Ok(())
}

pub(crate) async fn record_history(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    field_name: &str,
    old_value: Option<&str>,
    new_value: Option<&str>,
    created_row: bool,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO edit_history (element_key, field_name, old_value, new_value, created_row, changed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(key)
    .bind(field_name)
    .bind(old_value)
    .bind(new_value)
    .bind(created_row as i64)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    sqlx::query("UPDATE type_elements SET updated_at = ? WHERE element_key = ?")
        .bind(now)
        .bind(key)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

fn validate_field_name(field_name: &str) -> Result<()> {
    if field_name.trim().is_empty() {
        return Err(Error::validation("field name must not be empty").into());
    }
    if field_name.starts_with('@') {
        return Err(Error::validation(format!("field name '{}' is reserved", field_name)).into());
    }
    if is_reserved_key(field_name) {
        return Err(Error::validation(format!(
            "'{}' is not a plain field; use the classification commands",
            field_name
        ))
        .into());
    }
    Ok(())
}

/// Set the single-occurrence value of `field_name` for a record.
///
/// Updates the row with `field_order = NULL` (its attributes are left as
/// they are) or inserts one. Fields that only exist as repeated occurrences
/// cannot be edited this way.
pub async fn update_field(pool: &SqlitePool, key: &str, field_name: &str, value: &str) -> Result<()> {
    validate_field_name(field_name)?;

    let mut tx = pool.begin().await?;
    ensure_record(&mut tx, key).await?;

    let existing = sqlx::query(
        r#"
        SELECT id, field_value FROM type_element_fields
        WHERE element_key = ? AND field_name = ? AND field_order IS NULL
        ORDER BY id LIMIT 1
        "#,
    )
    .bind(key)
    .bind(field_name)
    .fetch_optional(&mut *tx)
    .await?;

    match existing {
        Some(row) => {
            let id: i64 = row.get("id");
            let old: Option<String> = row.get("field_value");
            sqlx::query("UPDATE type_element_fields SET field_value = ? WHERE id = ?")
                .bind(value)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            record_history(&mut tx, key, field_name, old.as_deref(), Some(value), false).await?;
        }
        None => {
            let repeated: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM type_element_fields WHERE element_key = ? AND field_name = ?",
            )
            .bind(key)
            .bind(field_name)
            .fetch_one(&mut *tx)
            .await?;
            if repeated > 0 {
                return Err(Error::validation(format!(
                    "field '{}' of '{}' repeats {} times; it cannot be edited as a single value",
                    field_name, key, repeated
                ))
                .into());
            }
            sqlx::query(
                r#"
                INSERT INTO type_element_fields (element_key, field_name, field_value, field_order, attributes_json)
                VALUES (?, ?, ?, NULL, NULL)
                "#,
            )
            .bind(key)
            .bind(field_name)
            .bind(value)
            .execute(&mut *tx)
            .await?;
            record_history(&mut tx, key, field_name, None, Some(value), true).await?;
        }
    }

    tx.commit().await?;
    tracing::debug!(record = key, field = field_name, "field updated");
    Ok(())
}

/// History for a record, newest first.
pub async fn history(pool: &SqlitePool, key: &str) -> Result<Vec<HistoryEntry>> {
    let rows = sqlx::query(
        r#"
        SELECT id, element_key, field_name, old_value, new_value, created_row, changed_at
        FROM edit_history WHERE element_key = ? ORDER BY id DESC
        "#,
    )
    .bind(key)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(entry_from_row).collect())
}

/// Revert the newest history entry of a record and drop it from the ledger.
pub async fn undo(pool: &SqlitePool, key: &str) -> Result<HistoryEntry> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        r#"
        SELECT id, element_key, field_name, old_value, new_value, created_row, changed_at
        FROM edit_history WHERE element_key = ? ORDER BY id DESC LIMIT 1
        "#,
    )
    .bind(key)
    .fetch_optional(&mut *tx)
    .await?;
    let entry = match row {
        Some(row) => entry_from_row(&row),
        None => return Err(Error::not_found(format!("edit history for '{}'", key)).into()),
    };

    match entry.field_name.as_str() {
        ITEMCLASS_FIELD => {
            sqlx::query("DELETE FROM element_itemclasses WHERE element_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            if let Some(name) = &entry.old_value {
                let restored = sqlx::query(
                    r#"
                    INSERT INTO element_itemclasses (element_key, itemclass_id)
                    SELECT ?, id FROM itemclasses WHERE name = ?
                    "#,
                )
                .bind(key)
                .bind(name)
                .execute(&mut *tx)
                .await?;
                if restored.rows_affected() == 0 {
                    tracing::warn!(record = key, itemclass = %name, "itemclass no longer exists; left unassigned");
                }
            }
        }
        ITEMTAGS_FIELD => {
            sqlx::query("DELETE FROM element_itemtags WHERE element_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            let names: Vec<String> = entry
                .old_value
                .as_deref()
                .map(serde_json::from_str::<Vec<String>>)
                .transpose()
                .map_err(|e| Error::malformed(format!("itemtag history entry: {}", e)))?
                .unwrap_or_default();
            for name in &names {
                sqlx::query(
                    r#"
                    INSERT OR IGNORE INTO element_itemtags (element_key, itemtag_id)
                    SELECT ?, id FROM itemtags WHERE name = ?
                    "#,
                )
                .bind(key)
                .bind(name)
                .execute(&mut *tx)
                .await?;
            }
        }
        field if entry.created_row => {
            sqlx::query(
                "DELETE FROM type_element_fields WHERE element_key = ? AND field_name = ? AND field_order IS NULL",
            )
            .bind(key)
            .bind(field)
            .execute(&mut *tx)
            .await?;
        }
        field => {
            let updated = sqlx::query(
                r#"
                UPDATE type_element_fields SET field_value = ?
                WHERE element_key = ? AND field_name = ? AND field_order IS NULL
                "#,
            )
            .bind(&entry.old_value)
            .bind(key)
            .bind(field)
            .execute(&mut *tx)
            .await?;
            if updated.rows_affected() == 0 {
                sqlx::query(
                    r#"
                    INSERT INTO type_element_fields (element_key, field_name, field_value, field_order, attributes_json)
                    VALUES (?, ?, ?, NULL, NULL)
                    "#,
                )
                .bind(key)
                .bind(field)
                .bind(&entry.old_value)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    sqlx::query("DELETE FROM edit_history WHERE id = ?")
        .bind(entry.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE type_elements SET updated_at = ? WHERE element_key = ?")
        .bind(chrono::Utc::now().timestamp())
        .bind(key)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(entry)
}

pub async fn run_edit(config: &Config, key: &str, field: &str, value: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = update_field(&pool, key, field, value).await;
    pool.close().await;
    result?;
    println!("{}.{} = {}", key, field, value);
    Ok(())
}

pub async fn run_undo(config: &Config, key: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = undo(&pool, key).await;
    pool.close().await;
    let entry = result?;
    println!(
        "undone {}.{}: {} -> {}",
        key,
        entry.field_name,
        entry.new_value.as_deref().unwrap_or("(none)"),
        entry.old_value.as_deref().unwrap_or("(none)")
    );
    Ok(())
}

pub async fn run_history(config: &Config, key: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let entries = history(&pool, key).await;
    pool.close().await;
    let entries = entries?;
    if entries.is_empty() {
        println!("No edits recorded for '{}'.", key);
        return Ok(());
    }
    println!("{:<6} {:<20} {:<24} {:<24}", "ID", "FIELD", "OLD", "NEW");
    for e in &entries {
        println!(
            "{:<6} {:<20} {:<24} {:<24}",
            e.id,
            e.field_name,
            e.old_value.as_deref().unwrap_or("(none)"),
            e.new_value.as_deref().unwrap_or("(none)")
        );
    }
    Ok(())
}
