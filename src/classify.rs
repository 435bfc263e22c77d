//! Itemclass / itemtag management and per-record classification edits.
//!
//! Itemclasses and itemtags are user-defined groupings: a record belongs to
//! at most one itemclass and any number of itemtags. Vocabulary edges
//! (category, tag, usage, value) and flags can also be toggled by hand.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use economy_harness_core::normalize::Vocabulary;
use economy_harness_core::Error;

use crate::config::Config;
use crate::db;
use crate::edit::{ensure_record, record_history, ITEMCLASS_FIELD, ITEMTAGS_FIELD};
use crate::sqlite_store::{term_id, upsert_flag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Itemclass,
    Itemtag,
}

impl Grouping {
    fn table(self) -> &'static str {
        match self {
            Grouping::Itemclass => "itemclasses",
            Grouping::Itemtag => "itemtags",
        }
    }

    fn edge_table(self) -> &'static str {
        match self {
            Grouping::Itemclass => "element_itemclasses",
            Grouping::Itemtag => "element_itemtags",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Grouping::Itemclass => "itemclass_id",
            Grouping::Itemtag => "itemtag_id",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Grouping::Itemclass => "itemclass",
            Grouping::Itemtag => "itemtag",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupingInfo {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub members: i64,
}

async fn grouping_id(pool: &SqlitePool, kind: Grouping, name: &str) -> Result<i64> {
    let sql = format!("SELECT id FROM {} WHERE name = ?", kind.table());
    let id: Option<i64> = sqlx::query_scalar(&sql).bind(name).fetch_optional(pool).await?;
    id.ok_or_else(|| Error::not_found(format!("{} '{}'", kind.label(), name)).into())
}

pub async fn create_grouping(
    pool: &SqlitePool,
    kind: Grouping,
    name: &str,
    description: Option<&str>,
) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::validation(format!("{} name must not be empty", kind.label())).into());
    }
    let sql = format!(
        "INSERT OR IGNORE INTO {} (name, description, created_at) VALUES (?, ?, ?)",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(name)
        .bind(description)
        .bind(chrono::Utc::now().timestamp())
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(Error::conflict(format!("{} '{}' already exists", kind.label(), name)).into());
    }
    Ok(result.last_insert_rowid())
}

/// Rename and/or re-describe a grouping.
pub async fn update_grouping(
    pool: &SqlitePool,
    kind: Grouping,
    name: &str,
    new_name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let id = grouping_id(pool, kind, name).await?;
    if let Some(new_name) = new_name {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::validation(format!("{} name must not be empty", kind.label())).into());
        }
        let taken: Option<i64> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE name = ? AND id != ?",
            kind.table()
        ))
        .bind(new_name)
        .bind(id)
        .fetch_optional(pool)
        .await?;
        if taken.is_some() {
            return Err(Error::conflict(format!("{} '{}' already exists", kind.label(), new_name)).into());
        }
        sqlx::query(&format!("UPDATE {} SET name = ? WHERE id = ?", kind.table()))
            .bind(new_name)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(description) = description {
        sqlx::query(&format!("UPDATE {} SET description = ? WHERE id = ?", kind.table()))
            .bind(description)
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

/// Delete a grouping and every assignment to it.
pub async fn delete_grouping(pool: &SqlitePool, kind: Grouping, name: &str) -> Result<u64> {
    let id = grouping_id(pool, kind, name).await?;
    let mut tx = pool.begin().await?;
    let unassigned = sqlx::query(&format!(
        "DELETE FROM {} WHERE {} = ?",
        kind.edge_table(),
        kind.id_column()
    ))
    .bind(id)
    .execute(&mut *tx)
    .await?
    .rows_affected();
    sqlx::query(&format!("DELETE FROM {} WHERE id = ?", kind.table()))
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(unassigned)
}

pub async fn list_groupings(pool: &SqlitePool, kind: Grouping) -> Result<Vec<GroupingInfo>> {
    let sql = format!(
        r#"
        SELECT g.id, g.name, g.description, COUNT(e.element_key) AS members
        FROM {table} g
        LEFT JOIN {edge} e ON e.{col} = g.id
        GROUP BY g.id
        ORDER BY g.name
        "#,
        table = kind.table(),
        edge = kind.edge_table(),
        col = kind.id_column(),
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    Ok(rows
        .iter()
        .map(|row| GroupingInfo {
            id: row.get("id"),
            name: row.get("name"),
            description: row.get("description"),
            members: row.get("members"),
        })
        .collect())
}

pub async fn itemclass_of(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    let name: Option<String> = sqlx::query_scalar(
        r#"
        SELECT c.name FROM element_itemclasses e
        JOIN itemclasses c ON c.id = e.itemclass_id
        WHERE e.element_key = ?
        "#,
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;
    Ok(name)
}

pub async fn itemtags_of(pool: &SqlitePool, key: &str) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT t.name FROM element_itemtags e
        JOIN itemtags t ON t.id = e.itemtag_id
        WHERE e.element_key = ?
        ORDER BY t.name
        "#,
    )
    .bind(key)
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// Assign a record's itemclass, or clear it with `None`. Logged for undo.
pub async fn assign_itemclass(pool: &SqlitePool, key: &str, itemclass: Option<&str>) -> Result<()> {
    let new_id = match itemclass {
        Some(name) => Some(grouping_id(pool, Grouping::Itemclass, name).await?),
        None => None,
    };
    let old = itemclass_of(pool, key).await?;

    let mut tx = pool.begin().await?;
    ensure_record(&mut tx, key).await?;
    sqlx::query("DELETE FROM element_itemclasses WHERE element_key = ?")
        .bind(key)
        .execute(&mut *tx)
        .await?;
    if let Some(id) = new_id {
        sqlx::query("INSERT INTO element_itemclasses (element_key, itemclass_id) VALUES (?, ?)")
            .bind(key)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    record_history(&mut tx, key, ITEMCLASS_FIELD, old.as_deref(), itemclass, false).await?;
    tx.commit().await?;
    Ok(())
}

/// Replace a record's itemtag set. Logged for undo.
pub async fn set_itemtags(pool: &SqlitePool, key: &str, names: &[String]) -> Result<()> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        ids.push(grouping_id(pool, Grouping::Itemtag, name).await?);
    }
    let old = itemtags_of(pool, key).await?;
    let mut new: Vec<String> = names.to_vec();
    new.sort();
    new.dedup();

    let mut tx = pool.begin().await?;
    ensure_record(&mut tx, key).await?;
    sqlx::query("DELETE FROM element_itemtags WHERE element_key = ?")
        .bind(key)
        .execute(&mut *tx)
        .await?;
    for id in ids {
        sqlx::query("INSERT OR IGNORE INTO element_itemtags (element_key, itemtag_id) VALUES (?, ?)")
            .bind(key)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    let old_json = serde_json::to_string(&old)?;
    let new_json = serde_json::to_string(&new)?;
    record_history(&mut tx, key, ITEMTAGS_FIELD, Some(&old_json), Some(&new_json), false).await?;
    tx.commit().await?;
    Ok(())
}

/// Add (`present = true`) or remove a vocabulary edge by term name.
pub async fn set_classification(
    pool: &SqlitePool,
    key: &str,
    vocab: Vocabulary,
    name: &str,
    present: bool,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    ensure_record(&mut tx, key).await?;
    let id = term_id(&mut tx, vocab, name)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} '{}'", vocab, name)))?;
    let sql = if present {
        format!(
            "INSERT OR IGNORE INTO {} (element_key, {}) VALUES (?, ?)",
            vocab.edge_table(),
            vocab.id_column()
        )
    } else {
        format!(
            "DELETE FROM {} WHERE element_key = ? AND {} = ?",
            vocab.edge_table(),
            vocab.id_column()
        )
    };
    sqlx::query(&sql).bind(key).bind(id).execute(&mut *tx).await?;
    sqlx::query("UPDATE type_elements SET updated_at = ? WHERE element_key = ?")
        .bind(chrono::Utc::now().timestamp())
        .bind(key)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

/// Set a flag to true/false, or remove it with `None`.
pub async fn set_flag(pool: &SqlitePool, key: &str, flag: &str, value: Option<bool>) -> Result<()> {
    if flag.trim().is_empty() {
        return Err(Error::validation("flag name must not be empty").into());
    }
    let mut tx = pool.begin().await?;
    ensure_record(&mut tx, key).await?;
    match value {
        Some(v) => upsert_flag(&mut tx, key, flag, v).await?,
        None => {
            sqlx::query(
                r#"
                DELETE FROM element_flags
                WHERE element_key = ? AND flag_id = (SELECT id FROM flags WHERE name = ?)
                "#,
            )
            .bind(key)
            .bind(flag)
            .execute(&mut *tx)
            .await?;
        }
    }
    tx.commit().await?;
    Ok(())
}

// ─── CLI entry points ───

pub async fn run_grouping_create(
    config: &Config,
    kind: Grouping,
    name: &str,
    description: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = create_grouping(&pool, kind, name, description).await;
    pool.close().await;
    let id = result?;
    println!("created {} '{}' (id {})", kind.label(), name.trim(), id);
    Ok(())
}

pub async fn run_grouping_update(
    config: &Config,
    kind: Grouping,
    name: &str,
    new_name: Option<&str>,
    description: Option<&str>,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = update_grouping(&pool, kind, name, new_name, description).await;
    pool.close().await;
    result?;
    println!("updated {} '{}'", kind.label(), new_name.unwrap_or(name));
    Ok(())
}

pub async fn run_grouping_delete(config: &Config, kind: Grouping, name: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = delete_grouping(&pool, kind, name).await;
    pool.close().await;
    let unassigned = result?;
    println!(
        "deleted {} '{}' ({} assignments removed)",
        kind.label(),
        name,
        unassigned
    );
    Ok(())
}

pub async fn run_grouping_list(config: &Config, kind: Grouping) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = list_groupings(&pool, kind).await;
    pool.close().await;
    let groups = result?;
    if groups.is_empty() {
        println!("No {}s defined.", kind.label());
        return Ok(());
    }
    println!("{:<28} {:>8}   {}", "NAME", "RECORDS", "DESCRIPTION");
    for g in &groups {
        println!(
            "{:<28} {:>8}   {}",
            g.name,
            g.members,
            g.description.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub async fn run_assign_itemclass(config: &Config, key: &str, itemclass: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = assign_itemclass(&pool, key, itemclass).await;
    pool.close().await;
    result?;
    match itemclass {
        Some(name) => println!("{} -> itemclass '{}'", key, name),
        None => println!("{} -> no itemclass", key),
    }
    Ok(())
}

pub async fn run_set_itemtags(config: &Config, key: &str, names: &[String]) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = set_itemtags(&pool, key, names).await;
    pool.close().await;
    result?;
    println!("{} -> itemtags [{}]", key, names.join(", "));
    Ok(())
}

pub async fn run_set_classification(
    config: &Config,
    key: &str,
    vocab: Vocabulary,
    name: &str,
    present: bool,
) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = set_classification(&pool, key, vocab, name, present).await;
    pool.close().await;
    result?;
    println!(
        "{} {} {} '{}'",
        key,
        if present { "+" } else { "-" },
        vocab,
        name
    );
    Ok(())
}

pub async fn run_set_flag(config: &Config, key: &str, flag: &str, value: Option<bool>) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = set_flag(&pool, key, flag, value).await;
    pool.close().await;
    result?;
    match value {
        Some(v) => println!("{} flag {} = {}", key, flag, v as u8),
        None => println!("{} flag {} cleared", key, flag),
    }
    Ok(())
}
