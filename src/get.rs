//! Record retrieval by key, and record listing.
//!
//! `econ get` prints a record's provenance, groupings, classifications,
//! and field rows; `--xml` prints the reconstructed element instead and
//! `--json` the composed shape.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use economy_harness_core::normalize::FieldRow;
use economy_harness_core::reconstruct::reconstruct;
use economy_harness_core::store::{RecordMeta, RecordStore};
use economy_harness_core::xml::write_tree;
use economy_harness_core::Error;

use crate::classify::{itemclass_of, itemtags_of};
use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Output format of `econ get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetFormat {
    Text,
    Xml,
    Json,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub key: String,
    pub name: Option<String>,
    pub source_file: String,
    pub source_folder: String,
    pub created_at: String, // ISO8601
    pub updated_at: String, // ISO8601
    pub itemclass: Option<String>,
    pub itemtags: Vec<String>,
    pub shape: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedRecord {
    pub key: String,
    pub name: Option<String>,
    pub source: String,
    pub itemclass: Option<String>,
}

async fn require_meta(store: &SqliteStore, key: &str) -> Result<RecordMeta> {
    store
        .get_record_meta(key)
        .await?
        .ok_or_else(|| Error::not_found(format!("record '{}'", key)).into())
}

/// Core get function returning structured data.
pub async fn get_record(config: &Config, key: &str) -> Result<RecordView> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool, config.records.flags);
    let result = async {
        let meta = require_meta(&store, key).await?;
        let shape = store.load_record(key).await?;
        let itemclass = itemclass_of(store.pool(), key).await?;
        let itemtags = itemtags_of(store.pool(), key).await?;
        Ok::<_, anyhow::Error>(RecordView {
            key: meta.key,
            name: meta.name,
            source_file: meta.source_file,
            source_folder: meta.source_folder,
            created_at: format_ts_iso(meta.created_at),
            updated_at: format_ts_iso(meta.updated_at),
            itemclass,
            itemtags,
            shape: shape.to_json(),
        })
    }
    .await;
    store.close().await;
    result
}

/// Records filtered by source (`folder/file` or just `file`) and itemclass,
/// ordered by key.
pub async fn list_records(
    pool: &SqlitePool,
    source: Option<&str>,
    itemclass: Option<&str>,
) -> Result<Vec<ListedRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT te.element_key, te.name, te.source_folder, te.source_file, c.name AS itemclass
        FROM type_elements te
        LEFT JOIN element_itemclasses e ON e.element_key = te.element_key
        LEFT JOIN itemclasses c ON c.id = e.itemclass_id
        ORDER BY te.element_key
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let folder: String = row.get("source_folder");
            let file: String = row.get("source_file");
            ListedRecord {
                key: row.get("element_key"),
                name: row.get("name"),
                source: format!("{}/{}", folder, file),
                itemclass: row.get("itemclass"),
            }
        })
        .filter(|r| match source {
            Some(s) => r.source == s || r.source.rsplit('/').next() == Some(s),
            None => true,
        })
        .filter(|r| match itemclass {
            Some(c) => r.itemclass.as_deref() == Some(c),
            None => true,
        })
        .collect())
}

/// CLI entry point.
pub async fn run_get(config: &Config, key: &str, format: GetFormat) -> Result<()> {
    match format {
        GetFormat::Json => {
            let view = get_record(config, key).await?;
            println!("{}", serde_json::to_string_pretty(&view.shape)?);
        }
        GetFormat::Xml => {
            let pool = db::connect(config).await?;
            let store = SqliteStore::new(pool, config.records.flags);
            let shape = store.load_record(key).await;
            store.close().await;
            let node = reconstruct(&shape?, &config.records.tag, &config.conventions());
            print!("{}", write_tree(&node, config.export.indent)?);
            println!();
        }
        GetFormat::Text => {
            let view = get_record(config, key).await?;
            let pool = db::connect(config).await?;
            let store = SqliteStore::new(pool, config.records.flags);
            let rows = store.field_rows(key).await;
            let classifications = store.classifications(key).await;
            let flags = store.flags(key).await;
            store.close().await;
            let (rows, classifications, flags) = (rows?, classifications?, flags?);

            println!("--- Record ---");
            println!("key:        {}", view.key);
            println!("name:       {}", view.name.as_deref().unwrap_or("(unnamed)"));
            println!("source:     {}/{}", view.source_folder, view.source_file);
            println!("created_at: {}", view.created_at);
            println!("updated_at: {}", view.updated_at);
            println!("itemclass:  {}", view.itemclass.as_deref().unwrap_or("(none)"));
            if !view.itemtags.is_empty() {
                println!("itemtags:   {}", view.itemtags.join(", "));
            }
            println!();

            if !classifications.is_empty() || !flags.is_empty() {
                println!("--- Classifications ---");
                for (vocab, names) in &classifications {
                    println!("{:<11} {}", format!("{}:", vocab), names.join(", "));
                }
                for (flag, value) in &flags {
                    println!("flag {:<17} {}", flag, *value as u8);
                }
                println!();
            }

            println!("--- Fields ({}) ---", rows.len());
            for row in &rows {
                println!("{}", format_row(row));
            }
        }
    }
    Ok(())
}

fn format_row(row: &FieldRow) -> String {
    let name = match row.order {
        Some(i) => format!("{}[{}]", row.field_name, i),
        None => row.field_name.clone(),
    };
    let mut line = format!("{:<20} {}", name, row.value.as_deref().unwrap_or("(null)"));
    if let Some(sidecar) = &row.sidecar {
        line.push_str("  ");
        line.push_str(sidecar);
    }
    line
}

pub async fn run_list(config: &Config, source: Option<&str>, itemclass: Option<&str>) -> Result<()> {
    let pool = db::connect(config).await?;
    let records = list_records(&pool, source, itemclass).await;
    pool.close().await;
    let records = records?;

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }
    println!("{:<40} {:<32} {:<20}", "KEY", "SOURCE", "ITEMCLASS");
    for r in &records {
        println!(
            "{:<40} {:<32} {:<20}",
            r.key,
            r.source,
            r.itemclass.as_deref().unwrap_or("-")
        );
    }
    println!();
    println!("{} records", records.len());
    Ok(())
}

pub(crate) fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_repeated_rows_with_index() {
        let row = FieldRow {
            field_name: "category".into(),
            order: Some(1),
            value: Some("tools".into()),
            sidecar: None,
        };
        assert_eq!(format_row(&row), format!("{:<20} tools", "category[1]"));
    }

    #[test]
    fn formats_timestamps_as_iso() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
