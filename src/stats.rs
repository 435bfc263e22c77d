//! Store statistics and health overview.
//!
//! Summarizes what's stored: record and field counts, vocabulary sizes,
//! grouping coverage, and a per-source breakdown with the last sync time.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use economy_harness_core::normalize::Vocabulary;

use crate::config::Config;
use crate::db;

/// Per-source breakdown of record and field counts.
struct SourceStats {
    source: String,
    record_count: i64,
    field_count: i64,
    last_sync_ts: Option<i64>,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let result = print_stats(config, &pool).await;
    pool.close().await;
    result
}

async fn print_stats(config: &Config, pool: &SqlitePool) -> Result<()> {
    let total_records = count(pool, "SELECT COUNT(*) FROM type_elements").await?;
    let total_fields = count(pool, "SELECT COUNT(*) FROM type_element_fields").await?;
    let classified = count(
        pool,
        "SELECT COUNT(DISTINCT element_key) FROM element_itemclasses",
    )
    .await?;
    let edits = count(pool, "SELECT COUNT(*) FROM edit_history").await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Economy Harness — Store Stats");
    println!("=============================");
    println!();
    println!("  Store:       {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Records:     {}", total_records);
    println!("  Fields:      {}", total_fields);
    println!(
        "  Itemclass:   {} / {} ({}%)",
        classified,
        total_records,
        if total_records > 0 {
            (classified * 100) / total_records
        } else {
            0
        }
    );
    println!("  Edits:       {}", edits);

    println!();
    println!("  Vocabularies:");
    for vocab in Vocabulary::ALL {
        let terms = count(pool, &format!("SELECT COUNT(*) FROM {}", vocab.table())).await?;
        let refs = count(pool, &format!("SELECT COUNT(*) FROM {}", vocab.edge_table())).await?;
        println!("    {:<12} {:>6} terms {:>8} refs", vocab.table(), terms, refs);
    }
    let flags = count(pool, "SELECT COUNT(*) FROM flags").await?;
    println!("    {:<12} {:>6} names", "flags", flags);
    let itemclasses = count(pool, "SELECT COUNT(*) FROM itemclasses").await?;
    let itemtags = count(pool, "SELECT COUNT(*) FROM itemtags").await?;
    println!("    {:<12} {:>6}", "itemclasses", itemclasses);
    println!("    {:<12} {:>6}", "itemtags", itemtags);

    let source_rows = sqlx::query(
        r#"
        SELECT
            te.source_folder,
            te.source_file,
            COUNT(DISTINCT te.id) AS record_count,
            COUNT(f.id) AS field_count,
            sf.synced_at
        FROM type_elements te
        LEFT JOIN type_element_fields f ON f.element_key = te.element_key
        LEFT JOIN source_files sf
            ON sf.source_folder = te.source_folder AND sf.source_file = te.source_file
        GROUP BY te.source_folder, te.source_file
        ORDER BY record_count DESC, te.source_folder, te.source_file
        "#,
    )
    .fetch_all(pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| {
            let folder: String = row.get("source_folder");
            let file: String = row.get("source_file");
            SourceStats {
                source: format!("{}/{}", folder, file),
                record_count: row.get("record_count"),
                field_count: row.get("field_count"),
                last_sync_ts: row.get("synced_at"),
            }
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<36} {:>8} {:>8}   {}",
            "SOURCE", "RECORDS", "FIELDS", "LAST SYNC"
        );
        println!("  {}", "-".repeat(72));

        for s in &source_stats {
            let sync_display = match s.last_sync_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<36} {:>8} {:>8}   {}",
                s.source, s.record_count, s.field_count, sync_display
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return format_ts_short(ts);
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_short(ts)
    }
}

fn format_ts_short(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
