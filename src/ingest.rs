//! Ingestion pipeline orchestration.
//!
//! Coordinates the sync flow: discovery → read → extract → save. Source
//! files come from the mission's main types file plus every `types` entry of
//! the economy core manifest. A file that cannot be read or parsed is
//! skipped and reported; the rest of the batch continues. Unchanged files
//! are skipped using per-file SHA-256 checkpoints unless `--full` is given.

use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use economy_harness_core::extract::extract_str;
use economy_harness_core::limits::parse_limits;
use economy_harness_core::manifest::{normalize_folder, read_manifest};
use economy_harness_core::normalize::record_key;
use economy_harness_core::store::RecordStore;
use economy_harness_core::Error;

use crate::config::Config;
use crate::db;
use crate::migrate;
use crate::sqlite_store::SqliteStore;

/// A types file to ingest, identified by its manifest folder and file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub folder: String,
    pub file: String,
    pub path: PathBuf,
}

/// One file that was skipped, with the reason.
#[derive(Debug, Clone)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub files_found: usize,
    pub files_unchanged: usize,
    pub files_ingested: usize,
    pub records_saved: usize,
    pub terms_seeded: usize,
    pub failures: Vec<FileFailure>,
}

/// List the types files of the configured mission.
///
/// The main types file always comes first. Manifest entries are added in
/// document order, skipping duplicates. A missing manifest is not an error;
/// an unreadable one is reported as a failure.
pub fn discover_sources(config: &Config) -> (Vec<SourceFile>, Vec<FileFailure>) {
    let mut sources = Vec::new();
    let mut failures = Vec::new();

    let types_file = &config.mission.types_file;
    let folder = types_file
        .parent()
        .map(|p| normalize_folder(&p.to_string_lossy()))
        .unwrap_or_default();
    let file = types_file
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    sources.push(SourceFile {
        path: config.types_path(),
        folder,
        file,
    });

    let manifest_path = config.manifest_path();
    if manifest_path.exists() {
        match std::fs::read_to_string(&manifest_path)
            .map_err(anyhow::Error::from)
            .and_then(|text| read_manifest(&text).map_err(anyhow::Error::from))
        {
            Ok(entries) => {
                for entry in entries {
                    if entry.kind.as_deref() != Some("types") {
                        continue;
                    }
                    if sources
                        .iter()
                        .any(|s| s.folder == entry.folder && s.file == entry.name)
                    {
                        continue;
                    }
                    let path = config.mission.root.join(&entry.folder).join(&entry.name);
                    sources.push(SourceFile {
                        folder: entry.folder,
                        file: entry.name,
                        path,
                    });
                }
            }
            Err(e) => failures.push(FileFailure {
                path: manifest_path,
                error: format!("{:#}", e),
            }),
        }
    } else {
        tracing::debug!(path = %manifest_path.display(), "no manifest; using main types file only");
    }

    (sources, failures)
}

/// Seed vocabulary tables from the limits definition, if present.
pub async fn seed_vocabulary(config: &Config, store: &dyn RecordStore) -> Result<usize> {
    let path = config.limits_path();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no limits definition; vocabulary not seeded");
        return Ok(0);
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let limits = parse_limits(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    let mut added = 0;
    for (vocab, names) in &limits {
        added += store.seed_terms(*vocab, names).await?;
    }
    tracing::info!(path = %path.display(), added, "seeded vocabulary");
    Ok(added)
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Extract every record of `xml` and save it under its record key.
pub async fn ingest_text(
    store: &dyn RecordStore,
    config: &Config,
    xml: &str,
    folder: &str,
    file: &str,
) -> Result<usize> {
    let records = extract_str(xml, &config.records.tag)?;
    for shape in &records {
        let key = record_key(shape, folder, file);
        store
            .save_record(&key, shape, file, folder)
            .await
            .with_context(|| format!("saving record '{}'", key))?;
    }
    Ok(records.len())
}

pub async fn sync_sources(config: &Config, full: bool, dry_run: bool) -> Result<SyncReport> {
    migrate::run_migrations(config).await?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool.clone(), config.records.flags);

    let (sources, failures) = discover_sources(config);
    let mut report = SyncReport {
        files_found: sources.len(),
        failures,
        ..SyncReport::default()
    };

    if !dry_run {
        report.terms_seeded = seed_vocabulary(config, &store).await?;
    }

    for source in &sources {
        let bytes = match std::fs::read(&source.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %source.path.display(), error = %e, "skipping unreadable file");
                report.failures.push(FileFailure {
                    path: source.path.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };
        let hash = content_hash(&bytes);

        if !full && get_checkpoint(&pool, source).await?.as_deref() == Some(hash.as_str()) {
            report.files_unchanged += 1;
            continue;
        }

        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(e) => {
                let error = Error::malformed(format!("not valid UTF-8: {}", e));
                tracing::warn!(path = %source.path.display(), error = %error, "skipping file");
                report.failures.push(FileFailure {
                    path: source.path.clone(),
                    error: error.to_string(),
                });
                continue;
            }
        };
        if dry_run {
            match extract_str(text, &config.records.tag) {
                Ok(records) => {
                    report.files_ingested += 1;
                    report.records_saved += records.len();
                }
                Err(e) => report.failures.push(FileFailure {
                    path: source.path.clone(),
                    error: e.to_string(),
                }),
            }
            continue;
        }

        match ingest_text(&store, config, text, &source.folder, &source.file).await {
            Ok(count) => {
                tracing::info!(path = %source.path.display(), records = count, "ingested");
                set_checkpoint(&pool, source, &hash, count).await?;
                report.files_ingested += 1;
                report.records_saved += count;
            }
            Err(e) => {
                tracing::warn!(path = %source.path.display(), error = %e, "skipping file");
                report.failures.push(FileFailure {
                    path: source.path.clone(),
                    error: format!("{:#}", e),
                });
            }
        }
    }

    pool.close().await;
    Ok(report)
}

pub async fn run_sync(config: &Config, full: bool, dry_run: bool) -> Result<()> {
    let report = sync_sources(config, full, dry_run).await?;

    if dry_run {
        println!("sync {} (dry-run)", config.mission.root.display());
    } else {
        println!("sync {}", config.mission.root.display());
    }
    println!("  files found: {}", report.files_found);
    println!("  files unchanged: {}", report.files_unchanged);
    println!("  files ingested: {}", report.files_ingested);
    println!("  records saved: {}", report.records_saved);
    if !dry_run {
        println!("  terms seeded: {}", report.terms_seeded);
    }
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
    println!("ok");
    Ok(())
}

async fn get_checkpoint(pool: &SqlitePool, source: &SourceFile) -> Result<Option<String>> {
    let hash: Option<String> = sqlx::query_scalar(
        "SELECT content_hash FROM source_files WHERE source_folder = ? AND source_file = ?",
    )
    .bind(&source.folder)
    .bind(&source.file)
    .fetch_optional(pool)
    .await?;
    Ok(hash)
}

async fn set_checkpoint(
    pool: &SqlitePool,
    source: &SourceFile,
    hash: &str,
    record_count: usize,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    sqlx::query(
        r#"
        INSERT INTO source_files (source_folder, source_file, content_hash, record_count, synced_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(source_folder, source_file) DO UPDATE SET
            content_hash = excluded.content_hash,
            record_count = excluded.record_count,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&source.folder)
    .bind(&source.file)
    .bind(hash)
    .bind(record_count as i64)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(root: &std::path::Path) -> Config {
        toml::from_str(&format!(
            "[db]\npath = \"{0}/data/econ.sqlite\"\n[mission]\nroot = \"{0}/mission\"\n",
            root.display()
        ))
        .unwrap()
    }

    #[test]
    fn discovers_main_file_and_manifest_types_entries() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        std::fs::create_dir_all(cfg.mission.root.join("db")).unwrap();
        std::fs::write(
            cfg.manifest_path(),
            r#"<economycore>
                <ce folder="custom\weapons">
                    <file name="guns.xml" type="types"/>
                    <file name="spawns.xml" type="spawnabletypes"/>
                </ce>
                <ce folder="db"><file name="types.xml" type="types"/></ce>
            </economycore>"#,
        )
        .unwrap();

        let (sources, failures) = discover_sources(&cfg);
        assert!(failures.is_empty());
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].folder, "db");
        assert_eq!(sources[0].file, "types.xml");
        assert_eq!(sources[1].folder, "custom/weapons");
        assert_eq!(
            sources[1].path,
            cfg.mission.root.join("custom/weapons").join("guns.xml")
        );
    }

    #[test]
    fn malformed_manifest_is_reported_not_fatal() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = config_for(tmp.path());
        std::fs::create_dir_all(&cfg.mission.root).unwrap();
        std::fs::write(cfg.manifest_path(), "<economycore><ce folder=\"x\">").unwrap();
        let (sources, failures) = discover_sources(&cfg);
        assert_eq!(sources.len(), 1);
        assert_eq!(failures.len(), 1);
    }
}
