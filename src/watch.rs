//! File-change notification for a mission directory.
//!
//! Change detection is split in two: a [`FileChangeObserver`] receives
//! `on_file_changed(path)` calls, and something outside feeds it. The CLI
//! feeder is a polling scanner ([`MtimeScanner`]) that compares modification
//! times under the mission root, filtered by `watch.include_globs`, with a
//! [`Debouncer`] collapsing bursts of writes to the same file.
//!
//! `econ watch` wires the scanner to [`SyncOnChange`], which re-runs an
//! incremental sync whenever a types file, the manifest, or the limits
//! definition changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use anyhow::{Context, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::Config;
use crate::ingest::{discover_sources, sync_sources};

/// Receives change notifications for individual files.
#[async_trait]
pub trait FileChangeObserver: Send + Sync {
    async fn on_file_changed(&self, path: &Path) -> Result<()>;
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

/// Polls a directory tree and reports files whose mtime changed, files that
/// appeared, and files that disappeared since the previous scan.
pub struct MtimeScanner {
    root: PathBuf,
    include: GlobSet,
    seen: HashMap<PathBuf, SystemTime>,
}

impl MtimeScanner {
    pub fn new(root: impl Into<PathBuf>, include_globs: &[String]) -> Result<Self> {
        Ok(Self {
            root: root.into(),
            include: build_globset(include_globs)?,
            seen: HashMap::new(),
        })
    }

    fn snapshot(&self) -> HashMap<PathBuf, SystemTime> {
        let mut out = HashMap::new();
        for entry in WalkDir::new(&self.root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if !self.include.is_match(relative) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            out.insert(path.to_path_buf(), modified);
        }
        out
    }

    /// Record the current state without reporting anything.
    pub fn prime(&mut self) {
        self.seen = self.snapshot();
    }

    /// Paths that changed since the last scan, sorted.
    pub fn scan(&mut self) -> Vec<PathBuf> {
        let current = self.snapshot();
        let mut changed: Vec<PathBuf> = current
            .iter()
            .filter(|(path, mtime)| self.seen.get(*path) != Some(mtime))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            self.seen
                .keys()
                .filter(|path| !current.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        self.seen = current;
        changed
    }
}

/// Holds paths until they have been quiet for the debounce window.
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    pub fn record(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path, now);
    }

    /// Remove and return paths whose last change is at least one window old.
    pub fn take_ready(&mut self, now: Instant) -> Vec<PathBuf> {
        let mut ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| now.duration_since(**at) >= self.window)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &ready {
            self.pending.remove(path);
        }
        ready.sort();
        ready
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Re-runs an incremental sync when a mission input changes.
pub struct SyncOnChange {
    config: Config,
}

impl SyncOnChange {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn is_input(&self, path: &Path) -> bool {
        if path == self.config.manifest_path() || path == self.config.limits_path() {
            return true;
        }
        let (sources, _) = discover_sources(&self.config);
        sources.iter().any(|s| s.path == path)
    }
}

#[async_trait]
impl FileChangeObserver for SyncOnChange {
    async fn on_file_changed(&self, path: &Path) -> Result<()> {
        if !self.is_input(path) {
            tracing::debug!(path = %path.display(), "not a mission input; ignored");
            return Ok(());
        }
        let report = sync_sources(&self.config, false, false).await?;
        println!(
            "changed {}: {} files ingested, {} records saved, {} failures",
            path.display(),
            report.files_ingested,
            report.records_saved,
            report.failures.len()
        );
        for failure in &report.failures {
            println!("  failed: {} ({})", failure.path.display(), failure.error);
        }
        Ok(())
    }
}

/// Poll `root` and dispatch debounced changes to `observer` until ctrl-c.
///
/// Observer errors are logged and do not stop the loop.
pub async fn watch_loop(
    root: &Path,
    config: &Config,
    observer: &dyn FileChangeObserver,
) -> Result<()> {
    let mut scanner = MtimeScanner::new(root, &config.watch.include_globs)?;
    scanner.prime();
    let mut debouncer = Debouncer::new(Duration::from_millis(config.watch.debounce_ms));
    let mut ticker = tokio::time::interval(Duration::from_secs(config.watch.interval_secs));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("watch stopped");
                return Ok(());
            }
        }

        let now = Instant::now();
        for path in scanner.scan() {
            debouncer.record(path, now);
        }
        for path in debouncer.take_ready(Instant::now()) {
            if let Err(e) = observer.on_file_changed(&path).await {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "change handler failed");
            }
        }
    }
}

pub async fn run_watch(config: &Config) -> Result<()> {
    let root = &config.mission.root;
    if !root.is_dir() {
        anyhow::bail!("Mission root does not exist: {}", root.display());
    }
    println!(
        "watching {} (every {}s, ctrl-c to stop)",
        root.display(),
        config.watch.interval_secs
    );
    let observer = SyncOnChange::new(config.clone());
    watch_loop(root, config, &observer).await?;
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn scanner_reports_new_modified_and_removed_files() {
        let tmp = TempDir::new().unwrap();
        let a = tmp.path().join("a.xml");
        let b = tmp.path().join("b.txt");
        std::fs::write(&a, "<types/>").unwrap();
        std::fs::write(&b, "ignored").unwrap();

        let mut scanner = MtimeScanner::new(tmp.path(), &["**/*.xml".to_string()]).unwrap();
        scanner.prime();
        assert!(scanner.scan().is_empty());

        let c = tmp.path().join("db").join("c.xml");
        std::fs::create_dir_all(c.parent().unwrap()).unwrap();
        std::fs::write(&c, "<types/>").unwrap();
        std::fs::write(&b, "still ignored").unwrap();
        assert_eq!(scanner.scan(), vec![c.clone()]);

        std::fs::remove_file(&a).unwrap();
        assert_eq!(scanner.scan(), vec![a]);
    }

    #[test]
    fn debouncer_waits_for_quiet_window() {
        let mut d = Debouncer::new(Duration::from_millis(500));
        let t0 = Instant::now();
        let path = PathBuf::from("/m/db/types.xml");
        d.record(path.clone(), t0);
        assert!(d.take_ready(t0 + Duration::from_millis(100)).is_empty());

        d.record(path.clone(), t0 + Duration::from_millis(300));
        assert!(d.take_ready(t0 + Duration::from_millis(600)).is_empty());
        assert_eq!(d.take_ready(t0 + Duration::from_millis(800)), vec![path]);
        assert!(d.is_empty());
    }

    #[test]
    fn rejects_invalid_globs() {
        assert!(MtimeScanner::new("/tmp", &["a[".to_string()]).is_err());
    }
}
