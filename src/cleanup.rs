//! Duplicate-line cleanup for exported XML files.
//!
//! Hand-merged exports sometimes end up with the same line twice in a row.
//! `econ clean-lines` drops every non-empty line that repeats the line
//! directly before it, in each `*.xml` of the export folder. Line endings
//! are kept as found. A file is only rewritten when something was removed,
//! and its previous content is copied to `<export>/backup/` first.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;
use crate::ingest::FileFailure;

#[derive(Debug, Default)]
pub struct CleanReport {
    pub files_processed: usize,
    pub files_modified: Vec<(PathBuf, usize)>,
    pub failures: Vec<FileFailure>,
}

impl CleanReport {
    pub fn lines_removed(&self) -> usize {
        self.files_modified.iter().map(|(_, n)| n).sum()
    }
}

fn line_body(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Remove consecutive duplicate non-empty lines. Returns the cleaned text
/// and the number of lines removed.
pub fn remove_duplicate_lines(content: &str) -> (String, usize) {
    let mut out = String::with_capacity(content.len());
    let mut previous: Option<&str> = None;
    let mut removed = 0;
    for line in content.split_inclusive('\n') {
        let body = line_body(line);
        if !body.is_empty() && previous == Some(body) {
            removed += 1;
            continue;
        }
        out.push_str(line);
        previous = Some(body);
    }
    (out, removed)
}

fn clean_file(path: &Path, backup_dir: &Path) -> Result<usize> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8(bytes).with_context(|| format!("{} is not UTF-8", path.display()))?;
    let (cleaned, removed) = remove_duplicate_lines(&text);
    if removed == 0 {
        return Ok(0);
    }

    std::fs::create_dir_all(backup_dir)?;
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("no file name: {}", path.display()))?;
    let backup = backup_dir.join(file_name);
    std::fs::copy(path, &backup)
        .with_context(|| format!("Failed to back up {} to {}", path.display(), backup.display()))?;
    std::fs::write(path, cleaned).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(removed)
}

/// Clean every `*.xml` directly inside `dir`. Failures are collected per
/// file.
pub fn clean_directory(dir: &Path) -> Result<CleanReport> {
    if !dir.is_dir() {
        anyhow::bail!("Export folder does not exist: {}", dir.display());
    }
    let backup_dir = dir.join("backup");

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "xml"))
        .collect();
    files.sort();

    let mut report = CleanReport::default();
    for path in files {
        match clean_file(&path, &backup_dir) {
            Ok(removed) => {
                report.files_processed += 1;
                if removed > 0 {
                    tracing::info!(path = %path.display(), removed, "duplicate lines removed");
                    report.files_modified.push((path, removed));
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "clean-lines failed");
                report.failures.push(FileFailure {
                    path,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    Ok(report)
}

pub fn run_clean_lines(config: &Config) -> Result<()> {
    let dir = config.export_dir();
    let report = clean_directory(&dir)?;

    println!("clean-lines {}", dir.display());
    for (path, removed) in &report.files_modified {
        println!("  {} ({} lines removed)", path.display(), removed);
    }
    for failure in &report.failures {
        println!("  failed: {} ({})", failure.path.display(), failure.error);
    }
    println!("  files processed: {}", report.files_processed);
    println!("  files modified: {}", report.files_modified.len());
    println!("  lines removed: {}", report.lines_removed());
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn removes_consecutive_duplicates_only() {
        let input = "<a>\n<b/>\n<b/>\n<b/>\n<c/>\n<b/>\n";
        let (out, removed) = remove_duplicate_lines(input);
        assert_eq!(out, "<a>\n<b/>\n<c/>\n<b/>\n");
        assert_eq!(removed, 2);
    }

    #[test]
    fn keeps_blank_lines_and_crlf() {
        let input = "<a>\r\n\r\n\r\n<b/>\r\n<b/>\r\n";
        let (out, removed) = remove_duplicate_lines(input);
        assert_eq!(out, "<a>\r\n\r\n\r\n<b/>\r\n");
        assert_eq!(removed, 1);
    }

    #[test]
    fn last_line_without_newline_still_matches() {
        let (out, removed) = remove_duplicate_lines("<b/>\n<b/>");
        assert_eq!(out, "<b/>\n");
        assert_eq!(removed, 1);
    }

    #[test]
    fn cleans_directory_with_backups() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::write(dir.join("weapons.xml"), "<types>\n<x/>\n<x/>\n</types>\n").unwrap();
        std::fs::write(dir.join("food.xml"), "<types>\n</types>\n").unwrap();
        std::fs::write(dir.join("notes.txt"), "a\na\n").unwrap();

        let report = clean_directory(dir).unwrap();
        assert_eq!(report.files_processed, 2);
        assert_eq!(report.lines_removed(), 1);
        assert_eq!(
            std::fs::read_to_string(dir.join("weapons.xml")).unwrap(),
            "<types>\n<x/>\n</types>\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.join("backup").join("weapons.xml")).unwrap(),
            "<types>\n<x/>\n<x/>\n</types>\n"
        );
        assert!(!dir.join("backup").join("food.xml").exists());
        assert_eq!(std::fs::read_to_string(dir.join("notes.txt")).unwrap(), "a\na\n");
    }
}
