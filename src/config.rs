use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use economy_harness_core::normalize::FlagPolicy;
use economy_harness_core::reconstruct::{Conventions, NamePlacement};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub mission: MissionConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MissionConfig {
    pub root: PathBuf,
    #[serde(default = "default_types_file")]
    pub types_file: PathBuf,
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    #[serde(default = "default_limits")]
    pub limits: PathBuf,
}

fn default_types_file() -> PathBuf {
    PathBuf::from("db/types.xml")
}
fn default_manifest() -> PathBuf {
    PathBuf::from("cfgeconomycore.xml")
}
fn default_limits() -> PathBuf {
    PathBuf::from("cfglimitsdefinition.xml")
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordsConfig {
    #[serde(default = "default_record_tag")]
    pub tag: String,
    #[serde(default = "default_container")]
    pub container: String,
    #[serde(default)]
    pub name_placement: NamePlacement,
    #[serde(default)]
    pub flags: FlagPolicy,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            tag: default_record_tag(),
            container: default_container(),
            name_placement: NamePlacement::default(),
            flags: FlagPolicy::default(),
        }
    }
}

fn default_record_tag() -> String {
    "type".to_string()
}
fn default_container() -> String {
    "types".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExportConfig {
    #[serde(default = "default_export_subfolder")]
    pub subfolder: String,
    #[serde(default = "default_indent")]
    pub indent: usize,
    #[serde(default = "default_misc_file")]
    pub misc_file: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            subfolder: default_export_subfolder(),
            indent: default_indent(),
            misc_file: default_misc_file(),
        }
    }
}

fn default_export_subfolder() -> String {
    "exported-types".to_string()
}
fn default_indent() -> usize {
    4
}
fn default_misc_file() -> String {
    "misc.xml".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct BackupConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            debounce_ms: default_debounce_ms(),
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.xml".to_string()]
}
fn default_debounce_ms() -> u64 {
    500
}
fn default_interval_secs() -> u64 {
    2
}

impl Config {
    pub fn conventions(&self) -> Conventions {
        Conventions {
            name_placement: self.records.name_placement,
            flag_policy: self.records.flags,
        }
    }

    pub fn types_path(&self) -> PathBuf {
        self.mission.root.join(&self.mission.types_file)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.mission.root.join(&self.mission.manifest)
    }

    pub fn limits_path(&self) -> PathBuf {
        self.mission.root.join(&self.mission.limits)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.mission.root.join(&self.export.subfolder)
    }

    /// Backup directory; defaults to `backups/` next to the database.
    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup.dir {
            Some(dir) => dir.clone(),
            None => self
                .db
                .path
                .parent()
                .map(|p| p.join("backups"))
                .unwrap_or_else(|| PathBuf::from("backups")),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate records
    if config.records.tag.trim().is_empty() {
        anyhow::bail!("records.tag must not be empty");
    }
    if config.records.container.trim().is_empty() {
        anyhow::bail!("records.container must not be empty");
    }

    // Validate export
    let subfolder = config.export.subfolder.trim_matches(|c| c == '/' || c == '\\');
    if subfolder.is_empty() || subfolder.contains("..") {
        anyhow::bail!(
            "export.subfolder must be a relative folder name, got '{}'",
            config.export.subfolder
        );
    }
    if config.export.indent > 16 {
        anyhow::bail!("export.indent must be <= 16");
    }
    if !config.export.misc_file.ends_with(".xml") {
        anyhow::bail!("export.misc_file must end with .xml");
    }

    // Validate watch
    if config.watch.interval_secs == 0 {
        anyhow::bail!("watch.interval_secs must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Config {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn defaults_fill_optional_sections() {
        let cfg = parse(
            r#"
            [db]
            path = "./data/economy.sqlite"

            [mission]
            root = "/srv/mission"
            "#,
        );
        assert_eq!(cfg.records.tag, "type");
        assert_eq!(cfg.records.container, "types");
        assert_eq!(cfg.records.flags, FlagPolicy::All);
        assert_eq!(cfg.records.name_placement, NamePlacement::Attribute);
        assert_eq!(cfg.export.subfolder, "exported-types");
        assert_eq!(cfg.export.indent, 4);
        assert_eq!(cfg.types_path(), PathBuf::from("/srv/mission/db/types.xml"));
        assert_eq!(cfg.backup_dir(), PathBuf::from("./data/backups"));
    }

    #[test]
    fn conventions_come_from_records_section() {
        let cfg = parse(
            r#"
            [db]
            path = "x.sqlite"

            [mission]
            root = "."

            [records]
            name_placement = "child"
            flags = "set-only"
            "#,
        );
        let conv = cfg.conventions();
        assert_eq!(conv.name_placement, NamePlacement::Child);
        assert_eq!(conv.flag_policy, FlagPolicy::SetOnly);
    }

    #[test]
    fn load_config_rejects_escaping_export_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("econ.toml");
        std::fs::write(
            &path,
            "[db]\npath = \"x.sqlite\"\n[mission]\nroot = \".\"\n[export]\nsubfolder = \"../out\"\n",
        )
        .unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("export.subfolder"));
    }

    #[test]
    fn example_config_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/econ.example.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.db.path, PathBuf::from("./data/economy.sqlite"));
        assert_eq!(cfg.watch.debounce_ms, 500);
    }
}
