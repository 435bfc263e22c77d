use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn econ_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("econ");
    path
}

const TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<types>
    <type name="Apple">
        <nominal>50</nominal>
        <lifetime>3600</lifetime>
        <flags count_in_cargo="0" count_in_hoarder="0" count_in_map="1" count_in_player="0" crafted="0" deloot="0"/>
        <category name="food"/>
        <usage name="Coast"/>
        <usage name="Village"/>
    </type>
    <type name="AKM">
        <nominal>5</nominal>
        <lifetime>28800</lifetime>
        <category name="weapons"/>
        <usage name="Military"/>
        <value name="Tier3"/>
    </type>
</types>
"#;

const LIMITS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes" ?>
<lists>
    <categories>
        <category name="food"/>
        <category name="weapons"/>
    </categories>
    <tags>
        <tag name="floor"/>
    </tags>
    <usageflags>
        <usage name="Coast"/>
        <usage name="Village"/>
        <usage name="Military"/>
    </usageflags>
    <valueflags>
        <value name="Tier3"/>
    </valueflags>
</lists>
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let mission = root.join("mission");
    fs::create_dir_all(mission.join("db")).unwrap();
    fs::write(mission.join("db").join("types.xml"), TYPES_XML).unwrap();
    fs::write(mission.join("cfglimitsdefinition.xml"), LIMITS_XML).unwrap();

    let config_content = format!(
        r#"[db]
path = "{0}/data/econ.sqlite"

[mission]
root = "{0}/mission"
"#,
        root.display()
    );

    let config_path = config_dir.join("econ.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_econ(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = econ_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run econ binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn synced_env() -> (TempDir, PathBuf) {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_econ(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    let (stdout, stderr, success) = run_econ(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    (tmp, config_path)
}

#[test]
fn test_init_creates_database_and_seeds_vocabulary() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_econ(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(stdout.contains("terms seeded: 7"));
    assert!(tmp.path().join("data").join("econ.sqlite").exists());

    let (stdout, _, success) = run_econ(&config_path, &["vocab", "list", "usage"]);
    assert!(success);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), vec!["Coast", "Military", "Village"]);
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_econ(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (stdout, _, success2) = run_econ(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
    assert!(stdout.contains("terms seeded: 0"));
}

#[test]
fn test_sync_ingests_types() {
    let (_tmp, config_path) = setup_test_env();

    run_econ(&config_path, &["init"]);
    let (stdout, stderr, success) = run_econ(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files ingested: 1"));
    assert!(stdout.contains("records saved: 2"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_sync_incremental() {
    let (tmp, config_path) = synced_env();

    let (stdout, _, _) = run_econ(&config_path, &["sync"]);
    assert!(
        stdout.contains("files unchanged: 1") && stdout.contains("records saved: 0"),
        "Expected no files processed on incremental sync, got: {}",
        stdout
    );

    let types = tmp.path().join("mission").join("db").join("types.xml");
    fs::write(&types, TYPES_XML.replace("<nominal>50</nominal>", "<nominal>60</nominal>")).unwrap();

    let (stdout, _, _) = run_econ(&config_path, &["sync"]);
    assert!(
        stdout.contains("files ingested: 1") && stdout.contains("records saved: 2"),
        "Expected the modified file to be re-ingested, got: {}",
        stdout
    );

    let (stdout, _, _) = run_econ(&config_path, &["sync", "--full"]);
    assert!(stdout.contains("files ingested: 1"));
}

#[test]
fn test_sync_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    run_econ(&config_path, &["init"]);
    let (stdout, _, success) = run_econ(&config_path, &["sync", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("records saved: 2"));

    let (stdout, _, _) = run_econ(&config_path, &["list"]);
    assert!(stdout.contains("No records."), "dry run wrote records: {}", stdout);
}

#[test]
fn test_sync_reports_malformed_file_and_continues() {
    let (tmp, config_path) = setup_test_env();
    let mission = tmp.path().join("mission");
    fs::create_dir_all(mission.join("extra")).unwrap();
    fs::write(mission.join("extra").join("broken.xml"), "<types><type name=\"X\">").unwrap();
    fs::write(
        mission.join("cfgeconomycore.xml"),
        "<economycore>\n    <ce folder=\"extra\">\n        <file name=\"broken.xml\" type=\"types\" />\n    </ce>\n</economycore>\n",
    )
    .unwrap();

    run_econ(&config_path, &["init"]);
    let (stdout, stderr, success) = run_econ(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files found: 2"));
    assert!(stdout.contains("records saved: 2"));
    assert!(stdout.contains("failed:") && stdout.contains("broken.xml"));
}

#[test]
fn test_get_text_xml_and_json() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_econ(&config_path, &["get", "Apple"]);
    assert!(success);
    assert!(stdout.contains("source:     db/types.xml"));
    assert!(stdout.contains("nominal"));
    assert!(stdout.contains("usage:"));

    let (stdout, _, success) = run_econ(&config_path, &["get", "Apple", "--xml"]);
    assert!(success);
    assert!(stdout.contains("<type name=\"Apple\">"));
    assert!(stdout.contains("<nominal>50</nominal>"));
    assert!(stdout.contains("<usage name=\"Village\"/>"));

    let (stdout, _, success) = run_econ(&config_path, &["get", "AKM", "--json"]);
    assert!(success);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["nominal"], "5");
}

#[test]
fn test_get_unknown_record_fails() {
    let (_tmp, config_path) = synced_env();

    let (_, stderr, success) = run_econ(&config_path, &["get", "Banana"]);
    assert!(!success);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_edit_history_undo() {
    let (_tmp, config_path) = synced_env();

    let (stdout, stderr, success) = run_econ(&config_path, &["edit", "Apple", "nominal", "75"]);
    assert!(success, "edit failed: stdout={}, stderr={}", stdout, stderr);

    let (stdout, _, _) = run_econ(&config_path, &["get", "Apple", "--xml"]);
    assert!(stdout.contains("<nominal>75</nominal>"));

    let (stdout, _, _) = run_econ(&config_path, &["history", "Apple"]);
    assert!(stdout.contains("nominal") && stdout.contains("50") && stdout.contains("75"));

    let (stdout, _, success) = run_econ(&config_path, &["undo", "Apple"]);
    assert!(success);
    assert!(stdout.contains("75 -> 50"));

    let (stdout, _, _) = run_econ(&config_path, &["get", "Apple", "--xml"]);
    assert!(stdout.contains("<nominal>50</nominal>"));

    let (_, _, success) = run_econ(&config_path, &["undo", "Apple"]);
    assert!(!success, "undo with empty history should fail");
}

#[test]
fn test_edit_rejects_reserved_fields() {
    let (_tmp, config_path) = synced_env();

    let (_, stderr, success) = run_econ(&config_path, &["edit", "Apple", "usage", "Farm"]);
    assert!(!success);
    assert!(stderr.contains("validation failed"), "stderr: {}", stderr);
}

#[test]
fn test_itemclass_export_updates_manifest() {
    let (tmp, config_path) = synced_env();

    let (_, _, success) = run_econ(&config_path, &["itemclass", "create", "weapons"]);
    assert!(success);
    let (_, _, success) = run_econ(&config_path, &["itemclass", "assign", "AKM", "weapons"]);
    assert!(success);

    let (_, stderr, success) = run_econ(&config_path, &["itemclass", "create", "weapons"]);
    assert!(!success);
    assert!(stderr.contains("already exists"), "stderr: {}", stderr);

    let (stdout, stderr, success) = run_econ(&config_path, &["export", "--by-itemclass"]);
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);

    let export_dir = tmp.path().join("mission").join("exported-types");
    let weapons = fs::read_to_string(export_dir.join("weapons.xml")).unwrap();
    assert!(weapons.contains("<type name=\"AKM\">"));
    assert!(!weapons.contains("Apple"));
    let misc = fs::read_to_string(export_dir.join("misc.xml")).unwrap();
    assert!(misc.contains("<type name=\"Apple\">"));

    let manifest = fs::read_to_string(tmp.path().join("mission").join("cfgeconomycore.xml")).unwrap();
    assert!(manifest.contains("<ce folder=\"exported-types\">"));
    assert!(manifest.contains("<file name=\"misc.xml\" type=\"types\" />"));
    assert!(manifest.contains("<file name=\"weapons.xml\" type=\"types\" />"));

    // Second export leaves the manifest byte-identical.
    run_econ(&config_path, &["export", "--by-itemclass"]);
    let again = fs::read_to_string(tmp.path().join("mission").join("cfgeconomycore.xml")).unwrap();
    assert_eq!(manifest, again);
}

#[test]
fn test_export_by_source_round_trip() {
    let (tmp, config_path) = synced_env();
    let out = tmp.path().join("out");

    let (stdout, stderr, success) =
        run_econ(&config_path, &["export", "--out", out.to_str().unwrap()]);
    assert!(success, "export failed: stdout={}, stderr={}", stdout, stderr);

    let written = fs::read_to_string(out.join("db").join("types.xml")).unwrap();
    assert!(written.starts_with("<?xml"));
    assert!(written.contains("<type name=\"AKM\">"));
    assert!(written.contains("<value name=\"Tier3\"/>"));
    assert!(written.contains("count_in_map=\"1\""));
}

#[test]
fn test_dedupe_requires_known_table() {
    let (_tmp, config_path) = synced_env();

    let (_, _, success) = run_econ(&config_path, &["duplicates", "no_such_table"]);
    assert!(!success);

    let (stdout, _, success) = run_econ(&config_path, &["duplicates", "type_element_fields"]);
    assert!(success);
    assert!(stdout.contains("No duplicates"));
}

#[test]
fn test_delete_all_requires_confirmation() {
    let (_tmp, config_path) = synced_env();

    let (_, stderr, success) = run_econ(&config_path, &["delete-all", "edit_history"]);
    assert!(!success);
    assert!(stderr.contains("--yes"));

    let (stdout, _, success) = run_econ(&config_path, &["delete-all", "edit_history", "--yes"]);
    assert!(success);
    assert!(stdout.contains("rows deleted: 0"));

    let (stdout, _, _) = run_econ(&config_path, &["backup", "list"]);
    assert!(stdout.contains("_backup_"), "guarded op should leave a backup: {}", stdout);
}

#[test]
fn test_sync_after_delete_all_reingests() {
    let (_tmp, config_path) = synced_env();

    for table in ["type_elements", "type_element_fields"] {
        let (_, stderr, success) = run_econ(&config_path, &["delete-all", table, "--yes"]);
        assert!(success, "delete-all {} failed: {}", table, stderr);
    }

    let (stdout, stderr, success) = run_econ(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("files unchanged: 0"));
    assert!(stdout.contains("records saved: 2"));

    let (stdout, _, success) = run_econ(&config_path, &["get", "Apple"]);
    assert!(success);
    assert!(stdout.contains("nominal"));
}

#[test]
fn test_table_browse_and_row_edits() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_econ(&config_path, &["table", "list"]);
    assert!(success);
    assert!(stdout.contains("type_elements"));
    assert!(stdout.contains("source_files"));
    assert!(!stdout.contains("sqlite_sequence"));

    let (stdout, _, success) = run_econ(&config_path, &["table", "show", "type_elements"]);
    assert!(success);
    assert!(stdout.contains("element_key"));
    assert!(stdout.contains("AKM"));
    assert!(stdout.contains("rows 1-2 of 2"));

    let (stdout, stderr, success) = run_econ(
        &config_path,
        &["table", "update-row", "type_element_fields", "1", "field_value", "42"],
    );
    assert!(success, "update-row failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("field_value = 42"));

    let (stdout, _, _) = run_econ(&config_path, &["table", "show", "type_element_fields"]);
    assert!(stdout.contains("42"));

    let (stdout, _, success) = run_econ(
        &config_path,
        &["table", "delete-row", "type_element_fields", "1"],
    );
    assert!(success);
    assert!(stdout.contains("ok"));

    let (_, stderr, success) = run_econ(
        &config_path,
        &["table", "delete-row", "type_element_fields", "1"],
    );
    assert!(!success);
    assert!(stderr.contains("not found"));

    let (_, _, success) = run_econ(&config_path, &["table", "update-row", "type_elements", "1", "name"]);
    assert!(!success, "update-row needs a value or --null");
}

#[test]
fn test_merge_xml_skips_existing() {
    let (tmp, config_path) = synced_env();
    let extra = tmp.path().join("extra_types.xml");
    fs::write(
        &extra,
        "<types><type name=\"AKM\"><nominal>1</nominal></type><type name=\"Banana\"><nominal>7</nominal></type></types>",
    )
    .unwrap();

    let (stdout, stderr, success) = run_econ(&config_path, &["merge-xml", extra.to_str().unwrap()]);
    assert!(success, "merge failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("records added: 1"));
    assert!(stdout.contains("records skipped: 1"));

    let (stdout, _, _) = run_econ(&config_path, &["get", "Banana"]);
    assert!(stdout.contains("merged/extra_types.xml"));
}

#[test]
fn test_stats_and_list() {
    let (_tmp, config_path) = synced_env();

    let (stdout, _, success) = run_econ(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Records:     2"));
    assert!(stdout.contains("db/types.xml"));

    let (stdout, _, success) = run_econ(&config_path, &["list", "--source", "types.xml"]);
    assert!(success);
    assert!(stdout.contains("AKM") && stdout.contains("Apple"));
    assert!(stdout.contains("2 records"));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_econ(&tmp.path().join("nope.toml"), &["stats"]);
    assert!(!success);
    assert!(stderr.contains("nope.toml"), "stderr: {}", stderr);
}
