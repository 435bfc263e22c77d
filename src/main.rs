//! # Economy Harness CLI (`econ`)
//!
//! The `econ` binary is the primary interface for Economy Harness. It
//! provides commands for store initialization, mission ingestion, export,
//! record inspection and editing, classification management, and store
//! maintenance.
//!
//! ## Usage
//!
//! ```bash
//! econ --config ./config/econ.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `econ init` | Create the store, run migrations, seed vocabulary |
//! | `econ sync` | Ingest the mission's types files |
//! | `econ export` | Write records back to XML (by source or by itemclass) |
//! | `econ get <key>` | Show one record |
//! | `econ list` | List records |
//! | `econ edit <key> <field> <value>` | Set a field value |
//! | `econ undo <key>` / `econ history <key>` | Walk back edits |
//! | `econ itemclass ...` / `econ itemtag ...` | Manage groupings |
//! | `econ vocab ...` / `econ flag ...` | Manage vocabulary edges and flags |
//! | `econ backup ...` | Create, list, restore backups |
//! | `econ table ...` | Browse tables, edit or delete single rows |
//! | `econ duplicates` / `econ dedupe` / `econ delete-all` | Table maintenance |
//! | `econ import-db` / `econ merge-xml` | Merge records from elsewhere |
//! | `econ clean-lines` | Remove duplicate lines in exported files |
//! | `econ stats` | Store overview |
//! | `econ watch` | Re-sync when mission files change |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize and ingest
//! econ init --config ./config/econ.toml
//! econ sync --config ./config/econ.toml
//!
//! # Classify and regroup
//! econ itemclass create weapons --config ./config/econ.toml
//! econ itemclass assign AKM weapons --config ./config/econ.toml
//! econ export --by-itemclass --config ./config/econ.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use economy_harness::classify::{self, Grouping};
use economy_harness::get::{self, GetFormat};
use economy_harness::sqlite_store::SqliteStore;
use economy_harness::{
    backup, cleanup, config, db, edit, export, ingest, maintenance, migrate, stats, watch,
};
use economy_harness_core::normalize::Vocabulary;
use economy_harness_core::store::RecordStore;

/// Economy Harness CLI — normalize DayZ central-economy files into SQLite
/// and back.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/econ.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "econ",
    about = "Economy Harness — normalize DayZ types.xml into SQLite and back",
    version,
    long_about = "Economy Harness extracts <type> records from a mission's types files into \
    relational rows, lets you edit and classify them, and reconstructs well-formed XML, \
    optionally regrouped by itemclass with cfgeconomycore.xml kept in sync."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/econ.toml`. Store, mission, record convention,
    /// export, backup, and watch settings are read from this file.
    #[arg(long, global = true, default_value = "./config/econ.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the store.
    ///
    /// Creates the SQLite file and all tables, then seeds the vocabulary
    /// tables from the mission's limits definition. Safe to run repeatedly.
    Init,

    /// Ingest the mission's types files.
    ///
    /// Reads the main types file and every `types` entry of the economy
    /// core manifest. Files whose content hash is unchanged since the last
    /// sync are skipped.
    Sync {
        /// Ignore checkpoints and re-ingest every file.
        #[arg(long)]
        full: bool,

        /// Show file and record counts without writing to the store.
        #[arg(long)]
        dry_run: bool,
    },

    /// Write records back to XML.
    ///
    /// By default each record returns to the file it came from. With
    /// `--by-itemclass`, one file per itemclass is written into the export
    /// subfolder and the manifest is updated to reference exactly those.
    Export {
        /// Group by itemclass instead of by source file.
        #[arg(long)]
        by_itemclass: bool,

        /// Output root for source-grouped export (defaults to the mission root).
        #[arg(long, conflicts_with = "by_itemclass")]
        out: Option<PathBuf>,
    },

    /// Show one record.
    Get {
        /// Record key.
        key: String,

        /// Print the reconstructed XML element.
        #[arg(long, conflicts_with = "json")]
        xml: bool,

        /// Print the record shape as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List records.
    List {
        /// Only records from this source (`folder/file` or `file`).
        #[arg(long)]
        source: Option<String>,

        /// Only records in this itemclass.
        #[arg(long)]
        itemclass: Option<String>,
    },

    /// Set a single-occurrence field of a record.
    Edit {
        key: String,
        field: String,
        value: String,
    },

    /// Revert the latest edit of a record.
    Undo { key: String },

    /// Show the edit history of a record, newest first.
    History { key: String },

    /// Manage itemclasses (one per record).
    Itemclass {
        #[command(subcommand)]
        action: ItemclassAction,
    },

    /// Manage itemtags (any number per record).
    Itemtag {
        #[command(subcommand)]
        action: ItemtagAction,
    },

    /// Manage vocabulary terms and record references.
    ///
    /// Vocabularies: `category`, `tag`, `usage`, `value`.
    Vocab {
        #[command(subcommand)]
        action: VocabAction,
    },

    /// Set or clear a record flag.
    Flag {
        #[command(subcommand)]
        action: FlagAction,
    },

    /// Manage store backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Browse store tables and edit or delete single rows.
    Table {
        #[command(subcommand)]
        action: TableAction,
    },

    /// List duplicate rows of a table (equal in every column except `id`).
    Duplicates { table: String },

    /// Delete duplicate rows of a table, keeping the lowest id.
    ///
    /// A backup is taken first and restored if the operation fails.
    Dedupe { table: String },

    /// Delete every row of a table.
    ///
    /// A backup is taken first and restored if the operation fails.
    DeleteAll {
        table: String,

        /// Confirm the deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Merge records from another store; existing keys are skipped.
    ImportDb { path: PathBuf },

    /// Add records from a loose XML file; existing keys are skipped.
    MergeXml { path: PathBuf },

    /// Remove consecutive duplicate lines in exported XML files.
    CleanLines,

    /// Show store statistics.
    Stats,

    /// Re-sync whenever a mission input file changes.
    Watch,
}

#[derive(Subcommand)]
enum ItemclassAction {
    /// Create an itemclass.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Rename an itemclass or change its description.
    Update {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an itemclass and its assignments.
    Delete { name: String },
    /// List itemclasses with member counts.
    List,
    /// Put a record into an itemclass.
    Assign { key: String, itemclass: String },
    /// Remove a record from its itemclass.
    Clear { key: String },
}

#[derive(Subcommand)]
enum ItemtagAction {
    /// Create an itemtag.
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Rename an itemtag or change its description.
    Update {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an itemtag and its assignments.
    Delete { name: String },
    /// List itemtags with member counts.
    List,
    /// Replace a record's itemtags (no names clears them).
    Set { key: String, itemtags: Vec<String> },
}

#[derive(Subcommand)]
enum VocabAction {
    /// Add a term to a vocabulary.
    Add {
        #[arg(value_parser = parse_vocab)]
        vocab: Vocabulary,
        name: String,
    },
    /// List the terms of a vocabulary.
    List {
        #[arg(value_parser = parse_vocab)]
        vocab: Vocabulary,
    },
    /// Reference a term from a record.
    Link {
        key: String,
        #[arg(value_parser = parse_vocab)]
        vocab: Vocabulary,
        name: String,
    },
    /// Drop a record's reference to a term.
    Unlink {
        key: String,
        #[arg(value_parser = parse_vocab)]
        vocab: Vocabulary,
        name: String,
    },
}

#[derive(Subcommand)]
enum FlagAction {
    /// Set a flag to 0 or 1.
    Set {
        key: String,
        flag: String,
        #[arg(value_parser = clap::value_parser!(u8).range(0..=1))]
        value: u8,
    },
    /// Remove a flag from a record.
    Clear { key: String, flag: String },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Write a timestamped backup of the store.
    Create,
    /// List backups, newest first.
    List,
    /// Replace the store with a backup (the newest if none is given).
    Restore { path: Option<PathBuf> },
}

#[derive(Subcommand)]
enum TableAction {
    /// List tables with their row counts.
    List,
    /// Print a page of a table.
    Show {
        table: String,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Set one column of the row with the given id.
    ///
    /// A backup is taken first and restored if the operation fails.
    UpdateRow {
        table: String,
        id: i64,
        column: String,
        #[arg(required_unless_present = "null")]
        value: Option<String>,
        /// Store NULL instead of a value.
        #[arg(long, conflicts_with = "value")]
        null: bool,
    },
    /// Delete the row with the given id.
    ///
    /// A backup is taken first and restored if the operation fails.
    DeleteRow { table: String, id: i64 },
}

fn parse_vocab(s: &str) -> Result<Vocabulary, String> {
    Vocabulary::parse(s).ok_or_else(|| {
        format!(
            "unknown vocabulary '{}': expected category, tag, usage, or value",
            s
        )
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            let store = SqliteStore::new(db::connect(&cfg).await?, cfg.records.flags);
            let seeded = ingest::seed_vocabulary(&cfg, &store).await;
            store.close().await;
            let seeded = seeded?;
            println!("Store initialized: {}", cfg.db.path.display());
            println!("  terms seeded: {}", seeded);
        }
        Commands::Sync { full, dry_run } => {
            ingest::run_sync(&cfg, full, dry_run).await?;
        }
        Commands::Export { by_itemclass, out } => {
            export::run_export(&cfg, by_itemclass, out.as_deref()).await?;
        }
        Commands::Get { key, xml, json } => {
            let format = if xml {
                GetFormat::Xml
            } else if json {
                GetFormat::Json
            } else {
                GetFormat::Text
            };
            get::run_get(&cfg, &key, format).await?;
        }
        Commands::List { source, itemclass } => {
            get::run_list(&cfg, source.as_deref(), itemclass.as_deref()).await?;
        }
        Commands::Edit { key, field, value } => {
            edit::run_edit(&cfg, &key, &field, &value).await?;
        }
        Commands::Undo { key } => {
            edit::run_undo(&cfg, &key).await?;
        }
        Commands::History { key } => {
            edit::run_history(&cfg, &key).await?;
        }
        Commands::Itemclass { action } => match action {
            ItemclassAction::Create { name, description } => {
                classify::run_grouping_create(&cfg, Grouping::Itemclass, &name, description.as_deref())
                    .await?;
            }
            ItemclassAction::Update {
                name,
                rename,
                description,
            } => {
                classify::run_grouping_update(
                    &cfg,
                    Grouping::Itemclass,
                    &name,
                    rename.as_deref(),
                    description.as_deref(),
                )
                .await?;
            }
            ItemclassAction::Delete { name } => {
                classify::run_grouping_delete(&cfg, Grouping::Itemclass, &name).await?;
            }
            ItemclassAction::List => {
                classify::run_grouping_list(&cfg, Grouping::Itemclass).await?;
            }
            ItemclassAction::Assign { key, itemclass } => {
                classify::run_assign_itemclass(&cfg, &key, Some(&itemclass)).await?;
            }
            ItemclassAction::Clear { key } => {
                classify::run_assign_itemclass(&cfg, &key, None).await?;
            }
        },
        Commands::Itemtag { action } => match action {
            ItemtagAction::Create { name, description } => {
                classify::run_grouping_create(&cfg, Grouping::Itemtag, &name, description.as_deref())
                    .await?;
            }
            ItemtagAction::Update {
                name,
                rename,
                description,
            } => {
                classify::run_grouping_update(
                    &cfg,
                    Grouping::Itemtag,
                    &name,
                    rename.as_deref(),
                    description.as_deref(),
                )
                .await?;
            }
            ItemtagAction::Delete { name } => {
                classify::run_grouping_delete(&cfg, Grouping::Itemtag, &name).await?;
            }
            ItemtagAction::List => {
                classify::run_grouping_list(&cfg, Grouping::Itemtag).await?;
            }
            ItemtagAction::Set { key, itemtags } => {
                classify::run_set_itemtags(&cfg, &key, &itemtags).await?;
            }
        },
        Commands::Vocab { action } => match action {
            VocabAction::Add { vocab, name } => {
                let store = SqliteStore::new(db::connect(&cfg).await?, cfg.records.flags);
                let result = store.add_term(vocab, &name).await;
                store.close().await;
                result?;
                println!("added {} '{}'", vocab, name.trim());
            }
            VocabAction::List { vocab } => {
                let store = SqliteStore::new(db::connect(&cfg).await?, cfg.records.flags);
                let result = store.list_terms(vocab).await;
                store.close().await;
                for name in result? {
                    println!("{}", name);
                }
            }
            VocabAction::Link { key, vocab, name } => {
                classify::run_set_classification(&cfg, &key, vocab, &name, true).await?;
            }
            VocabAction::Unlink { key, vocab, name } => {
                classify::run_set_classification(&cfg, &key, vocab, &name, false).await?;
            }
        },
        Commands::Flag { action } => match action {
            FlagAction::Set { key, flag, value } => {
                classify::run_set_flag(&cfg, &key, &flag, Some(value == 1)).await?;
            }
            FlagAction::Clear { key, flag } => {
                classify::run_set_flag(&cfg, &key, &flag, None).await?;
            }
        },
        Commands::Backup { action } => match action {
            BackupAction::Create => backup::run_backup_create(&cfg).await?,
            BackupAction::List => backup::run_backup_list(&cfg)?,
            BackupAction::Restore { path } => backup::run_backup_restore(&cfg, path.as_deref())?,
        },
        Commands::Table { action } => match action {
            TableAction::List => maintenance::run_tables(&cfg).await?,
            TableAction::Show {
                table,
                limit,
                offset,
            } => maintenance::run_table_show(&cfg, &table, limit, offset).await?,
            TableAction::UpdateRow {
                table,
                id,
                column,
                value,
                null: _,
            } => maintenance::run_update_row(&cfg, &table, id, &column, value.as_deref()).await?,
            TableAction::DeleteRow { table, id } => {
                maintenance::run_delete_row(&cfg, &table, id).await?
            }
        },
        Commands::Duplicates { table } => {
            maintenance::run_duplicates(&cfg, &table).await?;
        }
        Commands::Dedupe { table } => {
            maintenance::run_dedupe(&cfg, &table).await?;
        }
        Commands::DeleteAll { table, yes } => {
            if !yes {
                anyhow::bail!("delete-all removes every row of '{}'; pass --yes to confirm", table);
            }
            maintenance::run_delete_all(&cfg, &table).await?;
        }
        Commands::ImportDb { path } => {
            maintenance::run_import(&cfg, &path).await?;
        }
        Commands::MergeXml { path } => {
            maintenance::run_merge_xml(&cfg, &path).await?;
        }
        Commands::CleanLines => {
            cleanup::run_clean_lines(&cfg)?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Watch => {
            watch::run_watch(&cfg).await?;
        }
    }

    Ok(())
}
