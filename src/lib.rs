//! # Economy Harness
//!
//! A bidirectional normalization engine for DayZ central-economy files.
//!
//! Economy Harness reads a mission's `types.xml` (plus every `types` file
//! registered in `cfgeconomycore.xml`), decomposes each `<type>` record into
//! relational rows in SQLite, lets you edit and classify records there, and
//! writes them back out as well-formed XML, either to their original files
//! or regrouped by itemclass with the manifest updated to match.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌─────────────┐
//! │ Mission XML  │──▶│  Extract +   │──▶│   SQLite    │
//! │ types/limits │   │  Decompose  │   │ rows+edges  │
//! └──────────────┘   └─────────────┘   └──────┬──────┘
//!        ▲                                    │
//!        │           ┌─────────────┐          │
//!        └───────────│ Compose +   │◀─────────┘
//!   manifest sync    │ Reconstruct │   edit / classify / undo
//!                    └─────────────┘
//! ```
//!
//! The pure half (shape model, extraction, normalization, reconstruction,
//! manifest editing) lives in `economy-harness-core`; this crate adds the
//! configuration, the SQLite store, and the commands.
//!
//! ## Quick Start
//!
//! ```bash
//! econ init                     # create store, seed vocabulary
//! econ sync                     # ingest mission types files
//! econ itemclass create weapons
//! econ itemclass assign AKM weapons
//! econ export --by-itemclass    # regroup + update cfgeconomycore.xml
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite `RecordStore` backend |
//! | [`ingest`] | Source discovery and sync |
//! | [`export`] | XML export and manifest sync |
//! | [`edit`] | Field edits, history, undo |
//! | [`classify`] | Itemclasses, itemtags, vocabulary edges, flags |
//! | [`backup`] | Backups and guarded destructive operations |
//! | [`maintenance`] | Dedup, delete-all, import, merge |
//! | [`get`] | Record retrieval and listing |
//! | [`stats`] | Store statistics |
//! | [`watch`] | File-change observer and polling watcher |
//! | [`cleanup`] | Duplicate-line cleanup of exported files |

pub mod backup;
pub mod classify;
pub mod cleanup;
pub mod config;
pub mod db;
pub mod edit;
pub mod export;
pub mod get;
pub mod ingest;
pub mod maintenance;
pub mod migrate;
pub mod sqlite_store;
pub mod stats;
pub mod watch;
