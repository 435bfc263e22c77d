//! Storage abstraction for normalized records.
//!
//! The [`RecordStore`] trait is the persistence half of the normalization
//! engine: `save_record` decomposes a [`Shape`] into field rows, vocabulary
//! references, and flags; `load_record` composes them back. Backends:
//!
//! | Backend | Crate |
//! |---------|-------|
//! | [`memory::InMemoryStore`] | this crate (tests, tooling) |
//! | `SqliteStore` | `economy-harness` |
//!
//! Save semantics shared by every backend:
//!
//! - the record row is upserted by key; `created_at` survives, `updated_at`
//!   is bumped;
//! - all field rows for the key are replaced;
//! - vocabulary references resolve by exact name against existing terms and
//!   unknown names are dropped; resolved references are added to the
//!   record's existing ones, never removed;
//! - flags from the shape overwrite stored values for the same flag names.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::normalize::Vocabulary;
use crate::shape::Shape;

/// Record identity and provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMeta {
    pub key: String,
    pub name: Option<String>,
    pub source_file: String,
    pub source_folder: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Upsert a record and replace its field rows.
    async fn save_record(
        &self,
        key: &str,
        shape: &Shape,
        source_file: &str,
        source_folder: &str,
    ) -> Result<()>;

    /// Rebuild a record's shape. Fails with `Error::NotFound` for unknown keys.
    async fn load_record(&self, key: &str) -> Result<Shape>;

    async fn get_record_meta(&self, key: &str) -> Result<Option<RecordMeta>>;

    /// All records ordered by key.
    async fn list_records(&self) -> Result<Vec<RecordMeta>>;

    /// Add one term. Fails with `Error::Validation` for a blank name and
    /// `Error::Conflict` if it already exists.
    async fn add_term(&self, vocab: Vocabulary, name: &str) -> Result<()>;

    /// Insert terms that are not present yet; returns how many were added.
    async fn seed_terms(&self, vocab: Vocabulary, names: &[String]) -> Result<usize>;

    /// Term names ordered alphabetically.
    async fn list_terms(&self, vocab: Vocabulary) -> Result<Vec<String>>;
}
