//! SQLite-backed [`RecordStore`] implementation.
//!
//! Records live in `type_elements`, their fields in `type_element_fields`,
//! vocabulary references in the `element_*` edge tables, and flags in
//! `element_flags`. Each save runs in one transaction.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use economy_harness_core::normalize::{compose, decompose, FieldRow, FlagPolicy, Vocabulary};
use economy_harness_core::shape::Shape;
use economy_harness_core::store::{RecordMeta, RecordStore};
use economy_harness_core::Error;

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    flag_policy: FlagPolicy,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, flag_policy: FlagPolicy) -> Self {
        Self { pool, flag_policy }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Field rows for a record, ordered by `(field_name, field_order)` with
    /// unordered rows first.
    pub async fn field_rows(&self, key: &str) -> Result<Vec<FieldRow>> {
        let rows = sqlx::query(
            r#"
            SELECT field_name, field_order, field_value, attributes_json
            FROM type_element_fields
            WHERE element_key = ?
            ORDER BY field_name ASC, field_order ASC, id ASC
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| FieldRow {
                field_name: row.get("field_name"),
                order: row.get("field_order"),
                value: row.get("field_value"),
                sidecar: row.get("attributes_json"),
            })
            .collect())
    }

    /// Term names referenced by a record, per vocabulary, alphabetically.
    pub async fn classifications(&self, key: &str) -> Result<BTreeMap<Vocabulary, Vec<String>>> {
        let mut out = BTreeMap::new();
        for vocab in Vocabulary::ALL {
            let sql = format!(
                "SELECT t.name FROM {edge} e JOIN {table} t ON t.id = e.{col} \
                 WHERE e.element_key = ? ORDER BY t.name",
                edge = vocab.edge_table(),
                table = vocab.table(),
                col = vocab.id_column(),
            );
            let names: Vec<String> = sqlx::query_scalar(&sql)
                .bind(key)
                .fetch_all(&self.pool)
                .await?;
            if !names.is_empty() {
                out.insert(vocab, names);
            }
        }
        Ok(out)
    }

    pub async fn flags(&self, key: &str) -> Result<BTreeMap<String, bool>> {
        let rows = sqlx::query(
            r#"
            SELECT f.name, ef.value
            FROM element_flags ef
            JOIN flags f ON f.id = ef.flag_id
            WHERE ef.element_key = ?
            ORDER BY f.name
            "#,
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let value: i64 = row.get("value");
                (row.get("name"), value != 0)
            })
            .collect())
    }
}

fn meta_from_row(row: &sqlx::sqlite::SqliteRow) -> RecordMeta {
    RecordMeta {
        key: row.get("element_key"),
        name: row.get("name"),
        source_file: row.get("source_file"),
        source_folder: row.get("source_folder"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

/// Look up a vocabulary term id by exact name.
pub async fn term_id(
    tx: &mut Transaction<'_, Sqlite>,
    vocab: Vocabulary,
    name: &str,
) -> Result<Option<i64>> {
    let sql = format!("SELECT id FROM {} WHERE name = ?", vocab.table());
    let id: Option<i64> = sqlx::query_scalar(&sql)
        .bind(name)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(id)
}

/// Set a flag value for a record, creating the flag name on first use.
pub async fn upsert_flag(
    tx: &mut Transaction<'_, Sqlite>,
    key: &str,
    flag: &str,
    value: bool,
) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO flags (name) VALUES (?)")
        .bind(flag)
        .execute(&mut **tx)
        .await?;
    let flag_id: i64 = sqlx::query_scalar("SELECT id FROM flags WHERE name = ?")
        .bind(flag)
        .fetch_one(&mut **tx)
        .await?;
    sqlx::query(
        r#"
        INSERT INTO element_flags (element_key, flag_id, value)
        VALUES (?, ?, ?)
        ON CONFLICT(element_key, flag_id) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(key)
    .bind(flag_id)
    .bind(value as i64)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn save_record(
        &self,
        key: &str,
        shape: &Shape,
        source_file: &str,
        source_folder: &str,
    ) -> Result<()> {
        let parts = decompose(shape, self.flag_policy);
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO type_elements (element_key, name, source_file, source_folder,
                                       created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(element_key) DO UPDATE SET
                name = excluded.name,
                source_file = excluded.source_file,
                source_folder = excluded.source_folder,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(&parts.name)
        .bind(source_file)
        .bind(source_folder)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Replace fields
        sqlx::query("DELETE FROM type_element_fields WHERE element_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        for row in &parts.fields {
            sqlx::query(
                r#"
                INSERT INTO type_element_fields
                    (element_key, field_name, field_value, field_order, attributes_json)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(key)
            .bind(&row.field_name)
            .bind(&row.value)
            .bind(row.order)
            .bind(&row.sidecar)
            .execute(&mut *tx)
            .await?;
        }

        // Vocabulary references are additive
        for (vocab, names) in &parts.classifications {
            for name in names {
                let Some(id) = term_id(&mut tx, *vocab, name).await? else {
                    tracing::debug!(record = key, vocabulary = %vocab, term = %name, "unknown term dropped");
                    continue;
                };
                let sql = format!(
                    "INSERT OR IGNORE INTO {} (element_key, {}) VALUES (?, ?)",
                    vocab.edge_table(),
                    vocab.id_column()
                );
                sqlx::query(&sql).bind(key).bind(id).execute(&mut *tx).await?;
            }
        }

        for (flag, value) in &parts.flags {
            upsert_flag(&mut tx, key, flag, *value).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load_record(&self, key: &str) -> Result<Shape> {
        let row = sqlx::query("SELECT name FROM type_elements WHERE element_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(Error::not_found(format!("record '{}'", key)).into());
        };
        let name: Option<String> = row.get("name");

        let fields = self.field_rows(key).await?;
        let classifications = self.classifications(key).await?;
        let flags = self.flags(key).await?;

        let shape = compose(name.as_deref(), &fields, &classifications, &flags)
            .map_err(|e| anyhow::Error::new(e).context(format!("loading record '{}'", key)))?;
        Ok(shape)
    }

    async fn get_record_meta(&self, key: &str) -> Result<Option<RecordMeta>> {
        let row = sqlx::query(
            r#"
            SELECT element_key, name, source_file, source_folder, created_at, updated_at
            FROM type_elements WHERE element_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(meta_from_row))
    }

    async fn list_records(&self) -> Result<Vec<RecordMeta>> {
        let rows = sqlx::query(
            r#"
            SELECT element_key, name, source_file, source_folder, created_at, updated_at
            FROM type_elements ORDER BY element_key
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(meta_from_row).collect())
    }

    async fn add_term(&self, vocab: Vocabulary, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation(format!("{} name must not be empty", vocab)).into());
        }
        let sql = format!("INSERT OR IGNORE INTO {} (name) VALUES (?)", vocab.table());
        let result = sqlx::query(&sql).bind(name).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(Error::conflict(format!("{} '{}' already exists", vocab, name)).into());
        }
        Ok(())
    }

    async fn seed_terms(&self, vocab: Vocabulary, names: &[String]) -> Result<usize> {
        let sql = format!("INSERT OR IGNORE INTO {} (name) VALUES (?)", vocab.table());
        let mut tx = self.pool.begin().await?;
        let mut added = 0usize;
        for name in names {
            let result = sqlx::query(&sql).bind(name).execute(&mut *tx).await?;
            added += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(added)
    }

    async fn list_terms(&self, vocab: Vocabulary) -> Result<Vec<String>> {
        let sql = format!("SELECT name FROM {} ORDER BY name", vocab.table());
        let names: Vec<String> = sqlx::query_scalar(&sql).fetch_all(&self.pool).await?;
        Ok(names)
    }
}
