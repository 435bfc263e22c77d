//! In-memory [`RecordStore`] implementation.
//!
//! Uses `HashMap`/`BTreeMap` behind `std::sync::RwLock`. Mirrors the SQLite
//! backend's save semantics so tooling and tests can run without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::Error;
use crate::normalize::{compose, decompose, FieldRow, FlagPolicy, Vocabulary};
use crate::shape::Shape;

use super::{RecordMeta, RecordStore};

struct StoredRecord {
    meta: RecordMeta,
    fields: Vec<FieldRow>,
    classifications: BTreeMap<Vocabulary, Vec<String>>,
    flags: BTreeMap<String, bool>,
}

pub struct InMemoryStore {
    flag_policy: FlagPolicy,
    records: RwLock<HashMap<String, StoredRecord>>,
    terms: RwLock<BTreeMap<Vocabulary, Vec<String>>>,
}

impl InMemoryStore {
    pub fn new(flag_policy: FlagPolicy) -> Self {
        Self {
            flag_policy,
            records: RwLock::new(HashMap::new()),
            terms: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(FlagPolicy::default())
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn save_record(
        &self,
        key: &str,
        shape: &Shape,
        source_file: &str,
        source_folder: &str,
    ) -> Result<()> {
        let parts = decompose(shape, self.flag_policy);
        let terms = self.terms.read().map_err(poisoned)?;
        let mut records = self.records.write().map_err(poisoned)?;
        let now = chrono::Utc::now().timestamp();

        let entry = records.entry(key.to_string()).or_insert_with(|| StoredRecord {
            meta: RecordMeta {
                key: key.to_string(),
                name: None,
                source_file: String::new(),
                source_folder: String::new(),
                created_at: now,
                updated_at: now,
            },
            fields: Vec::new(),
            classifications: BTreeMap::new(),
            flags: BTreeMap::new(),
        });

        entry.meta.name = parts.name;
        entry.meta.source_file = source_file.to_string();
        entry.meta.source_folder = source_folder.to_string();
        entry.meta.updated_at = now;
        entry.fields = parts.fields;

        for (vocab, names) in parts.classifications {
            let known = terms.get(&vocab);
            let stored = entry.classifications.entry(vocab).or_default();
            for name in names {
                let resolves = known.is_some_and(|k| k.contains(&name));
                if resolves && !stored.contains(&name) {
                    stored.push(name);
                }
            }
        }
        entry.classifications.retain(|_, names| !names.is_empty());
        entry.flags.extend(parts.flags);
        Ok(())
    }

    async fn load_record(&self, key: &str) -> Result<Shape> {
        let records = self.records.read().map_err(poisoned)?;
        let record = records
            .get(key)
            .ok_or_else(|| Error::not_found(format!("record '{}'", key)))?;
        let mut classifications = record.classifications.clone();
        for names in classifications.values_mut() {
            names.sort();
        }
        Ok(compose(
            record.meta.name.as_deref(),
            &record.fields,
            &classifications,
            &record.flags,
        )?)
    }

    async fn get_record_meta(&self, key: &str) -> Result<Option<RecordMeta>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).map(|r| r.meta.clone()))
    }

    async fn list_records(&self) -> Result<Vec<RecordMeta>> {
        let records = self.records.read().map_err(poisoned)?;
        let mut out: Vec<RecordMeta> = records.values().map(|r| r.meta.clone()).collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    async fn add_term(&self, vocab: Vocabulary, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation(format!("{} name must not be empty", vocab)).into());
        }
        let mut terms = self.terms.write().map_err(poisoned)?;
        let list = terms.entry(vocab).or_default();
        if list.iter().any(|n| n == name) {
            return Err(Error::conflict(format!("{} '{}' already exists", vocab, name)).into());
        }
        list.push(name.to_string());
        Ok(())
    }

    async fn seed_terms(&self, vocab: Vocabulary, names: &[String]) -> Result<usize> {
        let mut terms = self.terms.write().map_err(poisoned)?;
        let list = terms.entry(vocab).or_default();
        let mut added = 0;
        for name in names {
            if !list.contains(name) {
                list.push(name.clone());
                added += 1;
            }
        }
        Ok(added)
    }

    async fn list_terms(&self, vocab: Vocabulary) -> Result<Vec<String>> {
        let terms = self.terms.read().map_err(poisoned)?;
        let mut list = terms.get(&vocab).cloned().unwrap_or_default();
        list.sort();
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_str;
    use crate::shape::FieldValue;

    fn record(xml: &str) -> Shape {
        extract_str(xml, "type").unwrap().remove(0)
    }

    async fn seeded_store(policy: FlagPolicy) -> InMemoryStore {
        let store = InMemoryStore::new(policy);
        store
            .seed_terms(Vocabulary::Category, &["food".to_string(), "tools".to_string()])
            .await
            .unwrap();
        store
            .seed_terms(Vocabulary::Usage, &["Coast".to_string(), "Village".to_string()])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let store = seeded_store(FlagPolicy::All).await;
        let apple = record(
            r#"<type name="Apple"><nominal>50</nominal><category name="food"/><usage name="Coast"/><usage name="Village"/><flags a="1" b="0"/></type>"#,
        );
        store.save_record("Apple", &apple, "types.xml", "db").await.unwrap();
        let loaded = store.load_record("Apple").await.unwrap();
        assert_eq!(loaded.normalized(), apple.normalized());
    }

    #[tokio::test]
    async fn unknown_vocabulary_names_are_dropped() {
        let store = seeded_store(FlagPolicy::All).await;
        let shape = record(r#"<type name="X"><category name="weapons"/></type>"#);
        store.save_record("X", &shape, "types.xml", "db").await.unwrap();
        let loaded = store.load_record("X").await.unwrap();
        assert!(loaded.get("category").is_none());
    }

    #[tokio::test]
    async fn resave_replaces_fields_and_keeps_references() {
        let store = seeded_store(FlagPolicy::All).await;
        let a = record(r#"<type name="K"><nominal>1</nominal><min>1</min><category name="food"/></type>"#);
        let b = record(r#"<type name="K"><nominal>2</nominal></type>"#);
        store.save_record("K", &a, "types.xml", "db").await.unwrap();
        let created = store.get_record_meta("K").await.unwrap().unwrap().created_at;
        store.save_record("K", &b, "types.xml", "db").await.unwrap();

        let loaded = store.load_record("K").await.unwrap();
        assert_eq!(loaded.get("nominal"), Some(&FieldValue::text("2")));
        assert!(loaded.get("min").is_none());
        assert!(loaded.get("category").is_some());
        assert_eq!(
            store.get_record_meta("K").await.unwrap().unwrap().created_at,
            created
        );
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let store = InMemoryStore::default();
        let err = store.load_record("nope").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn add_term_rejects_duplicates_and_blanks() {
        let store = InMemoryStore::default();
        store.add_term(Vocabulary::Tag, "floor").await.unwrap();
        let dup = store.add_term(Vocabulary::Tag, "floor").await.unwrap_err();
        assert!(matches!(dup.downcast_ref::<Error>(), Some(Error::Conflict(_))));
        let blank = store.add_term(Vocabulary::Tag, "  ").await.unwrap_err();
        assert!(matches!(blank.downcast_ref::<Error>(), Some(Error::Validation(_))));
        assert_eq!(store.list_terms(Vocabulary::Tag).await.unwrap(), vec!["floor"]);
    }
}
