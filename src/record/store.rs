//! Record store with file-based JSON persistence
//!
//! All records live in memory behind a `tokio::sync::RwLock` and are written
//! to a single document on every mutation:
//!
//! ```text
//! ~/.experiential/records.json
//! {
//!   "sources":  [ { "id": "src-...", "content": "...", ... }, ... ],
//!   "released": [ "src-...", ... ]
//! }
//! ```
//!
//! Writes go to a sibling temp file that is then renamed over the document,
//! so a crash leaves either the old or the new state, never a partial one.
//! The in-memory state only changes after the write succeeds.

use super::types::{CreateRecord, Record, RecordFilter, RecordUpdate, DEFAULT_PERSPECTIVE};
use crate::error::{Error, Result};
use crate::persist::{ensure_parent, load_json, save_json};
use chrono::Utc;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// On-disk document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    sources: Vec<Record>,
    /// Ids of deleted records, kept so a second delete or an update after
    /// delete is reported as released rather than unknown
    #[serde(default)]
    released: BTreeSet<String>,
}

impl StoreDocument {
    fn position(&self, id: &str) -> Option<usize> {
        self.sources.iter().position(|r| r.id == id)
    }

    fn missing(&self, id: &str) -> Error {
        if self.released.contains(id) {
            Error::already_released(id)
        } else {
            Error::not_found(id)
        }
    }
}

/// Durable store for experiential records
pub struct RecordStore {
    path: Option<PathBuf>,
    state: Arc<RwLock<StoreDocument>>,
}

impl RecordStore {
    /// Open (or create) a store backed by the document at `path`
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path).await?;
        let document: StoreDocument = load_json(&path).await?.unwrap_or_default();

        tracing::debug!(
            "Loaded {} records ({} released) from {}",
            document.sources.len(),
            document.released.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            state: Arc::new(RwLock::new(document)),
        })
    }

    /// Store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Arc::new(RwLock::new(StoreDocument::default())),
        }
    }

    /// Default document location (~/.experiential/records.json)
    pub fn default_path() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".experiential")
            .join("records.json")
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    /// Create a record. Assigns the id and `created`, validates content and
    /// reflects targets, and persists before returning.
    pub async fn create(&self, request: CreateRecord) -> Result<Record> {
        let content = normalize_content(&request.content)?;
        let id = format!("src-{}", uuid::Uuid::new_v4());

        let mut state = self.state.write().await;
        let reflects = validate_reflects(&state, &id, request.reflects)?;

        let record = Record {
            id,
            content,
            created: Utc::now(),
            occurred: request.occurred,
            who: request.who.unwrap_or_default(),
            processing: request.processing.unwrap_or_default(),
            perspective: normalize_perspective(request.perspective),
            qualities: request.qualities.unwrap_or_default(),
            reflects,
        };

        let mut next = state.clone();
        next.sources.push(record.clone());
        self.persist(&next).await?;
        *state = next;

        tracing::debug!("Created record {}", record.id);
        Ok(record)
    }

    /// Fetch a live record
    pub async fn get(&self, id: &str) -> Result<Record> {
        let state = self.state.read().await;
        state
            .sources
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found(id))
    }

    /// Succeed when `id` is live; distinguishes released from unknown ids.
    pub async fn ensure_live(&self, id: &str) -> Result<()> {
        let state = self.state.read().await;
        match state.position(id) {
            Some(_) => Ok(()),
            None => Err(state.missing(id)),
        }
    }

    /// Merge `changes` into the record. `id` and `created` never change.
    pub async fn update(&self, id: &str, changes: RecordUpdate) -> Result<Record> {
        let mut state = self.state.write().await;
        let index = state.position(id).ok_or_else(|| state.missing(id))?;

        let mut record = state.sources[index].clone();
        if let Some(content) = changes.content {
            record.content = normalize_content(&content)?;
        }
        if let Some(who) = changes.who {
            record.who = who;
        }
        if let Some(processing) = changes.processing {
            record.processing = processing;
        }
        if let Some(perspective) = changes.perspective {
            record.perspective = normalize_perspective(Some(perspective));
        }
        if let Some(qualities) = changes.qualities {
            record.qualities = qualities;
        }
        if let Some(reflects) = changes.reflects {
            record.reflects = validate_reflects(&state, id, reflects)?;
        }
        if let Some(occurred) = changes.occurred {
            record.occurred = Some(occurred);
        }

        let mut next = state.clone();
        next.sources[index] = record.clone();
        self.persist(&next).await?;
        *state = next;

        tracing::debug!("Updated record {}", id);
        Ok(record)
    }

    /// Delete a record, returning it. A second delete of the same id is
    /// `AlreadyReleased`; an id that never existed is `NotFound`.
    pub async fn delete(&self, id: &str) -> Result<Record> {
        let mut state = self.state.write().await;
        let index = state.position(id).ok_or_else(|| state.missing(id))?;

        let mut next = state.clone();
        let removed = next.sources.remove(index);
        next.released.insert(removed.id.clone());
        self.persist(&next).await?;
        *state = next;

        tracing::debug!("Deleted record {}", id);
        Ok(removed)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Lazy listing over records matching `filter`
    pub fn list(&self, filter: RecordFilter) -> RecordListing {
        RecordListing {
            state: self.state.clone(),
            filter,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.sources.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.position(id).is_some()
    }

    pub async fn is_released(&self, id: &str) -> bool {
        self.state.read().await.released.contains(id)
    }

    /// Ids of all live records in creation order
    pub async fn ids(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .sources
            .iter()
            .map(|r| r.id.clone())
            .collect()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    async fn persist(&self, document: &StoreDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        save_json(path, document).await
    }
}

/// A restartable view over the store. Each call to [`records`] or
/// [`stream`] reads the store's current state, not a snapshot taken when
/// the listing was created.
///
/// [`records`]: RecordListing::records
/// [`stream`]: RecordListing::stream
#[derive(Clone)]
pub struct RecordListing {
    state: Arc<RwLock<StoreDocument>>,
    filter: RecordFilter,
}

impl RecordListing {
    /// Collect the matching records in creation order
    pub async fn records(&self) -> Vec<Record> {
        self.state
            .read()
            .await
            .sources
            .iter()
            .filter(|r| self.filter.matches(r))
            .cloned()
            .collect()
    }

    /// Stream the matching records in creation order
    pub fn stream(&self) -> impl Stream<Item = Record> + '_ {
        async_stream::stream! {
            let ids: Vec<String> = {
                let state = self.state.read().await;
                state.sources.iter().map(|r| r.id.clone()).collect()
            };
            for id in ids {
                let next = {
                    let state = self.state.read().await;
                    state.sources.iter().find(|r| r.id == id).cloned()
                };
                if let Some(record) = next {
                    if self.filter.matches(&record) {
                        yield record;
                    }
                }
            }
        }
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }
}

fn normalize_content(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("content must not be empty".to_string()));
    }
    Ok(trimmed.to_string())
}

fn normalize_perspective(perspective: Option<String>) -> String {
    perspective
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PERSPECTIVE.to_string())
}

/// Deduplicate reflects (first occurrence wins), reject self-reference, and
/// require every target to be a live record.
fn validate_reflects(state: &StoreDocument, id: &str, reflects: Vec<String>) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(reflects.len());
    for target in reflects {
        let target = target.trim().to_string();
        if target.is_empty() || !seen.insert(target.clone()) {
            continue;
        }
        if target == id {
            return Err(Error::Validation(format!(
                "record {} cannot reflect on itself",
                id
            )));
        }
        if state.position(&target).is_none() {
            return Err(Error::not_found(target));
        }
        targets.push(target);
    }
    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualitySignature;
    use crate::record::types::{Processing, TimeRange, Who};
    use futures::StreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    async fn make_store() -> (RecordStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RecordStore::open(dir.path().join("records.json"))
            .await
            .unwrap();
        (store, dir)
    }

    fn qualities(value: serde_json::Value) -> QualitySignature {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _dir) = make_store().await;
        let record = store
            .create(
                CreateRecord::new("anxious about tomorrow")
                    .who("Ava")
                    .qualities(qualities(json!({"mood": "tight", "time": "future"}))),
            )
            .await
            .unwrap();

        assert!(record.id.starts_with("src-"));
        let fetched = store.get(&record.id).await.unwrap();
        assert_eq!(fetched.content, "anxious about tomorrow");
        assert_eq!(fetched.who, Who::from("Ava"));
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn test_create_defaults() {
        let store = RecordStore::in_memory();
        let record = store.create(CreateRecord::new("  plain  ")).await.unwrap();
        assert_eq!(record.content, "plain");
        assert_eq!(record.who, Who::default());
        assert_eq!(record.processing, Processing::During);
        assert_eq!(record.perspective, "I");
    }

    #[tokio::test]
    async fn test_create_rejects_empty_content() {
        let store = RecordStore::in_memory();
        let err = store.create(CreateRecord::new("   ")).await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reflects_deduplicated() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        let b = store
            .create(CreateRecord::new("b").reflects([a.id.clone(), a.id.clone()]))
            .await
            .unwrap();
        assert_eq!(b.reflects, vec![a.id.clone()]);
        assert_eq!(store.get(&b.id).await.unwrap().reflects, vec![a.id]);
    }

    #[tokio::test]
    async fn test_reflects_missing_target_persists_nothing() {
        let (store, dir) = make_store().await;
        let err = store
            .create(CreateRecord::new("a").reflects(["src-missing"]))
            .await
            .unwrap_err();
        match err {
            Error::NotFound { id } => assert_eq!(id, "src-missing"),
            other => panic!("unexpected: {:?}", other),
        }
        assert!(store.is_empty().await);
        assert!(!dir.path().join("records.json").exists());
    }

    #[tokio::test]
    async fn test_update_rejects_self_reference() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        let err = store
            .update(
                &a.id,
                RecordUpdate {
                    reflects: Some(vec![a.id.clone()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(store.get(&a.id).await.unwrap().reflects.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = RecordStore::in_memory();
        let original = store
            .create(CreateRecord::new("first draft").who("Ava"))
            .await
            .unwrap();

        let updated = store
            .update(
                &original.id,
                RecordUpdate {
                    content: Some("second draft".to_string()),
                    qualities: Some(qualities(json!({"focus": "narrow"}))),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, original.id);
        assert_eq!(updated.created, original.created);
        assert_eq!(updated.content, "second draft");
        assert_eq!(updated.who, Who::from("Ava"));
        assert!(updated.qualities.is_present(crate::quality::Dimension::Focus));
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let store = RecordStore::in_memory();
        let err = store
            .update("src-nope", RecordUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_then_get_not_found() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        store.delete(&a.id).await.unwrap();
        assert!(matches!(
            store.get(&a.id).await.unwrap_err(),
            Error::NotFound { .. }
        ));
        assert!(store.is_released(&a.id).await);
    }

    #[tokio::test]
    async fn test_ensure_live_separates_released_from_unknown() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        assert!(store.ensure_live(&a.id).await.is_ok());

        store.delete(&a.id).await.unwrap();
        assert!(matches!(
            store.ensure_live(&a.id).await.unwrap_err(),
            Error::AlreadyReleased { .. }
        ));
        assert!(matches!(
            store.ensure_live("src-unknown").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_double_delete_is_already_released() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        store.delete(&a.id).await.unwrap();
        assert!(matches!(
            store.delete(&a.id).await.unwrap_err(),
            Error::AlreadyReleased { .. }
        ));
        assert!(matches!(
            store.delete("src-never").await.unwrap_err(),
            Error::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn test_update_after_delete_is_already_released() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        store.delete(&a.id).await.unwrap();
        let err = store
            .update(
                &a.id,
                RecordUpdate {
                    content: Some("back".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyReleased { .. }));
        assert!(!store.contains(&a.id).await);
    }

    #[tokio::test]
    async fn test_reflects_on_deleted_target_kept() {
        let store = RecordStore::in_memory();
        let a = store.create(CreateRecord::new("a")).await.unwrap();
        let b = store
            .create(CreateRecord::new("b").reflects([a.id.clone()]))
            .await
            .unwrap();
        store.delete(&a.id).await.unwrap();
        assert_eq!(store.get(&b.id).await.unwrap().reflects, vec![a.id]);
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");

        let (kept, released) = {
            let store = RecordStore::open(&path).await.unwrap();
            let kept = store
                .create(CreateRecord::new("kept").who(Who::new(["Ava", "Ben"])))
                .await
                .unwrap();
            let gone = store.create(CreateRecord::new("gone")).await.unwrap();
            store.delete(&gone.id).await.unwrap();
            (kept, gone.id)
        };

        let reopened = RecordStore::open(&path).await.unwrap();
        assert_eq!(reopened.get(&kept.id).await.unwrap(), kept);
        assert!(reopened.is_released(&released).await);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["sources"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_filters_and_rereads() {
        let store = RecordStore::in_memory();
        store.create(CreateRecord::new("one").who("Ava")).await.unwrap();
        store.create(CreateRecord::new("two").who("Ben")).await.unwrap();

        let listing = store.list(RecordFilter {
            who: Some(vec!["Ava".to_string()]),
            ..Default::default()
        });
        assert_eq!(listing.records().await.len(), 1);

        store
            .create(CreateRecord::new("three").who(Who::new(["Ben", "Ava"])))
            .await
            .unwrap();
        let contents: Vec<String> = listing.stream().map(|r| r.content).collect().await;
        assert_eq!(contents, vec!["one".to_string(), "three".to_string()]);
    }

    #[tokio::test]
    async fn test_list_time_range() {
        let store = RecordStore::in_memory();
        let record = store.create(CreateRecord::new("now")).await.unwrap();

        let inside = store.list(RecordFilter {
            created: Some(TimeRange::new(Some(record.created), Some(record.created))),
            ..Default::default()
        });
        assert_eq!(inside.records().await.len(), 1);

        let after = store.list(RecordFilter {
            created: Some(TimeRange::new(
                Some(record.created + chrono::Duration::seconds(1)),
                None,
            )),
            ..Default::default()
        });
        assert!(after.records().await.is_empty());
    }
}
