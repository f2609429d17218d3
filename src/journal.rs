//! Journal service
//!
//! Composes the record store, the embedding registry and the vector store:
//!
//! - write: validate → persist → embed → upsert
//! - delete: check liveness → drop the vector → release the record
//! - batch: sequential, rate-limited re-embedding with cooperative cancel
//!
//! Embedding is best effort on writes. A record is durable once the record
//! store accepts it, whether or not a vector could be produced.

use crate::config::{BatchConfig, JournalConfig, ProviderKind};
use crate::embedding::{EmbeddingRegistry, RegistryState};
use crate::error::Result;
use crate::record::{CreateRecord, Record, RecordFilter, RecordStore, RecordUpdate};
use crate::search::{SearchEngine, SearchRequest, SearchResponse};
use crate::vector::{open_store, Metadata, VectorStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result of a write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    pub record: Record,
    /// Whether a vector was stored for the record
    pub embedded: bool,
}

/// Batch re-embedding options
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Pause after every provider call
    pub delay: Duration,
    pub cancel: CancellationToken,
}

impl BatchOptions {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self::new(Duration::from_millis(config.delay_ms))
    }
}

/// One record the batch could not embed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Batch re-embedding summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub embedded: usize,
    pub failed: Vec<BatchFailure>,
    pub cancelled: bool,
    /// Set when the whole batch was skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
}

/// Service status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalStatus {
    pub records: usize,
    pub provider: String,
    pub requested_provider: ProviderKind,
    pub provider_state: RegistryState,
    pub dimensions: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub store: String,
    pub store_available: bool,
    /// `None` when the store could not be counted
    pub vectors: Option<usize>,
}

/// Experiential journal
pub struct Journal {
    records: Arc<RecordStore>,
    registry: Arc<EmbeddingRegistry>,
    vectors: Arc<dyn VectorStore>,
    engine: SearchEngine,
    batch: BatchConfig,
}

impl Journal {
    /// Open every component from configuration.
    pub async fn open(config: &JournalConfig) -> Result<Self> {
        config.validate()?;
        let records = RecordStore::open(config.storage.records_path()).await?;
        let registry = EmbeddingRegistry::select(&config.embedding).await?;
        let vectors = open_store(&config.vector_store, &config.storage.data_dir).await?;
        if !vectors.is_available().await {
            tracing::warn!(
                "Vector store '{}' is not reachable; semantic search will degrade",
                vectors.name()
            );
        }
        Ok(Self::new(records, registry, vectors, config))
    }

    pub fn new(
        records: RecordStore,
        registry: EmbeddingRegistry,
        vectors: Arc<dyn VectorStore>,
        config: &JournalConfig,
    ) -> Self {
        let records = Arc::new(records);
        let registry = Arc::new(registry);
        let engine = SearchEngine::new(
            records.clone(),
            registry.clone(),
            vectors.clone(),
            config.search.clone(),
        );
        Self {
            records,
            registry,
            vectors,
            engine,
            batch: config.batch.clone(),
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn registry(&self) -> &EmbeddingRegistry {
        &self.registry
    }

    pub fn vectors(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions::from(&self.batch)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    pub async fn create(&self, request: CreateRecord) -> Result<WriteOutcome> {
        let record = self.records.create(request).await?;
        tracing::info!("Created record {}", record.id);
        let embedded = self.embed_best_effort(&record).await;
        Ok(WriteOutcome { record, embedded })
    }

    pub async fn get(&self, id: &str) -> Result<Record> {
        self.records.get(id).await
    }

    /// Apply `changes`; re-embeds when the embedding text may have changed.
    pub async fn update(&self, id: &str, changes: RecordUpdate) -> Result<WriteOutcome> {
        let reembed = changes.affects_embedding();
        let record = self.records.update(id, changes).await?;
        let embedded = if reembed {
            self.embed_best_effort(&record).await
        } else {
            matches!(self.vectors.get(id).await, Ok(Some(_)))
        };
        Ok(WriteOutcome { record, embedded })
    }

    /// Delete a record and its vector.
    ///
    /// The vector goes first. If the store cannot remove it the record is
    /// left in place, so a vector never outlives its record.
    pub async fn delete(&self, id: &str) -> Result<Record> {
        self.records.ensure_live(id).await?;
        let had_vector = self.vectors.delete(id).await?;
        let record = self.records.delete(id).await?;
        tracing::info!("Released record {} (vector removed: {})", id, had_vector);
        Ok(record)
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.engine.search(request).await
    }

    pub async fn status(&self) -> JournalStatus {
        let vectors = match self.vectors.len().await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::debug!("Could not count vectors: {}", e);
                None
            }
        };
        JournalStatus {
            records: self.records.len().await,
            provider: self.registry.name().to_string(),
            requested_provider: self.registry.requested(),
            provider_state: self.registry.state(),
            dimensions: self.registry.dimensions(),
            fallback_reason: self.registry.fallback_reason().map(str::to_string),
            store: self.vectors.name().to_string(),
            store_available: self.vectors.is_available().await,
            vectors,
        }
    }

    // =========================================================================
    // Embedding
    // =========================================================================

    fn metadata(record: &Record) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("who".to_string(), json!(record.who.names()));
        metadata.insert("created".to_string(), json!(record.created.to_rfc3339()));
        metadata.insert("processing".to_string(), json!(record.processing.to_string()));
        metadata
    }

    /// Embed and store one record. `Ok(false)` when the registry carries
    /// no semantic signal.
    async fn embed(&self, record: &Record) -> Result<bool> {
        if !self.registry.has_signal() {
            return Ok(false);
        }
        let vector = self
            .registry
            .generate_embedding(&record.embedding_text())
            .await?;
        self.vectors
            .upsert(&record.id, vector, Self::metadata(record))
            .await?;
        Ok(true)
    }

    async fn embed_best_effort(&self, record: &Record) -> bool {
        match self.embed(record).await {
            Ok(embedded) => embedded,
            Err(e) => {
                tracing::warn!("Record {} stored without a vector: {}", record.id, e);
                false
            }
        }
    }

    /// Re-embed every live record, one at a time.
    ///
    /// Sleeps `options.delay` after each provider call and checks the
    /// cancellation token between records. A failing record is reported and
    /// the batch moves on. Upserts are keyed by record id, so running the
    /// batch twice is harmless.
    pub async fn reembed_all(&self, options: BatchOptions) -> Result<BatchReport> {
        let records = self.records.list(RecordFilter::default()).records().await;
        let mut report = BatchReport {
            total: records.len(),
            ..Default::default()
        };

        if !self.registry.has_signal() {
            let reason = match self.registry.fallback_reason() {
                Some(reason) => format!("embedding provider fell back: {}", reason),
                None => "no embedding provider configured".to_string(),
            };
            tracing::info!("Skipping re-embed of {} records: {}", report.total, reason);
            report.skipped_reason = Some(reason);
            return Ok(report);
        }

        tracing::info!(
            "Re-embedding {} records with '{}' ({:?} between calls)",
            report.total,
            self.registry.name(),
            options.delay
        );

        for record in records {
            if options.cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let outcome = match self
                .registry
                .generate_embedding(&record.embedding_text())
                .await
            {
                Ok(vector) => {
                    self.vectors
                        .upsert(&record.id, vector, Self::metadata(&record))
                        .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => report.embedded += 1,
                Err(e) => {
                    tracing::warn!("Re-embed failed for {}: {}", record.id, e);
                    report.failed.push(BatchFailure {
                        id: record.id.clone(),
                        error: e.to_string(),
                    });
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(options.delay) => {}
                _ = options.cancel.cancelled() => {}
            }
        }

        if options.cancel.is_cancelled() {
            report.cancelled = true;
        }
        tracing::info!(
            "Re-embed finished: {} embedded, {} failed{}",
            report.embedded,
            report.failed.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::registry::tests::{ready_registry, StaticProvider};
    use crate::error::Error;
    use crate::quality::QualitySignature;
    use crate::search::SearchFilters;
    use crate::vector::tests::DownStore;
    use crate::vector::{FlatVectorStore, ScoredEntry, VectorQuery};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    async fn journal() -> Journal {
        Journal::new(
            RecordStore::in_memory(),
            ready_registry(26).await,
            Arc::new(FlatVectorStore::in_memory()),
            &JournalConfig::default(),
        )
    }

    fn qualities(value: serde_json::Value) -> QualitySignature {
        serde_json::from_value(value).unwrap()
    }

    /// Flat store that rejects upserts for one record id.
    struct PickyStore {
        inner: FlatVectorStore,
        reject: String,
    }

    #[async_trait]
    impl VectorStore for PickyStore {
        async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
            if id == self.reject {
                return Err(Error::Schema {
                    expected: 3,
                    actual: vector.len(),
                });
            }
            self.inner.upsert(id, vector, metadata).await
        }

        async fn search(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
            self.inner.search(vector, query).await
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            self.inner.delete(id).await
        }

        async fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
            self.inner.get(id).await
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "picky"
        }

        async fn len(&self) -> Result<usize> {
            self.inner.len().await
        }
    }

    #[tokio::test]
    async fn test_create_get_search_scenario() {
        let journal = journal().await;
        let created = journal
            .create(
                CreateRecord::new("anxious about tomorrow")
                    .who("Ava")
                    .qualities(qualities(serde_json::json!({"mood": "tight", "time": "future"}))),
            )
            .await
            .unwrap();
        assert!(created.embedded);
        let x = created.record.id;

        let fetched = journal.get(&x).await.unwrap();
        assert_eq!(fetched.content, "anxious about tomorrow");
        assert_eq!(fetched.who.names(), ["Ava".to_string()]);

        let ava = journal
            .search(&SearchRequest::new().filters(SearchFilters::default().who(["Ava"])))
            .await
            .unwrap();
        assert!(ava.ids().contains(&x.as_str()));

        let ben = journal
            .search(&SearchRequest::new().filters(SearchFilters::default().who(["Ben"])))
            .await
            .unwrap();
        assert!(!ben.ids().contains(&x.as_str()));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_vector() {
        let journal = journal().await;
        let id = journal
            .create(CreateRecord::new("short lived"))
            .await
            .unwrap()
            .record
            .id;
        assert!(journal.vectors().get(&id).await.unwrap().is_some());

        journal.delete(&id).await.unwrap();
        assert!(matches!(journal.get(&id).await, Err(Error::NotFound { .. })));
        assert!(journal.vectors().get(&id).await.unwrap().is_none());
        assert!(matches!(
            journal.delete(&id).await,
            Err(Error::AlreadyReleased { .. })
        ));
        assert!(matches!(
            journal.delete("src-missing").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_failure_aborts_delete() {
        let journal = Journal::new(
            RecordStore::in_memory(),
            ready_registry(26).await,
            Arc::new(DownStore),
            &JournalConfig::default(),
        );
        let created = journal.create(CreateRecord::new("kept")).await.unwrap();
        assert!(!created.embedded);

        let err = assert_err!(journal.delete(&created.record.id).await);
        assert!(err.is_unavailable());
        assert_ok!(journal.get(&created.record.id).await);
    }

    #[tokio::test]
    async fn test_fallback_registry_skips_embedding() {
        let journal = Journal::new(
            RecordStore::in_memory(),
            EmbeddingRegistry::with_provider(
                ProviderKind::Remote,
                Arc::new(StaticProvider {
                    available: false,
                    dims: 4,
                }),
                Duration::from_secs(1),
            )
            .await,
            Arc::new(FlatVectorStore::in_memory()),
            &JournalConfig::default(),
        );
        let created = journal.create(CreateRecord::new("plain")).await.unwrap();
        assert!(!created.embedded);
        assert_eq!(journal.vectors().len().await.unwrap(), 0);

        let report = journal
            .reembed_all(BatchOptions::new(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(report.embedded, 0);
        assert!(report.skipped_reason.is_some());

        let status = journal.status().await;
        assert_eq!(status.provider, "none");
        assert_eq!(status.requested_provider, ProviderKind::Remote);
        assert_eq!(status.provider_state, RegistryState::Fallback);
    }

    #[tokio::test]
    async fn test_update_reembeds_changed_content() {
        let journal = journal().await;
        let id = journal
            .create(CreateRecord::new("aaaa"))
            .await
            .unwrap()
            .record
            .id;
        let before = journal.vectors().get(&id).await.unwrap().unwrap();

        let outcome = journal
            .update(
                &id,
                RecordUpdate {
                    content: Some("zzzz".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.embedded);
        let after = journal.vectors().get(&id).await.unwrap().unwrap();
        assert_ne!(before, after);

        let outcome = journal
            .update(
                &id,
                RecordUpdate {
                    perspective: Some("we".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.embedded);
        assert_eq!(outcome.record.perspective, "we");
        assert_eq!(journal.vectors().get(&id).await.unwrap().unwrap(), after);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_respects_rate_limit() {
        let journal = journal().await;
        for i in 0..50 {
            journal
                .records()
                .create(CreateRecord::new(format!("entry number {}", i)))
                .await
                .unwrap();
        }
        assert_eq!(journal.vectors().len().await.unwrap(), 0);

        let started = tokio::time::Instant::now();
        let report = journal
            .reembed_all(BatchOptions::new(Duration::from_millis(100)))
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(report.total, 50);
        assert_eq!(report.embedded, 50);
        assert!(report.failed.is_empty());
        assert!(!report.cancelled);
        assert_eq!(journal.vectors().len().await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_batch_continues_past_schema_error() {
        let records = RecordStore::in_memory();
        let bad = records.create(CreateRecord::new("bad one")).await.unwrap();
        records.create(CreateRecord::new("good one")).await.unwrap();
        records.create(CreateRecord::new("good two")).await.unwrap();

        let journal = Journal::new(
            records,
            ready_registry(26).await,
            Arc::new(PickyStore {
                inner: FlatVectorStore::in_memory(),
                reject: bad.id.clone(),
            }),
            &JournalConfig::default(),
        );
        let report = journal
            .reembed_all(BatchOptions::new(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(report.embedded, 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, bad.id);
        assert!(report.failed[0].error.contains("Schema"));
    }

    #[tokio::test]
    async fn test_batch_cancellation_stops_between_records() {
        let journal = journal().await;
        for i in 0..5 {
            journal
                .records()
                .create(CreateRecord::new(format!("entry {}", i)))
                .await
                .unwrap();
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = journal
            .reembed_all(BatchOptions::new(Duration::from_secs(1)).with_cancel(cancel))
            .await
            .unwrap();
        assert!(report.cancelled);
        assert_eq!(report.embedded, 0);
    }

    #[tokio::test]
    async fn test_open_from_config() {
        let dir = TempDir::new().unwrap();
        let mut config = JournalConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();

        let journal = Journal::open(&config).await.unwrap();
        let created = journal.create(CreateRecord::new("persisted")).await.unwrap();
        assert!(!created.embedded);
        assert!(dir.path().join("records.json").exists());

        let status = journal.status().await;
        assert_eq!(status.records, 1);
        assert_eq!(status.store, "flat");
        assert_eq!(status.vectors, Some(0));
    }
}
