//! Qdrant vector store over the REST API
//!
//! Qdrant point ids must be integers or UUIDs, so each record id is mapped to
//! a deterministic UUID v5. The record id travels in the point payload under
//! `backReferenceId` and search results are re-keyed by it.
//!
//! The collection is created on the first upsert with that vector's width,
//! or adopted when it already exists. Every failure to reach the server is a
//! `StoreUnavailable`; nothing is retried here.

use super::{Metadata, ScoredEntry, VectorQuery, VectorStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Payload key holding the caller's record id.
pub const BACK_REFERENCE_KEY: &str = "backReferenceId";

/// Hit cap when the caller gives neither a limit nor a candidate set.
const UNBOUNDED_SEARCH_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: usize,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct RetrievedPoint {
    #[serde(default)]
    vector: Option<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

/// Deterministic Qdrant point id for a record id.
pub fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

/// Remote vector index backed by a Qdrant collection
pub struct QdrantVectorStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    /// Vector width of the collection once known
    dimensions: Mutex<Option<usize>>,
}

impl QdrantVectorStore {
    pub fn new(
        url: &str,
        api_key: Option<String>,
        collection: &str,
        timeout_secs: u64,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            collection: collection.to_string(),
            dimensions: Mutex::new(None),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    fn collection_path(&self, suffix: &str) -> String {
        format!("/collections/{}{}", self.collection, suffix)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("qdrant unreachable: {}", e)))
    }

    async fn parse<T: DeserializeOwned>(resp: Response) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::StoreUnavailable(format!(
                "qdrant returned {} - {}",
                status, text
            )));
        }
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::StoreUnavailable(format!("bad qdrant response: {}", e)))?;
        Ok(envelope.result)
    }

    /// Width of the existing collection, or `None` when it does not exist.
    async fn existing_dimensions(&self) -> Result<Option<usize>> {
        let mut cached = self.dimensions.lock().await;
        if cached.is_some() {
            return Ok(*cached);
        }

        let resp = self
            .execute(self.request(Method::GET, &self.collection_path("")))
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: CollectionInfo = Self::parse(resp).await?;
        tracing::debug!(
            "Adopted qdrant collection '{}' ({} dimensions)",
            self.collection,
            info.config.params.vectors.size
        );
        *cached = Some(info.config.params.vectors.size);
        Ok(*cached)
    }

    /// Make sure the collection exists with width `size`.
    async fn ensure_collection(&self, size: usize) -> Result<()> {
        let expected = match self.existing_dimensions().await? {
            Some(existing) => existing,
            None => {
                let mut cached = self.dimensions.lock().await;
                if cached.is_none() {
                    let resp = self
                        .execute(
                            self.request(Method::PUT, &self.collection_path(""))
                                .json(&json!({ "vectors": { "size": size, "distance": "Cosine" } })),
                        )
                        .await?;
                    let _: Value = Self::parse(resp).await?;
                    tracing::info!(
                        "Created qdrant collection '{}' ({} dimensions)",
                        self.collection,
                        size
                    );
                    *cached = Some(size);
                }
                cached.unwrap_or(size)
            }
        };

        if expected != size {
            return Err(Error::Schema {
                expected,
                actual: size,
            });
        }
        Ok(())
    }

    fn candidate_filter(query: &VectorQuery) -> Option<Value> {
        query.candidates.as_ref().map(|ids| {
            let ids: Vec<&String> = ids.iter().collect();
            json!({ "must": [ { "key": BACK_REFERENCE_KEY, "match": { "any": ids } } ] })
        })
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn upsert(&self, id: &str, vector: Vec<f32>, metadata: Metadata) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::Validation("vector must not be empty".to_string()));
        }
        self.ensure_collection(vector.len()).await?;

        let mut payload = metadata;
        payload.insert(BACK_REFERENCE_KEY.to_string(), json!(id));
        let body = json!({
            "points": [ { "id": point_id(id), "vector": vector, "payload": payload } ]
        });
        let resp = self
            .execute(
                self.request(Method::PUT, &self.collection_path("/points?wait=true"))
                    .json(&body),
            )
            .await?;
        let _: Value = Self::parse(resp).await?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], query: &VectorQuery) -> Result<Vec<ScoredEntry>> {
        let Some(expected) = self.existing_dimensions().await? else {
            return Ok(Vec::new());
        };
        if expected != vector.len() {
            return Err(Error::Schema {
                expected,
                actual: vector.len(),
            });
        }
        if query.candidates.as_ref().is_some_and(|c| c.is_empty()) {
            return Ok(Vec::new());
        }

        let limit = query
            .limit
            .or_else(|| query.candidates.as_ref().map(|c| c.len()))
            .unwrap_or(UNBOUNDED_SEARCH_LIMIT);
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(filter) = Self::candidate_filter(query) {
            body["filter"] = filter;
        }

        let resp = self
            .execute(
                self.request(Method::POST, &self.collection_path("/points/search"))
                    .json(&body),
            )
            .await?;
        let points: Vec<ScoredPoint> = Self::parse(resp).await?;

        let mut hits = Vec::with_capacity(points.len());
        for point in points {
            let mut payload = point.payload.unwrap_or_default();
            match payload.remove(BACK_REFERENCE_KEY) {
                Some(Value::String(id)) => hits.push(ScoredEntry {
                    id,
                    score: point.score,
                    metadata: payload,
                }),
                _ => tracing::warn!(
                    "Qdrant point in '{}' has no {}; skipping",
                    self.collection,
                    BACK_REFERENCE_KEY
                ),
            }
        }
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        if self.existing_dimensions().await?.is_none() {
            return Ok(false);
        }
        let existed = self.get(id).await?.is_some();
        if !existed {
            return Ok(false);
        }
        let resp = self
            .execute(
                self.request(Method::POST, &self.collection_path("/points/delete?wait=true"))
                    .json(&json!({ "points": [point_id(id)] })),
            )
            .await?;
        let _: Value = Self::parse(resp).await?;
        Ok(true)
    }

    async fn get(&self, id: &str) -> Result<Option<Vec<f32>>> {
        if self.existing_dimensions().await?.is_none() {
            return Ok(None);
        }
        let resp = self
            .execute(
                self.request(Method::POST, &self.collection_path("/points"))
                    .json(&json!({ "ids": [point_id(id)], "with_vector": true, "with_payload": false })),
            )
            .await?;
        let points: Vec<RetrievedPoint> = Self::parse(resp).await?;
        Ok(points.into_iter().next().and_then(|p| p.vector))
    }

    async fn is_available(&self) -> bool {
        match self.execute(self.request(Method::GET, "/collections")).await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                tracing::debug!("Qdrant probe failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "qdrant"
    }

    async fn len(&self) -> Result<usize> {
        if self.existing_dimensions().await?.is_none() {
            return Ok(0);
        }
        let resp = self
            .execute(
                self.request(Method::POST, &self.collection_path("/points/count"))
                    .json(&json!({ "exact": true })),
            )
            .await?;
        let count: CountResult = Self::parse(resp).await?;
        Ok(count.count)
    }
}
