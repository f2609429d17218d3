//! Experiential configuration management
//!
//! Configuration is an explicit value handed to each component's
//! constructor. It is loaded from an optional TOML file and then overlaid
//! with environment variables:
//!
//! | Variable                   | Field                                 |
//! |----------------------------|---------------------------------------|
//! | `JOURNAL_DATA_DIR`         | `storage.data_dir`                    |
//! | `EMBEDDING_PROVIDER`       | `embedding.provider` (none/remote/local) |
//! | `EMBEDDING_API_KEY`        | `embedding.api_key` (falls back to `OPENAI_API_KEY`) |
//! | `EMBEDDING_MODEL`          | `embedding.model`                     |
//! | `EMBEDDING_DIMENSIONS`     | `embedding.dimensions`                |
//! | `EMBEDDING_BASE_URL`       | `embedding.base_url`                  |
//! | `EMBEDDING_BATCH_DELAY_MS` | `batch.delay_ms`                      |
//! | `VECTOR_STORE`             | `vector_store` backend (flat/qdrant)  |
//! | `VECTOR_STORE_PATH`        | flat store file                       |
//! | `QDRANT_URL`, `QDRANT_API_KEY`, `QDRANT_COLLECTION` | qdrant store |

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main Experiential configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Record storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider selection
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store selection
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Search defaults
    #[serde(default)]
    pub search: SearchConfig,

    /// Batch re-embedding
    #[serde(default)]
    pub batch: BatchConfig,

    /// HTTP surface
    #[serde(default)]
    pub server: ServerConfig,
}

/// Record storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the records and flat vector documents
    pub data_dir: PathBuf,

    /// Records document file name, relative to `data_dir`
    pub records_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            records_file: "records.json".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(&self.records_file)
    }
}

fn default_data_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".experiential")
}

/// Embedding provider type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// No semantic signal (zero-config default)
    #[default]
    None,

    /// OpenAI-compatible embeddings API
    Remote,

    /// Local inference server (Ollama-compatible)
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Remote => write!(f, "remote"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "remote" | "openai" => Ok(Self::Remote),
            "local" | "ollama" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown embedding provider: {}", other))),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to select at startup
    pub provider: ProviderKind,

    /// API key for the remote provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Model name (provider default when unset)
    #[serde(default)]
    pub model: Option<String>,

    /// Target dimensionality (provider default when unset)
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Endpoint base URL (provider default when unset)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Upper bound on the startup availability probe in seconds
    pub probe_timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::None,
            api_key: None,
            model: None,
            dimensions: None,
            base_url: None,
            timeout_secs: 30,
            probe_timeout_secs: 10,
        }
    }
}

impl EmbeddingConfig {
    pub fn resolved_model(&self) -> String {
        self.model.clone().unwrap_or_else(|| {
            match self.provider {
                ProviderKind::Local => "nomic-embed-text",
                _ => "text-embedding-3-small",
            }
            .to_string()
        })
    }

    pub fn resolved_dimensions(&self) -> usize {
        self.dimensions.unwrap_or(match self.provider {
            ProviderKind::None => 1,
            ProviderKind::Remote => 1536,
            ProviderKind::Local => 768,
        })
    }

    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| {
                match self.provider {
                    ProviderKind::Local => "http://localhost:11434",
                    _ => "https://api.openai.com",
                }
                .to_string()
            })
            .trim_end_matches('/')
            .to_string()
    }
}

/// Vector store backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum VectorStoreConfig {
    /// In-process store persisted to one JSON document
    Flat {
        /// Document path (defaults to `vectors.json` in the data directory)
        #[serde(default)]
        path: Option<PathBuf>,
    },

    /// Remote Qdrant index
    Qdrant {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default = "default_collection")]
        collection: String,
        #[serde(default = "default_store_timeout")]
        timeout_secs: u64,
    },
}

fn default_collection() -> String {
    "experiential".to_string()
}

fn default_store_timeout() -> u64 {
    10
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self::Flat { path: None }
    }
}

impl VectorStoreConfig {
    /// Flat store document path, resolved against the data directory
    pub fn flat_path(&self, data_dir: &Path) -> Option<PathBuf> {
        match self {
            Self::Flat { path } => Some(
                path.clone()
                    .unwrap_or_else(|| data_dir.join("vectors.json")),
            ),
            Self::Qdrant { .. } => None,
        }
    }
}

/// Search defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Page size when the caller gives none
    pub default_limit: usize,

    /// Largest page a caller may request
    pub max_limit: usize,

    /// Snippet length in characters
    pub snippet_length: usize,

    /// Drop semantically ranked results scoring below this
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            snippet_length: 200,
            min_similarity: None,
        }
    }
}

/// Batch re-embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause after every provider call, in milliseconds
    pub delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { delay_ms: 100 }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18791,
            cors_origins: Vec::new(),
        }
    }
}

impl JournalConfig {
    /// Load from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Overlay process environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`; blank values count as unset
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = var("JOURNAL_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }

        if let Some(kind) = var("EMBEDDING_PROVIDER") {
            self.embedding.provider = kind.parse()?;
        }
        if let Some(key) = var("EMBEDDING_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.embedding.api_key = Some(key);
        }
        if let Some(model) = var("EMBEDDING_MODEL") {
            self.embedding.model = Some(model);
        }
        if let Some(dims) = var("EMBEDDING_DIMENSIONS") {
            let dims = dims
                .trim()
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("EMBEDDING_DIMENSIONS: {}", e)))?;
            self.embedding.dimensions = Some(dims);
        }
        if let Some(url) = var("EMBEDDING_BASE_URL") {
            self.embedding.base_url = Some(url);
        }
        if let Some(delay) = var("EMBEDDING_BATCH_DELAY_MS") {
            self.batch.delay_ms = delay
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("EMBEDDING_BATCH_DELAY_MS: {}", e)))?;
        }

        match var("VECTOR_STORE").map(|v| v.to_lowercase()).as_deref() {
            Some("qdrant") => {
                let url = var("QDRANT_URL").ok_or_else(|| {
                    Error::Config("VECTOR_STORE=qdrant requires QDRANT_URL".to_string())
                })?;
                self.vector_store = VectorStoreConfig::Qdrant {
                    url,
                    api_key: var("QDRANT_API_KEY"),
                    collection: var("QDRANT_COLLECTION").unwrap_or_else(default_collection),
                    timeout_secs: default_store_timeout(),
                };
            }
            Some("flat") => {
                self.vector_store = VectorStoreConfig::Flat {
                    path: var("VECTOR_STORE_PATH").map(PathBuf::from),
                };
            }
            Some(other) => {
                return Err(Error::Config(format!("unknown vector store: {}", other)));
            }
            None => {
                if let Some(path) = var("VECTOR_STORE_PATH") {
                    if matches!(self.vector_store, VectorStoreConfig::Flat { .. }) {
                        self.vector_store = VectorStoreConfig::Flat {
                            path: Some(PathBuf::from(path)),
                        };
                    }
                }
            }
        }

        Ok(self)
    }

    /// Reject configurations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.search.default_limit == 0 || self.search.max_limit == 0 {
            return Err(Error::Config("search limits must be positive".to_string()));
        }
        if self.search.default_limit > self.search.max_limit {
            return Err(Error::Config(
                "search.default_limit exceeds search.max_limit".to_string(),
            ));
        }
        if self.embedding.dimensions == Some(0) {
            return Err(Error::Config("embedding.dimensions must be positive".to_string()));
        }
        if let VectorStoreConfig::Qdrant { url, collection, .. } = &self.vector_store {
            if url.trim().is_empty() || collection.trim().is_empty() {
                return Err(Error::Config(
                    "qdrant store needs a url and a collection".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = JournalConfig::default();
        assert_eq!(config.embedding.provider, ProviderKind::None);
        assert!(matches!(config.vector_store, VectorStoreConfig::Flat { path: None }));
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.batch.delay_ms, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overlay_remote_provider() {
        let config = JournalConfig::default()
            .with_env_from(env(&[
                ("EMBEDDING_PROVIDER", "openai"),
                ("OPENAI_API_KEY", "sk-test"),
                ("EMBEDDING_DIMENSIONS", "256"),
            ]))
            .unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::Remote);
        assert_eq!(config.embedding.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.embedding.resolved_dimensions(), 256);
        assert_eq!(config.embedding.resolved_model(), "text-embedding-3-small");
    }

    #[test]
    fn test_env_overlay_qdrant() {
        let config = JournalConfig::default()
            .with_env_from(env(&[
                ("VECTOR_STORE", "qdrant"),
                ("QDRANT_URL", "http://localhost:6333"),
            ]))
            .unwrap();
        match config.vector_store {
            VectorStoreConfig::Qdrant { url, collection, .. } => {
                assert_eq!(url, "http://localhost:6333");
                assert_eq!(collection, "experiential");
            }
            other => panic!("unexpected store: {:?}", other),
        }
    }

    #[test]
    fn test_env_qdrant_requires_url() {
        let err = JournalConfig::default()
            .with_env_from(env(&[("VECTOR_STORE", "qdrant")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_rejects_unknown_provider() {
        assert!(JournalConfig::default()
            .with_env_from(env(&[("EMBEDDING_PROVIDER", "magic")]))
            .is_err());
    }

    #[test]
    fn test_blank_env_is_unset() {
        let config = JournalConfig::default()
            .with_env_from(env(&[("EMBEDDING_PROVIDER", "  ")]))
            .unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::None);
    }

    #[test]
    fn test_toml_round_trip() {
        let toml_str = r#"
            [embedding]
            provider = "local"
            model = "mxbai-embed-large"
            timeout_secs = 5
            probe_timeout_secs = 2

            [vector_store]
            backend = "qdrant"
            url = "http://qdrant:6333"

            [search]
            default_limit = 5
            max_limit = 50
            snippet_length = 120
        "#;
        let config: JournalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.embedding.provider, ProviderKind::Local);
        assert_eq!(config.embedding.resolved_base_url(), "http://localhost:11434");
        assert_eq!(config.search.snippet_length, 120);
        assert!(config.validate().is_ok());

        let rendered = toml::to_string_pretty(&config).unwrap();
        let back: JournalConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(back.embedding.model.as_deref(), Some("mxbai-embed-large"));
    }

    #[test]
    fn test_flat_path_resolution() {
        let store = VectorStoreConfig::default();
        assert_eq!(
            store.flat_path(Path::new("/data")),
            Some(PathBuf::from("/data/vectors.json"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = JournalConfig::default();
        config.search.default_limit = 500;
        assert!(config.validate().is_err());
    }
}
