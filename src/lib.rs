//! Experiential - Personal Journal of Phenomenological Records
//!
//! Experiential stores short first-person accounts of lived moments, tags
//! each one with a fixed taxonomy of experiential qualities, and finds them
//! again by structured filters and by meaning.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   CLI / HTTP API (axum)                      │
//! └──────────────────────────────┬───────────────────────────────┘
//!                                │
//! ┌──────────────────────────────▼───────────────────────────────┐
//! │                         Journal                              │
//! │  create / update / delete cascade / search / batch re-embed  │
//! └───────┬──────────────────┬─────────────────────┬─────────────┘
//!         │                  │                     │
//! ┌───────▼───────┐  ┌───────▼──────────┐  ┌───────▼─────────────┐
//! │  RecordStore  │  │ EmbeddingRegistry│  │    VectorStore      │
//! │ records.json  │  │ remote │ local   │  │  flat │ qdrant      │
//! │ reflects graph│  │ none (fallback)  │  │                     │
//! └───────────────┘  └──────────────────┘  └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`quality`]: Quality taxonomy and signature validation
//! - [`record`]: Records, the reflects graph and the record store
//! - [`embedding`]: Embedding providers and the selecting registry
//! - [`vector`]: Vector store abstraction with flat and Qdrant backends
//! - [`search`]: Filtered, semantically ranked search
//! - [`journal`]: Facade tying the stores together
//! - [`api`]: HTTP API
//! - [`config`]: Configuration management

pub mod api;
pub mod config;
pub mod embedding;
pub mod error;
pub mod journal;
pub(crate) mod persist;
pub mod quality;
pub mod record;
pub mod search;
pub mod vector;

pub use config::JournalConfig;
pub use error::{Error, Result};
pub use journal::{BatchOptions, BatchReport, Journal, JournalStatus, WriteOutcome};
