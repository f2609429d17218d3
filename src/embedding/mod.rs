//! Text embedding providers
//!
//! - `NoneProvider`: zero-config default, no semantic signal
//! - `RemoteApiProvider`: OpenAI-compatible embeddings API
//! - `LocalModelProvider`: locally served model, loaded lazily
//!
//! `EmbeddingRegistry` picks one of them from configuration and falls back
//! to `NoneProvider` when the chosen backend does not answer its probe.

pub mod local;
pub mod provider;
pub mod registry;
pub mod remote;

pub use local::LocalModelProvider;
pub use provider::{EmbeddingProvider, NoneProvider, NONE_PROVIDER_NAME};
pub use registry::{EmbeddingRegistry, RegistryState};
pub use remote::RemoteApiProvider;
