//! Quality taxonomy and signature validation
//!
//! Pure functions over a constant 21-tag set. Nothing here touches storage.

pub mod signature;
pub mod taxonomy;

pub use signature::{validate_signature, DimensionState, QualitySignature, RawSignature};
pub use taxonomy::{all_tags, is_known_quality, Dimension, QualityTag, TAXONOMY_SIZE};
