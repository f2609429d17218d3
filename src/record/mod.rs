//! Experiential records and their durable store
//!
//! Records form a small graph: each may reflect on earlier records. Reflect
//! targets are checked when a record is written; deleting a target later
//! leaves the pointer in place.

pub mod store;
pub mod types;

pub use store::{RecordListing, RecordStore};
pub use types::{
    CreateRecord, Processing, Record, RecordFilter, RecordUpdate, TimeRange, Who,
    DEFAULT_EXPERIENCER, DEFAULT_PERSPECTIVE,
};
