//! Record search: structured filters, optional semantic ranking, sorting
//! and pagination

pub mod engine;
pub mod snippet;
pub mod types;

pub use engine::{parse_time_bound, SearchEngine, MISSING_VECTOR_RELEVANCE, UNRANKED_RELEVANCE};
pub use snippet::snippet;
pub use types::{
    SearchDebug, SearchFilters, SearchRequest, SearchResponse, SearchResult, SortBy, TimeBounds,
};
