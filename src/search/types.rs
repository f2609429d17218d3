//! Search request and response types (camelCase on the wire)

use crate::record::types::WhoInput;
use crate::record::{Processing, Record};
use serde::{Deserialize, Serialize};

/// Ordering of search results
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    /// Highest relevance first; ties keep listing order
    #[default]
    Relevance,
    /// Newest first
    Created,
}

impl std::str::FromStr for SortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "created" => Ok(Self::Created),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// Raw time window as supplied by the caller. Bounds are RFC 3339
/// timestamps or `YYYY-MM-DD` dates and are parsed before any I/O.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

impl TimeBounds {
    pub fn new(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
        }
    }
}

/// Structured filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    /// Any of these experiencers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub who: Option<WhoInput>,
    /// Window over when the experience happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeBounds>,
    /// Window over when the record was persisted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_time_range: Option<TimeBounds>,
    /// Quality tags that must all be present
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub qualities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing: Option<Processing>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
    /// Records that reflect on this id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflects: Option<String>,
}

impl SearchFilters {
    pub fn who(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.who = Some(WhoInput::Many(names.into_iter().map(Into::into).collect()));
        self
    }

    pub fn time_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.time_range = Some(TimeBounds::new(start, end));
        self
    }

    pub fn system_time_range(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.system_time_range = Some(TimeBounds::new(start, end));
        self
    }

    pub fn quality(mut self, tag: impl Into<String>) -> Self {
        self.qualities.push(tag.into());
        self
    }

    /// Normalized experiencer names, or `None` when no name survives.
    pub(crate) fn who_names(&self) -> Option<Vec<String>> {
        let names: Vec<String> = match self.who.as_ref()? {
            WhoInput::One(name) => vec![name.trim().to_string()],
            WhoInput::Many(names) => names.iter().map(|n| n.trim().to_string()).collect(),
        };
        let names: Vec<String> = names.into_iter().filter(|n| !n.is_empty()).collect();
        (!names.is_empty()).then_some(names)
    }
}

/// A search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Lexical query: every whitespace-separated token must appear in the
    /// content, case-insensitively
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Text to rank candidates against semantically
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_query: Option<String>,
    #[serde(default)]
    pub filters: SearchFilters,
    #[serde(default)]
    pub sort_by: Option<SortBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// Always return diagnostics
    #[serde(default)]
    pub debug: bool,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, text: impl Into<String>) -> Self {
        self.query = Some(text.into());
        self
    }

    pub fn semantic(mut self, text: impl Into<String>) -> Self {
        self.semantic_query = Some(text.into());
        self
    }

    pub fn filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    pub fn sort_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = Some(sort_by);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Semantic query text, if it has any content.
    pub(crate) fn semantic_text(&self) -> Option<&str> {
        self.semantic_query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub record: Record,
    /// Similarity when semantically ranked, otherwise a constant
    pub relevance: f32,
    pub snippet: String,
}

/// Diagnostics describing how a search was executed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDebug {
    pub total_records: usize,
    pub after_filters: usize,
    pub semantic_requested: bool,
    pub semantic_applied: bool,
    pub provider: String,
    pub store: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub ranked_count: usize,
}

/// Search results for one page
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    /// Matches before pagination
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<SearchDebug>,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.record.id.as_str()).collect()
    }
}
