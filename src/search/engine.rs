//! Search pipeline
//!
//! 1. Parse and validate every filter (no I/O yet)
//! 2. Structured filtering over the record listing
//! 3. Optional semantic ranking through the registry and vector store
//! 4. Merge relevance and snippets
//! 5. Sort, then paginate
//!
//! Provider and store outages never fail a search: the engine falls back to
//! structured-only results and says why in the debug payload.

use super::snippet::snippet;
use super::types::{
    SearchDebug, SearchFilters, SearchRequest, SearchResponse, SearchResult, SortBy, TimeBounds,
};
use crate::config::SearchConfig;
use crate::embedding::EmbeddingRegistry;
use crate::error::{Error, Result};
use crate::quality::QualityTag;
use crate::record::{Record, RecordFilter, RecordStore, TimeRange};
use crate::vector::{cosine_similarity, VectorQuery, VectorStore};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Relevance assigned when results are not semantically ranked.
pub const UNRANKED_RELEVANCE: f32 = 1.0;

/// Relevance of a candidate that has no stored vector under semantic ranking.
/// Such candidates sort after every scored one.
pub const MISSING_VECTOR_RELEVANCE: f32 = 0.0;

/// Filters after parsing
#[derive(Debug, Default)]
struct ParsedFilters {
    records: RecordFilter,
    qualities: Vec<QualityTag>,
    processing: Option<crate::record::Processing>,
    perspective: Option<String>,
    reflects: Option<String>,
    tokens: Vec<String>,
}

impl ParsedFilters {
    fn parse(request: &SearchRequest) -> Result<Self> {
        let filters: &SearchFilters = &request.filters;
        let records = RecordFilter {
            who: filters.who_names(),
            created: filters
                .system_time_range
                .as_ref()
                .map(|b| parse_range(b, "systemTimeRange"))
                .transpose()?,
            occurred: filters
                .time_range
                .as_ref()
                .map(|b| parse_range(b, "timeRange"))
                .transpose()?,
        };

        let qualities = filters
            .qualities
            .iter()
            .map(|tag| QualityTag::parse(tag.trim()))
            .collect::<Result<Vec<_>>>()?;

        let tokens = request
            .query
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        Ok(Self {
            records,
            qualities,
            processing: filters.processing,
            perspective: filters
                .perspective
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            reflects: filters
                .reflects
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            tokens,
        })
    }

    /// Filters the record listing cannot express.
    fn matches(&self, record: &Record) -> bool {
        if !self.qualities.iter().all(|tag| record.qualities.has(tag)) {
            return false;
        }
        if self.processing.is_some_and(|p| p != record.processing) {
            return false;
        }
        if let Some(perspective) = &self.perspective {
            if &record.perspective != perspective {
                return false;
            }
        }
        if let Some(target) = &self.reflects {
            if !record.reflects.contains(target) {
                return false;
            }
        }
        if !self.tokens.is_empty() {
            let content = record.content.to_lowercase();
            if !self.tokens.iter().all(|t| content.contains(t.as_str())) {
                return false;
            }
        }
        true
    }
}

/// Parse one time bound. Dates expand to the start or end of that UTC day.
pub fn parse_time_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| Error::Validation(format!("invalid time bound: '{}'", raw)))?;
    let time = if end_of_day {
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| Error::Internal("invalid time of day".to_string()))?;
    Ok(Utc.from_utc_datetime(&date.and_time(time)))
}

fn parse_range(bounds: &TimeBounds, field: &str) -> Result<TimeRange> {
    let start = bounds
        .start
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_time_bound(s, false))
        .transpose()
        .map_err(|e| Error::Validation(format!("{}.start: {}", field, e)))?;
    let end = bounds
        .end
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| parse_time_bound(s, true))
        .transpose()
        .map_err(|e| Error::Validation(format!("{}.end: {}", field, e)))?;

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(Error::Validation(format!(
                "{}: start is after end",
                field
            )));
        }
    }
    Ok(TimeRange::new(start, end))
}

/// Outcome of the semantic stage
enum Ranking {
    Skipped,
    Applied(HashMap<String, f32>),
}

/// Composes structured filtering, semantic ranking, sorting and pagination
pub struct SearchEngine {
    records: Arc<RecordStore>,
    registry: Arc<EmbeddingRegistry>,
    vectors: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        records: Arc<RecordStore>,
        registry: Arc<EmbeddingRegistry>,
        vectors: Arc<dyn VectorStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            records,
            registry,
            vectors,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let filters = ParsedFilters::parse(request)?;
        let limit = request
            .limit
            .unwrap_or(self.config.default_limit)
            .min(self.config.max_limit);

        // Structured filtering
        let total_records = self.records.len().await;
        let candidates: Vec<Record> = self
            .records
            .list(filters.records.clone())
            .records()
            .await
            .into_iter()
            .filter(|r| filters.matches(r))
            .collect();

        let mut diagnostics = SearchDebug {
            total_records,
            after_filters: candidates.len(),
            provider: self.registry.name().to_string(),
            store: self.vectors.name().to_string(),
            ..Default::default()
        };

        // Semantic ranking
        let ranking = match request.semantic_text() {
            None => Ranking::Skipped,
            Some(text) => {
                diagnostics.semantic_requested = true;
                match self.rank(text, &candidates).await {
                    Ok(scores) => {
                        diagnostics.semantic_applied = true;
                        diagnostics.ranked_count = scores.len();
                        Ranking::Applied(scores)
                    }
                    Err(reason) => {
                        tracing::warn!("Semantic ranking skipped: {}", reason);
                        diagnostics.degraded_reason = Some(reason);
                        Ranking::Skipped
                    }
                }
            }
        };

        // Merge. Each entry carries whether it was scored by the store.
        let mut merged: Vec<(bool, SearchResult)> = Vec::with_capacity(candidates.len());
        for record in candidates {
            let (scored, relevance) = match &ranking {
                Ranking::Skipped => (false, UNRANKED_RELEVANCE),
                Ranking::Applied(scores) => match scores.get(&record.id) {
                    Some(score) => {
                        if self.config.min_similarity.is_some_and(|min| *score < min) {
                            continue;
                        }
                        (true, *score)
                    }
                    None => (false, MISSING_VECTOR_RELEVANCE),
                },
            };
            let snippet = snippet(&record.content, self.config.snippet_length);
            merged.push((
                scored,
                SearchResult {
                    record,
                    relevance,
                    snippet,
                },
            ));
        }

        // Sort. Under relevance, scored entries precede unscored ones and
        // ties keep listing order; created ties put the later-written
        // record first.
        let sort_by = request.sort_by.unwrap_or(match ranking {
            Ranking::Applied(_) => SortBy::Relevance,
            Ranking::Skipped => SortBy::Created,
        });
        match sort_by {
            SortBy::Relevance => merged.sort_by(|(a_scored, a), (b_scored, b)| {
                b_scored
                    .cmp(a_scored)
                    .then_with(|| b.relevance.total_cmp(&a.relevance))
            }),
            SortBy::Created => {
                merged.reverse();
                merged.sort_by(|(_, a), (_, b)| b.record.created.cmp(&a.record.created));
            }
        }

        // Paginate
        let total = merged.len();
        let results: Vec<SearchResult> = merged
            .into_iter()
            .map(|(_, result)| result)
            .skip(request.offset)
            .take(limit)
            .collect();

        tracing::debug!(
            "Search: {} records, {} after filters, {} returned (semantic applied: {})",
            diagnostics.total_records,
            diagnostics.after_filters,
            results.len(),
            diagnostics.semantic_applied
        );

        let show_debug = request.debug || diagnostics.degraded_reason.is_some();
        Ok(SearchResponse {
            results,
            total,
            debug: show_debug.then_some(diagnostics),
        })
    }

    /// Similarity per candidate id. An `Err` carries the degradation reason.
    async fn rank(
        &self,
        text: &str,
        candidates: &[Record],
    ) -> std::result::Result<HashMap<String, f32>, String> {
        if !self.registry.has_signal() {
            return Err(match self.registry.fallback_reason() {
                Some(reason) => format!("embedding provider fell back: {}", reason),
                None => "no embedding provider configured".to_string(),
            });
        }
        if candidates.is_empty() {
            return Ok(HashMap::new());
        }

        let vector = self
            .registry
            .generate_embedding(text)
            .await
            .map_err(|e| e.to_string())?;

        let ids = candidates.iter().map(|r| r.id.clone());
        if self.vectors.supports_filtering() {
            let query = VectorQuery::new().candidates(ids);
            let hits = self
                .vectors
                .search(&vector, &query)
                .await
                .map_err(|e| e.to_string())?;
            Ok(hits.into_iter().map(|h| (h.id, h.score)).collect())
        } else {
            let mut scores = HashMap::new();
            for id in ids {
                let stored = self.vectors.get(&id).await.map_err(|e| e.to_string())?;
                if let Some(stored) = stored {
                    let score = cosine_similarity(&stored, &vector).map_err(|e| e.to_string())?;
                    scores.insert(id, score);
                }
            }
            Ok(scores)
        }
    }
}
