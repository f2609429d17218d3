//! Quality signatures
//!
//! A signature maps dimensions to either absent or present, where a present
//! dimension may carry a sub-quality and a free-text manifestation. Input is
//! accepted as a map (`{"mood": "tight", "focus.narrow": true}`) or as a tag
//! list (`["embodied.sensing", "mood"]`); both are validated against the
//! taxonomy on the way in.

use super::taxonomy::{Dimension, QualityTag};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// State of one dimension within a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimensionState {
    /// Explicitly marked absent (`false`)
    Absent,
    /// Present, optionally narrowed to a sub-quality
    Present {
        sub: Option<&'static str>,
        manifestation: Option<String>,
    },
}

/// Validated quality signature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSignature", into = "BTreeMap<String, Value>")]
pub struct QualitySignature {
    dimensions: BTreeMap<Dimension, DimensionState>,
}

/// Wire shape before validation
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawSignature {
    Tags(Vec<String>),
    Map(BTreeMap<String, Value>),
}

impl TryFrom<RawSignature> for QualitySignature {
    type Error = Error;

    fn try_from(raw: RawSignature) -> Result<Self> {
        match raw {
            RawSignature::Tags(tags) => Self::from_tags(tags.iter().map(String::as_str)),
            RawSignature::Map(map) => validate_signature(&map),
        }
    }
}

impl From<QualitySignature> for BTreeMap<String, Value> {
    fn from(signature: QualitySignature) -> Self {
        signature
            .dimensions
            .into_iter()
            .map(|(dimension, state)| match state {
                DimensionState::Absent => (dimension.to_string(), Value::Bool(false)),
                DimensionState::Present { sub, manifestation } => {
                    let key = QualityTag { dimension, sub }.to_string();
                    let value = manifestation.map(Value::String).unwrap_or(Value::Bool(true));
                    (key, value)
                }
            })
            .collect()
    }
}

/// Validate a raw quality map and build a signature from it.
///
/// Keys must be taxonomy tags. Values may be `false`/`null` (absent),
/// `true` (present), or a non-empty manifestation string. A string that
/// names one of the dimension's sub-qualities under a base key selects
/// that sub-quality; spelling other than the canonical name is kept as
/// the manifestation.
pub fn validate_signature(map: &BTreeMap<String, Value>) -> Result<QualitySignature> {
    let mut signature = QualitySignature::default();

    for (key, value) in map {
        let tag = QualityTag::parse(key)?;
        let state = match value {
            Value::Null | Value::Bool(false) => DimensionState::Absent,
            Value::Bool(true) => DimensionState::Present {
                sub: tag.sub,
                manifestation: None,
            },
            Value::String(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(Error::invalid_quality(key, "manifestation must not be empty"));
                }
                match (tag.sub, tag.dimension.sub_quality(&text.to_lowercase())) {
                    (None, Some(sub)) => DimensionState::Present {
                        sub: Some(sub),
                        manifestation: (text != sub).then(|| text.to_string()),
                    },
                    _ => DimensionState::Present {
                        sub: tag.sub,
                        manifestation: Some(text.to_string()),
                    },
                }
            }
            _ => {
                return Err(Error::invalid_quality(
                    key,
                    "value must be false, true or a manifestation string",
                ))
            }
        };
        signature.insert(key, tag.dimension, state)?;
    }

    Ok(signature)
}

impl QualitySignature {
    /// Build a signature from bare tags, each marking its dimension present.
    pub fn from_tags<'a>(tags: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let mut signature = Self::default();
        for raw in tags {
            let tag = QualityTag::parse(raw)?;
            signature.insert(
                raw,
                tag.dimension,
                DimensionState::Present {
                    sub: tag.sub,
                    manifestation: None,
                },
            )?;
        }
        Ok(signature)
    }

    fn insert(&mut self, key: &str, dimension: Dimension, state: DimensionState) -> Result<()> {
        if let Some(existing) = self.dimensions.get(&dimension) {
            let reason = match (existing, &state) {
                (
                    DimensionState::Present { sub: Some(a), .. },
                    DimensionState::Present { sub: Some(b), .. },
                ) if a != b => "a dimension carries at most one sub-quality",
                _ => "dimension given more than once",
            };
            return Err(Error::invalid_quality(key, reason));
        }
        self.dimensions.insert(dimension, state);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn state(&self, dimension: Dimension) -> Option<&DimensionState> {
        self.dimensions.get(&dimension)
    }

    pub fn is_present(&self, dimension: Dimension) -> bool {
        matches!(self.state(dimension), Some(DimensionState::Present { .. }))
    }

    pub fn sub_quality(&self, dimension: Dimension) -> Option<&'static str> {
        match self.state(dimension) {
            Some(DimensionState::Present { sub, .. }) => *sub,
            _ => None,
        }
    }

    pub fn manifestation(&self, dimension: Dimension) -> Option<&str> {
        match self.state(dimension) {
            Some(DimensionState::Present { manifestation, .. }) => manifestation.as_deref(),
            _ => None,
        }
    }

    /// Tags for every present dimension, most specific form.
    pub fn present_tags(&self) -> Vec<QualityTag> {
        self.dimensions
            .iter()
            .filter_map(|(dimension, state)| match state {
                DimensionState::Present { sub, .. } => Some(QualityTag {
                    dimension: *dimension,
                    sub: *sub,
                }),
                DimensionState::Absent => None,
            })
            .collect()
    }

    /// Whether this signature satisfies a tag: a base tag needs the
    /// dimension present, a sub tag needs that exact sub-quality.
    pub fn has(&self, tag: &QualityTag) -> bool {
        match tag.sub {
            None => self.is_present(tag.dimension),
            Some(sub) => self.sub_quality(tag.dimension) == Some(sub),
        }
    }

    /// Human-readable rendering used when building embedding text.
    pub fn describe(&self) -> String {
        self.dimensions
            .iter()
            .filter_map(|(dimension, state)| match state {
                DimensionState::Absent => None,
                DimensionState::Present { sub, manifestation } => {
                    let tag = QualityTag {
                        dimension: *dimension,
                        sub: *sub,
                    };
                    Some(match manifestation {
                        Some(text) => format!("{}: {}", tag, text),
                        None => tag.to_string(),
                    })
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
