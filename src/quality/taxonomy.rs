//! The closed quality taxonomy
//!
//! Seven base dimensions, each with exactly two named sub-qualities, for a
//! total of 21 valid tags. Tags are written `dimension` or
//! `dimension.sub_quality`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Number of tags in the taxonomy (7 bases + 14 sub-qualities).
pub const TAXONOMY_SIZE: usize = 21;

/// A top-level phenomenological dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Embodied,
    Focus,
    Mood,
    Purpose,
    Space,
    Time,
    Presence,
}

impl Dimension {
    /// All dimensions in canonical order.
    pub const ALL: [Dimension; 7] = [
        Dimension::Embodied,
        Dimension::Focus,
        Dimension::Mood,
        Dimension::Purpose,
        Dimension::Space,
        Dimension::Time,
        Dimension::Presence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embodied => "embodied",
            Self::Focus => "focus",
            Self::Mood => "mood",
            Self::Purpose => "purpose",
            Self::Space => "space",
            Self::Time => "time",
            Self::Presence => "presence",
        }
    }

    /// The two sub-qualities this dimension may carry.
    pub fn sub_qualities(&self) -> [&'static str; 2] {
        match self {
            Self::Embodied => ["thinking", "sensing"],
            Self::Focus => ["narrow", "broad"],
            Self::Mood => ["open", "closed"],
            Self::Purpose => ["goal", "wander"],
            Self::Space => ["here", "there"],
            Self::Time => ["past", "future"],
            Self::Presence => ["individual", "collective"],
        }
    }

    /// Resolve a sub-quality name to its static form.
    pub fn sub_quality(&self, name: &str) -> Option<&'static str> {
        self.sub_qualities().into_iter().find(|s| *s == name)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dimension {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Dimension::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::invalid_quality(s, "unknown dimension"))
    }
}

/// A parsed quality tag: a dimension and optionally one of its sub-qualities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QualityTag {
    pub dimension: Dimension,
    pub sub: Option<&'static str>,
}

impl QualityTag {
    pub fn base(dimension: Dimension) -> Self {
        Self {
            dimension,
            sub: None,
        }
    }

    /// Parse a tag, rejecting anything outside the taxonomy.
    ///
    /// Accepted shapes are `dimension` and `dimension.sub`. More than one
    /// dot, or an empty segment, is a malformed path.
    pub fn parse(tag: &str) -> Result<Self> {
        let segments: Vec<&str> = tag.split('.').collect();
        if segments.len() > 2 {
            return Err(Error::invalid_quality(tag, "more than one '.' in tag path"));
        }
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::invalid_quality(tag, "empty segment in tag path"));
        }

        let dimension: Dimension = segments[0]
            .parse()
            .map_err(|_| Error::invalid_quality(tag, "unknown dimension"))?;

        let sub = match segments.get(1) {
            Some(name) => Some(
                dimension
                    .sub_quality(name)
                    .ok_or_else(|| Error::invalid_quality(tag, "unknown sub-quality"))?,
            ),
            None => None,
        };

        Ok(Self { dimension, sub })
    }
}

impl std::fmt::Display for QualityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.sub {
            Some(sub) => write!(f, "{}.{}", self.dimension, sub),
            None => write!(f, "{}", self.dimension),
        }
    }
}

/// True when `tag` is one of the 21 taxonomy members.
pub fn is_known_quality(tag: &str) -> bool {
    QualityTag::parse(tag).is_ok()
}

/// Every taxonomy tag, bases first within each dimension.
pub fn all_tags() -> Vec<QualityTag> {
    Dimension::ALL
        .into_iter()
        .flat_map(|dimension| {
            std::iter::once(QualityTag::base(dimension)).chain(
                dimension
                    .sub_qualities()
                    .into_iter()
                    .map(move |sub| QualityTag {
                        dimension,
                        sub: Some(sub),
                    }),
            )
        })
        .collect()
}
