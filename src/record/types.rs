//! Record data types
//!
//! A record is one first-person experiential entry: its content, who had the
//! experience, when and how it was processed, its quality signature, and the
//! earlier records it reflects on.

use crate::quality::QualitySignature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Experiencer used when none is given.
pub const DEFAULT_EXPERIENCER: &str = "self";

/// Perspective used when none is given.
pub const DEFAULT_PERSPECTIVE: &str = "I";

/// A persisted experiential record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Unique record identifier, immutable once assigned
    pub id: String,
    /// Free-text content, never empty
    pub content: String,
    /// When the record was persisted
    pub created: DateTime<Utc>,
    /// When the experience happened, if the caller said so
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurred: Option<DateTime<Utc>>,
    /// Who had the experience
    #[serde(default)]
    pub who: Who,
    /// How long after the experience it was written down
    #[serde(default)]
    pub processing: Processing,
    /// Narrative perspective
    #[serde(default = "default_perspective")]
    pub perspective: String,
    /// Quality signature
    #[serde(default, skip_serializing_if = "QualitySignature::is_empty")]
    pub qualities: QualitySignature,
    /// Ids of records this one reflects on, deduplicated, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reflects: Vec<String>,
}

fn default_perspective() -> String {
    DEFAULT_PERSPECTIVE.to_string()
}

impl Record {
    /// Time the experience happened, falling back to persistence time.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred.unwrap_or(self.created)
    }

    /// Text handed to embedding providers for this record.
    pub fn embedding_text(&self) -> String {
        let mut text = format!("[{}] {}", self.who, self.content);
        let qualities = self.qualities.describe();
        if !qualities.is_empty() {
            text.push_str(" {");
            text.push_str(&qualities);
            text.push('}');
        }
        text
    }
}

/// When the record was written relative to the experience
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Processing {
    #[default]
    During,
    RightAfter,
    LongAfter,
    Crafted,
}

impl std::fmt::Display for Processing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::During => write!(f, "during"),
            Self::RightAfter => write!(f, "right-after"),
            Self::LongAfter => write!(f, "long-after"),
            Self::Crafted => write!(f, "crafted"),
        }
    }
}

impl std::str::FromStr for Processing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "during" => Ok(Self::During),
            "right-after" => Ok(Self::RightAfter),
            "long-after" => Ok(Self::LongAfter),
            "crafted" => Ok(Self::Crafted),
            other => Err(format!("unknown processing level: {}", other)),
        }
    }
}

/// Normalized, ordered, non-empty list of experiencers.
///
/// Accepts a single string or a list on the wire; serializes a single
/// experiencer back as a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WhoInput", into = "WhoInput")]
pub struct Who(Vec<String>);

/// Wire shape of `who`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WhoInput {
    One(String),
    Many(Vec<String>),
}

impl From<WhoInput> for Who {
    fn from(input: WhoInput) -> Self {
        match input {
            WhoInput::One(name) => Who::new([name]),
            WhoInput::Many(names) => Who::new(names),
        }
    }
}

impl From<Who> for WhoInput {
    fn from(who: Who) -> Self {
        if who.0.len() == 1 {
            WhoInput::One(who.0.into_iter().next().unwrap_or_default())
        } else {
            WhoInput::Many(who.0)
        }
    }
}

impl Who {
    /// Trim names, drop blanks and duplicates; empty input becomes `self`.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.into().trim().to_string())
            .filter(|n| !n.is_empty() && seen.insert(n.clone()))
            .collect();
        if names.is_empty() {
            Self::default()
        } else {
            Self(names)
        }
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// True when any listed name is one of this record's experiencers.
    pub fn matches_any(&self, names: &[String]) -> bool {
        self.0.iter().any(|n| names.contains(n))
    }
}

impl Default for Who {
    fn default() -> Self {
        Self(vec![DEFAULT_EXPERIENCER.to_string()])
    }
}

impl From<&str> for Who {
    fn from(name: &str) -> Self {
        Who::new([name])
    }
}

impl std::fmt::Display for Who {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// Request to create a record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecord {
    pub content: String,
    #[serde(default)]
    pub who: Option<Who>,
    #[serde(default)]
    pub processing: Option<Processing>,
    #[serde(default)]
    pub perspective: Option<String>,
    #[serde(default)]
    pub qualities: Option<QualitySignature>,
    #[serde(default)]
    pub reflects: Vec<String>,
    #[serde(default)]
    pub occurred: Option<DateTime<Utc>>,
}

impl CreateRecord {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn who(mut self, who: impl Into<Who>) -> Self {
        self.who = Some(who.into());
        self
    }

    pub fn processing(mut self, processing: Processing) -> Self {
        self.processing = Some(processing);
        self
    }

    pub fn perspective(mut self, perspective: impl Into<String>) -> Self {
        self.perspective = Some(perspective.into());
        self
    }

    pub fn qualities(mut self, qualities: QualitySignature) -> Self {
        self.qualities = Some(qualities);
        self
    }

    pub fn reflects(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.reflects.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn occurred(mut self, at: DateTime<Utc>) -> Self {
        self.occurred = Some(at);
        self
    }
}

/// Partial changes to an existing record; absent fields are left alone
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub who: Option<Who>,
    #[serde(default)]
    pub processing: Option<Processing>,
    #[serde(default)]
    pub perspective: Option<String>,
    #[serde(default)]
    pub qualities: Option<QualitySignature>,
    #[serde(default)]
    pub reflects: Option<Vec<String>>,
    #[serde(default)]
    pub occurred: Option<DateTime<Utc>>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.who.is_none()
            && self.processing.is_none()
            && self.perspective.is_none()
            && self.qualities.is_none()
            && self.reflects.is_none()
            && self.occurred.is_none()
    }

    /// Whether applying this update changes the record's embedding text.
    pub fn affects_embedding(&self) -> bool {
        self.content.is_some() || self.who.is_some() || self.qualities.is_some()
    }
}

/// Inclusive time window; an open end is unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| at >= s) && self.end.map_or(true, |e| at <= e)
    }
}

/// Structured filter for record listings
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Keep records whose experiencers include any of these names
    pub who: Option<Vec<String>>,
    /// Keep records persisted within this window
    pub created: Option<TimeRange>,
    /// Keep records that happened within this window
    pub occurred: Option<TimeRange>,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(names) = &self.who {
            if !record.who.matches_any(names) {
                return false;
            }
        }
        if let Some(range) = &self.created {
            if !range.contains(record.created) {
                return false;
            }
        }
        if let Some(range) = &self.occurred {
            if !range.contains(record.occurred_at()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample() -> Record {
        Record {
            id: "src-1".to_string(),
            content: "anxious about tomorrow".to_string(),
            created: Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
            occurred: None,
            who: Who::from("Ava"),
            processing: Processing::During,
            perspective: DEFAULT_PERSPECTIVE.to_string(),
            qualities: serde_json::from_value(json!({"mood": "tight", "time": "future"}))
                .unwrap(),
            reflects: vec![],
        }
    }

    #[test]
    fn test_who_normalization() {
        let who = Who::new(["  Ava ", "", "Ben", "Ava"]);
        assert_eq!(who.names(), ["Ava".to_string(), "Ben".to_string()]);

        let empty = Who::new(Vec::<String>::new());
        assert_eq!(empty.names(), [DEFAULT_EXPERIENCER.to_string()]);
    }

    #[test]
    fn test_who_wire_forms() {
        let one: Who = serde_json::from_value(json!("Ava")).unwrap();
        assert_eq!(serde_json::to_value(&one).unwrap(), json!("Ava"));

        let many: Who = serde_json::from_value(json!(["Ava", "Ben"])).unwrap();
        assert_eq!(serde_json::to_value(&many).unwrap(), json!(["Ava", "Ben"]));
    }

    #[test]
    fn test_processing_wire_names() {
        assert_eq!(
            serde_json::to_value(Processing::RightAfter).unwrap(),
            json!("right-after")
        );
        assert_eq!("long-after".parse::<Processing>().unwrap(), Processing::LongAfter);
        assert!("later".parse::<Processing>().is_err());
    }

    #[test]
    fn test_record_defaults_on_deserialize() {
        let record: Record = serde_json::from_value(json!({
            "id": "src-2",
            "content": "quiet morning",
            "created": "2025-03-01T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(record.who, Who::default());
        assert_eq!(record.processing, Processing::During);
        assert_eq!(record.perspective, "I");
        assert!(record.qualities.is_empty());
        assert!(record.reflects.is_empty());
    }

    #[test]
    fn test_embedding_text_includes_qualities() {
        let text = sample().embedding_text();
        assert!(text.starts_with("[Ava] anxious about tomorrow"));
        assert!(text.contains("mood: tight"));
        assert!(text.contains("time.future"));
    }

    #[test]
    fn test_time_range_inclusive() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert!(TimeRange::new(Some(at), Some(at)).contains(at));
        assert!(TimeRange::default().contains(at));
        assert!(!TimeRange::new(Some(at + chrono::Duration::seconds(1)), None).contains(at));
    }

    #[test]
    fn test_filter_by_who() {
        let record = sample();
        let ava = RecordFilter {
            who: Some(vec!["Ava".to_string()]),
            ..Default::default()
        };
        let ben = RecordFilter {
            who: Some(vec!["Ben".to_string()]),
            ..Default::default()
        };
        assert!(ava.matches(&record));
        assert!(!ben.matches(&record));
    }

    #[test]
    fn test_update_affects_embedding() {
        assert!(!RecordUpdate::default().affects_embedding());
        let update = RecordUpdate {
            processing: Some(Processing::Crafted),
            ..Default::default()
        };
        assert!(!update.affects_embedding());
        assert!(!update.is_empty());
        let update = RecordUpdate {
            content: Some("new".to_string()),
            ..Default::default()
        };
        assert!(update.affects_embedding());
    }
}
