//! Marker definitions as loaded from JSON/YAML registry documents

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::ActivationRule;

/// Descriptive framing for a marker. Not evaluated logically.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Surface cues the marker is about (accepts a string or a list)
    #[serde(default, deserialize_with = "one_or_many")]
    pub signal: Vec<String>,
    #[serde(default)]
    pub concept: String,
    #[serde(default)]
    pub pragmatics: String,
    #[serde(default)]
    pub narrative: String,
}

/// Non-structural marker attributes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerMetadata {
    /// Schema/category this marker belongs to; markers without one match any schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Confidence assigned to exact/regex hits (1.0 when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_default: Option<f64>,
    /// Scoring weight (1.0 when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// One entry in the marker registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkerDefinition {
    /// Unique identifier; immutable once loaded. Accepts `_id` (document form).
    #[serde(default, alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub frame: Frame,
    /// Example utterances used for containment and similarity matching
    #[serde(default)]
    pub examples: Vec<String>,
    /// Optional regular expression, compiled eagerly at registry load
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Informational cross-reference; `activation` is authoritative
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub composed_of: Vec<String>,
    /// Absent ⇒ atomic marker, detected only by pattern/example matching
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<ActivationRule>,
    #[serde(default)]
    pub metadata: MarkerMetadata,
}

impl MarkerDefinition {
    /// Atomic markers have no activation rule and are matched in the initial scan
    pub fn is_atomic(&self) -> bool {
        self.activation.is_none()
    }

    /// Confidence for exact/regex hits
    pub fn confidence_default(&self) -> f64 {
        self.metadata.confidence_default.unwrap_or(1.0)
    }

    /// Scoring weight
    pub fn weight(&self) -> f64 {
        self.metadata.weight.unwrap_or(1.0)
    }

    /// True when the marker participates in an analysis for `schema_id`
    pub fn matches_schema(&self, schema_id: &str) -> bool {
        match &self.metadata.category {
            Some(category) => schema_id.is_empty() || category == schema_id,
            None => true,
        }
    }
}

/// Accept `"x"` or `["x", "y"]` for list-valued fields
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

// =============================================================================
// TESTS
// =============================================================================
