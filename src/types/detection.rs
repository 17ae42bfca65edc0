//! Detection output units

use serde::{Deserialize, Serialize};

/// Which phase produced a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionPhase {
    /// Pattern/example matching over raw text
    Initial,
    /// Activation-rule evaluation over already-detected markers
    Contextual,
}

/// Byte span of a hit, plus the sentence it falls in once enrichment ran
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPosition {
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentence_index: Option<usize>,
}

/// One detected marker instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedMarker {
    pub marker_id: String,
    /// In [0, 1]
    pub confidence: f64,
    pub detection_phase: DetectionPhase,
    /// Absent for similarity hits and contextual markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MarkerPosition>,
    /// Component ids that satisfied the rule (composite markers only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
}

impl DetectedMarker {
    /// Initial-phase hit at a known span
    pub fn initial(marker_id: &str, confidence: f64, position: Option<MarkerPosition>) -> Self {
        Self {
            marker_id: marker_id.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            detection_phase: DetectionPhase::Initial,
            position,
            components: Vec::new(),
        }
    }

    /// Contextual-phase hit backed by component evidence
    pub fn contextual(marker_id: &str, confidence: f64, components: Vec<String>) -> Self {
        Self {
            marker_id: marker_id.to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            detection_phase: DetectionPhase::Contextual,
            position: None,
            components,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
