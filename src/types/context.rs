//! Per-request analysis state
//!
//! The context is created at request start, mutated only by the
//! orchestrator's phases in sequence, and dropped once the response is
//! assembled. `detected` is append-only across phases.

use std::collections::HashSet;

use crate::types::{DetectedMarker, EnrichmentResult, MarkerPosition};

/// Timing and error record for one pipeline phase
#[derive(Debug, Clone, Default)]
pub struct PhaseRecord {
    pub duration_ms: f64,
    pub error: Option<String>,
}

/// Records for all phases of one analysis
#[derive(Debug, Clone, Default)]
pub struct PhaseMetadata {
    pub initial: PhaseRecord,
    pub enrichment: PhaseRecord,
    pub contextual: PhaseRecord,
    pub scoring: PhaseRecord,
}

/// Mutable accumulator for one analysis run
#[derive(Debug)]
pub struct AnalysisContext {
    pub text: String,
    pub schema_id: String,
    pub session_id: Option<String>,
    /// Populated by the enrichment phase (degraded substitute on failure)
    pub enrichment: Option<EnrichmentResult>,
    /// True only when a live enricher produced the annotations
    pub nlp_enriched: bool,
    /// Append-only across phases
    pub detected: Vec<DetectedMarker>,
    pub phase_meta: PhaseMetadata,
}

impl AnalysisContext {
    pub fn new(text: &str, schema_id: &str, session_id: Option<String>) -> Self {
        Self {
            text: text.to_string(),
            schema_id: schema_id.to_string(),
            session_id,
            enrichment: None,
            nlp_enriched: false,
            detected: Vec::new(),
            phase_meta: PhaseMetadata::default(),
        }
    }

    /// A component is present if any instance with that id was detected
    pub fn has_marker(&self, marker_id: &str) -> bool {
        self.detected.iter().any(|m| m.marker_id == marker_id)
    }

    /// Ids of everything detected so far
    pub fn detected_ids(&self) -> HashSet<&str> {
        self.detected.iter().map(|m| m.marker_id.as_str()).collect()
    }

    /// Best confidence among instances of `marker_id`
    pub fn best_confidence(&self, marker_id: &str) -> Option<f64> {
        self.detected
            .iter()
            .filter(|m| m.marker_id == marker_id)
            .map(|m| m.confidence)
            .fold(None, |best, c| Some(best.map_or(c, |b: f64| b.max(c))))
    }

    /// Byte spans of all positioned instances of `marker_id`
    pub fn positions_of(&self, marker_id: &str) -> Vec<&MarkerPosition> {
        self.detected
            .iter()
            .filter(|m| m.marker_id == marker_id)
            .filter_map(|m| m.position.as_ref())
            .collect()
    }

    /// Token indices (via enrichment offsets) of all spans of `marker_id`
    pub fn token_positions_of(&self, marker_id: &str) -> Vec<usize> {
        let Some(enrichment) = &self.enrichment else {
            return Vec::new();
        };
        let mut positions: Vec<usize> = self
            .positions_of(marker_id)
            .iter()
            .filter_map(|p| enrichment.token_index_at(p.start))
            .collect();
        positions.sort_unstable();
        positions.dedup();
        positions
    }
}

// =============================================================================
// TESTS
// =============================================================================
