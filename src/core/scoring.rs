//! Scoring: weighted confidence sum over detected instances
//!
//! `total = Σ weight(marker) × confidence(instance)`, weight defaulting
//! to 1.0. No normalization; callers apply their own thresholds.

use crate::core::Registry;
use crate::types::DetectedMarker;

#[derive(Debug, Default)]
pub struct Scorer;

impl Scorer {
    pub fn new() -> Self {
        Self
    }

    pub fn total(&self, detected: &[DetectedMarker], registry: &Registry) -> f64 {
        detected
            .iter()
            .map(|instance| {
                let weight = registry
                    .get(&instance.marker_id)
                    .map(|m| m.weight())
                    .unwrap_or(1.0);
                weight * instance.confidence
            })
            .sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================
