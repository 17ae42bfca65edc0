//! Engine request/response contract
//!
//! The response is deterministic for a fixed registry snapshot and
//! enricher: identical requests serialize byte-identically apart from
//! `performance_metrics`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::DetectedMarker;

/// Engine input
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
    #[serde(default)]
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Run live enrichment (degraded annotations otherwise)
    #[serde(default = "default_true")]
    pub enable_nlp: bool,
    /// Run the contextual rescan (activation rules)
    #[serde(default = "default_true")]
    pub enable_contextual: bool,
}

impl AnalyzeRequest {
    pub fn new(text: &str, schema_id: &str) -> Self {
        Self {
            text: text.to_string(),
            schema_id: schema_id.to_string(),
            session_id: None,
            enable_nlp: true,
            enable_contextual: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Phase 1 report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialPhaseReport {
    pub markers_found: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Phase 2 report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentPhaseReport {
    pub enriched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Phase 3 report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextualPhaseReport {
    pub markers_added: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-phase observability block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReports {
    pub initial: InitialPhaseReport,
    pub enrichment: EnrichmentPhaseReport,
    pub contextual: ContextualPhaseReport,
}

/// Phase timings; keys are phase names, values milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub phase_durations_ms: BTreeMap<String, f64>,
}

/// Engine output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub markers: Vec<DetectedMarker>,
    pub marker_count: usize,
    pub total_score: f64,
    pub phases: PhaseReports,
    pub nlp_enriched: bool,
    /// Narrative from the interpretation bridge, when one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpretation: Option<String>,
    pub performance_metrics: PerformanceMetrics,
}

impl AnalyzeResponse {
    /// Serialization with timings stripped, for idempotence comparison and caching
    pub fn stable_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(object) = value.as_object_mut() {
            object.remove("performance_metrics");
        }
        value
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_flag_defaults() {
        let req: AnalyzeRequest = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        assert!(req.enable_nlp);
        assert!(req.enable_contextual);
        assert_eq!(req.schema_id, "");
    }

    #[test]
    fn test_stable_json_strips_timings() {
        let response = AnalyzeResponse {
            markers: vec![],
            marker_count: 0,
            total_score: 0.0,
            phases: PhaseReports {
                initial: InitialPhaseReport {
                    markers_found: 0,
                    error: None,
                },
                enrichment: EnrichmentPhaseReport {
                    enriched: true,
                    error: None,
                },
                contextual: ContextualPhaseReport {
                    markers_added: 0,
                    error: None,
                },
            },
            nlp_enriched: true,
            interpretation: None,
            performance_metrics: PerformanceMetrics::default(),
        };

        let stable = response.stable_json();
        assert!(stable.get("performance_metrics").is_none());
        assert!(stable.get("phases").is_some());
    }
}
