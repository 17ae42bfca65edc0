//! Interpretation bridge: optional narrative generation
//!
//! The engine only knows the trait; prompt construction for a real LLM
//! backend lives with the collaborator that implements it. A runner
//! pairs a primary with a fallback and bounds the primary with a
//! timeout, so bridge latency never blocks the core pipeline.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::core::Registry;
use crate::types::{BridgeError, DetectedMarker, DetectionPhase};
use crate::DEFAULT_INTERPRETATION_TIMEOUT_MS;

/// Narrative generation over the final marker set
#[async_trait]
pub trait InterpretationBridge: Send + Sync {
    async fn interpret(
        &self,
        text: &str,
        markers: &[DetectedMarker],
        registry: &Registry,
    ) -> Result<String, BridgeError>;

    fn name(&self) -> &'static str;
}

/// Deterministic template narrative; always available, used as fallback
#[derive(Debug, Default)]
pub struct TemplateBridge;

#[async_trait]
impl InterpretationBridge for TemplateBridge {
    async fn interpret(
        &self,
        _text: &str,
        markers: &[DetectedMarker],
        registry: &Registry,
    ) -> Result<String, BridgeError> {
        let Some(strongest) = markers
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            return Ok("No markers were detected in this text.".to_string());
        };

        let contextual = markers
            .iter()
            .filter(|m| m.detection_phase == DetectionPhase::Contextual)
            .count();

        let mut narrative = format!(
            "{} marker(s) detected, {} of them composed from other markers. ",
            markers.len(),
            contextual
        );
        narrative.push_str(&format!(
            "The strongest signal is {} (confidence {:.2})",
            strongest.marker_id, strongest.confidence
        ));
        if let Some(concept) = registry
            .get(&strongest.marker_id)
            .map(|m| m.frame.concept.as_str())
            .filter(|c| !c.is_empty())
        {
            narrative.push_str(&format!(", pointing at: {}", concept));
        }
        narrative.push('.');
        Ok(narrative)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

/// Primary/fallback strategy with a timeout on the primary
pub struct BridgeRunner {
    primary: Arc<dyn InterpretationBridge>,
    fallback: Arc<dyn InterpretationBridge>,
    timeout_ms: u64,
}

impl BridgeRunner {
    pub fn new(
        primary: Arc<dyn InterpretationBridge>,
        fallback: Arc<dyn InterpretationBridge>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            primary,
            fallback,
            timeout_ms,
        }
    }

    /// Template fallback with the default timeout
    pub fn with_template_fallback(primary: Arc<dyn InterpretationBridge>) -> Self {
        Self::new(
            primary,
            Arc::new(TemplateBridge),
            DEFAULT_INTERPRETATION_TIMEOUT_MS,
        )
    }

    /// Never fails: primary with timeout, then fallback, then nothing
    pub async fn interpret(
        &self,
        text: &str,
        markers: &[DetectedMarker],
        registry: &Registry,
    ) -> Option<String> {
        let budget = Duration::from_millis(self.timeout_ms);
        match tokio::time::timeout(budget, self.primary.interpret(text, markers, registry)).await {
            Ok(Ok(narrative)) => return Some(narrative),
            Ok(Err(error)) => {
                tracing::warn!(bridge = self.primary.name(), %error, "primary bridge failed");
            }
            Err(_) => {
                tracing::warn!(
                    bridge = self.primary.name(),
                    timeout_ms = self.timeout_ms,
                    "primary bridge timed out"
                );
            }
        }

        match self.fallback.interpret(text, markers, registry).await {
            Ok(narrative) => Some(narrative),
            Err(error) => {
                tracing::warn!(bridge = self.fallback.name(), %error, "fallback bridge failed");
                None
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarkerDefinition;

    struct FailingBridge;

    #[async_trait]
    impl InterpretationBridge for FailingBridge {
        async fn interpret(
            &self,
            _text: &str,
            _markers: &[DetectedMarker],
            _registry: &Registry,
        ) -> Result<String, BridgeError> {
            Err(BridgeError::Unavailable("backend down".into()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    fn registry() -> std::sync::Arc<Registry> {
        let mut marker = MarkerDefinition {
            id: "A_X".into(),
            pattern: Some("x".into()),
            ..Default::default()
        };
        marker.frame.concept = "ambivalence".into();
        Registry::from_definitions(vec![marker], None).unwrap()
    }

    #[tokio::test]
    async fn test_template_bridge_is_deterministic() {
        let registry = registry();
        let markers = vec![DetectedMarker::initial("A_X", 0.9, None)];

        let first = TemplateBridge
            .interpret("x", &markers, &registry)
            .await
            .unwrap();
        let second = TemplateBridge
            .interpret("x", &markers, &registry)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert!(first.contains("A_X"));
        assert!(first.contains("ambivalence"));
    }

    #[tokio::test]
    async fn test_runner_falls_back_on_primary_failure() {
        let registry = registry();
        let runner = BridgeRunner::with_template_fallback(Arc::new(FailingBridge));

        let narrative = runner
            .interpret("x", &[DetectedMarker::initial("A_X", 0.9, None)], &registry)
            .await;
        assert!(narrative.is_some());
    }

    #[tokio::test]
    async fn test_empty_markers_narrative() {
        let registry = registry();
        let narrative = TemplateBridge.interpret("", &[], &registry).await.unwrap();
        assert!(narrative.contains("No markers"));
    }
}
