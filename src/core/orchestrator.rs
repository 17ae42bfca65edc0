//! Orchestrator: sequences the analysis phases
//!
//! State machine: Init → Scanning → Enriching → Rescanning → Scoring →
//! Done. Every phase is isolated: an internal failure degrades that
//! phase's contribution and lands in its report, never aborting the
//! request. Atomic markers are matched only in Scanning; Rescanning is
//! activation-rule evaluation over the Phase-1/Phase-2 context.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};

use crate::core::{BridgeRunner, Enricher, EngineConfig, Matcher, Registry, RuleEngine, Scorer};
use crate::types::{
    AnalysisContext, AnalyzeRequest, AnalyzeResponse, ContextualPhaseReport, DetectionPhase,
    EngineError, EnrichmentPhaseReport, EnrichmentResult, InitialPhaseReport, PerformanceMetrics,
    PhaseReports,
};

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Init,
    Scanning,
    Enriching,
    Rescanning,
    Scoring,
    Done,
    /// Unrecoverable input errors only; phases never transition here
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Init => "INIT",
            EngineState::Scanning => "SCANNING",
            EngineState::Enriching => "ENRICHING",
            EngineState::Rescanning => "RESCANNING",
            EngineState::Scoring => "SCORING",
            EngineState::Done => "DONE",
            EngineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation, checked at phase boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives one registry snapshot through the full pipeline
pub struct Orchestrator {
    registry: Arc<Registry>,
    enricher: Arc<dyn Enricher>,
    matcher: Matcher,
    rules: RuleEngine,
    scorer: Scorer,
    bridge: Option<BridgeRunner>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, config: EngineConfig) -> Self {
        let enricher = config.build_enricher();
        Self::with_enricher(registry, enricher, config)
    }

    /// Inject a specific enricher (tests, external NLP backends)
    pub fn with_enricher(
        registry: Arc<Registry>,
        enricher: Arc<dyn Enricher>,
        config: EngineConfig,
    ) -> Self {
        Self {
            registry,
            enricher,
            matcher: Matcher::new(config.similarity_threshold),
            rules: RuleEngine::new(config.negation_radius),
            scorer: Scorer::new(),
            bridge: None,
            config,
        }
    }

    /// Attach an interpretation bridge; its latency never blocks phases
    pub fn with_bridge(mut self, bridge: BridgeRunner) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Analyze one text
    pub async fn analyze(&self, request: AnalyzeRequest) -> Result<AnalyzeResponse, EngineError> {
        self.analyze_with_cancel(request, &CancelFlag::new()).await
    }

    /// Analyze with a cancellation flag checked at each phase boundary
    pub async fn analyze_with_cancel(
        &self,
        request: AnalyzeRequest,
        cancel: &CancelFlag,
    ) -> Result<AnalyzeResponse, EngineError> {
        let total_start = Instant::now();
        let mut state = EngineState::Init;
        let mut context = AnalysisContext::new(
            &request.text,
            &request.schema_id,
            request.session_id.clone(),
        );

        // Phase 1: initial scan
        state = self.advance(state, EngineState::Scanning, cancel)?;
        self.phase_scan(&mut context);

        // Phase 2: enrichment
        state = self.advance(state, EngineState::Enriching, cancel)?;
        self.phase_enrich(&mut context, request.enable_nlp).await;

        // Phase 3: contextual rescan
        state = self.advance(state, EngineState::Rescanning, cancel)?;
        let markers_added = if request.enable_contextual {
            self.phase_rescan(&mut context)
        } else {
            0
        };

        // Scoring
        state = self.advance(state, EngineState::Scoring, cancel)?;
        let scoring_start = Instant::now();
        let total_score = self.scorer.total(&context.detected, &self.registry);
        context.phase_meta.scoring.duration_ms = ms_since(scoring_start);

        // Optional narrative, outside the phase state machine
        let interpretation = match &self.bridge {
            Some(runner) => {
                runner
                    .interpret(&context.text, &context.detected, &self.registry)
                    .await
            }
            None => None,
        };

        state = self.advance(state, EngineState::Done, cancel)?;
        tracing::debug!(%state, markers = context.detected.len(), "analysis complete");

        Ok(self.assemble(context, markers_added, total_score, interpretation, total_start))
    }

    /// Batch analysis: bounded fan-out, input order preserved
    pub async fn analyze_batch(
        &self,
        requests: Vec<AnalyzeRequest>,
    ) -> Result<Vec<AnalyzeResponse>, EngineError> {
        let workers = self.config.workers().max(1);
        stream::iter(requests.into_iter().map(|request| self.analyze(request)))
            .buffered(workers)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .collect()
    }

    fn advance(
        &self,
        from: EngineState,
        to: EngineState,
        cancel: &CancelFlag,
    ) -> Result<EngineState, EngineError> {
        if cancel.is_cancelled() {
            tracing::info!(%from, %to, "analysis cancelled at phase boundary");
            return Err(EngineError::Cancelled);
        }
        tracing::debug!(%from, %to, "phase transition");
        Ok(to)
    }

    fn phase_scan(&self, context: &mut AnalysisContext) {
        let start = Instant::now();
        let hits = self
            .matcher
            .scan(&context.text, &context.schema_id, &self.registry);
        tracing::info!(count = hits.len(), "initial scan complete");
        context.detected.extend(hits);
        context.phase_meta.initial.duration_ms = ms_since(start);
    }

    async fn phase_enrich(&self, context: &mut AnalysisContext, enable_nlp: bool) {
        let start = Instant::now();

        if !enable_nlp {
            context.enrichment = Some(EnrichmentResult::degraded(&context.text));
            context.nlp_enriched = false;
            tracing::info!("enrichment disabled by request, using degraded annotations");
        } else {
            let budget = Duration::from_millis(self.config.enrichment_timeout_ms);
            match tokio::time::timeout(budget, self.enricher.enrich(&context.text)).await {
                Ok(Ok(result)) => {
                    tracing::info!(
                        enricher = self.enricher.name(),
                        tokens = result.tokens.len(),
                        sentences = result.sentences.len(),
                        "enrichment complete"
                    );
                    context.enrichment = Some(result);
                    context.nlp_enriched = true;
                }
                Ok(Err(error)) => {
                    tracing::warn!(%error, "enrichment failed, degrading");
                    context.phase_meta.enrichment.error = Some(error.to_string());
                    context.enrichment = Some(EnrichmentResult::degraded(&context.text));
                    context.nlp_enriched = false;
                }
                Err(_) => {
                    let message = format!(
                        "enrichment timed out after {} ms",
                        self.config.enrichment_timeout_ms
                    );
                    tracing::warn!("{}", message);
                    context.phase_meta.enrichment.error = Some(message);
                    context.enrichment = Some(EnrichmentResult::degraded(&context.text));
                    context.nlp_enriched = false;
                }
            }
        }

        // spans can now be placed in sentences
        let AnalysisContext {
            enrichment,
            detected,
            ..
        } = context;
        if let Some(enrichment) = enrichment.as_ref() {
            for marker in detected.iter_mut() {
                if let Some(position) = marker.position.as_mut() {
                    position.sentence_index = enrichment.sentence_index_at(position.start);
                }
            }
        }

        context.phase_meta.enrichment.duration_ms = ms_since(start);
    }

    /// One pass over rule-bearing markers in topological order; a failing
    /// marker is skipped and recorded, its siblings still evaluate
    fn phase_rescan(&self, context: &mut AnalysisContext) -> usize {
        let start = Instant::now();
        let mut added = 0usize;
        let mut errors: Vec<String> = Vec::new();

        let candidates: Vec<String> = self
            .registry
            .composite_markers()
            .filter(|m| m.matches_schema(&context.schema_id))
            .map(|m| m.id.clone())
            .collect();

        for id in candidates {
            let Some(marker) = self.registry.get(&id) else {
                continue;
            };
            match self.rules.evaluate(marker, context, &self.registry) {
                Ok(Some(detected)) => {
                    debug_assert_eq!(detected.detection_phase, DetectionPhase::Contextual);
                    context.detected.push(detected);
                    added += 1;
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(marker = %id, %error, "rule evaluation failed, skipping marker");
                    errors.push(format!("{}: {}", id, error));
                }
            }
        }

        if !errors.is_empty() {
            context.phase_meta.contextual.error = Some(errors.join("; "));
        }
        tracing::info!(added, "contextual rescan complete");
        context.phase_meta.contextual.duration_ms = ms_since(start);
        added
    }

    fn assemble(
        &self,
        context: AnalysisContext,
        markers_added: usize,
        total_score: f64,
        interpretation: Option<String>,
        total_start: Instant,
    ) -> AnalyzeResponse {
        let meta = context.phase_meta.clone();
        let initial_found = context
            .detected
            .iter()
            .filter(|m| m.detection_phase == DetectionPhase::Initial)
            .count();

        let mut metrics = PerformanceMetrics::default();
        metrics
            .phase_durations_ms
            .insert("initial".to_string(), meta.initial.duration_ms);
        metrics
            .phase_durations_ms
            .insert("enrichment".to_string(), meta.enrichment.duration_ms);
        metrics
            .phase_durations_ms
            .insert("contextual".to_string(), meta.contextual.duration_ms);
        metrics
            .phase_durations_ms
            .insert("scoring".to_string(), meta.scoring.duration_ms);
        metrics
            .phase_durations_ms
            .insert("total".to_string(), ms_since(total_start));

        AnalyzeResponse {
            marker_count: context.detected.len(),
            total_score,
            phases: PhaseReports {
                initial: InitialPhaseReport {
                    markers_found: initial_found,
                    error: meta.initial.error,
                },
                enrichment: EnrichmentPhaseReport {
                    enriched: context.nlp_enriched,
                    error: meta.enrichment.error,
                },
                contextual: ContextualPhaseReport {
                    markers_added,
                    error: meta.contextual.error,
                },
            },
            nlp_enriched: context.nlp_enriched,
            interpretation,
            performance_metrics: metrics,
            markers: context.detected,
        }
    }
}

fn ms_since(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivationRule, MarkerDefinition};

    fn simple_registry() -> Arc<Registry> {
        Registry::from_definitions(
            vec![
                MarkerDefinition {
                    id: "A_ONE".into(),
                    pattern: Some("one".into()),
                    ..Default::default()
                },
                MarkerDefinition {
                    id: "A_TWO".into(),
                    pattern: Some("two".into()),
                    ..Default::default()
                },
                MarkerDefinition {
                    id: "C_BOTH".into(),
                    activation: Some(ActivationRule::All {
                        components: vec!["A_ONE".into(), "A_TWO".into()],
                    }),
                    ..Default::default()
                },
            ],
            None,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_cancellation_before_first_phase() {
        let orchestrator = Orchestrator::new(simple_registry(), EngineConfig::default());
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = orchestrator
            .analyze_with_cancel(AnalyzeRequest::new("one two", ""), &cancel)
            .await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }

    #[tokio::test]
    async fn test_contextual_disabled_skips_rescan() {
        let orchestrator = Orchestrator::new(simple_registry(), EngineConfig::default());
        let mut request = AnalyzeRequest::new("one and two", "");
        request.enable_contextual = false;

        let response = orchestrator.analyze(request).await.unwrap();
        assert_eq!(response.phases.contextual.markers_added, 0);
        assert!(!response.markers.iter().any(|m| m.marker_id == "C_BOTH"));
    }

    #[tokio::test]
    async fn test_nlp_disabled_reports_unenriched() {
        let orchestrator = Orchestrator::new(simple_registry(), EngineConfig::default());
        let mut request = AnalyzeRequest::new("one and two", "");
        request.enable_nlp = false;

        let response = orchestrator.analyze(request).await.unwrap();
        assert!(!response.nlp_enriched);
        assert!(response.phases.enrichment.error.is_none());
        // rules not needing sentiment still fire
        assert!(response.markers.iter().any(|m| m.marker_id == "C_BOTH"));
    }

    #[tokio::test]
    async fn test_state_display() {
        assert_eq!(EngineState::Rescanning.to_string(), "RESCANNING");
        assert_eq!(EngineState::Failed.to_string(), "FAILED");
    }
}
