//! Activation rule engine: the Phase-3 contextual rescan
//!
//! Evaluation is a depth-first walk over one marker's rule tree. The
//! universe of "present" components is `context.detected`; positional
//! rules (TEMPORAL, PROXIMITY, NEGATION) additionally need token
//! positions, so components without spans fail them rather than guess.
//!
//! Confidence: product of the best confidences of directly referenced
//! present components, clamped to [0, 1]; nested COMPOSITE propagates
//! the minimum across satisfied branches; component-less rules fall
//! back to the marker's default confidence.

use lazy_static::lazy_static;
use std::collections::HashSet;

use crate::core::Registry;
use crate::types::{
    ActivationRule, AnalysisContext, Combinator, DetectedMarker, MarkerDefinition,
    RuleEvaluationError,
};
use crate::{DEFAULT_NEGATION_RADIUS, MAX_RULE_DEPTH};

lazy_static! {
    /// Negation cue tokens (English + German)
    static ref NEGATION_CUES: HashSet<&'static str> = [
        "not", "no", "never", "none", "nothing", "neither", "nor", "without",
        "n't", "don't", "doesn't", "didn't", "won't", "can't", "cannot",
        "isn't", "wasn't",
        "nicht", "kein", "keine", "keinen", "niemals", "nie", "nirgends",
        "niemand", "ohne",
    ]
    .into_iter()
    .collect();
}

/// Outcome of evaluating one (sub-)rule
#[derive(Debug, Clone)]
struct RuleOutcome {
    satisfied: bool,
    confidence: f64,
    components: Vec<String>,
}

impl RuleOutcome {
    fn unsatisfied() -> Self {
        Self {
            satisfied: false,
            confidence: 0.0,
            components: Vec::new(),
        }
    }

    fn satisfied(confidence: f64, components: Vec<String>) -> Self {
        Self {
            satisfied: true,
            confidence,
            components,
        }
    }
}

/// Evaluates activation rules against the accumulated analysis context
#[derive(Debug)]
pub struct RuleEngine {
    negation_radius: usize,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NEGATION_RADIUS)
    }
}

impl RuleEngine {
    pub fn new(negation_radius: usize) -> Self {
        Self { negation_radius }
    }

    /// Evaluate one composed marker; `Ok(Some)` when its rule fired
    pub fn evaluate(
        &self,
        marker: &MarkerDefinition,
        context: &AnalysisContext,
        registry: &Registry,
    ) -> Result<Option<DetectedMarker>, RuleEvaluationError> {
        let rule = marker
            .activation
            .as_ref()
            .ok_or_else(|| RuleEvaluationError::MissingRule(marker.id.clone()))?;

        let outcome = self.eval_rule(rule, &marker.id, context, registry, 0)?;
        if !outcome.satisfied {
            return Ok(None);
        }

        let mut components = outcome.components;
        components.sort_unstable();
        components.dedup();

        let confidence = if components.is_empty() {
            marker.confidence_default()
        } else {
            outcome.confidence
        };

        Ok(Some(DetectedMarker::contextual(
            &marker.id,
            confidence,
            components,
        )))
    }

    fn eval_rule(
        &self,
        rule: &ActivationRule,
        marker_id: &str,
        context: &AnalysisContext,
        registry: &Registry,
        depth: usize,
    ) -> Result<RuleOutcome, RuleEvaluationError> {
        if depth > MAX_RULE_DEPTH {
            return Err(RuleEvaluationError::DepthExceeded {
                marker: marker_id.to_string(),
                max: MAX_RULE_DEPTH,
            });
        }

        match rule {
            ActivationRule::All { components } => {
                if components.iter().all(|id| context.has_marker(id)) {
                    Ok(present_outcome(context, components))
                } else {
                    Ok(RuleOutcome::unsatisfied())
                }
            }

            ActivationRule::Any { components } => {
                let present: Vec<String> = components
                    .iter()
                    .filter(|id| context.has_marker(id))
                    .cloned()
                    .collect();
                if present.is_empty() {
                    Ok(RuleOutcome::unsatisfied())
                } else {
                    Ok(present_outcome(context, &present))
                }
            }

            ActivationRule::AnyN { components, count } => {
                let present: Vec<String> = components
                    .iter()
                    .filter(|id| context.has_marker(id))
                    .cloned()
                    .collect();
                if present.len() >= *count {
                    Ok(present_outcome(context, &present))
                } else {
                    Ok(RuleOutcome::unsatisfied())
                }
            }

            ActivationRule::Temporal {
                components,
                window,
                strict_order,
            } => Ok(self.eval_temporal(components, *window, *strict_order, context)),

            ActivationRule::Proximity {
                components,
                max_distance,
            } => Ok(self.eval_proximity(components, *max_distance, context)),

            ActivationRule::Sentiment { alignment } => {
                let dominant = context
                    .enrichment
                    .as_ref()
                    .and_then(|e| e.dominant_polarity());
                // unavailable sentiment evaluates false, never errors
                match dominant {
                    Some(polarity) if polarity == *alignment => {
                        Ok(RuleOutcome::satisfied(1.0, Vec::new()))
                    }
                    _ => Ok(RuleOutcome::unsatisfied()),
                }
            }

            ActivationRule::Negation {
                inner,
                allow_negation,
            } => {
                let outcome = self.eval_rule(inner, marker_id, context, registry, depth + 1)?;
                if !outcome.satisfied || *allow_negation {
                    return Ok(outcome);
                }
                if self.negation_near(&outcome.components, context) {
                    Ok(RuleOutcome::unsatisfied())
                } else {
                    Ok(outcome)
                }
            }

            ActivationRule::Pattern { pattern } => {
                let regex = registry
                    .rule_pattern(pattern)
                    .ok_or_else(|| RuleEvaluationError::UncompiledPattern(pattern.clone()))?;
                if regex.is_match(&context.text) {
                    Ok(RuleOutcome::satisfied(1.0, Vec::new()))
                } else {
                    Ok(RuleOutcome::unsatisfied())
                }
            }

            ActivationRule::Composite { rules, operator } => {
                self.eval_composite(rules, *operator, marker_id, context, registry, depth)
            }
        }
    }

    /// ALL children (AND) or first satisfied child (OR), short-circuiting
    fn eval_composite(
        &self,
        rules: &[ActivationRule],
        operator: Combinator,
        marker_id: &str,
        context: &AnalysisContext,
        registry: &Registry,
        depth: usize,
    ) -> Result<RuleOutcome, RuleEvaluationError> {
        match operator {
            Combinator::And => {
                let mut confidence = f64::MAX;
                let mut components = Vec::new();
                for rule in rules {
                    let outcome = self.eval_rule(rule, marker_id, context, registry, depth + 1)?;
                    if !outcome.satisfied {
                        return Ok(RuleOutcome::unsatisfied());
                    }
                    confidence = confidence.min(outcome.confidence);
                    components.extend(outcome.components);
                }
                Ok(RuleOutcome::satisfied(confidence.min(1.0), components))
            }
            Combinator::Or => {
                for rule in rules {
                    let outcome = self.eval_rule(rule, marker_id, context, registry, depth + 1)?;
                    if outcome.satisfied {
                        return Ok(outcome);
                    }
                }
                Ok(RuleOutcome::unsatisfied())
            }
        }
    }

    /// All components inside some `window`-token span; strict order compares
    /// first occurrences against the component list order
    fn eval_temporal(
        &self,
        components: &[String],
        window: usize,
        strict_order: bool,
        context: &AnalysisContext,
    ) -> RuleOutcome {
        let positions: Vec<Vec<usize>> = components
            .iter()
            .map(|id| context.token_positions_of(id))
            .collect();
        if positions.iter().any(Vec::is_empty) {
            return RuleOutcome::unsatisfied();
        }

        if !fits_window(&positions, window) {
            return RuleOutcome::unsatisfied();
        }

        if strict_order {
            let firsts: Vec<usize> = positions.iter().map(|p| p[0]).collect();
            if !firsts.windows(2).all(|pair| pair[0] < pair[1]) {
                return RuleOutcome::unsatisfied();
            }
        }

        present_outcome(context, components)
    }

    /// Every pair of components has some span pair within `max_distance` tokens
    fn eval_proximity(
        &self,
        components: &[String],
        max_distance: usize,
        context: &AnalysisContext,
    ) -> RuleOutcome {
        let positions: Vec<Vec<usize>> = components
            .iter()
            .map(|id| context.token_positions_of(id))
            .collect();
        if positions.iter().any(Vec::is_empty) {
            return RuleOutcome::unsatisfied();
        }

        for i in 0..positions.len() {
            for j in (i + 1)..positions.len() {
                let close = positions[i].iter().any(|a| {
                    positions[j]
                        .iter()
                        .any(|b| a.abs_diff(*b) <= max_distance)
                });
                if !close {
                    return RuleOutcome::unsatisfied();
                }
            }
        }

        present_outcome(context, components)
    }

    /// Negation cue within the token radius of any component span
    fn negation_near(&self, components: &[String], context: &AnalysisContext) -> bool {
        let Some(enrichment) = &context.enrichment else {
            return false;
        };

        for id in components {
            for position in context.positions_of(id) {
                let Some(first) = enrichment.token_index_at(position.start) else {
                    continue;
                };
                let last = enrichment
                    .token_index_at(position.end.saturating_sub(1))
                    .unwrap_or(first);

                let from = first.saturating_sub(self.negation_radius);
                let to = (last + self.negation_radius).min(enrichment.tokens.len() - 1);
                for token in &enrichment.tokens[from..=to] {
                    if NEGATION_CUES.contains(token.text.to_lowercase().as_str()) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// Satisfied outcome for a set of present components: product of best
/// per-component confidences, clamped
fn present_outcome(context: &AnalysisContext, components: &[String]) -> RuleOutcome {
    let confidence = components
        .iter()
        .filter_map(|id| context.best_confidence(id))
        .product::<f64>()
        .clamp(0.0, 1.0);
    RuleOutcome::satisfied(confidence, components.to_vec())
}

/// Some selection of one position per component spans ≤ `window` tokens.
/// Sliding a cover over the merged positions finds it if it exists.
fn fits_window(positions: &[Vec<usize>], window: usize) -> bool {
    if positions.len() == 1 {
        return true;
    }

    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (component, component_positions) in positions.iter().enumerate() {
        for &p in component_positions {
            merged.push((p, component));
        }
    }
    merged.sort_unstable();

    let needed = positions.len();
    let mut counts = vec![0usize; needed];
    let mut covered = 0usize;
    let mut left = 0;

    for right in 0..merged.len() {
        let (pos, component) = merged[right];
        if counts[component] == 0 {
            covered += 1;
        }
        counts[component] += 1;

        while pos - merged[left].0 > window {
            let (_, dropped) = merged[left];
            counts[dropped] -= 1;
            if counts[dropped] == 0 {
                covered -= 1;
            }
            left += 1;
        }

        if covered == needed {
            return true;
        }
    }
    false
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnrichmentResult, MarkerPosition, Polarity, SentenceSpan};

    fn registry() -> std::sync::Arc<Registry> {
        Registry::from_definitions(
            vec![
                MarkerDefinition {
                    id: "A_X".into(),
                    pattern: Some("x".into()),
                    ..Default::default()
                },
                MarkerDefinition {
                    id: "A_Y".into(),
                    pattern: Some("y".into()),
                    ..Default::default()
                },
                MarkerDefinition {
                    id: "A_Z".into(),
                    pattern: Some("z".into()),
                    ..Default::default()
                },
            ],
            None,
        )
        .unwrap()
    }

    fn context_with(text: &str, detected: Vec<DetectedMarker>) -> AnalysisContext {
        let mut ctx = AnalysisContext::new(text, "", None);
        ctx.enrichment = Some(EnrichmentResult::degraded(text));
        ctx.detected = detected;
        ctx
    }

    fn hit_at(id: &str, confidence: f64, text: &str, word: &str) -> DetectedMarker {
        let start = text.find(word).expect("word present");
        DetectedMarker::initial(
            id,
            confidence,
            Some(MarkerPosition {
                start,
                end: start + word.len(),
                sentence_index: None,
            }),
        )
    }

    fn marker_with(rule: ActivationRule) -> MarkerDefinition {
        MarkerDefinition {
            id: "C_TEST".into(),
            activation: Some(rule),
            ..Default::default()
        }
    }

    #[test]
    fn test_all_rule_confidence_product() {
        let text = "x and y";
        let ctx = context_with(
            text,
            vec![hit_at("A_X", 0.8, text, "x"), hit_at("A_Y", 0.5, text, "y")],
        );
        let marker = marker_with(ActivationRule::All {
            components: vec!["A_X".into(), "A_Y".into()],
        });

        let result = RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .expect("rule fires");
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert_eq!(result.components, vec!["A_X", "A_Y"]);
    }

    #[test]
    fn test_all_rule_missing_component() {
        let text = "x only";
        let ctx = context_with(text, vec![hit_at("A_X", 1.0, text, "x")]);
        let marker = marker_with(ActivationRule::All {
            components: vec!["A_X".into(), "A_Y".into()],
        });

        let result = RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_any_n_threshold() {
        let text = "x y";
        let ctx = context_with(
            text,
            vec![hit_at("A_X", 1.0, text, "x"), hit_at("A_Y", 1.0, text, "y")],
        );

        let two_of_three = marker_with(ActivationRule::AnyN {
            components: vec!["A_X".into(), "A_Y".into(), "A_Z".into()],
            count: 2,
        });
        assert!(RuleEngine::default()
            .evaluate(&two_of_three, &ctx, &registry())
            .unwrap()
            .is_some());

        let three_of_three = marker_with(ActivationRule::AnyN {
            components: vec!["A_X".into(), "A_Y".into(), "A_Z".into()],
            count: 3,
        });
        assert!(RuleEngine::default()
            .evaluate(&three_of_three, &ctx, &registry())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_temporal_window_and_order() {
        let text = "x aaa bbb y";
        let ctx = context_with(
            text,
            vec![hit_at("A_X", 1.0, text, "x"), hit_at("A_Y", 1.0, text, "y")],
        );

        let in_window = marker_with(ActivationRule::Temporal {
            components: vec!["A_X".into(), "A_Y".into()],
            window: 3,
            strict_order: true,
        });
        assert!(RuleEngine::default()
            .evaluate(&in_window, &ctx, &registry())
            .unwrap()
            .is_some());

        let tight_window = marker_with(ActivationRule::Temporal {
            components: vec!["A_X".into(), "A_Y".into()],
            window: 2,
            strict_order: false,
        });
        assert!(RuleEngine::default()
            .evaluate(&tight_window, &ctx, &registry())
            .unwrap()
            .is_none());

        // y before x violates strict order even inside the window
        let reversed = marker_with(ActivationRule::Temporal {
            components: vec!["A_Y".into(), "A_X".into()],
            window: 5,
            strict_order: true,
        });
        assert!(RuleEngine::default()
            .evaluate(&reversed, &ctx, &registry())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_temporal_needs_positions() {
        let text = "x y";
        // similarity-style hit without a span
        let ctx = context_with(
            text,
            vec![
                hit_at("A_X", 1.0, text, "x"),
                DetectedMarker::initial("A_Y", 0.9, None),
            ],
        );
        let marker = marker_with(ActivationRule::Temporal {
            components: vec!["A_X".into(), "A_Y".into()],
            window: 10,
            strict_order: false,
        });
        assert!(RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_proximity_pairwise() {
        let text = "x filler filler filler y";
        let ctx = context_with(
            text,
            vec![hit_at("A_X", 1.0, text, "x"), hit_at("A_Y", 1.0, text, "y")],
        );

        let near = marker_with(ActivationRule::Proximity {
            components: vec!["A_X".into(), "A_Y".into()],
            max_distance: 4,
        });
        assert!(RuleEngine::default()
            .evaluate(&near, &ctx, &registry())
            .unwrap()
            .is_some());

        let too_far = marker_with(ActivationRule::Proximity {
            components: vec!["A_X".into(), "A_Y".into()],
            max_distance: 3,
        });
        assert!(RuleEngine::default()
            .evaluate(&too_far, &ctx, &registry())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_negation_suppresses_within_radius() {
        let text = "it is not x today";
        let ctx = context_with(text, vec![hit_at("A_X", 1.0, text, "x")]);

        let suppressed = marker_with(ActivationRule::Negation {
            inner: Box::new(ActivationRule::All {
                components: vec!["A_X".into()],
            }),
            allow_negation: false,
        });
        assert!(RuleEngine::default()
            .evaluate(&suppressed, &ctx, &registry())
            .unwrap()
            .is_none());

        let allowed = marker_with(ActivationRule::Negation {
            inner: Box::new(ActivationRule::All {
                components: vec!["A_X".into()],
            }),
            allow_negation: true,
        });
        assert!(RuleEngine::default()
            .evaluate(&allowed, &ctx, &registry())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_negation_cue_outside_radius_ignored() {
        let text = "not a b c d x here";
        let ctx = context_with(text, vec![hit_at("A_X", 1.0, text, "x")]);
        let marker = marker_with(ActivationRule::Negation {
            inner: Box::new(ActivationRule::All {
                components: vec!["A_X".into()],
            }),
            allow_negation: false,
        });
        assert!(RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_sentiment_unavailable_is_false() {
        let text = "x";
        let ctx = context_with(text, vec![hit_at("A_X", 1.0, text, "x")]);
        let marker = marker_with(ActivationRule::Sentiment {
            alignment: Polarity::Positive,
        });
        // degraded enrichment has no polarity
        assert!(RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_sentiment_matches_dominant() {
        let text = "happy words";
        let mut ctx = context_with(text, vec![]);
        if let Some(enrichment) = ctx.enrichment.as_mut() {
            enrichment.sentences = vec![SentenceSpan {
                text: text.into(),
                start: 0,
                end: text.len(),
                polarity: Some(Polarity::Positive),
            }];
        }

        let marker = marker_with(ActivationRule::Sentiment {
            alignment: Polarity::Positive,
        });
        let result = RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .expect("fires");
        // component-less rule falls back to the marker default confidence
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_composite_and_takes_minimum() {
        let text = "x y";
        let ctx = context_with(
            text,
            vec![hit_at("A_X", 0.9, text, "x"), hit_at("A_Y", 0.6, text, "y")],
        );
        let marker = marker_with(ActivationRule::Composite {
            rules: vec![
                ActivationRule::All {
                    components: vec!["A_X".into()],
                },
                ActivationRule::All {
                    components: vec!["A_Y".into()],
                },
            ],
            operator: Combinator::And,
        });

        let result = RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .expect("fires");
        assert!((result.confidence - 0.6).abs() < 1e-9);
        assert_eq!(result.components, vec!["A_X", "A_Y"]);
    }

    #[test]
    fn test_composite_or_short_circuits() {
        let text = "y";
        let ctx = context_with(text, vec![hit_at("A_Y", 0.7, text, "y")]);
        let marker = marker_with(ActivationRule::Composite {
            rules: vec![
                ActivationRule::All {
                    components: vec!["A_X".into()],
                },
                ActivationRule::All {
                    components: vec!["A_Y".into()],
                },
            ],
            operator: Combinator::Or,
        });

        let result = RuleEngine::default()
            .evaluate(&marker, &ctx, &registry())
            .unwrap()
            .expect("fires");
        assert!((result.confidence - 0.7).abs() < 1e-9);
        assert_eq!(result.components, vec!["A_Y"]);
    }

    #[test]
    fn test_fits_window_cover() {
        // component 0 at {0, 9}, component 1 at {8}: selection (9, 8) fits window 1
        assert!(fits_window(&[vec![0, 9], vec![8]], 1));
        assert!(!fits_window(&[vec![0], vec![8]], 7));
        assert!(fits_window(&[vec![0], vec![8]], 8));
    }
}
