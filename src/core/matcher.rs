//! Pattern/example matcher: the Phase-1 initial scan
//!
//! Per atomic marker, exactly one method may fire:
//! 1. example containment (only when no `pattern` is defined)
//! 2. the `pattern` regex, every non-overlapping span
//! 3. example token-overlap similarity, threshold-gated
//!
//! Methods are attempted in order and never combined.

use crate::types::{DetectedMarker, MarkerDefinition, MarkerPosition};
use crate::core::Registry;
use crate::DEFAULT_SIMILARITY_THRESHOLD;

/// Phase-1 scanner over atomic markers
#[derive(Debug)]
pub struct Matcher {
    similarity_threshold: f64,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(DEFAULT_SIMILARITY_THRESHOLD)
    }
}

impl Matcher {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
        }
    }

    /// Scan raw text for atomic markers; every hit carries phase `initial`
    pub fn scan(&self, text: &str, schema_id: &str, registry: &Registry) -> Vec<DetectedMarker> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut detected = Vec::new();
        for marker in registry.atomic_markers() {
            if !marker.matches_schema(schema_id) {
                continue;
            }
            self.scan_marker(text, marker, registry, &mut detected);
        }
        detected
    }

    fn scan_marker(
        &self,
        text: &str,
        marker: &MarkerDefinition,
        registry: &Registry,
        detected: &mut Vec<DetectedMarker>,
    ) {
        // Method 1: example containment, only when no pattern is defined
        if marker.pattern.is_none() {
            if let Some(literals) = registry.example_patterns_for(&marker.id) {
                let spans = containment_spans(text, literals);
                if !spans.is_empty() {
                    push_span_hits(marker, spans, detected);
                    return;
                }
            }
        }

        // Method 2: the marker's own regex
        if let Some(regex) = registry.pattern_for(&marker.id) {
            let spans: Vec<(usize, usize)> =
                regex.find_iter(text).map(|m| (m.start(), m.end())).collect();
            if !spans.is_empty() {
                push_span_hits(marker, spans, detected);
                return;
            }
        }

        // Method 3: example similarity; best ratio over the threshold wins
        if let Some(ratio) = self.best_similarity(text, marker) {
            detected.push(DetectedMarker::initial(&marker.id, ratio, None));
        }
    }

    fn best_similarity(&self, text: &str, marker: &MarkerDefinition) -> Option<f64> {
        let text_tokens = normalized_tokens(text);
        if text_tokens.is_empty() {
            return None;
        }

        let mut best: Option<f64> = None;
        for example in &marker.examples {
            let ratio = token_overlap(&text_tokens, example);
            if ratio >= self.similarity_threshold {
                best = Some(best.map_or(ratio, |b: f64| b.max(ratio)));
            }
        }
        best
    }
}

fn push_span_hits(
    marker: &MarkerDefinition,
    spans: Vec<(usize, usize)>,
    detected: &mut Vec<DetectedMarker>,
) {
    let confidence = marker.confidence_default();
    for (start, end) in spans {
        detected.push(DetectedMarker::initial(
            &marker.id,
            confidence,
            Some(MarkerPosition {
                start,
                end,
                sentence_index: None,
            }),
        ));
    }
}

/// All non-overlapping spans where any example literal occurs, earliest-first
fn containment_spans(text: &str, literals: &[regex::Regex]) -> Vec<(usize, usize)> {
    let mut spans: Vec<(usize, usize)> = literals
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| (m.start(), m.end())))
        .collect();
    spans.sort_unstable();

    let mut kept: Vec<(usize, usize)> = Vec::new();
    for (start, end) in spans {
        match kept.last() {
            Some(&(_, last_end)) if start < last_end => {}
            _ => kept.push((start, end)),
        }
    }
    kept
}

/// Unique lowercase word tokens
fn normalized_tokens(text: &str) -> Vec<String> {
    let mut tokens: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

/// Share of the example's tokens that also occur in the text
fn token_overlap(text_tokens: &[String], example: &str) -> f64 {
    let example_tokens = normalized_tokens(example);
    if example_tokens.is_empty() {
        return 0.0;
    }
    let hits = example_tokens
        .iter()
        .filter(|t| text_tokens.binary_search(t).is_ok())
        .count();
    hits as f64 / example_tokens.len() as f64
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Registry;
    use crate::types::DetectionPhase;

    fn registry_with(definitions: Vec<MarkerDefinition>) -> std::sync::Arc<Registry> {
        Registry::from_definitions(definitions, None).unwrap()
    }

    fn pattern_marker(id: &str, pattern: &str) -> MarkerDefinition {
        MarkerDefinition {
            id: id.to_string(),
            pattern: Some(pattern.to_string()),
            ..Default::default()
        }
    }

    fn example_marker(id: &str, examples: &[&str]) -> MarkerDefinition {
        MarkerDefinition {
            id: id.to_string(),
            examples: examples.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let registry = registry_with(vec![example_marker("A_HI", &["hi"])]);
        let hits = Matcher::default().scan("   ", "", &registry);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_containment_case_insensitive_spans() {
        let registry = registry_with(vec![example_marker("A_SPACE", &["need space"])]);
        let hits = Matcher::default().scan("I really NEED SPACE right now", "", &registry);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].marker_id, "A_SPACE");
        assert_eq!(hits[0].detection_phase, DetectionPhase::Initial);
        let position = hits[0].position.as_ref().unwrap();
        assert_eq!(&"I really NEED SPACE right now"[position.start..position.end], "NEED SPACE");
    }

    #[test]
    fn test_regex_multiple_disjoint_spans() {
        let registry = registry_with(vec![pattern_marker("A_ONE", r"\bone\b")]);
        let hits = Matcher::default().scan("one plus one is two, one more", "", &registry);
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.marker_id == "A_ONE"));
        assert!(hits.iter().all(|h| h.position.is_some()));
    }

    #[test]
    fn test_regex_confidence_default() {
        let mut marker = pattern_marker("A_ONE", "one");
        marker.metadata.confidence_default = Some(0.7);
        let registry = registry_with(vec![marker]);

        let hits = Matcher::default().scan("one", "", &registry);
        assert_eq!(hits[0].confidence, 0.7);
    }

    #[test]
    fn test_similarity_fallback_and_threshold() {
        let registry = registry_with(vec![example_marker(
            "A_MISS",
            &["I miss you so much already"],
        )]);

        // 5 of 6 example tokens present, ratio ≈ 0.83 → hit with that confidence
        let hits = Matcher::default().scan("you know I miss you so much", "", &registry);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].position.is_none());
        assert!((hits[0].confidence - 5.0 / 6.0).abs() < 1e-9);

        // barely any overlap → below threshold, no hit
        let hits = Matcher::default().scan("completely unrelated words here", "", &registry);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_first_method_wins_not_combined() {
        // containment fires, so similarity must not add a second hit
        let registry = registry_with(vec![example_marker("A_HI", &["hello there"])]);
        let hits = Matcher::default().scan("hello there my friend", "", &registry);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].position.is_some());
    }

    #[test]
    fn test_schema_filter() {
        let mut marker = pattern_marker("A_WORK", "deadline");
        marker.metadata.category = Some("workplace".into());
        let registry = registry_with(vec![marker]);

        let matcher = Matcher::default();
        assert_eq!(matcher.scan("deadline", "", &registry).len(), 1);
        assert_eq!(matcher.scan("deadline", "workplace", &registry).len(), 1);
        assert!(matcher.scan("deadline", "relationship", &registry).is_empty());
    }

    #[test]
    fn test_composed_markers_not_scanned() {
        let registry = registry_with(vec![
            pattern_marker("A_ONE", "one"),
            MarkerDefinition {
                id: "C_BOTH".into(),
                pattern: Some("one".into()),
                activation: Some(crate::types::ActivationRule::All {
                    components: vec!["A_ONE".into()],
                }),
                ..Default::default()
            },
        ]);

        let hits = Matcher::default().scan("one", "", &registry);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].marker_id, "A_ONE");
    }
}
