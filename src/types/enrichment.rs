//! Linguistic annotations produced by an Enricher
//!
//! All offsets are byte offsets into the original text, so spans found
//! by the matcher map directly onto tokens and sentences.

use serde::{Deserialize, Serialize};

/// Sentence-level sentiment polarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
    Neutral,
}

/// One token with its byte span
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// One sentence with its byte span and optional polarity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentenceSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
    /// None when the enricher does not annotate sentiment (degraded mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polarity: Option<Polarity>,
}

/// One named entity guess
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub text: String,
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Token/sentence/entity annotations for one text
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub tokens: Vec<Token>,
    pub sentences: Vec<SentenceSpan>,
    pub entities: Vec<Entity>,
}

impl EnrichmentResult {
    /// Whitespace-split fallback used when live enrichment fails or is disabled
    pub fn degraded(text: &str) -> Self {
        let mut tokens = Vec::new();
        let mut offset = 0;
        for piece in text.split_whitespace() {
            // split_whitespace yields pieces in order, so a forward find is exact
            if let Some(found) = text[offset..].find(piece) {
                let start = offset + found;
                let end = start + piece.len();
                tokens.push(Token {
                    text: piece.to_string(),
                    start,
                    end,
                });
                offset = end;
            }
        }

        let sentences = if text.is_empty() {
            Vec::new()
        } else {
            vec![SentenceSpan {
                text: text.to_string(),
                start: 0,
                end: text.len(),
                polarity: None,
            }]
        };

        Self {
            tokens,
            sentences,
            entities: Vec::new(),
        }
    }

    /// Index of the token covering (or first token after) `pos`
    pub fn token_index_at(&self, pos: usize) -> Option<usize> {
        if self.tokens.is_empty() {
            return None;
        }
        let idx = self.tokens.partition_point(|t| t.end <= pos);
        (idx < self.tokens.len()).then_some(idx)
    }

    /// Index of the sentence containing `pos`
    pub fn sentence_index_at(&self, pos: usize) -> Option<usize> {
        self.sentences
            .iter()
            .position(|s| s.start <= pos && pos < s.end)
    }

    /// Majority polarity across annotated sentences; None when unannotated
    pub fn dominant_polarity(&self) -> Option<Polarity> {
        let mut positive = 0usize;
        let mut negative = 0usize;
        let mut annotated = 0usize;

        for sentence in &self.sentences {
            match sentence.polarity {
                Some(Polarity::Positive) => {
                    positive += 1;
                    annotated += 1;
                }
                Some(Polarity::Negative) => {
                    negative += 1;
                    annotated += 1;
                }
                Some(Polarity::Neutral) => annotated += 1,
                None => {}
            }
        }

        if annotated == 0 {
            return None;
        }
        Some(if positive > negative {
            Polarity::Positive
        } else if negative > positive {
            Polarity::Negative
        } else {
            Polarity::Neutral
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degraded_token_offsets() {
        let result = EnrichmentResult::degraded("one  two three");
        let spans: Vec<(&str, usize, usize)> = result
            .tokens
            .iter()
            .map(|t| (t.text.as_str(), t.start, t.end))
            .collect();
        assert_eq!(spans, vec![("one", 0, 3), ("two", 5, 8), ("three", 9, 14)]);
        assert_eq!(result.sentences.len(), 1);
        assert!(result.entities.is_empty());
    }

    #[test]
    fn test_degraded_empty_text() {
        let result = EnrichmentResult::degraded("");
        assert!(result.tokens.is_empty());
        assert!(result.sentences.is_empty());
    }

    #[test]
    fn test_token_index_at() {
        let result = EnrichmentResult::degraded("one two three");
        assert_eq!(result.token_index_at(0), Some(0));
        assert_eq!(result.token_index_at(4), Some(1));
        assert_eq!(result.token_index_at(8), Some(2));
        assert_eq!(result.token_index_at(99), None);
    }

    #[test]
    fn test_dominant_polarity_majority_and_tie() {
        let mut result = EnrichmentResult::degraded("a. b. c.");
        assert_eq!(result.dominant_polarity(), None);

        result.sentences = vec![
            SentenceSpan {
                text: "a".into(),
                start: 0,
                end: 1,
                polarity: Some(Polarity::Positive),
            },
            SentenceSpan {
                text: "b".into(),
                start: 2,
                end: 3,
                polarity: Some(Polarity::Negative),
            },
        ];
        assert_eq!(result.dominant_polarity(), Some(Polarity::Neutral));

        result.sentences[1].polarity = Some(Polarity::Positive);
        assert_eq!(result.dominant_polarity(), Some(Polarity::Positive));
    }
}
