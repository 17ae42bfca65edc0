//! Enrichment adapters: pluggable linguistic annotation
//!
//! The engine depends only on the `Enricher` trait. Two implementations
//! ship: a whitespace fallback (also the degraded substitute on timeout
//! or failure) and a lexicon-based enricher with offset-preserving
//! tokens, sentence splitting, entity guessing, and sentence polarity.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::types::{EnrichmentError, EnrichmentResult, Entity, Polarity, SentenceSpan, Token};

lazy_static! {
    /// Word or single punctuation token
    static ref RE_TOKEN: Regex = Regex::new(r"[\w']+|[^\w\s]").unwrap();

    /// Sentence terminator runs
    static ref RE_SENTENCE_END: Regex = Regex::new(r"[.!?]+").unwrap();

    /// Positive cue words (English + German)
    static ref POSITIVE_WORDS: HashSet<&'static str> = [
        "good", "great", "love", "happy", "wonderful", "glad", "beautiful",
        "trust", "calm", "hope", "warm", "safe", "together",
        "gut", "schön", "liebe", "froh", "freude", "vertrauen", "ruhig",
        "hoffnung", "geborgen", "zusammen",
    ]
    .into_iter()
    .collect();

    /// Negative cue words (English + German)
    static ref NEGATIVE_WORDS: HashSet<&'static str> = [
        "bad", "terrible", "hate", "awful", "angry", "fear", "alone",
        "hurt", "cold", "distance", "leave", "wrong", "sad",
        "schlecht", "schlimm", "hass", "angst", "allein", "verletzt",
        "kalt", "abstand", "falsch", "traurig",
    ]
    .into_iter()
    .collect();
}

/// Linguistic annotation backend
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, text: &str) -> Result<EnrichmentResult, EnrichmentError>;

    fn name(&self) -> &'static str;
}

/// Whitespace tokenizer, one sentence, no entities, no sentiment
#[derive(Debug, Default)]
pub struct WhitespaceEnricher;

#[async_trait]
impl Enricher for WhitespaceEnricher {
    async fn enrich(&self, text: &str) -> Result<EnrichmentResult, EnrichmentError> {
        Ok(EnrichmentResult::degraded(text))
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Full local enricher: offsets, sentences, entity guesses, polarity
#[derive(Debug, Default)]
pub struct LexiconEnricher;

impl LexiconEnricher {
    pub fn new() -> Self {
        Self
    }

    fn tokenize(text: &str) -> Vec<Token> {
        RE_TOKEN
            .find_iter(text)
            .map(|m| Token {
                text: m.as_str().to_string(),
                start: m.start(),
                end: m.end(),
            })
            .collect()
    }

    fn split_sentences(text: &str) -> Vec<SentenceSpan> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for terminator in RE_SENTENCE_END.find_iter(text) {
            let end = terminator.end();
            let piece = &text[start..end];
            if !piece.trim().is_empty() {
                sentences.push(raw_sentence(piece, start));
            }
            start = end;
        }
        if start < text.len() {
            let piece = &text[start..];
            if !piece.trim().is_empty() {
                sentences.push(raw_sentence(piece, start));
            }
        }
        sentences
    }

    /// Runs of capitalized words not opening a sentence
    fn guess_entities(tokens: &[Token], sentences: &[SentenceSpan]) -> Vec<Entity> {
        let sentence_starts: Vec<usize> = sentences
            .iter()
            .filter_map(|s| {
                tokens
                    .iter()
                    .position(|t| t.start >= s.start && t.start < s.end)
            })
            .collect();

        let mut entities = Vec::new();
        let mut index = 0;
        while index < tokens.len() {
            let token = &tokens[index];
            let capitalized = token.text.chars().next().is_some_and(char::is_uppercase)
                && token.text.chars().any(char::is_lowercase);

            if capitalized && !sentence_starts.contains(&index) {
                let mut end_index = index;
                while end_index + 1 < tokens.len() {
                    let next = &tokens[end_index + 1].text;
                    if next.chars().next().is_some_and(char::is_uppercase)
                        && next.chars().any(char::is_lowercase)
                    {
                        end_index += 1;
                    } else {
                        break;
                    }
                }
                let start = tokens[index].start;
                let end = tokens[end_index].end;
                entities.push(Entity {
                    text: tokens[index..=end_index]
                        .iter()
                        .map(|t| t.text.as_str())
                        .collect::<Vec<_>>()
                        .join(" "),
                    label: "MISC".to_string(),
                    start,
                    end,
                });
                index = end_index + 1;
            } else {
                index += 1;
            }
        }
        entities
    }
}

fn raw_sentence(piece: &str, offset: usize) -> SentenceSpan {
    let trimmed_start = piece.len() - piece.trim_start().len();
    let trimmed = piece.trim();
    let start = offset + trimmed_start;
    SentenceSpan {
        text: trimmed.to_string(),
        start,
        end: start + trimmed.len(),
        polarity: Some(sentence_polarity(trimmed)),
    }
}

fn sentence_polarity(sentence: &str) -> Polarity {
    let mut positive = 0usize;
    let mut negative = 0usize;
    for word in sentence
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let lower = word.to_lowercase();
        if POSITIVE_WORDS.contains(lower.as_str()) {
            positive += 1;
        }
        if NEGATIVE_WORDS.contains(lower.as_str()) {
            negative += 1;
        }
    }
    if positive > negative {
        Polarity::Positive
    } else if negative > positive {
        Polarity::Negative
    } else {
        Polarity::Neutral
    }
}

#[async_trait]
impl Enricher for LexiconEnricher {
    async fn enrich(&self, text: &str) -> Result<EnrichmentResult, EnrichmentError> {
        let tokens = Self::tokenize(text);
        let sentences = Self::split_sentences(text);
        let entities = Self::guess_entities(&tokens, &sentences);

        Ok(EnrichmentResult {
            tokens,
            sentences,
            entities,
        })
    }

    fn name(&self) -> &'static str {
        "lexicon"
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_whitespace_enricher_is_degraded_shape() {
        let result = WhitespaceEnricher.enrich("one two").await.unwrap();
        assert_eq!(result.tokens.len(), 2);
        assert_eq!(result.sentences.len(), 1);
        assert_eq!(result.sentences[0].polarity, None);
    }

    #[tokio::test]
    async fn test_lexicon_token_offsets() {
        let text = "I miss you, truly.";
        let result = LexiconEnricher::new().enrich(text).await.unwrap();

        let texts: Vec<&str> = result.tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["I", "miss", "you", ",", "truly", "."]);
        for token in &result.tokens {
            assert_eq!(&text[token.start..token.end], token.text);
        }
    }

    #[tokio::test]
    async fn test_lexicon_sentence_split() {
        let result = LexiconEnricher::new()
            .enrich("First one. Second one! A third?")
            .await
            .unwrap();
        let texts: Vec<&str> = result.sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["First one.", "Second one!", "A third?"]);
    }

    #[tokio::test]
    async fn test_lexicon_polarity() {
        let result = LexiconEnricher::new()
            .enrich("I love this wonderful day. Everything is terrible and wrong.")
            .await
            .unwrap();
        assert_eq!(result.sentences[0].polarity, Some(Polarity::Positive));
        assert_eq!(result.sentences[1].polarity, Some(Polarity::Negative));
    }

    #[tokio::test]
    async fn test_entity_guessing_skips_sentence_start() {
        let result = LexiconEnricher::new()
            .enrich("Yesterday I met Anna Schmidt in Berlin.")
            .await
            .unwrap();
        let names: Vec<&str> = result.entities.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(names, vec!["Anna Schmidt", "Berlin"]);
    }
}
