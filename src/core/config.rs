//! Engine configuration
//!
//! Defaults are the crate constants; a JSON/YAML file may override any
//! subset of fields. The enricher choice is made here so callers select
//! an implementation by configuration, not runtime type inspection.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{Enricher, LexiconEnricher, WhitespaceEnricher};
use crate::types::ConfigError;
use crate::{
    DEFAULT_ENRICHMENT_TIMEOUT_MS, DEFAULT_INTERPRETATION_TIMEOUT_MS, DEFAULT_NEGATION_RADIUS,
    DEFAULT_SIMILARITY_THRESHOLD,
};

/// Which enricher implementation to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnricherKind {
    /// Whitespace tokenization only (no sentiment, no entities)
    Whitespace,
    /// Local lexicon-based enrichment
    #[default]
    Lexicon,
}

/// Tunables for one engine instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub enricher: EnricherKind,
    pub enrichment_timeout_ms: u64,
    pub interpretation_timeout_ms: u64,
    pub similarity_threshold: f64,
    pub negation_radius: usize,
    /// 0 = size the batch worker pool to available CPU cores
    pub max_workers: usize,
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enricher: EnricherKind::default(),
            enrichment_timeout_ms: DEFAULT_ENRICHMENT_TIMEOUT_MS,
            interpretation_timeout_ms: DEFAULT_INTERPRETATION_TIMEOUT_MS,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            negation_radius: DEFAULT_NEGATION_RADIUS,
            max_workers: 0,
            cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Load overrides from a JSON or YAML file (format by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if yaml {
            serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))
        }
    }

    /// Construct the configured enricher
    pub fn build_enricher(&self) -> Arc<dyn Enricher> {
        match self.enricher {
            EnricherKind::Whitespace => Arc::new(WhitespaceEnricher),
            EnricherKind::Lexicon => Arc::new(LexiconEnricher::new()),
        }
    }

    /// Effective batch worker count
    pub fn workers(&self) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

// =============================================================================
// TESTS
// =============================================================================
