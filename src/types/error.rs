//! Error taxonomy
//!
//! Only registry problems (and explicit cancellation) surface to the
//! caller; everything else degrades in place and is reported through
//! the per-phase `error` fields.

use thiserror::Error;

/// Fatal for the engine instance: no analysis can proceed without a registry
#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("duplicate marker id `{0}`")]
    DuplicateId(String),

    #[error("marker `{marker}` references unknown component `{component}`")]
    UnresolvedReference { marker: String, component: String },

    #[error("reference cycle through marker `{0}`")]
    Cycle(String),

    #[error("invalid pattern for marker `{marker}`: {source}")]
    InvalidPattern {
        marker: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid rule for marker `{marker}`: {reason}")]
    InvalidRule { marker: String, reason: String },

    #[error("rule tree for marker `{marker}` exceeds maximum depth {max}")]
    TooDeep { marker: String, max: usize },

    #[error("failed to read registry source: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed registry document: {0}")]
    Parse(String),
}

/// Recoverable: the orchestrator degrades to whitespace annotations
#[derive(Debug, Error)]
#[error("enrichment failed: {0}")]
pub struct EnrichmentError(pub String);

/// Recoverable per marker: that marker is skipped, siblings continue
#[derive(Debug, Error)]
pub enum RuleEvaluationError {
    #[error("marker `{0}` has no activation rule")]
    MissingRule(String),

    #[error("rule nesting exceeded depth {max} while evaluating `{marker}`")]
    DepthExceeded { marker: String, max: usize },

    #[error("pattern `{0}` was not compiled at registry load")]
    UncompiledPattern(String),
}

/// Recoverable: the interpretation falls back or is omitted
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("interpretation backend unavailable: {0}")]
    Unavailable(String),

    #[error("interpretation timed out after {0} ms")]
    Timeout(u64),
}

/// Configuration file problems
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config document: {0}")]
    Parse(String),
}

/// Umbrella error surfaced by the engine API
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Registry(#[from] RegistryLoadError),

    #[error("analysis cancelled")]
    Cancelled,
}
