//! MarkerEngine: multi-phase semantic marker detection
//!
//! Pipeline: text → Matcher (initial scan) → Enricher (linguistic
//! annotations) → RuleEngine (contextual rescan) → Scorer → response

pub mod core;
pub mod types;

// =============================================================================
// DETECTION THRESHOLDS
// =============================================================================

/// Minimum token-overlap ratio for an example-similarity hit
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.6;

/// Token radius scanned for negation cues around a component span
pub const DEFAULT_NEGATION_RADIUS: usize = 3;

/// Default token window for TEMPORAL rules
pub const DEFAULT_TEMPORAL_WINDOW: usize = 10;

/// Default maximum token distance for PROXIMITY rules
pub const DEFAULT_PROXIMITY_DISTANCE: usize = 20;

// =============================================================================
// STRUCTURAL BOUNDS
// =============================================================================

/// Maximum activation-rule nesting depth accepted at registry load
pub const MAX_RULE_DEPTH: usize = 8;

// =============================================================================
// TIMEOUTS
// =============================================================================

/// Enrichment budget before degrading to whitespace annotations (milliseconds)
pub const DEFAULT_ENRICHMENT_TIMEOUT_MS: u64 = 2000;

/// Interpretation bridge budget before falling back (milliseconds)
pub const DEFAULT_INTERPRETATION_TIMEOUT_MS: u64 = 5000;

// =============================================================================
// VERSION
// =============================================================================

pub const VERSION: &str = "1.0.0";
