//! Activation rules: the condition trees that fire composed markers
//!
//! Rules form a tree (COMPOSITE/NEGATION nest children); the registry
//! rejects cycles through component references and excessive depth at
//! load time, so evaluation is a bounded depth-first walk.

use serde::{Deserialize, Serialize};

use crate::types::Polarity;
use crate::{DEFAULT_PROXIMITY_DISTANCE, DEFAULT_TEMPORAL_WINDOW};

/// Combinator for COMPOSITE rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Combinator {
    /// Logical AND over child rules
    #[default]
    #[serde(rename = "AND", alias = "ALL")]
    And,
    /// Logical OR over child rules
    #[serde(rename = "OR", alias = "ANY")]
    Or,
}

/// Closed set of activation rule kinds; unknown kinds fail at registry load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ActivationRule {
    /// Every component must be present
    #[serde(rename = "ALL")]
    All { components: Vec<String> },

    /// At least one component must be present
    #[serde(rename = "ANY")]
    Any { components: Vec<String> },

    /// At least `count` components must be present
    #[serde(rename = "ANY_N")]
    AnyN { components: Vec<String>, count: usize },

    /// All components inside a sliding token window, optionally in order
    #[serde(rename = "TEMPORAL")]
    Temporal {
        components: Vec<String>,
        #[serde(default = "default_window")]
        window: usize,
        #[serde(default)]
        strict_order: bool,
    },

    /// Every component pair within `max_distance` tokens
    #[serde(rename = "PROXIMITY")]
    Proximity {
        components: Vec<String>,
        #[serde(default = "default_max_distance")]
        max_distance: usize,
    },

    /// Dominant sentence-level polarity must match `alignment`
    #[serde(rename = "SENTIMENT")]
    Sentiment { alignment: Polarity },

    /// Inner rule, suppressed by nearby negation cues unless allowed
    #[serde(rename = "NEGATION")]
    Negation {
        inner: Box<ActivationRule>,
        #[serde(default)]
        allow_negation: bool,
    },

    /// Raw-text regex, independent of any components
    #[serde(rename = "PATTERN")]
    Pattern { pattern: String },

    /// Nested rules combined with AND/OR, short-circuiting
    #[serde(rename = "COMPOSITE")]
    Composite {
        rules: Vec<ActivationRule>,
        #[serde(default)]
        operator: Combinator,
    },
}

fn default_window() -> usize {
    DEFAULT_TEMPORAL_WINDOW
}

fn default_max_distance() -> usize {
    DEFAULT_PROXIMITY_DISTANCE
}

impl ActivationRule {
    /// All component ids referenced anywhere in the tree
    pub fn referenced_components(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_components(&mut out);
        out
    }

    fn collect_components<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ActivationRule::All { components }
            | ActivationRule::Any { components }
            | ActivationRule::AnyN { components, .. }
            | ActivationRule::Temporal { components, .. }
            | ActivationRule::Proximity { components, .. } => {
                out.extend(components.iter().map(String::as_str));
            }
            ActivationRule::Negation { inner, .. } => inner.collect_components(out),
            ActivationRule::Composite { rules, .. } => {
                for rule in rules {
                    rule.collect_components(out);
                }
            }
            ActivationRule::Sentiment { .. } | ActivationRule::Pattern { .. } => {}
        }
    }

    /// All regex sources anywhere in the tree (compiled eagerly at load)
    pub fn patterns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_patterns(&mut out);
        out
    }

    fn collect_patterns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ActivationRule::Pattern { pattern } => out.push(pattern),
            ActivationRule::Negation { inner, .. } => inner.collect_patterns(out),
            ActivationRule::Composite { rules, .. } => {
                for rule in rules {
                    rule.collect_patterns(out);
                }
            }
            _ => {}
        }
    }

    /// Nesting depth of the tree (leaf = 1)
    pub fn depth(&self) -> usize {
        match self {
            ActivationRule::Negation { inner, .. } => 1 + inner.depth(),
            ActivationRule::Composite { rules, .. } => {
                1 + rules.iter().map(ActivationRule::depth).max().unwrap_or(0)
            }
            _ => 1,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
