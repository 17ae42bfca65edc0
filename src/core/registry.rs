//! Marker registry: validated, immutable snapshots of marker definitions
//!
//! `load_*` validates the whole document up front (fail-closed): unique
//! ids, resolvable component references, acyclic reference graph,
//! bounded rule depth, and eagerly compiled regexes, so nothing fails
//! at match time. A reload produces a new `Arc` snapshot; in-flight
//! analyses keep the one they started with.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::types::{ActivationRule, MarkerDefinition, RegistryLoadError};
use crate::MAX_RULE_DEPTH;

/// Source of marker definitions (file store, document store, fixture)
pub trait MarkerSource {
    fn load_registry(
        &self,
        version: Option<&str>,
    ) -> Result<Vec<MarkerDefinition>, RegistryLoadError>;
}

/// File-based marker source (JSON or YAML)
pub struct FileMarkerSource {
    path: std::path::PathBuf,
}

impl FileMarkerSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl MarkerSource for FileMarkerSource {
    fn load_registry(
        &self,
        _version: Option<&str>,
    ) -> Result<Vec<MarkerDefinition>, RegistryLoadError> {
        let raw = std::fs::read_to_string(&self.path)?;
        parse_document(&raw, is_yaml_path(&self.path))
    }
}

/// Registry documents are either a map keyed by id or a list of definitions
#[derive(Deserialize)]
#[serde(untagged)]
enum RegistryDocument {
    Keyed(BTreeMap<String, MarkerDefinition>),
    List(Vec<MarkerDefinition>),
}

/// Immutable, validated snapshot of marker definitions
pub struct Registry {
    version: String,
    loaded_at: DateTime<Utc>,
    markers: HashMap<String, MarkerDefinition>,
    /// Atomic marker ids in deterministic (sorted) scan order
    atomic_order: Vec<String>,
    /// Markers with activation rules, topologically sorted by reference
    composite_order: Vec<String>,
    /// Compiled `pattern` fields, keyed by marker id
    marker_patterns: HashMap<String, Regex>,
    /// Compiled case-insensitive example literals (markers without `pattern`)
    example_patterns: HashMap<String, Vec<Regex>>,
    /// Compiled PATTERN-rule regexes, keyed by source
    rule_patterns: HashMap<String, Regex>,
}

impl Registry {
    /// Load and validate a registry file (format chosen by extension)
    pub fn load_path(path: impl AsRef<Path>) -> Result<Arc<Self>, RegistryLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let definitions = parse_document(&raw, is_yaml_path(path))?;
        Self::from_definitions(definitions, None)
    }

    pub fn from_json_str(raw: &str) -> Result<Arc<Self>, RegistryLoadError> {
        Self::from_definitions(parse_document(raw, false)?, None)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Arc<Self>, RegistryLoadError> {
        Self::from_definitions(parse_document(raw, true)?, None)
    }

    /// Validate definitions into an immutable snapshot
    pub fn from_definitions(
        definitions: Vec<MarkerDefinition>,
        version: Option<String>,
    ) -> Result<Arc<Self>, RegistryLoadError> {
        let mut markers: HashMap<String, MarkerDefinition> = HashMap::new();
        for definition in definitions {
            if definition.id.is_empty() {
                return Err(RegistryLoadError::Parse(
                    "marker definition without an id".to_string(),
                ));
            }
            if markers.contains_key(&definition.id) {
                return Err(RegistryLoadError::DuplicateId(definition.id));
            }
            markers.insert(definition.id.clone(), definition);
        }

        validate_references(&markers)?;
        validate_rules(&markers)?;
        let composite_order = topological_order(&markers)?;

        let mut marker_patterns = HashMap::new();
        let mut example_patterns = HashMap::new();
        let mut rule_patterns = HashMap::new();
        compile_patterns(
            &markers,
            &mut marker_patterns,
            &mut example_patterns,
            &mut rule_patterns,
        )?;

        let mut atomic_order: Vec<String> = markers
            .values()
            .filter(|m| m.is_atomic())
            .map(|m| m.id.clone())
            .collect();
        atomic_order.sort();

        let version = version.unwrap_or_else(|| fingerprint(&markers));

        Ok(Arc::new(Self {
            version,
            loaded_at: Utc::now(),
            markers,
            atomic_order,
            composite_order,
            marker_patterns,
            example_patterns,
            rule_patterns,
        }))
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&MarkerDefinition> {
        self.markers.get(id)
    }

    /// Atomic markers in deterministic scan order
    pub fn atomic_markers(&self) -> impl Iterator<Item = &MarkerDefinition> {
        self.atomic_order.iter().filter_map(|id| self.markers.get(id))
    }

    /// Rule-bearing markers in evaluation (topological) order
    pub fn composite_markers(&self) -> impl Iterator<Item = &MarkerDefinition> {
        self.composite_order
            .iter()
            .filter_map(|id| self.markers.get(id))
    }

    pub fn pattern_for(&self, marker_id: &str) -> Option<&Regex> {
        self.marker_patterns.get(marker_id)
    }

    pub fn example_patterns_for(&self, marker_id: &str) -> Option<&[Regex]> {
        self.example_patterns.get(marker_id).map(Vec::as_slice)
    }

    pub fn rule_pattern(&self, pattern: &str) -> Option<&Regex> {
        self.rule_patterns.get(pattern)
    }
}

fn is_yaml_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn parse_document(raw: &str, yaml: bool) -> Result<Vec<MarkerDefinition>, RegistryLoadError> {
    let document: RegistryDocument = if yaml {
        serde_yaml::from_str(raw).map_err(|e| RegistryLoadError::Parse(e.to_string()))?
    } else {
        serde_json::from_str(raw).map_err(|e| RegistryLoadError::Parse(e.to_string()))?
    };

    Ok(match document {
        RegistryDocument::List(definitions) => definitions,
        RegistryDocument::Keyed(map) => map
            .into_iter()
            .map(|(key, mut definition)| {
                if definition.id.is_empty() {
                    definition.id = key;
                }
                definition
            })
            .collect(),
    })
}

/// Every id referenced by a rule or `composed_of` must exist in the snapshot
fn validate_references(
    markers: &HashMap<String, MarkerDefinition>,
) -> Result<(), RegistryLoadError> {
    for marker in markers.values() {
        for component in referenced_ids(marker) {
            if !markers.contains_key(component) {
                return Err(RegistryLoadError::UnresolvedReference {
                    marker: marker.id.clone(),
                    component: component.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Structural rule checks: depth bound, non-empty component lists, sane ANY_N
fn validate_rules(markers: &HashMap<String, MarkerDefinition>) -> Result<(), RegistryLoadError> {
    for marker in markers.values() {
        let Some(rule) = &marker.activation else {
            continue;
        };

        if rule.depth() > MAX_RULE_DEPTH {
            return Err(RegistryLoadError::TooDeep {
                marker: marker.id.clone(),
                max: MAX_RULE_DEPTH,
            });
        }
        check_rule_shape(&marker.id, rule)?;

        // composed_of is documentation-only; flag divergence, never reconcile
        if !marker.composed_of.is_empty() {
            let declared: HashSet<&str> = marker.composed_of.iter().map(String::as_str).collect();
            let referenced: HashSet<&str> = rule.referenced_components().into_iter().collect();
            if declared != referenced {
                tracing::warn!(
                    marker = %marker.id,
                    "composed_of diverges from activation components"
                );
            }
        }
    }
    Ok(())
}

fn check_rule_shape(marker_id: &str, rule: &ActivationRule) -> Result<(), RegistryLoadError> {
    let invalid = |reason: String| RegistryLoadError::InvalidRule {
        marker: marker_id.to_string(),
        reason,
    };

    match rule {
        ActivationRule::All { components }
        | ActivationRule::Any { components }
        | ActivationRule::Temporal { components, .. }
        | ActivationRule::Proximity { components, .. } => {
            if components.is_empty() {
                return Err(invalid("empty component list".to_string()));
            }
        }
        ActivationRule::AnyN { components, count } => {
            if components.is_empty() {
                return Err(invalid("empty component list".to_string()));
            }
            if *count == 0 || *count > components.len() {
                return Err(invalid(format!(
                    "ANY_N count {} out of range 1..={}",
                    count,
                    components.len()
                )));
            }
        }
        ActivationRule::Negation { inner, .. } => check_rule_shape(marker_id, inner)?,
        ActivationRule::Composite { rules, .. } => {
            if rules.is_empty() {
                return Err(invalid("COMPOSITE without child rules".to_string()));
            }
            for child in rules {
                check_rule_shape(marker_id, child)?;
            }
        }
        ActivationRule::Sentiment { .. } | ActivationRule::Pattern { .. } => {}
    }
    Ok(())
}

/// Reference edges: marker → rule components ∪ composed_of
fn referenced_ids(marker: &MarkerDefinition) -> Vec<&str> {
    let mut ids: Vec<&str> = marker
        .activation
        .as_ref()
        .map(|rule| rule.referenced_components())
        .unwrap_or_default();
    ids.extend(marker.composed_of.iter().map(String::as_str));
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[derive(Clone, Copy, PartialEq)]
enum VisitState {
    InProgress,
    Done,
}

/// Deterministic topological order over rule-bearing markers; rejects cycles.
/// Iterative DFS so adversarial registries cannot overflow the stack.
fn topological_order(
    markers: &HashMap<String, MarkerDefinition>,
) -> Result<Vec<String>, RegistryLoadError> {
    let mut roots: Vec<&str> = markers.keys().map(String::as_str).collect();
    roots.sort_unstable();

    let mut state: HashMap<&str, VisitState> = HashMap::new();
    let mut order = Vec::new();

    for root in roots {
        if state.contains_key(root) {
            continue;
        }
        // stack of (id, next child index)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        state.insert(root, VisitState::InProgress);

        while let Some((id, child_index)) = stack.pop() {
            let children = markers.get(id).map(referenced_ids).unwrap_or_default();

            if child_index < children.len() {
                stack.push((id, child_index + 1));
                let child = children[child_index];
                match state.get(child) {
                    Some(VisitState::InProgress) => {
                        return Err(RegistryLoadError::Cycle(child.to_string()));
                    }
                    Some(VisitState::Done) => {}
                    None => {
                        state.insert(child, VisitState::InProgress);
                        stack.push((child, 0));
                    }
                }
            } else {
                state.insert(id, VisitState::Done);
                if markers.get(id).is_some_and(|m| !m.is_atomic()) {
                    order.push(id.to_string());
                }
            }
        }
    }

    Ok(order)
}

/// Compile every regex the registry will ever need, so match time cannot fail
fn compile_patterns(
    markers: &HashMap<String, MarkerDefinition>,
    marker_patterns: &mut HashMap<String, Regex>,
    example_patterns: &mut HashMap<String, Vec<Regex>>,
    rule_patterns: &mut HashMap<String, Regex>,
) -> Result<(), RegistryLoadError> {
    for marker in markers.values() {
        if let Some(pattern) = &marker.pattern {
            let compiled = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| RegistryLoadError::InvalidPattern {
                    marker: marker.id.clone(),
                    source,
                })?;
            marker_patterns.insert(marker.id.clone(), compiled);
        } else if !marker.examples.is_empty() {
            let literals: Vec<Regex> = marker
                .examples
                .iter()
                .filter(|example| !example.trim().is_empty())
                .map(|example| {
                    RegexBuilder::new(&regex::escape(example))
                        .case_insensitive(true)
                        .build()
                        .map_err(|source| RegistryLoadError::InvalidPattern {
                            marker: marker.id.clone(),
                            source,
                        })
                })
                .collect::<Result<_, _>>()?;
            example_patterns.insert(marker.id.clone(), literals);
        }

        if let Some(rule) = &marker.activation {
            for pattern in rule.patterns() {
                if rule_patterns.contains_key(pattern) {
                    continue;
                }
                let compiled = Regex::new(pattern).map_err(|source| {
                    RegistryLoadError::InvalidPattern {
                        marker: marker.id.clone(),
                        source,
                    }
                })?;
                rule_patterns.insert(pattern.to_string(), compiled);
            }
        }
    }
    Ok(())
}

/// Content fingerprint used as the version when the source carries none
fn fingerprint(markers: &HashMap<String, MarkerDefinition>) -> String {
    let mut ids: Vec<&String> = markers.keys().collect();
    ids.sort();

    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        if let Ok(encoded) = serde_json::to_vec(&markers[id]) {
            hasher.update(&encoded);
        }
    }
    let digest = hasher.finalize();
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

// =============================================================================
// TESTS
// =============================================================================
