//! Engine components

pub mod registry;
pub mod matcher;
pub mod enrich;
pub mod rules;
pub mod scoring;
pub mod orchestrator;
pub mod bridge;
pub mod cache;
pub mod config;

pub use registry::{FileMarkerSource, MarkerSource, Registry};
pub use matcher::Matcher;
pub use enrich::{Enricher, LexiconEnricher, WhitespaceEnricher};
pub use rules::RuleEngine;
pub use scoring::Scorer;
pub use orchestrator::{CancelFlag, EngineState, Orchestrator};
pub use bridge::{BridgeRunner, InterpretationBridge, TemplateBridge};
pub use cache::{cache_key, CachedResponse, ResponseCache};
pub use config::{EngineConfig, EnricherKind};
