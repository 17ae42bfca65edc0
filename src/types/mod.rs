//! Data model for MarkerEngine

mod marker;
mod rule;
mod enrichment;
mod detection;
mod context;
mod response;
mod error;

pub use marker::{Frame, MarkerDefinition, MarkerMetadata};
pub use rule::{ActivationRule, Combinator};
pub use enrichment::{EnrichmentResult, Entity, Polarity, SentenceSpan, Token};
pub use detection::{DetectedMarker, DetectionPhase, MarkerPosition};
pub use context::{AnalysisContext, PhaseMetadata, PhaseRecord};
pub use response::{
    AnalyzeRequest, AnalyzeResponse, ContextualPhaseReport, EnrichmentPhaseReport,
    InitialPhaseReport, PerformanceMetrics, PhaseReports,
};
pub use error::{
    BridgeError, ConfigError, EngineError, EnrichmentError, RegistryLoadError,
    RuleEvaluationError,
};
