//! Navigation graph pathfinding, edge sequencing, and dependency-aware
//! validation.
//!
//! This crate turns an authored navigation tree into a [`NavigationGraph`]
//! and drives it: shortest routes between screens, an edge-validation
//! sequence that covers every edge with few navigation gaps, and a smart
//! validation run that aborts the dependents of failed screens.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod events;
pub mod executor;
pub mod graph;
pub mod lint;
pub mod pathfinder;
pub mod runner;
pub mod sequencer;
pub mod smart_validation;

#[cfg(test)]
mod test_support;

pub use bridge::{
    AcceptableFailures, ClassifyingBridge, ExecutionBridge, FailureClassifier, SimulatedBridge,
    SimulatedVerifier, VerificationBridge,
};
pub use cache::{DirectorySource, GraphCache, GraphSource};
pub use config::{CascadePolicy, EngineConfig};
pub use events::{EventEmitter, StepStatus, ValidationEvent};
pub use executor::{execute_transition, TransitionOutcome};
pub use graph::{NavEdge, NavNode, NavigationGraph};
pub use lint::{lint, lint_or_raise, Diagnostic, LintRule, Severity};
pub use pathfinder::{
    diagnose_unreachable, distance, find_transitions, find_transitions_avoiding, shortest_path,
    Navigation, PathDiagnostics, Transition,
};
pub use runner::{SequenceReport, SequenceRunner, StepResult};
pub use sequencer::{
    analyze_sequence, build_edge_validation_sequence, EfficiencyRating, OptimizationTag,
    SequenceAnalysis, ValidationStep,
};
pub use smart_validation::{
    FailureKind, NodeValidationResult, SmartValidationEngine, ValidationState, ValidationSummary,
};
pub use tokio_util::sync::CancellationToken;
