//! Dependency-aware node validation.
//!
//! Visits every node of a tree, navigating to it from the nearest live entry
//! point and running its verifications. When a node fails, the nodes that
//! depend on it are aborted instead of being driven into certain failure, and
//! later routes steer around every failed node.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use navgraph_types::{
    HealthRating, NavError, NodeStatus, Result, TreeKey, VerificationResult,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bridge::{ExecutionBridge, VerificationBridge};
use crate::config::{CascadePolicy, EngineConfig};
use crate::events::{EventEmitter, StepStatus, ValidationEvent};
use crate::executor::execute_transition;
use crate::graph::{NavNode, NavigationGraph};
use crate::lint::{lint_or_raise, Diagnostic};
use crate::pathfinder::{find_transitions_avoiding, Transition};

pub const ABORT_REASON: &str = "aborted due to parent node failure";
pub const PARENT_FAILED_REASON: &str = "parent dependency failed";
pub const UNREACHABLE_REASON: &str = "unreachable from any entry point";

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The device could not be driven to the screen.
    Navigation,
    /// The screen was reached but its checks failed.
    Verification,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeValidationResult {
    pub node_id: String,
    pub label: String,
    pub status: NodeStatus,
    pub failure_kind: Option<FailureKind>,
    pub reason: Option<String>,
    /// Entry point the route started from.
    pub entered_from: Option<String>,
    pub transitions: usize,
    pub retry_attempts: usize,
    pub has_retry_success: bool,
    pub errors: Vec<String>,
    pub verifications: Vec<VerificationResult>,
}

impl NodeValidationResult {
    fn pending(node: &NavNode) -> Self {
        Self {
            node_id: node.id.clone(),
            label: node.label.clone(),
            status: NodeStatus::Pending,
            failure_kind: None,
            reason: None,
            entered_from: None,
            transitions: 0,
            retry_attempts: 0,
            has_retry_success: false,
            errors: Vec::new(),
            verifications: Vec::new(),
        }
    }

    fn skipped(node: &NavNode, reason: &str) -> Self {
        Self {
            status: NodeStatus::Skipped,
            reason: Some(reason.to_string()),
            ..Self::pending(node)
        }
    }

    fn fail(mut self, kind: FailureKind, error: impl Into<String>) -> Self {
        let error = error.into();
        self.status = NodeStatus::Failed;
        self.failure_kind = Some(kind);
        self.reason = Some(error.clone());
        self.errors.push(error);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationSummary {
    pub run_id: Uuid,
    pub tree: Option<TreeKey>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_nodes: usize,
    pub validated: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending: usize,
    pub navigation_failures: usize,
    pub verification_failures: usize,
    pub retry_attempts: usize,
    /// Nodes whose route was rescued by an edge's retry actions.
    pub retry_rescues: usize,
    /// validated / (validated + failed); 0 when nothing was attempted.
    pub success_rate: f64,
    pub health: HealthRating,
    pub cancelled: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub results: Vec<NodeValidationResult>,
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Mutable bookkeeping for one run.
#[derive(Debug, Clone, Default)]
pub struct ValidationState {
    /// Nodes routes must avoid: failed ones plus those skipped because of a
    /// failure upstream.
    pub failed_nodes: HashSet<String>,
    pub validated_nodes: HashSet<String>,
    pub retry_attempts: HashMap<String, usize>,
    statuses: HashMap<String, NodeStatus>,
}

impl ValidationState {
    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.statuses
            .get(node_id)
            .copied()
            .unwrap_or(NodeStatus::Pending)
    }

    fn mark(&mut self, result: &NodeValidationResult) {
        self.statuses.insert(result.node_id.clone(), result.status);
        match result.status {
            NodeStatus::Validated => {
                self.validated_nodes.insert(result.node_id.clone());
            }
            NodeStatus::Failed | NodeStatus::Skipped => {
                self.failed_nodes.insert(result.node_id.clone());
            }
            NodeStatus::Pending => {}
        }
    }
}

// ---------------------------------------------------------------------------
// SmartValidationEngine
// ---------------------------------------------------------------------------

pub struct SmartValidationEngine<'g> {
    graph: &'g NavigationGraph,
    config: EngineConfig,
    events: EventEmitter,
    state: ValidationState,
}

impl<'g> SmartValidationEngine<'g> {
    pub fn new(graph: &'g NavigationGraph, config: EngineConfig) -> Self {
        let events = EventEmitter::new(config.event_capacity);
        Self {
            graph,
            config,
            events,
            state: ValidationState::default(),
        }
    }

    /// Share an existing emitter instead of the engine's own.
    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    pub fn state(&self) -> &ValidationState {
        &self.state
    }

    /// Nodes reachable from any entry point, optionally steering around
    /// failed nodes.
    pub fn reachable_nodes(&self, exclude_failed: bool) -> HashSet<String> {
        let empty = HashSet::new();
        let avoid = if exclude_failed {
            &self.state.failed_nodes
        } else {
            &empty
        };
        let entry_points = self.graph.entry_points();
        self.graph
            .reachable_from(entry_points.iter().map(|n| n.id.as_str()), avoid)
    }

    /// Topological order when the tree is acyclic; otherwise BFS from the
    /// first entry point with unvisited nodes appended in insertion order.
    pub fn validation_order(&self) -> Vec<String> {
        if let Some(order) = self.graph.topological_order() {
            return order;
        }
        let mut order = match self.graph.entry_points().first() {
            Some(ep) => self.graph.bfs_order(&ep.id),
            None => Vec::new(),
        };
        let seen: HashSet<String> = order.iter().cloned().collect();
        order.extend(
            self.graph
                .all_nodes()
                .filter(|n| !seen.contains(&n.id))
                .map(|n| n.id.clone()),
        );
        order
    }

    /// True when a predecessor has failed and the failures cut the node off
    /// from every entry point.
    pub fn should_skip(&self, node_id: &str) -> bool {
        let has_failed_parent = self
            .graph
            .predecessors(node_id)
            .any(|p| self.state.failed_nodes.contains(p));
        has_failed_parent && !self.reachable_nodes(true).contains(node_id)
    }

    /// Shortest route to `node_id` over all live entry points, ties going to
    /// the earlier entry point.
    fn route_to(&self, node_id: &str) -> Result<(String, Vec<Transition>)> {
        let avoid = &self.state.failed_nodes;
        let mut best: Option<(String, Vec<Transition>)> = None;
        let mut last_err = None;
        for ep in self.graph.entry_points() {
            if avoid.contains(&ep.id) {
                continue;
            }
            match find_transitions_avoiding(self.graph, node_id, Some(ep.id.as_str()), avoid) {
                Ok(nav) => {
                    let route = nav.into_transitions();
                    if best.as_ref().map_or(true, |(_, b)| route.len() < b.len()) {
                        best = Some((ep.id.clone(), route));
                    }
                }
                Err(e @ NavError::NoPath { .. }) => last_err = Some(e),
                Err(e) => return Err(e),
            }
        }
        best.ok_or_else(|| {
            last_err.unwrap_or_else(|| NavError::Graph("No live entry point to start from".into()))
        })
    }

    /// Navigate to one node and verify it. Records the outcome in the run
    /// state. A node cut off by a failed parent is skipped without touching
    /// the device. Routing problems are reported as a `Failed` result, not an
    /// error; only unknown ids and graph errors propagate.
    pub async fn validate_node(
        &mut self,
        node_id: &str,
        bridge: &dyn ExecutionBridge,
        verifier: &dyn VerificationBridge,
    ) -> Result<NodeValidationResult> {
        let graph = self.graph;
        let node = graph.require_node(node_id)?;
        if self.should_skip(node_id) {
            let result = NodeValidationResult::skipped(node, PARENT_FAILED_REASON);
            self.state.mark(&result);
            return Ok(result);
        }
        let mut result = NodeValidationResult::pending(node);

        let (entered_from, route) = match self.route_to(node_id) {
            Ok(found) => found,
            Err(e @ NavError::NoPath { .. }) => {
                let result = result.fail(FailureKind::Navigation, e.to_string());
                self.state.mark(&result);
                return Ok(result);
            }
            Err(e) => return Err(e),
        };
        result.entered_from = Some(entered_from);

        for transition in &route {
            let outcome = execute_transition(
                bridge,
                &transition.payload,
                (&transition.from_node, &transition.to_node),
                &self.config,
            )
            .await;
            result.transitions += 1;
            if outcome.used_retry {
                result.retry_attempts += 1;
                *self
                    .state
                    .retry_attempts
                    .entry(node_id.to_string())
                    .or_insert(0) += 1;
                self.events.emit(ValidationEvent::TransitionRetrying {
                    from_node: transition.from_node.clone(),
                    to_node: transition.to_node.clone(),
                });
            }
            if outcome.retry_succeeded {
                result.has_retry_success = true;
            }
            if !outcome.success {
                result.errors.extend(outcome.errors);
                let message = format!(
                    "Transition {} -> {} failed",
                    transition.from_node, transition.to_node
                );
                let result = result.fail(FailureKind::Navigation, message);
                self.state.mark(&result);
                return Ok(result);
            }
        }

        if !node.verifications.is_empty() {
            match verifier.run_verifications(node_id, &node.verifications).await {
                Ok(checks) => {
                    let mut failed: Vec<String> = checks
                        .iter()
                        .filter(|c| !c.success)
                        .map(|c| c.message.clone())
                        .collect();
                    if checks.len() != node.verifications.len() {
                        failed.push(format!(
                            "verifier returned {} results for {} checks",
                            checks.len(),
                            node.verifications.len()
                        ));
                    }
                    result.verifications = checks;
                    if !failed.is_empty() {
                        let error = NavError::Verification {
                            node: node_id.to_string(),
                            message: failed.join("; "),
                        };
                        let result = result.fail(FailureKind::Verification, error.to_string());
                        self.state.mark(&result);
                        return Ok(result);
                    }
                }
                Err(e) => {
                    let result = result.fail(FailureKind::Verification, e.to_string());
                    self.state.mark(&result);
                    return Ok(result);
                }
            }
        }

        result.status = NodeStatus::Validated;
        self.state.mark(&result);
        Ok(result)
    }

    /// Mark the descendants of a failed node as skipped. Nodes that already
    /// reached a terminal status keep it. Returns the newly aborted nodes in
    /// insertion order.
    pub fn abort_dependents(&mut self, failed_id: &str) -> Vec<NodeValidationResult> {
        let graph = self.graph;
        let descendants = graph.descendants(failed_id);
        let still_reachable = match self.config.cascade {
            CascadePolicy::AllDescendants => HashSet::new(),
            CascadePolicy::DisconnectedOnly => self.reachable_nodes(true),
        };

        let mut aborted = Vec::new();
        for node in graph.all_nodes() {
            if node.id == failed_id
                || !descendants.contains(&node.id)
                || self.state.status(&node.id).is_terminal()
                || still_reachable.contains(&node.id)
            {
                continue;
            }
            let result = NodeValidationResult::skipped(node, ABORT_REASON);
            self.state.mark(&result);
            aborted.push(result);
        }
        if !aborted.is_empty() {
            tracing::info!(node = %failed_id, aborted = aborted.len(), "Aborted dependents of failed node");
        }
        aborted
    }

    fn record(&self, result: &NodeValidationResult, results: &mut Vec<NodeValidationResult>) {
        match result.status {
            NodeStatus::Validated => {
                tracing::info!(node = %result.node_id, transitions = result.transitions, "Node validated");
                self.events.emit(ValidationEvent::NodeValidated {
                    node_id: result.node_id.clone(),
                    used_retry: result.retry_attempts > 0,
                });
            }
            NodeStatus::Failed => {
                let error = result.reason.clone().unwrap_or_default();
                tracing::warn!(node = %result.node_id, error = %error, "Node failed");
                self.events.emit(ValidationEvent::NodeFailed {
                    node_id: result.node_id.clone(),
                    error,
                });
            }
            NodeStatus::Skipped => {
                let reason = result.reason.clone().unwrap_or_default();
                tracing::debug!(node = %result.node_id, reason = %reason, "Node skipped");
                self.events.emit(ValidationEvent::NodeSkipped {
                    node_id: result.node_id.clone(),
                    reason,
                });
            }
            NodeStatus::Pending => {}
        }
        results.push(result.clone());
    }

    /// Validate every node. Structural errors abort before any action runs.
    /// Cancelling the token stops the run before the next node; the node
    /// being navigated when it fires is finished first.
    pub async fn run(
        mut self,
        bridge: &dyn ExecutionBridge,
        verifier: &dyn VerificationBridge,
        cancel: &CancellationToken,
    ) -> Result<ValidationSummary> {
        let graph = self.graph;
        let diagnostics = lint_or_raise(graph)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let order = self.validation_order();
        let total = order.len();

        tracing::info!(run_id = %run_id, nodes = total, "Validation run started");
        self.events.emit(ValidationEvent::RunStarted {
            run_id: run_id.to_string(),
            node_count: graph.node_count(),
            total_steps: total,
        });

        let mut results = Vec::new();
        let mut cancelled = false;
        let mut completed_steps = 0;

        for (index, node_id) in order.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            completed_steps = index;
            if self.state.status(node_id).is_terminal() {
                continue;
            }
            let Some(node) = graph.node(node_id) else {
                continue;
            };

            // Nodes cut off by a failed parent fall through to validate_node,
            // which skips them with the parent-failure reason.
            if !self.reachable_nodes(true).contains(node_id) && !self.should_skip(node_id) {
                let result = NodeValidationResult::skipped(node, UNREACHABLE_REASON);
                self.state.mark(&result);
                self.record(&result, &mut results);
                continue;
            }

            // Not raced against `cancel`: the loop head is the only cancellation point.
            let result = self.validate_node(node_id, bridge, verifier).await?;
            let status = match result.status {
                NodeStatus::Validated => StepStatus::Passed,
                NodeStatus::Skipped => StepStatus::Skipped,
                _ => StepStatus::Failed,
            };
            let from = result.entered_from.as_deref().unwrap_or(node_id);
            self.progress(index + 1, total, from, node_id, status);
            self.record(&result, &mut results);

            if result.status == NodeStatus::Failed {
                let aborted = self.abort_dependents(node_id);
                if !aborted.is_empty() {
                    self.events.emit(ValidationEvent::DependentsAborted {
                        node_id: node_id.clone(),
                        aborted: aborted.iter().map(|r| r.node_id.clone()).collect(),
                    });
                }
                for r in &aborted {
                    self.record(r, &mut results);
                }
            }
            completed_steps = index + 1;
        }

        let finished_at = Utc::now();
        let duration_ms = clock.elapsed().as_millis() as u64;
        let summary = self.summarize(
            run_id,
            started_at,
            finished_at,
            duration_ms,
            cancelled,
            diagnostics,
            results,
        );

        if cancelled {
            tracing::warn!(run_id = %run_id, completed_steps, "Validation run cancelled");
            self.events.emit(ValidationEvent::RunCancelled {
                run_id: run_id.to_string(),
                completed_steps,
            });
        } else {
            tracing::info!(
                run_id = %run_id,
                validated = summary.validated,
                failed = summary.failed,
                skipped = summary.skipped,
                health = %summary.health,
                "Validation run completed"
            );
        }
        self.events.emit(ValidationEvent::RunCompleted {
            run_id: run_id.to_string(),
            validated: summary.validated,
            failed: summary.failed,
            skipped: summary.skipped,
            health: summary.health,
            duration_ms,
        });
        Ok(summary)
    }

    fn progress(&self, current: usize, total: usize, from: &str, to: &str, status: StepStatus) {
        self.events.emit(ValidationEvent::StepProgress {
            current_step: current,
            total_steps: total,
            from_node: from.to_string(),
            to_node: to.to_string(),
            status,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn summarize(
        &self,
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        duration_ms: u64,
        cancelled: bool,
        diagnostics: Vec<Diagnostic>,
        results: Vec<NodeValidationResult>,
    ) -> ValidationSummary {
        let mut counts: HashMap<NodeStatus, usize> = HashMap::new();
        for node in self.graph.all_nodes() {
            *counts.entry(self.state.status(&node.id)).or_insert(0) += 1;
        }
        let count = |s: NodeStatus| counts.get(&s).copied().unwrap_or(0);
        let validated = count(NodeStatus::Validated);
        let failed = count(NodeStatus::Failed);
        let attempted = validated + failed;

        let kind_count = |kind: FailureKind| {
            results
                .iter()
                .filter(|r| r.failure_kind == Some(kind))
                .count()
        };

        ValidationSummary {
            run_id,
            tree: self.graph.key.clone(),
            started_at,
            finished_at,
            duration_ms,
            total_nodes: self.graph.node_count(),
            validated,
            failed,
            skipped: count(NodeStatus::Skipped),
            pending: count(NodeStatus::Pending),
            navigation_failures: kind_count(FailureKind::Navigation),
            verification_failures: kind_count(FailureKind::Verification),
            retry_attempts: self.state.retry_attempts.values().sum(),
            retry_rescues: results.iter().filter(|r| r.has_retry_success).count(),
            success_rate: if attempted == 0 {
                0.0
            } else {
                validated as f64 / attempted as f64
            },
            health: HealthRating::from_counts(validated, attempted),
            cancelled,
            diagnostics,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{SimulatedBridge, SimulatedVerifier};
    use crate::test_support::{chain_graph, edge};
    use navgraph_types::{Action, EdgeRecord, NodeRecord, VerificationSpec};

    fn launch() -> EdgeRecord {
        EdgeRecord::new("entry", "home").with_action(Action::new("launch_app"))
    }

    /// entry -> home -> A -> B -> C, home -> D. Acyclic.
    fn dag() -> NavigationGraph {
        NavigationGraph::build(
            ["home", "A", "B", "C", "D"]
                .iter()
                .map(|id| NodeRecord::new(*id, *id))
                .chain(std::iter::once(NodeRecord::entry("entry")))
                .collect(),
            vec![
                launch(),
                edge("home", "A"),
                edge("A", "B"),
                edge("B", "C"),
                edge("home", "D"),
            ],
        )
        .unwrap()
    }

    /// entry -> home -> {A, B} -> C
    fn diamond() -> NavigationGraph {
        NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("A", "A"),
                NodeRecord::new("B", "B"),
                NodeRecord::new("C", "C"),
            ],
            vec![
                launch(),
                edge("home", "A"),
                edge("home", "B"),
                edge("A", "C"),
                edge("B", "C"),
            ],
        )
        .unwrap()
    }

    fn failed(engine: &mut SmartValidationEngine<'_>, id: &str) {
        let node = engine.graph.node(id).unwrap();
        let result = NodeValidationResult::pending(node).fail(FailureKind::Navigation, "boom");
        engine.state.mark(&result);
    }

    // --- order ---

    #[test]
    fn acyclic_tree_validates_in_topological_order() {
        let graph = dag();
        let engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let order = engine.validation_order();
        let pos = |id: &str| order.iter().position(|n| n == id).unwrap();
        assert_eq!(order.len(), 6);
        assert_eq!(order[0], "entry");
        for e in graph.all_edges() {
            assert!(pos(&e.from) < pos(&e.to), "{} before {}", e.from, e.to);
        }
    }

    #[test]
    fn cyclic_tree_falls_back_to_bfs() {
        let graph = chain_graph();
        let engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        assert_eq!(engine.validation_order(), vec!["entry", "home", "X", "Y"]);
    }

    // --- reachability and skipping ---

    #[test]
    fn reachable_nodes_excludes_failed() {
        let graph = dag();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        assert_eq!(engine.reachable_nodes(true).len(), 6);

        failed(&mut engine, "A");
        let live = engine.reachable_nodes(true);
        assert!(!live.contains("A"));
        assert!(!live.contains("B"));
        assert!(live.contains("D"));
        assert_eq!(engine.reachable_nodes(false).len(), 6);
    }

    #[test]
    fn should_skip_requires_failed_parent_and_disconnection() {
        let graph = diamond();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        failed(&mut engine, "A");
        // C still reachable through B
        assert!(!engine.should_skip("C"));
        failed(&mut engine, "B");
        assert!(engine.should_skip("C"));
        // home has no failed parent
        assert!(!engine.should_skip("home"));
    }

    // --- cascade ---

    #[test]
    fn abort_dependents_marks_every_descendant() {
        let graph = dag();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        failed(&mut engine, "A");

        let aborted = engine.abort_dependents("A");
        let ids: Vec<_> = aborted.iter().map(|r| r.node_id.as_str()).collect();
        assert_eq!(ids, vec!["B", "C"]);
        for r in &aborted {
            assert_eq!(r.status, NodeStatus::Skipped);
            assert_eq!(r.reason.as_deref(), Some(ABORT_REASON));
        }
        for id in graph.descendants("A") {
            let status = engine.state().status(&id);
            assert!(
                matches!(status, NodeStatus::Failed | NodeStatus::Skipped),
                "{id} is {status}"
            );
        }
        assert_eq!(engine.state().status("D"), NodeStatus::Pending);
    }

    #[test]
    fn abort_dependents_keeps_validated_nodes() {
        let graph = dag();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let node = graph.node("C").unwrap();
        let mut ok = NodeValidationResult::pending(node);
        ok.status = NodeStatus::Validated;
        engine.state.mark(&ok);
        failed(&mut engine, "A");

        let aborted = engine.abort_dependents("A");
        assert_eq!(aborted.len(), 1);
        assert_eq!(engine.state().status("C"), NodeStatus::Validated);
    }

    #[test]
    fn disconnected_only_spares_nodes_with_another_route() {
        let graph = diamond();
        let config = EngineConfig {
            cascade: CascadePolicy::DisconnectedOnly,
            ..EngineConfig::dry_run()
        };
        let mut engine = SmartValidationEngine::new(&graph, config);
        failed(&mut engine, "A");
        assert!(engine.abort_dependents("A").is_empty());
        assert_eq!(engine.state().status("C"), NodeStatus::Pending);

        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        failed(&mut engine, "A");
        assert_eq!(engine.abort_dependents("A").len(), 1);
    }

    // --- validate_node ---

    #[tokio::test]
    async fn validate_node_navigates_from_entry() {
        let graph = chain_graph();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new();
        let verifier = SimulatedVerifier::passing();

        let result = engine.validate_node("Y", &bridge, &verifier).await.unwrap();
        assert_eq!(result.status, NodeStatus::Validated);
        assert_eq!(result.entered_from.as_deref(), Some("entry"));
        assert_eq!(result.transitions, 3);
        assert_eq!(bridge.executed_commands(), vec!["launch_app", "press_key", "press_key"]);
        assert!(engine.state().validated_nodes.contains("Y"));
    }

    #[tokio::test]
    async fn validate_node_prefers_nearest_entry_point() {
        let graph = NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("X", "X"),
                NodeRecord::new("deep", "deep"),
                NodeRecord {
                    is_entry_point: true,
                    ..NodeRecord::new("deeplink", "deeplink")
                },
            ],
            vec![
                launch(),
                edge("home", "X"),
                edge("X", "deep"),
                edge("deeplink", "deep"),
            ],
        )
        .unwrap();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new();
        let result = engine
            .validate_node("deep", &bridge, &SimulatedVerifier::passing())
            .await
            .unwrap();
        assert_eq!(result.entered_from.as_deref(), Some("deeplink"));
        assert_eq!(result.transitions, 1);
    }

    #[tokio::test]
    async fn retry_actions_rescue_navigation() {
        let graph = NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("X", "X"),
            ],
            vec![
                launch(),
                edge("home", "X").with_retry_action(Action::new("tap")),
            ],
        )
        .unwrap();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new().fail_param("key", "X");

        let result = engine
            .validate_node("X", &bridge, &SimulatedVerifier::passing())
            .await
            .unwrap();
        assert_eq!(result.status, NodeStatus::Validated);
        assert!(result.has_retry_success);
        assert_eq!(result.retry_attempts, 1);
        assert_eq!(engine.state().retry_attempts.get("X"), Some(&1));
    }

    #[tokio::test]
    async fn navigation_and_verification_failures_are_distinguished() {
        let graph = NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("X", "X").with_verification(VerificationSpec::new("wait_for_element")),
                NodeRecord::new("Y", "Y"),
            ],
            vec![launch(), edge("home", "X"), edge("home", "Y")],
        )
        .unwrap();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new().fail_param("key", "Y");
        let verifier = SimulatedVerifier::passing().fail_node("X");

        let x = engine.validate_node("X", &bridge, &verifier).await.unwrap();
        assert_eq!(x.status, NodeStatus::Failed);
        assert_eq!(x.failure_kind, Some(FailureKind::Verification));
        assert_eq!(x.verifications.len(), 1);

        let y = engine.validate_node("Y", &bridge, &verifier).await.unwrap();
        assert_eq!(y.status, NodeStatus::Failed);
        assert_eq!(y.failure_kind, Some(FailureKind::Navigation));
        assert!(y.reason.unwrap().contains("home -> Y"));
        assert!(engine.state().failed_nodes.contains("X"));
        assert!(engine.state().failed_nodes.contains("Y"));
    }

    #[tokio::test]
    async fn validate_node_skips_node_cut_off_by_failed_parent() {
        let graph = dag();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        failed(&mut engine, "A");
        let bridge = SimulatedBridge::new();
        let verifier = SimulatedVerifier::passing();

        let result = engine.validate_node("B", &bridge, &verifier).await.unwrap();
        assert_eq!(result.status, NodeStatus::Skipped);
        assert_eq!(result.reason.as_deref(), Some(PARENT_FAILED_REASON));
        assert_eq!(result.failure_kind, None);
        assert!(bridge.executed().is_empty());
        assert_eq!(verifier.calls(), 0);
        assert_eq!(engine.state().status("B"), NodeStatus::Skipped);
    }

    /// Verifier that answers with fewer results than checks.
    struct ShortVerifier;

    #[async_trait::async_trait]
    impl VerificationBridge for ShortVerifier {
        async fn run_verifications(
            &self,
            _node_id: &str,
            specs: &[VerificationSpec],
        ) -> Result<Vec<VerificationResult>> {
            Ok(specs
                .iter()
                .skip(1)
                .map(|s| VerificationResult::pass(s.command.clone()))
                .collect())
        }
    }

    #[tokio::test]
    async fn missing_verification_results_fail_the_node() {
        let graph = NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("X", "X").with_verification(VerificationSpec::new("wait_for_element")),
                NodeRecord::new("Y", "Y")
                    .with_verification(VerificationSpec::new("wait_for_element"))
                    .with_verification(VerificationSpec::new("check_text")),
            ],
            vec![launch(), edge("home", "X"), edge("home", "Y")],
        )
        .unwrap();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new();

        for id in ["X", "Y"] {
            let result = engine.validate_node(id, &bridge, &ShortVerifier).await.unwrap();
            assert_eq!(result.status, NodeStatus::Failed, "{id}");
            assert_eq!(result.failure_kind, Some(FailureKind::Verification));
            assert!(result.reason.unwrap().contains("results for"));
        }
    }

    #[tokio::test]
    async fn progress_reports_the_entry_point_each_route_started_from() {
        let graph = NavigationGraph::build(
            vec![
                NodeRecord::entry("entry"),
                NodeRecord::new("home", "home"),
                NodeRecord::new("X", "X"),
                NodeRecord::new("deep", "deep"),
                NodeRecord {
                    is_entry_point: true,
                    ..NodeRecord::new("deeplink", "deeplink")
                },
            ],
            vec![
                launch(),
                edge("home", "X"),
                edge("X", "deep"),
                edge("deeplink", "deep"),
            ],
        )
        .unwrap();
        let engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let mut rx = engine.events().subscribe();
        engine
            .run(&SimulatedBridge::new(), &SimulatedVerifier::passing(), &CancellationToken::new())
            .await
            .unwrap();

        let mut origins = HashMap::new();
        while let Ok(event) = rx.try_recv() {
            if let ValidationEvent::StepProgress { from_node, to_node, .. } = event {
                origins.insert(to_node, from_node);
            }
        }
        assert_eq!(origins["deep"], "deeplink");
        assert_eq!(origins["X"], "entry");
    }

    #[tokio::test]
    async fn unknown_node_is_an_error() {
        let graph = chain_graph();
        let mut engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let err = engine
            .validate_node("nope", &SimulatedBridge::new(), &SimulatedVerifier::passing())
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::UnknownNode(_)));
    }

    #[tokio::test]
    async fn run_rejects_structurally_broken_tree() {
        let graph = NavigationGraph::build(
            vec![NodeRecord::entry("entry"), NodeRecord::new("home", "home")],
            vec![],
        )
        .unwrap();
        let engine = SmartValidationEngine::new(&graph, EngineConfig::dry_run());
        let bridge = SimulatedBridge::new();
        let err = engine
            .run(&bridge, &SimulatedVerifier::passing(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NavError::Graph(_)));
        assert!(bridge.executed().is_empty());
    }
}
