//! Navigation tree lint rules and diagnostics.
//!
//! Call [`lint`] for advisory diagnostics or [`lint_or_raise`] to fail on the
//! first `Error`-severity issue. Validation runs use the latter so structural
//! problems stop a run before any device action is sent.

use std::collections::HashSet;

use navgraph_types::{NavError, Result};
use serde::Serialize;

use crate::graph::NavigationGraph;

// ---------------------------------------------------------------------------
// Diagnostic types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    pub node_id: Option<String>,
    pub edge: Option<(String, String)>,
    pub fix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN",
            Severity::Info => "INFO",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// LintRule trait
// ---------------------------------------------------------------------------

pub trait LintRule: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic>;
}

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

struct EntryPointExistsRule;
impl LintRule for EntryPointExistsRule {
    fn name(&self) -> &str { "entry_point_exists" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        if graph.node_count() == 0 || !graph.entry_points().is_empty() {
            return vec![];
        }
        vec![Diagnostic {
            rule: self.name().into(),
            severity: Severity::Error,
            message: "Tree has no entry point: every screen has an incoming edge and none is flagged".into(),
            node_id: None,
            edge: None,
            fix: Some("Add an `entry` node or set isEntryPoint on the launch screen".into()),
        }]
    }
}

/// Routes from the app entry always start with entry -> home, so that edge
/// must exist whenever both nodes do and differ.
struct EntryToHomeRule;
impl LintRule for EntryToHomeRule {
    fn name(&self) -> &str { "entry_to_home" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        let (Some(entry), Some(home)) = (graph.entry_node(), graph.home_node()) else {
            return vec![];
        };
        if entry.id == home.id || graph.has_edge(&entry.id, &home.id) {
            return vec![];
        }
        vec![Diagnostic {
            rule: self.name().into(),
            severity: Severity::Error,
            message: format!("Missing edge from entry '{}' to home '{}'", entry.id, home.id),
            node_id: Some(entry.id.clone()),
            edge: Some((entry.id.clone(), home.id.clone())),
            fix: Some("Add the launch edge carrying the app start actions".into()),
        }]
    }
}

struct ReachabilityRule;
impl LintRule for ReachabilityRule {
    fn name(&self) -> &str { "reachability" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        let entry_points = graph.entry_points();
        if entry_points.is_empty() {
            return vec![];
        }
        let reachable =
            graph.reachable_from(entry_points.iter().map(|n| n.id.as_str()), &HashSet::new());
        graph
            .all_nodes()
            .filter(|n| !reachable.contains(&n.id))
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Node '{}' is not reachable from any entry point", n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some("Connect it from a reachable screen or remove it".into()),
            })
            .collect()
    }
}

struct EmptyActionsRule;
impl LintRule for EmptyActionsRule {
    fn name(&self) -> &str { "empty_actions" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        graph
            .all_edges()
            .iter()
            .filter(|e| e.payload.actions.is_empty())
            .map(|e| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Edge {} -> {} has no actions", e.from, e.to),
                node_id: None,
                edge: Some((e.from.clone(), e.to.clone())),
                fix: None,
            })
            .collect()
    }
}

struct SelfLoopRule;
impl LintRule for SelfLoopRule {
    fn name(&self) -> &str { "self_loop" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        graph
            .all_edges()
            .iter()
            .filter(|e| e.from == e.to)
            .map(|e| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Warning,
                message: format!("Edge {} -> {} loops back to its own screen", e.from, e.to),
                node_id: Some(e.from.clone()),
                edge: Some((e.from.clone(), e.to.clone())),
                fix: None,
            })
            .collect()
    }
}

struct DeadEndRule;
impl LintRule for DeadEndRule {
    fn name(&self) -> &str { "dead_end" }
    fn apply(&self, graph: &NavigationGraph) -> Vec<Diagnostic> {
        graph
            .all_nodes()
            .filter(|n| graph.out_degree(&n.id) == 0 && graph.in_degree(&n.id) > 0)
            .map(|n| Diagnostic {
                rule: self.name().into(),
                severity: Severity::Info,
                message: format!("Node '{}' has no outgoing edges; runs re-enter from the app entry", n.id),
                node_id: Some(n.id.clone()),
                edge: None,
                fix: Some("Add a back edge if the screen has one".into()),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run all built-in lint rules and return collected diagnostics.
pub fn lint(graph: &NavigationGraph) -> Vec<Diagnostic> {
    let rules: Vec<Box<dyn LintRule>> = vec![
        Box::new(EntryPointExistsRule),
        Box::new(EntryToHomeRule),
        Box::new(ReachabilityRule),
        Box::new(EmptyActionsRule),
        Box::new(SelfLoopRule),
        Box::new(DeadEndRule),
    ];

    let mut diagnostics = Vec::new();
    for rule in &rules {
        diagnostics.extend(rule.apply(graph));
    }
    diagnostics
}

/// Run all lint rules; return `Err` if any `Error`-severity diagnostic found.
pub fn lint_or_raise(graph: &NavigationGraph) -> Result<Vec<Diagnostic>> {
    let diagnostics = lint(graph);
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .collect();
    if !errors.is_empty() {
        return Err(NavError::Graph(errors.join("; ")));
    }
    Ok(diagnostics)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
