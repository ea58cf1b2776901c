//! Shortest-path navigation between screens.
//!
//! Turns "get me from S to T" into an ordered list of [`Transition`]s, each
//! carrying the edge's action payload. Ties between equally short routes are
//! broken by edge creation order so a given graph always yields the same
//! route.

use std::collections::{HashMap, HashSet, VecDeque};

use navgraph_types::{EdgeActions, NavError, Result};
use serde::Serialize;

use crate::graph::{NavEdge, NavNode, NavigationGraph};

/// One hop of a navigation route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition {
    pub transition_number: usize,
    pub from_node: String,
    pub to_node: String,
    pub from_label: String,
    pub to_label: String,
    #[serde(flatten)]
    pub payload: EdgeActions,
}

/// Outcome of a successful route lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// Start and target are the same screen; nothing to execute.
    AlreadyAtTarget,
    Route(Vec<Transition>),
}

impl Navigation {
    pub fn transitions(&self) -> &[Transition] {
        match self {
            Navigation::AlreadyAtTarget => &[],
            Navigation::Route(t) => t,
        }
    }

    pub fn into_transitions(self) -> Vec<Transition> {
        match self {
            Navigation::AlreadyAtTarget => Vec::new(),
            Navigation::Route(t) => t,
        }
    }

    pub fn is_already_at_target(&self) -> bool {
        matches!(self, Navigation::AlreadyAtTarget)
    }
}

/// Why a target could not be reached, for logs and error reports.
#[derive(Debug, Clone, Serialize)]
pub struct PathDiagnostics {
    pub from: String,
    pub to: String,
    pub component_count: usize,
    pub same_component: bool,
    pub reachable_from_start: Vec<String>,
    pub reaching_target: Vec<String>,
}

fn transition_from_edge(graph: &NavigationGraph, edge: &NavEdge, number: usize) -> Transition {
    Transition {
        transition_number: number,
        from_node: edge.from.clone(),
        to_node: edge.to.clone(),
        from_label: graph.label_of(&edge.from).to_string(),
        to_label: graph.label_of(&edge.to).to_string(),
        payload: edge.payload.clone(),
    }
}

/// Route from `start` (or from the app entry when `None`) to `target`.
pub fn find_transitions(
    graph: &NavigationGraph,
    target: &str,
    start: Option<&str>,
) -> Result<Navigation> {
    find_transitions_avoiding(graph, target, start, &HashSet::new())
}

/// Like [`find_transitions`], but the route never enters a node in `avoid`.
pub fn find_transitions_avoiding(
    graph: &NavigationGraph,
    target: &str,
    start: Option<&str>,
    avoid: &HashSet<String>,
) -> Result<Navigation> {
    graph.require_node(target)?;
    if let Some(s) = start {
        graph.require_node(s)?;
        if s == target {
            return Ok(Navigation::AlreadyAtTarget);
        }
    }

    // Entry-point targets are only reached through their dedicated entry edge.
    if graph.is_entry_point(target) {
        let entry_edge = graph.incoming_edges(target).find(|e| {
            !avoid.contains(&e.from) && graph.node(&e.from).is_some_and(NavNode::is_entry_type)
        });
        if let Some(edge) = entry_edge {
            tracing::debug!(target = %target, from = %edge.from, "Using dedicated entry edge");
            return Ok(Navigation::Route(vec![transition_from_edge(graph, edge, 1)]));
        }
    }

    let entry = match start {
        Some(s) => graph.node(s).filter(|n| n.is_entry_type()),
        None => graph.entry_node(),
    };
    let mut current = match (start, entry) {
        (Some(s), _) => s.to_string(),
        (None, Some(e)) => e.id.clone(),
        (None, None) => graph
            .entry_points()
            .into_iter()
            .find(|n| !avoid.contains(&n.id))
            .map(|n| n.id.clone())
            .ok_or_else(|| NavError::Graph("Graph has no usable entry point".into()))?,
    };
    if current == target {
        return Ok(Navigation::AlreadyAtTarget);
    }

    let mut transitions = Vec::new();

    // A run from the app entry always passes through the entry sequence first.
    // Only when starting at the entry itself: a route from a screen already
    // past launch stays a simple path from that screen.
    if let (Some(entry), Some(home)) = (entry, graph.home_node()) {
        if entry.id != home.id && !avoid.contains(&home.id) {
            if let Some(edge) = graph.edge(&entry.id, &home.id) {
                transitions.push(transition_from_edge(graph, edge, 1));
                current = home.id.clone();
                if target == home.id {
                    return Ok(Navigation::Route(transitions));
                }
            }
        }
    }

    let path = shortest_path(graph, &current, target, avoid).ok_or_else(|| {
        let diag = diagnose_unreachable(graph, &current, target);
        tracing::warn!(
            from = %diag.from,
            to = %diag.to,
            components = diag.component_count,
            same_component = diag.same_component,
            reachable = ?diag.reachable_from_start,
            avoided = avoid.len(),
            "No navigation path"
        );
        NavError::NoPath {
            from: current.clone(),
            to: target.to_string(),
        }
    })?;

    for pair in path.windows(2) {
        let edge = graph
            .edge(&pair[0], &pair[1])
            .ok_or_else(|| NavError::Other(format!("Missing edge {} -> {}", pair[0], pair[1])))?;
        let number = transitions.len() + 1;
        transitions.push(transition_from_edge(graph, edge, number));
    }

    tracing::debug!(target = %target, hops = transitions.len(), "Route found");
    Ok(Navigation::Route(transitions))
}

/// Unweighted BFS over outgoing edges in creation order. Returns the node
/// sequence `[from, ..., to]`, or `None` when `to` is unreachable.
pub fn shortest_path(
    graph: &NavigationGraph,
    from: &str,
    to: &str,
    avoid: &HashSet<String>,
) -> Option<Vec<String>> {
    if !graph.contains(from) || !graph.contains(to) || avoid.contains(to) {
        return None;
    }
    if from == to {
        return Some(vec![from.to_string()]);
    }

    let mut parent: HashMap<&str, &str> = HashMap::new();
    let mut queue = VecDeque::from([from]);
    let mut seen = HashSet::from([from]);

    while let Some(current) = queue.pop_front() {
        for next in graph.successors(current) {
            if avoid.contains(next) || !seen.insert(next) {
                continue;
            }
            parent.insert(next, current);
            if next == to {
                let mut path = vec![to.to_string()];
                let mut cursor = to;
                while let Some(&p) = parent.get(cursor) {
                    path.push(p.to_string());
                    cursor = p;
                }
                path.reverse();
                return Some(path);
            }
            queue.push_back(next);
        }
    }
    None
}

/// Number of hops on the shortest route, if any.
pub fn distance(graph: &NavigationGraph, from: &str, to: &str) -> Option<usize> {
    shortest_path(graph, from, to, &HashSet::new()).map(|p| p.len() - 1)
}

pub fn diagnose_unreachable(graph: &NavigationGraph, from: &str, to: &str) -> PathDiagnostics {
    let components = graph.weakly_connected_components();
    let same_component = components
        .iter()
        .any(|c| c.iter().any(|n| n == from) && c.iter().any(|n| n == to));

    let reachable = graph.reachable_from([from], &HashSet::new());
    let reachable_from_start = graph
        .all_nodes()
        .filter(|n| reachable.contains(&n.id))
        .map(|n| n.id.clone())
        .collect();
    let reaching_target = graph
        .all_nodes()
        .filter(|n| graph.reachable_from([n.id.as_str()], &HashSet::new()).contains(to))
        .map(|n| n.id.clone())
        .collect();

    PathDiagnostics {
        from: from.to_string(),
        to: to.to_string(),
        component_count: components.len(),
        same_component,
        reachable_from_start,
        reaching_target,
    }
}
