//! Edge validation sequencing.
//!
//! Orders every edge of a navigation graph so that a device can walk them
//! with as little "navigate but don't validate" travel as possible: entry
//! edges first, then hub leaves as back-to-back forward/return pairs, then
//! each branch drained depth-first before returning to the hub, then a
//! sweep of whatever is left.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use navgraph_types::EdgeActions;
use serde::{Deserialize, Serialize};

use crate::graph::NavigationGraph;
use crate::pathfinder::{distance, find_transitions};

/// Why a step sits where it does in the sequence. Reporting only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationTag {
    EntryEdge,
    LeafForward,
    LeafReturn,
    BranchForward,
    BranchReturn,
    DeepForward,
    DeepReturn,
    RemainingEdge,
}

impl fmt::Display for OptimizationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OptimizationTag::EntryEdge => "entry_edge",
            OptimizationTag::LeafForward => "leaf_forward",
            OptimizationTag::LeafReturn => "leaf_return",
            OptimizationTag::BranchForward => "branch_forward",
            OptimizationTag::BranchReturn => "branch_return",
            OptimizationTag::DeepForward => "deep_forward",
            OptimizationTag::DeepReturn => "deep_return",
            OptimizationTag::RemainingEdge => "remaining_edge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStep {
    pub step_number: usize,
    pub from_node: String,
    pub to_node: String,
    pub from_label: String,
    pub to_label: String,
    #[serde(flatten)]
    pub payload: EdgeActions,
    pub optimization_tag: OptimizationTag,
}

/// A node being drained during a branch excursion.
struct Frame {
    node: String,
    parent: String,
    children: Vec<String>,
    next: usize,
}

struct SequenceBuilder<'g> {
    graph: &'g NavigationGraph,
    visited: HashSet<(String, String)>,
    steps: Vec<ValidationStep>,
}

impl<'g> SequenceBuilder<'g> {
    fn new(graph: &'g NavigationGraph) -> Self {
        Self {
            graph,
            visited: HashSet::new(),
            steps: Vec::with_capacity(graph.edge_count()),
        }
    }

    fn is_visited(&self, from: &str, to: &str) -> bool {
        self.visited.contains(&(from.to_string(), to.to_string()))
    }

    /// Append the edge as the next step. Returns `false` when the edge does
    /// not exist or was already emitted.
    fn emit(&mut self, from: &str, to: &str, tag: OptimizationTag) -> bool {
        if self.is_visited(from, to) {
            return false;
        }
        let Some(edge) = self.graph.edge(from, to) else {
            return false;
        };
        self.visited.insert((from.to_string(), to.to_string()));
        self.steps.push(ValidationStep {
            step_number: self.steps.len() + 1,
            from_node: edge.from.clone(),
            to_node: edge.to.clone(),
            from_label: self.graph.label_of(&edge.from).to_string(),
            to_label: self.graph.label_of(&edge.to).to_string(),
            payload: edge.payload.clone(),
            optimization_tag: tag,
        });
        true
    }

    /// Drain everything reachable from `root` depth-first, then return to
    /// `hub`. Never descends back into the hub or into a node on the current
    /// excursion path.
    fn drain_branch(
        &mut self,
        hub: &str,
        root: &str,
        adjacency: &HashMap<String, Vec<String>>,
        explored: &mut HashSet<String>,
    ) {
        let children_of = |id: &str| adjacency.get(id).cloned().unwrap_or_default();

        explored.insert(root.to_string());
        let mut stack = vec![Frame {
            node: root.to_string(),
            parent: hub.to_string(),
            children: children_of(root),
            next: 0,
        }];

        loop {
            let next_child = match stack.last_mut() {
                None => break,
                Some(frame) if frame.next < frame.children.len() => {
                    frame.next += 1;
                    Some((frame.node.clone(), frame.children[frame.next - 1].clone()))
                }
                Some(_) => None,
            };

            let Some((node, child)) = next_child else {
                let Some(done) = stack.pop() else { break };
                let tag = if stack.is_empty() {
                    OptimizationTag::BranchReturn
                } else {
                    OptimizationTag::DeepReturn
                };
                self.emit(&done.node, &done.parent, tag);
                continue;
            };

            if child == hub || stack.iter().any(|f| f.node == child) {
                continue;
            }
            if self.is_visited(&node, &child) {
                continue;
            }
            if explored.contains(&child) {
                // Already drained elsewhere: only worth a visit when we can
                // come straight back.
                if !self.is_visited(&child, &node) && self.graph.has_edge(&child, &node) {
                    self.emit(&node, &child, OptimizationTag::DeepForward);
                    self.emit(&child, &node, OptimizationTag::DeepReturn);
                }
                continue;
            }

            self.emit(&node, &child, OptimizationTag::DeepForward);
            explored.insert(child.clone());
            stack.push(Frame {
                children: children_of(&child),
                node: child,
                parent: node,
                next: 0,
            });
        }
    }
}

fn is_entry_edge(graph: &NavigationGraph, from: &str) -> bool {
    graph
        .node(from)
        .is_some_and(|n| n.is_entry_type() && !n.label.trim().eq_ignore_ascii_case("HOME"))
}

/// The node the hub-centric passes are anchored on.
fn sequence_start(graph: &NavigationGraph, entry_targets: &[String]) -> Option<String> {
    graph
        .entry_points()
        .into_iter()
        .find(|n| !n.is_entry_type())
        .map(|n| n.id.clone())
        .or_else(|| entry_targets.first().cloned())
        .or_else(|| graph.hub_node().map(|n| n.id.clone()))
}

/// Order every edge of `graph` exactly once, minimizing navigation between
/// consecutive steps.
pub fn build_edge_validation_sequence(graph: &NavigationGraph) -> Vec<ValidationStep> {
    let mut builder = SequenceBuilder::new(graph);

    // Step 1: entry edges
    let mut entry_targets = Vec::new();
    for edge in graph.all_edges() {
        if is_entry_edge(graph, &edge.from)
            && builder.emit(&edge.from, &edge.to, OptimizationTag::EntryEdge)
        {
            entry_targets.push(edge.to.clone());
        }
    }

    // Step 2: start node
    let Some(start) = sequence_start(graph, &entry_targets) else {
        return builder.steps;
    };

    // Step 3: forward adjacency over regular edges, sorted for determinism
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for edge in graph.all_edges() {
        if !is_entry_edge(graph, &edge.from) {
            adjacency
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
        }
    }
    for neighbors in adjacency.values_mut() {
        neighbors.sort();
    }

    let hub_neighbors: Vec<String> = adjacency
        .get(&start)
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .filter(|t| *t != start)
        .collect();
    let is_leaf = |t: &str| match adjacency.get(t) {
        None => true,
        Some(n) => n.is_empty() || (n.len() == 1 && n[0] == start),
    };

    // Step 4: leaf pass
    let mut explored: HashSet<String> = HashSet::from([start.clone()]);
    for t in hub_neighbors.iter().filter(|t| is_leaf(t.as_str())) {
        if builder.emit(&start, t, OptimizationTag::LeafForward) {
            builder.emit(t, &start, OptimizationTag::LeafReturn);
        }
        explored.insert(t.clone());
    }

    // Step 5: branch pass
    for t in hub_neighbors.iter().filter(|t| !is_leaf(t.as_str())) {
        if !builder.emit(&start, t, OptimizationTag::BranchForward) {
            continue;
        }
        if explored.contains(t) {
            builder.emit(t, &start, OptimizationTag::BranchReturn);
            continue;
        }
        builder.drain_branch(&start, t, &adjacency, &mut explored);
    }

    // Step 6: sweep
    for edge in graph.all_edges() {
        builder.emit(&edge.from, &edge.to, OptimizationTag::RemainingEdge);
    }

    tracing::debug!(
        start = %start,
        steps = builder.steps.len(),
        edges = graph.edge_count(),
        "Built edge validation sequence"
    );
    builder.steps
}

// ---------------------------------------------------------------------------
// Efficiency analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EfficiencyRating {
    Excellent,
    Good,
    Average,
    NeedsImprovement,
}

impl fmt::Display for EfficiencyRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EfficiencyRating::Excellent => "Excellent",
            EfficiencyRating::Good => "Good",
            EfficiencyRating::Average => "Average",
            EfficiencyRating::NeedsImprovement => "Needs improvement",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceAnalysis {
    /// Validations plus the navigation-only hops needed between them.
    pub total_steps: usize,
    pub edge_validations: usize,
    pub navigation_hops: usize,
    /// Consecutive steps where the next one does not start where the last ended.
    pub navigation_gaps: usize,
    pub bidirectional_pairs: usize,
    pub bidirectional_immediate: usize,
    pub efficiency_ratio: f64,
    pub rating: EfficiencyRating,
    pub tag_counts: BTreeMap<OptimizationTag, usize>,
}

fn rate(ratio: f64, bidirectional_fraction: f64) -> EfficiencyRating {
    if ratio >= 0.9 && bidirectional_fraction >= 0.8 {
        EfficiencyRating::Excellent
    } else if ratio >= 0.75 && bidirectional_fraction >= 0.5 {
        EfficiencyRating::Good
    } else if ratio >= 0.5 {
        EfficiencyRating::Average
    } else {
        EfficiencyRating::NeedsImprovement
    }
}

/// Hops needed to get from `from` to `to` between two steps. An unreachable
/// gap is priced as a fresh route from the app entry.
fn gap_cost(graph: &NavigationGraph, from: &str, to: &str) -> usize {
    distance(graph, from, to)
        .or_else(|| {
            find_transitions(graph, to, None)
                .ok()
                .map(|nav| nav.transitions().len())
        })
        .unwrap_or(1)
        .max(1)
}

pub fn analyze_sequence(graph: &NavigationGraph, steps: &[ValidationStep]) -> SequenceAnalysis {
    let edge_validations = steps.len();

    let mut navigation_hops = 0;
    let mut navigation_gaps = 0;
    let mut bidirectional_immediate = 0;
    for pair in steps.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.to_node != next.from_node {
            navigation_gaps += 1;
            navigation_hops += gap_cost(graph, &prev.to_node, &next.from_node);
        }
        if prev.from_node == next.to_node && prev.to_node == next.from_node {
            bidirectional_immediate += 1;
        }
    }

    let in_sequence: HashSet<(&str, &str)> = steps
        .iter()
        .map(|s| (s.from_node.as_str(), s.to_node.as_str()))
        .collect();
    let bidirectional_pairs = in_sequence
        .iter()
        .filter(|(a, b)| a < b && in_sequence.contains(&(*b, *a)))
        .count();

    let mut tag_counts = BTreeMap::new();
    for step in steps {
        *tag_counts.entry(step.optimization_tag).or_insert(0) += 1;
    }

    let total_steps = edge_validations + navigation_hops;
    let efficiency_ratio = if total_steps == 0 {
        1.0
    } else {
        edge_validations as f64 / total_steps as f64
    };
    let bidirectional_fraction = if bidirectional_pairs == 0 {
        1.0
    } else {
        bidirectional_immediate as f64 / bidirectional_pairs as f64
    };

    SequenceAnalysis {
        total_steps,
        edge_validations,
        navigation_hops,
        navigation_gaps,
        bidirectional_pairs,
        bidirectional_immediate,
        efficiency_ratio,
        rating: rate(efficiency_ratio, bidirectional_fraction),
        tag_counts,
    }
}
