//! Small in-memory navigation trees shared by the unit tests.

use navgraph_types::{Action, EdgeRecord, NodeRecord};

use crate::graph::NavigationGraph;

/// One `press_key` action named after the destination, so executed commands
/// are easy to assert on.
pub fn key_action(to: &str) -> Action {
    Action::new("press_key").with_param("key", serde_json::json!(to))
}

pub fn edge(from: &str, to: &str) -> EdgeRecord {
    EdgeRecord::new(from, to).with_action(key_action(to))
}

/// Plain screens (no flags) connected by the given edges, in order.
pub fn graph_of(nodes: &[&str], edges: &[(&str, &str)]) -> NavigationGraph {
    let nodes = nodes.iter().map(|id| NodeRecord::new(*id, *id)).collect();
    let edges = edges.iter().map(|(f, t)| edge(f, t)).collect();
    NavigationGraph::build(nodes, edges).unwrap()
}

/// `home <-> {A, B, C, D}`: eight edges, all bidirectional pairs at the hub.
pub fn star_graph() -> NavigationGraph {
    graph_of(
        &["home", "A", "B", "C", "D"],
        &[
            ("home", "A"),
            ("A", "home"),
            ("home", "B"),
            ("B", "home"),
            ("home", "C"),
            ("C", "home"),
            ("home", "D"),
            ("D", "home"),
        ],
    )
}

/// `entry -> home -> X -> Y`, with `home <-> X` bidirectional and no way back
/// from `Y`.
pub fn chain_graph() -> NavigationGraph {
    NavigationGraph::build(
        vec![
            NodeRecord::entry("entry"),
            NodeRecord::new("home", "home"),
            NodeRecord::new("X", "X"),
            NodeRecord::new("Y", "Y"),
        ],
        vec![
            EdgeRecord::new("entry", "home").with_action(Action::new("launch_app")),
            edge("home", "X"),
            edge("X", "home"),
            edge("X", "Y"),
        ],
    )
    .unwrap()
}

/// A hub with two leaves, one deep branch, and a cross-link:
///
/// ```text
/// entry -> home
/// home <-> A            (leaf)
/// home <-> B -> B1 <-> B2 (branch, B1 returns to B)
/// home <-> C            (leaf)
/// B2 -> C               (cross-link)
/// ```
pub fn branching_graph() -> NavigationGraph {
    NavigationGraph::build(
        vec![
            NodeRecord::entry("entry"),
            NodeRecord::new("home", "home"),
            NodeRecord::new("A", "A"),
            NodeRecord::new("B", "B"),
            NodeRecord::new("B1", "B1"),
            NodeRecord::new("B2", "B2"),
            NodeRecord::new("C", "C"),
        ],
        vec![
            EdgeRecord::new("entry", "home").with_action(Action::new("launch_app")),
            edge("home", "A"),
            edge("A", "home"),
            edge("home", "B"),
            edge("B", "home"),
            edge("B", "B1"),
            edge("B1", "B"),
            edge("B1", "B2"),
            edge("B2", "B1"),
            edge("home", "C"),
            edge("C", "home"),
            edge("B2", "C"),
        ],
    )
    .unwrap()
}
