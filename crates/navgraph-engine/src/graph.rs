use std::collections::{HashMap, HashSet, VecDeque};

use navgraph_types::{
    EdgeActions, EdgeRecord, NavError, NodeRecord, Result, TreeDocument, TreeKey,
    VerificationSpec,
};

/// Ids treated as the home screen when no node is flagged root or labeled `home`.
pub const DEFAULT_HOME_IDS: &[&str] = &["home"];

#[derive(Debug, Clone)]
pub struct NavigationGraph {
    pub key: Option<TreeKey>,
    nodes: HashMap<String, NavNode>,
    /// Node ids in insertion order; every ordered query walks this.
    node_order: Vec<String>,
    /// Edges in creation order. Position doubles as the tie-break rank.
    edges: Vec<NavEdge>,
    edge_index: HashMap<(String, String), usize>,
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
    entry_points: Vec<String>,
    home_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NavNode {
    pub id: String,
    pub label: String,
    pub node_type: String,
    pub is_entry_point: bool,
    pub is_root: bool,
    pub verifications: Vec<VerificationSpec>,
}

impl NavNode {
    pub fn is_entry_type(&self) -> bool {
        self.node_type.eq_ignore_ascii_case("entry")
    }
}

#[derive(Debug, Clone)]
pub struct NavEdge {
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub payload: EdgeActions,
}

// --- Conversions ---

fn record_to_nav_node(record: NodeRecord) -> NavNode {
    let label = if record.label.trim().is_empty() {
        record.id.clone()
    } else {
        record.label
    };
    NavNode {
        id: record.id,
        label,
        node_type: record.node_type,
        is_entry_point: record.is_entry_point,
        is_root: record.is_root,
        verifications: record.verifications,
    }
}

fn record_to_nav_edge(record: EdgeRecord) -> NavEdge {
    NavEdge {
        from: record.from_node,
        to: record.to_node,
        label: record.label,
        payload: record.payload,
    }
}

impl NavigationGraph {
    /// Build a graph from authored records. Fails only when an edge names a
    /// node that does not exist.
    pub fn build(node_records: Vec<NodeRecord>, edge_records: Vec<EdgeRecord>) -> Result<Self> {
        let mut nodes: HashMap<String, NavNode> = HashMap::new();
        let mut node_order = Vec::new();

        for record in node_records {
            let node = record_to_nav_node(record);
            if nodes.contains_key(&node.id) {
                tracing::warn!(node = %node.id, "Duplicate node record, later record wins");
            } else {
                node_order.push(node.id.clone());
            }
            nodes.insert(node.id.clone(), node);
        }

        let mut edges: Vec<NavEdge> = Vec::new();
        let mut edge_index: HashMap<(String, String), usize> = HashMap::new();

        for record in edge_records {
            for endpoint in [&record.from_node, &record.to_node] {
                if !nodes.contains_key(endpoint) {
                    return Err(NavError::Graph(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        record.from_node, record.to_node, endpoint
                    )));
                }
            }
            let edge = record_to_nav_edge(record);
            let key = (edge.from.clone(), edge.to.clone());
            match edge_index.get(&key) {
                Some(&pos) => {
                    tracing::warn!(
                        from = %edge.from,
                        to = %edge.to,
                        "Duplicate edge record, keeping first position with later payload"
                    );
                    edges[pos] = edge;
                }
                None => {
                    edge_index.insert(key, edges.len());
                    edges.push(edge);
                }
            }
        }

        let mut outgoing: HashMap<String, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.from.clone()).or_default().push(i);
            incoming.entry(edge.to.clone()).or_default().push(i);
        }

        let mut graph = NavigationGraph {
            key: None,
            nodes,
            node_order,
            edges,
            edge_index,
            outgoing,
            incoming,
            entry_points: Vec::new(),
            home_ids: DEFAULT_HOME_IDS.iter().map(|s| s.to_string()).collect(),
        };
        graph.entry_points = graph.compute_entry_points();
        Ok(graph)
    }

    pub fn from_document(doc: TreeDocument) -> Result<Self> {
        let key = doc.key();
        let mut graph = Self::build(doc.nodes, doc.edges)?;
        graph.key = Some(key);
        Ok(graph)
    }

    /// Replace the well-known ids used as the last home-resolution fallback.
    pub fn with_home_ids(mut self, ids: Vec<String>) -> Self {
        self.home_ids = ids;
        self
    }

    fn compute_entry_points(&self) -> Vec<String> {
        let flagged: Vec<String> = self
            .all_nodes()
            .filter(|n| n.is_entry_point || n.is_entry_type())
            .map(|n| n.id.clone())
            .collect();
        if !flagged.is_empty() {
            return flagged;
        }
        self.all_nodes()
            .filter(|n| self.in_degree(&n.id) == 0)
            .map(|n| n.id.clone())
            .collect()
    }

    // --- Lookup ---

    pub fn node(&self, id: &str) -> Option<&NavNode> {
        self.nodes.get(id)
    }

    pub fn require_node(&self, id: &str) -> Result<&NavNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| NavError::UnknownNode(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn label_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.nodes.get(id).map(|n| n.label.as_str()).unwrap_or(id)
    }

    /// Nodes in insertion order.
    pub fn all_nodes(&self) -> impl Iterator<Item = &NavNode> {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Edges in creation order.
    pub fn all_edges(&self) -> &[NavEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, from: &str, to: &str) -> Option<&NavEdge> {
        self.edge_index
            .get(&(from.to_string(), to.to_string()))
            .map(|&i| &self.edges[i])
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edge(from, to).is_some()
    }

    // --- Adjacency ---

    /// Outgoing edges of `id` in creation order.
    pub fn outgoing_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NavEdge> + 'a {
        self.outgoing
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.edges[i])
    }

    pub fn incoming_edges<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a NavEdge> + 'a {
        self.incoming
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&i| &self.edges[i])
    }

    pub fn successors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.outgoing_edges(id).map(|e| e.to.as_str())
    }

    pub fn predecessors<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.incoming_edges(id).map(|e| e.from.as_str())
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.outgoing.get(id).map_or(0, Vec::len)
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.incoming.get(id).map_or(0, Vec::len)
    }

    pub fn degree(&self, id: &str) -> usize {
        self.in_degree(id) + self.out_degree(id)
    }

    // --- Roles ---

    /// Entry points in insertion order: flagged or `entry`-typed nodes, else
    /// every node without incoming edges.
    pub fn entry_points(&self) -> Vec<&NavNode> {
        self.entry_points
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn is_entry_point(&self, id: &str) -> bool {
        self.entry_points.iter().any(|e| e == id)
    }

    /// The first `entry`-typed node.
    pub fn entry_node(&self) -> Option<&NavNode> {
        self.all_nodes().find(|n| n.is_entry_type())
    }

    /// Find the home node: flagged root, else labeled `home`, else a
    /// well-known id.
    pub fn home_node(&self) -> Option<&NavNode> {
        self.all_nodes()
            .find(|n| n.is_root)
            .or_else(|| {
                self.all_nodes()
                    .find(|n| n.label.trim().eq_ignore_ascii_case("home"))
            })
            .or_else(|| self.home_ids.iter().find_map(|id| self.nodes.get(id)))
    }

    /// The highest-degree node, ties broken by insertion order.
    pub fn hub_node(&self) -> Option<&NavNode> {
        let mut best: Option<&NavNode> = None;
        for node in self.all_nodes() {
            match best {
                Some(b) if self.degree(&b.id) >= self.degree(&node.id) => {}
                _ => best = Some(node),
            }
        }
        best
    }

    // --- Reachability ---

    /// Every node reachable from `id`, excluding `id` itself unless it lies
    /// on a cycle.
    pub fn descendants(&self, id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = self.successors(id).collect();
        while let Some(current) = queue.pop_front() {
            if seen.insert(current.to_string()) {
                queue.extend(self.successors(current));
            }
        }
        seen
    }

    /// Nodes reachable from `starts` without ever entering a node in `avoid`.
    /// Starts inside `avoid` contribute nothing.
    pub fn reachable_from<'a, I>(&self, starts: I, avoid: &HashSet<String>) -> HashSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        for start in starts {
            if self.contains(start) && !avoid.contains(start) && seen.insert(start.to_string()) {
                queue.push_back(start.to_string());
            }
        }
        while let Some(current) = queue.pop_front() {
            for next in self.successors(&current) {
                if !avoid.contains(next) && seen.insert(next.to_string()) {
                    queue.push_back(next.to_string());
                }
            }
        }
        seen
    }

    /// Breadth-first visit order from `start`, following edges in creation order.
    pub fn bfs_order(&self, start: &str) -> Vec<String> {
        let mut order = Vec::new();
        if !self.contains(start) {
            return order;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start.to_string()]);
        seen.insert(start.to_string());
        while let Some(current) = queue.pop_front() {
            for next in self.successors(&current) {
                if seen.insert(next.to_string()) {
                    queue.push_back(next.to_string());
                }
            }
            order.push(current);
        }
        order
    }

    /// Kahn's algorithm, seeded in insertion order. `None` when the graph has
    /// a cycle.
    pub fn topological_order(&self) -> Option<Vec<String>> {
        let mut remaining: HashMap<&str, usize> = self
            .node_order
            .iter()
            .map(|id| (id.as_str(), self.in_degree(id)))
            .collect();
        let mut queue: VecDeque<&str> = self
            .node_order
            .iter()
            .map(String::as_str)
            .filter(|id| remaining.get(id) == Some(&0))
            .collect();

        let mut order = Vec::with_capacity(self.node_count());
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());
            for next in self.successors(current) {
                if let Some(count) = remaining.get_mut(next) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(next);
                    }
                }
            }
        }

        (order.len() == self.node_count()).then_some(order)
    }

    /// Weakly connected components, each listed in insertion order.
    pub fn weakly_connected_components(&self) -> Vec<Vec<String>> {
        let mut component_of: HashMap<&str, usize> = HashMap::new();
        let mut components: Vec<Vec<String>> = Vec::new();

        for root in &self.node_order {
            if component_of.contains_key(root.as_str()) {
                continue;
            }
            let idx = components.len();
            let mut members = HashSet::new();
            let mut queue = VecDeque::from([root.as_str()]);
            component_of.insert(root.as_str(), idx);
            while let Some(current) = queue.pop_front() {
                members.insert(current);
                for next in self.successors(current).chain(self.predecessors(current)) {
                    if !component_of.contains_key(next) {
                        component_of.insert(next, idx);
                        queue.push_back(next);
                    }
                }
            }
            components.push(
                self.node_order
                    .iter()
                    .filter(|id| members.contains(id.as_str()))
                    .cloned()
                    .collect(),
            );
        }
        components
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{chain_graph, graph_of, star_graph};

    #[test]
    fn build_simple_graph() {
        let g = graph_of(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
        assert_eq!(g.node_count(), 3);
        assert_eq!(g.edge_count(), 2);
        assert!(g.has_edge("a", "b"));
        assert!(!g.has_edge("b", "a"));
        assert_eq!(g.node("b").unwrap().label, "b");
    }

    #[test]
    fn dangling_edge_is_graph_error() {
        let result = NavigationGraph::build(
            vec![NodeRecord::new("a", "A")],
            vec![EdgeRecord::new("a", "ghost")],
        );
        match result {
            Err(NavError::Graph(msg)) => assert!(msg.contains("ghost"), "got: {msg}"),
            other => panic!("Expected Graph error, got: {other:?}"),
        }
    }

    #[test]
    fn duplicate_edge_collapses_keeping_position() {
        let g = NavigationGraph::build(
            vec![
                NodeRecord::new("a", "A"),
                NodeRecord::new("b", "B"),
                NodeRecord::new("c", "C"),
            ],
            vec![
                EdgeRecord::new("a", "b").with_action(navgraph_types::Action::new("first")),
                EdgeRecord::new("a", "c"),
                EdgeRecord::new("a", "b").with_action(navgraph_types::Action::new("second")),
            ],
        )
        .unwrap();

        assert_eq!(g.edge_count(), 2);
        assert_eq!(g.all_edges()[0].to, "b");
        assert_eq!(g.edge("a", "b").unwrap().payload.actions[0].command, "second");
    }

    #[test]
    fn successors_follow_creation_order() {
        let g = graph_of(&["a", "b", "c", "d"], &[("a", "d"), ("a", "b"), ("a", "c")]);
        let succ: Vec<_> = g.successors("a").collect();
        assert_eq!(succ, vec!["d", "b", "c"]);
        let preds: Vec<_> = g.predecessors("b").collect();
        assert_eq!(preds, vec!["a"]);
    }

    #[test]
    fn degrees() {
        let g = star_graph();
        assert_eq!(g.out_degree("home"), 4);
        assert_eq!(g.in_degree("home"), 4);
        assert_eq!(g.degree("home"), 8);
        assert_eq!(g.degree("A"), 2);
        assert_eq!(g.hub_node().unwrap().id, "home");
    }

    #[test]
    fn entry_points_prefer_flagged_nodes() {
        let g = chain_graph();
        let entries: Vec<_> = g.entry_points().iter().map(|n| n.id.clone()).collect();
        assert_eq!(entries, vec!["entry"]);
        assert_eq!(g.entry_node().unwrap().id, "entry");
    }

    #[test]
    fn entry_points_fall_back_to_sources() {
        let g = graph_of(&["r1", "x", "r2"], &[("r1", "x"), ("r2", "x")]);
        let entries: Vec<_> = g.entry_points().iter().map(|n| n.id.clone()).collect();
        assert_eq!(entries, vec!["r1", "r2"]);
        assert!(g.entry_node().is_none());
    }

    #[test]
    fn home_resolution_order() {
        // Label match
        let g = NavigationGraph::build(
            vec![NodeRecord::new("n1", "Home"), NodeRecord::new("n2", "Menu")],
            vec![],
        )
        .unwrap();
        assert_eq!(g.home_node().unwrap().id, "n1");

        // Root flag beats label
        let g = NavigationGraph::build(
            vec![NodeRecord::new("n1", "Home"), NodeRecord::new("n2", "Menu").as_root()],
            vec![],
        )
        .unwrap();
        assert_eq!(g.home_node().unwrap().id, "n2");

        // Well-known id fallback
        let g = NavigationGraph::build(
            vec![NodeRecord::new("n1", "Start"), NodeRecord::new("main", "Main")],
            vec![],
        )
        .unwrap()
        .with_home_ids(vec!["main".into()]);
        assert_eq!(g.home_node().unwrap().id, "main");
    }

    #[test]
    fn descendants_and_avoiding_reachability() {
        let g = graph_of(
            &["s", "a", "b", "c"],
            &[("s", "a"), ("s", "b"), ("a", "c"), ("b", "c")],
        );
        let desc = g.descendants("a");
        assert_eq!(desc, HashSet::from(["c".to_string()]));

        let avoid = HashSet::from(["a".to_string()]);
        let reach = g.reachable_from(["s"], &avoid);
        assert!(reach.contains("c"), "c still reachable through b");
        assert!(!reach.contains("a"));

        let avoid = HashSet::from(["a".to_string(), "b".to_string()]);
        let reach = g.reachable_from(["s"], &avoid);
        assert_eq!(reach, HashSet::from(["s".to_string()]));
    }

    #[test]
    fn topological_order_for_dag_and_none_for_cycle() {
        let g = graph_of(&["c", "b", "a"], &[("a", "b"), ("b", "c")]);
        assert_eq!(g.topological_order().unwrap(), vec!["a", "b", "c"]);

        let g = star_graph();
        assert!(g.topological_order().is_none());
    }

    #[test]
    fn bfs_order_uses_creation_order() {
        let g = graph_of(&["s", "x", "y", "z"], &[("s", "y"), ("s", "x"), ("x", "z")]);
        assert_eq!(g.bfs_order("s"), vec!["s", "y", "x", "z"]);
    }

    #[test]
    fn weak_components() {
        let g = graph_of(&["a", "b", "c", "d"], &[("a", "b"), ("d", "c")]);
        let comps = g.weakly_connected_components();
        assert_eq!(comps, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn from_document_records_key() {
        let doc = TreeDocument {
            tree_id: "t1".into(),
            team_id: "team".into(),
            nodes: vec![NodeRecord::new("a", "A")],
            edges: vec![],
        };
        let g = NavigationGraph::from_document(doc).unwrap();
        assert_eq!(g.key, Some(TreeKey::new("t1", "team")));
    }
}
