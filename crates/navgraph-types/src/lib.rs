//! Shared records, errors, and statuses for the navigation graph engine.
//!
//! This crate provides the foundational types used across the other navgraph crates:
//! - `NavError`: unified error taxonomy
//! - `NodeRecord` / `EdgeRecord` / `Action`: typed graph input records
//! - `NodeStatus` / `HealthRating`: per-node and per-run validation outcomes
//! - `TreeDocument`: serializable tree snapshot exchanged with graph sources

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Unified error type for all navgraph subsystems.
#[derive(Debug, thiserror::Error)]
pub enum NavError {
    // === Graph Errors ===
    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    // === Navigation Errors ===
    #[error("No navigation path from '{from}' to '{to}'")]
    NoPath { from: String, to: String },

    #[error("Action '{command}' failed: {message}")]
    ActionFailed { command: String, message: String },

    #[error("Action '{command}' timed out after {timeout_ms}ms")]
    ActionTimeout { command: String, timeout_ms: u64 },

    // === Verification Errors ===
    #[error("Verification failed on node '{node}': {message}")]
    Verification { node: String, message: String },

    // === Run Control ===
    #[error("Validation run cancelled")]
    Cancelled,

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl NavError {
    /// Returns `true` if the error means the device could not be driven to
    /// the intended screen (as opposed to a screen that failed its checks).
    pub fn is_navigation_failure(&self) -> bool {
        matches!(
            self,
            NavError::NoPath { .. } | NavError::ActionFailed { .. } | NavError::ActionTimeout { .. }
        )
    }

    /// Returns `true` if the error invalidates the whole run rather than a
    /// single node or edge.
    pub fn is_fatal(&self) -> bool {
        matches!(self, NavError::Graph(_) | NavError::UnknownNode(_))
    }
}

/// A convenience alias for `Result<T, NavError>`.
pub type Result<T> = std::result::Result<T, NavError>;

// ---------------------------------------------------------------------------
// Action: one opaque device command
// ---------------------------------------------------------------------------

/// One device command with its parameters and the pause that follows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default, alias = "wait_time_ms", alias = "waitTime")]
    pub wait_time_ms: u64,
}

impl Action {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            params: serde_json::Map::new(),
            wait_time_ms: 0,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_wait(mut self, wait_time_ms: u64) -> Self {
        self.wait_time_ms = wait_time_ms;
        self
    }
}

/// The action payload carried by an edge: primary list, fallback list, and
/// the settle time after the edge succeeds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeActions {
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default, rename = "retryActions", alias = "retry_actions")]
    pub retry_actions: Vec<Action>,
    #[serde(default, rename = "finalWaitTimeMs", alias = "final_wait_time_ms")]
    pub final_wait_time_ms: u64,
}

impl EdgeActions {
    pub fn has_retry(&self) -> bool {
        !self.retry_actions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Verifications: opaque to the engine, interpreted by the verifier
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSpec {
    #[serde(default)]
    pub command: String,
    #[serde(rename = "type", default)]
    pub verification_type: Option<String>,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl VerificationSpec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub message: String,
}

impl VerificationResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Node and edge records: what a graph source hands to the engine
// ---------------------------------------------------------------------------

fn default_node_type() -> String {
    "screen".to_string()
}

/// A UI screen as authored in a navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub is_entry_point: bool,
    /// Marks the home screen explicitly.
    #[serde(default)]
    pub is_root: bool,
    #[serde(default)]
    pub verifications: Vec<VerificationSpec>,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            node_type: default_node_type(),
            is_entry_point: false,
            is_root: false,
            verifications: Vec::new(),
        }
    }

    /// An `entry`-typed node, flagged as an entry point.
    pub fn entry(id: impl Into<String>) -> Self {
        let id = id.into();
        let label = id.to_uppercase();
        Self {
            node_type: "entry".to_string(),
            is_entry_point: true,
            ..Self::new(id, label)
        }
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = node_type.into();
        self
    }

    pub fn as_root(mut self) -> Self {
        self.is_root = true;
        self
    }

    pub fn with_verification(mut self, spec: VerificationSpec) -> Self {
        self.verifications.push(spec);
        self
    }
}

/// A directed transition as authored in a navigation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(alias = "source")]
    pub from_node: String,
    #[serde(alias = "target")]
    pub to_node: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(flatten)]
    pub payload: EdgeActions,
}

impl EdgeRecord {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from_node: from.into(),
            to_node: to.into(),
            label: None,
            payload: EdgeActions::default(),
        }
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.payload.actions.push(action);
        self
    }

    pub fn with_retry_action(mut self, action: Action) -> Self {
        self.payload.retry_actions.push(action);
        self
    }

    pub fn with_final_wait(mut self, ms: u64) -> Self {
        self.payload.final_wait_time_ms = ms;
        self
    }
}

// ---------------------------------------------------------------------------
// TreeKey / TreeDocument: identity and interchange format of a tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeKey {
    pub tree_id: String,
    pub team_id: String,
}

impl TreeKey {
    pub fn new(tree_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            team_id: team_id.into(),
        }
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.team_id, self.tree_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDocument {
    #[serde(default)]
    pub tree_id: String,
    #[serde(default)]
    pub team_id: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<EdgeRecord>,
}

impl TreeDocument {
    pub fn key(&self) -> TreeKey {
        TreeKey::new(self.tree_id.clone(), self.team_id.clone())
    }

    /// Serialize this tree to JSON and write it to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Read a tree from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let tree: Self = serde_json::from_str(&data)?;
        Ok(tree)
    }
}

// ---------------------------------------------------------------------------
// NodeStatus: lifecycle of a node within one validation run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Validated,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Resolved nodes never return to `Pending`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, NodeStatus::Pending)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Validated => "validated",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// HealthRating: qualitative summary of a validation run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthRating {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl HealthRating {
    /// Rate a run by validated / attempted. Zero attempts rates `Poor`.
    pub fn from_counts(validated: usize, attempted: usize) -> Self {
        if attempted == 0 {
            return HealthRating::Poor;
        }
        Self::from_ratio(validated as f64 / attempted as f64)
    }

    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.9 {
            HealthRating::Excellent
        } else if ratio >= 0.7 {
            HealthRating::Good
        } else if ratio >= 0.5 {
            HealthRating::Fair
        } else {
            HealthRating::Poor
        }
    }
}

impl fmt::Display for HealthRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthRating::Excellent => "excellent",
            HealthRating::Good => "good",
            HealthRating::Fair => "fair",
            HealthRating::Poor => "poor",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_graph() {
        let err = NavError::Graph("edge a -> b references unknown node 'b'".into());
        assert_eq!(
            err.to_string(),
            "Graph error: edge a -> b references unknown node 'b'"
        );
    }

    #[test]
    fn error_display_no_path() {
        let err = NavError::NoPath {
            from: "home".into(),
            to: "settings".into(),
        };
        assert_eq!(
            err.to_string(),
            "No navigation path from 'home' to 'settings'"
        );
    }

    #[test]
    fn error_display_action_timeout() {
        let err = NavError::ActionTimeout {
            command: "press_key".into(),
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "Action 'press_key' timed out after 5000ms");
    }

    #[test]
    fn error_display_verification() {
        let err = NavError::Verification {
            node: "live_tv".into(),
            message: "image not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "Verification failed on node 'live_tv': image not found"
        );
    }

    // --- classification ---

    #[test]
    fn navigation_failures_are_classified() {
        assert!(NavError::NoPath {
            from: "a".into(),
            to: "b".into()
        }
        .is_navigation_failure());
        assert!(NavError::ActionFailed {
            command: "press_key".into(),
            message: "device offline".into()
        }
        .is_navigation_failure());
        assert!(!NavError::Verification {
            node: "a".into(),
            message: "x".into()
        }
        .is_navigation_failure());
    }

    #[test]
    fn graph_errors_are_fatal() {
        assert!(NavError::Graph("bad".into()).is_fatal());
        assert!(NavError::UnknownNode("x".into()).is_fatal());
        assert!(!NavError::Cancelled.is_fatal());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: NavError = json_err.into();
        assert!(matches!(err, NavError::Json(_)));
    }

    // --- records ---

    #[test]
    fn action_uses_camel_case_wait_time() {
        let action: Action =
            serde_json::from_str(r#"{"command":"press_key","params":{"key":"OK"},"waitTimeMs":500}"#)
                .unwrap();
        assert_eq!(action.command, "press_key");
        assert_eq!(action.params.get("key"), Some(&serde_json::json!("OK")));
        assert_eq!(action.wait_time_ms, 500);

        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["waitTimeMs"], serde_json::json!(500));
    }

    #[test]
    fn edge_record_accepts_source_target_aliases() {
        let edge: EdgeRecord = serde_json::from_str(
            r#"{
                "source": "home",
                "target": "settings",
                "actions": [{"command": "press_key", "params": {"key": "RIGHT"}}],
                "retryActions": [{"command": "press_key", "params": {"key": "OK"}, "waitTimeMs": 200}],
                "finalWaitTimeMs": 1000
            }"#,
        )
        .unwrap();
        assert_eq!(edge.from_node, "home");
        assert_eq!(edge.to_node, "settings");
        assert_eq!(edge.payload.actions.len(), 1);
        assert_eq!(edge.payload.retry_actions[0].wait_time_ms, 200);
        assert_eq!(edge.payload.final_wait_time_ms, 1000);
        assert!(edge.payload.has_retry());
    }

    #[test]
    fn edge_record_defaults_missing_retry_actions() {
        let edge: EdgeRecord =
            serde_json::from_str(r#"{"from_node": "a", "to_node": "b"}"#).unwrap();
        assert!(edge.payload.actions.is_empty());
        assert!(!edge.payload.has_retry());
        assert_eq!(edge.payload.final_wait_time_ms, 0);
    }

    #[test]
    fn node_record_defaults() {
        let node: NodeRecord = serde_json::from_str(r#"{"id": "guide"}"#).unwrap();
        assert_eq!(node.node_type, "screen");
        assert!(!node.is_entry_point);
        assert!(!node.is_root);
        assert!(node.verifications.is_empty());
    }

    #[test]
    fn node_record_reads_type_field() {
        let node: NodeRecord =
            serde_json::from_str(r#"{"id": "entry", "label": "ENTRY", "type": "entry"}"#).unwrap();
        assert_eq!(node.node_type, "entry");
    }

    #[test]
    fn tree_document_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.json");

        let doc = TreeDocument {
            tree_id: "tree-1".into(),
            team_id: "team-a".into(),
            nodes: vec![NodeRecord::entry("entry"), NodeRecord::new("home", "home")],
            edges: vec![EdgeRecord::new("entry", "home").with_action(Action::new("launch_app"))],
        };
        doc.save(&path).unwrap();
        let loaded = TreeDocument::load(&path).unwrap();

        assert_eq!(loaded.key(), TreeKey::new("tree-1", "team-a"));
        assert_eq!(loaded.nodes, doc.nodes);
        assert_eq!(loaded.edges, doc.edges);
    }

    #[test]
    fn tree_key_display() {
        assert_eq!(TreeKey::new("tree-1", "team-a").to_string(), "team-a/tree-1");
    }

    // --- statuses ---

    #[test]
    fn node_status_serializes_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Validated).unwrap(),
            "\"validated\""
        );
        assert_eq!(
            serde_json::to_string(&NodeStatus::Skipped).unwrap(),
            "\"skipped\""
        );
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(NodeStatus::Failed.is_terminal());
    }

    #[test]
    fn health_boundaries_are_inclusive() {
        assert_eq!(HealthRating::from_counts(9, 10), HealthRating::Excellent);
        assert_eq!(HealthRating::from_counts(7, 10), HealthRating::Good);
        assert_eq!(HealthRating::from_counts(5, 10), HealthRating::Fair);
        assert_eq!(HealthRating::from_counts(4, 10), HealthRating::Poor);
    }

    #[test]
    fn health_with_no_attempts_is_poor() {
        assert_eq!(HealthRating::from_counts(0, 0), HealthRating::Poor);
        assert_eq!(HealthRating::Poor.to_string(), "poor");
    }
}
