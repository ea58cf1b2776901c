//! Per-tree cache of built navigation graphs.
//!
//! Graphs are immutable once built and shared as `Arc<NavigationGraph>`, so a
//! read lock is enough for lookups; building happens outside the lock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use navgraph_types::{NavError, Result, TreeDocument, TreeKey};
use tokio::sync::RwLock;

use crate::graph::NavigationGraph;

/// Where tree documents come from (database, files, an HTTP API).
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn load(&self, key: &TreeKey) -> Result<TreeDocument>;
}

/// Reads `<root>/<team_id>/<tree_id>.json`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, key: &TreeKey) -> PathBuf {
        self.root
            .join(&key.team_id)
            .join(format!("{}.json", key.tree_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl GraphSource for DirectorySource {
    async fn load(&self, key: &TreeKey) -> Result<TreeDocument> {
        let path = self.path_for(key);
        let data = tokio::fs::read_to_string(&path).await.map_err(|e| {
            NavError::Other(format!("Cannot read tree {key} at {}: {e}", path.display()))
        })?;
        let mut doc: TreeDocument = serde_json::from_str(&data)?;
        // The file location is authoritative for identity.
        doc.tree_id = key.tree_id.clone();
        doc.team_id = key.team_id.clone();
        Ok(doc)
    }
}

#[derive(Default)]
pub struct GraphCache {
    graphs: RwLock<HashMap<TreeKey, Arc<NavigationGraph>>>,
    home_ids: Option<Vec<String>>,
}

impl GraphCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Home ids applied to every graph this cache builds.
    pub fn with_home_ids(mut self, ids: Vec<String>) -> Self {
        self.home_ids = Some(ids);
        self
    }

    pub async fn get(&self, key: &TreeKey) -> Option<Arc<NavigationGraph>> {
        self.graphs.read().await.get(key).cloned()
    }

    /// Return the cached graph, or load and build it from `source`. Concurrent
    /// misses for the same key may both build; the first insert wins.
    pub async fn get_or_load(
        &self,
        key: &TreeKey,
        source: &dyn GraphSource,
    ) -> Result<Arc<NavigationGraph>> {
        if let Some(graph) = self.get(key).await {
            tracing::debug!(tree = %key, "Graph cache hit");
            return Ok(graph);
        }

        tracing::debug!(tree = %key, "Graph cache miss, loading");
        let doc = source.load(key).await?;
        let graph = self.build(doc)?;

        let mut graphs = self.graphs.write().await;
        let entry = graphs.entry(key.clone()).or_insert_with(|| Arc::new(graph));
        Ok(Arc::clone(entry))
    }

    fn build(&self, doc: TreeDocument) -> Result<NavigationGraph> {
        let graph = NavigationGraph::from_document(doc)?;
        Ok(match &self.home_ids {
            Some(ids) => graph.with_home_ids(ids.clone()),
            None => graph,
        })
    }

    /// Build `doc` and store it under its own key, replacing any previous
    /// graph.
    pub async fn insert(&self, doc: TreeDocument) -> Result<Arc<NavigationGraph>> {
        let key = doc.key();
        let graph = Arc::new(self.build(doc)?);
        self.graphs.write().await.insert(key, Arc::clone(&graph));
        Ok(graph)
    }

    pub async fn invalidate(&self, key: &TreeKey) -> bool {
        let removed = self.graphs.write().await.remove(key).is_some();
        if removed {
            tracing::info!(tree = %key, "Invalidated cached graph");
        }
        removed
    }

    /// Drop every team's copy of `tree_id`. Returns how many were removed.
    pub async fn invalidate_tree(&self, tree_id: &str) -> usize {
        let mut graphs = self.graphs.write().await;
        let before = graphs.len();
        graphs.retain(|key, _| key.tree_id != tree_id);
        before - graphs.len()
    }

    pub async fn clear(&self) {
        self.graphs.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.graphs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
