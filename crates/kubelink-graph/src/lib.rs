//! kubelink-graph: petgraph view of resolved resource references.
//!
//! Nodes are resource ids; an edge `a → b` exists for every outgoing
//! reference of `a` bound to resource `b`. The graph is rebuilt from a
//! [`ResourceMap`] whenever a query needs it and is never persisted.

mod algorithms;
mod traversal;

pub use algorithms::RefGraphStats;
pub use traversal::KustomizationRefs;

use kubelink_core::{KubelinkError, ResourceMap};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Directed reference graph over resource ids.
pub struct RefGraph {
    pub(crate) graph: DiGraph<String, String>,
    /// Map from resource ids to petgraph NodeIndex.
    pub(crate) id_to_index: HashMap<String, NodeIndex>,
    /// Nodes that are kustomizations.
    pub(crate) kustomizations: HashSet<NodeIndex>,
}

impl RefGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            id_to_index: HashMap::new(),
            kustomizations: HashSet::new(),
        }
    }

    /// Project the outgoing resource references of a resource map.
    ///
    /// References whose target no longer exists are left out.
    pub fn from_resources(resources: &ResourceMap) -> Self {
        let mut graph = Self::new();
        for resource in resources.values() {
            let idx = graph.add_node(&resource.id);
            if resource.is_kustomization() {
                graph.kustomizations.insert(idx);
            }
        }
        for resource in resources.values() {
            for reference in resource.outgoing_refs() {
                if let Some(target) = reference.target_resource_id() {
                    // Dangling targets are skipped.
                    let _ = graph.add_edge(&resource.id, target, &reference.name);
                }
            }
        }
        graph
    }

    /// Add a node if it does not exist yet and return its index.
    pub fn add_node(&mut self, id: &str) -> NodeIndex {
        if let Some(idx) = self.id_to_index.get(id) {
            return *idx;
        }
        let idx = self.graph.add_node(id.to_string());
        self.id_to_index.insert(id.to_string(), idx);
        idx
    }

    /// Add an edge between two existing nodes.
    pub fn add_edge(&mut self, src: &str, dst: &str, name: &str) -> Result<(), KubelinkError> {
        let src_idx = self.index_of(src)?;
        let dst_idx = self.index_of(dst)?;
        self.graph.add_edge(src_idx, dst_idx, name.to_string());
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id_to_index.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Ids referenced by `id` (outgoing) or referencing it (incoming), sorted.
    pub fn neighbors(&self, id: &str) -> Result<Vec<String>, KubelinkError> {
        let idx = self.index_of(id)?;
        let mut ids: Vec<String> = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .chain(self.graph.neighbors_directed(idx, Direction::Incoming))
            .filter(|n| *n != idx)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    pub(crate) fn index_of(&self, id: &str) -> Result<NodeIndex, KubelinkError> {
        self.id_to_index
            .get(id)
            .copied()
            .ok_or_else(|| KubelinkError::NotFound(format!("Resource {id}")))
    }

    pub(crate) fn id_of(&self, idx: NodeIndex) -> Option<&str> {
        self.graph.node_weight(idx).map(String::as_str)
    }
}

impl Default for RefGraph {
    fn default() -> Self {
        Self::new()
    }
}
