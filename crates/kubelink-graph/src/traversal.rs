use crate::RefGraph;
use kubelink_core::KubelinkError;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashSet;

/// Result of a kustomization closure query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KustomizationRefs {
    /// Reached resource ids in preorder, without the starting kustomization.
    pub ids: Vec<String>,
    /// Set when the walk reached a kustomization already on the current path.
    pub cycle_detected: bool,
}

impl RefGraph {
    /// Resources composed by a kustomization, following nested kustomizations.
    ///
    /// With `include_parent`, kustomizations composing the starting one are
    /// included as well (without walking further up). Cycles stop the walk
    /// along that path and are reported; everything reached is still returned.
    pub fn kustomization_refs(
        &self,
        id: &str,
        include_parent: bool,
    ) -> Result<KustomizationRefs, KubelinkError> {
        let root = self.index_of(id)?;
        let mut result = KustomizationRefs::default();
        let mut seen: HashSet<NodeIndex> = HashSet::from([root]);

        if include_parent {
            for parent in self.ordered(root, Direction::Incoming) {
                if self.kustomizations.contains(&parent) && seen.insert(parent) {
                    result.ids.extend(self.id_of(parent).map(str::to_string));
                }
            }
        }

        let mut expanded: HashSet<NodeIndex> = HashSet::from([root]);
        let mut on_path: HashSet<NodeIndex> = HashSet::from([root]);
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
            vec![(root, self.ordered(root, Direction::Outgoing), 0)];

        while let Some((node, children, pos)) = stack.last_mut() {
            let Some(&child) = children.get(*pos) else {
                on_path.remove(node);
                stack.pop();
                continue;
            };
            *pos += 1;

            if seen.insert(child) {
                result.ids.extend(self.id_of(child).map(str::to_string));
            }
            if !self.kustomizations.contains(&child) {
                continue;
            }
            if on_path.contains(&child) {
                tracing::warn!(
                    "Kustomization cycle through {}",
                    self.id_of(child).unwrap_or_default()
                );
                result.cycle_detected = true;
                continue;
            }
            if expanded.insert(child) {
                on_path.insert(child);
                stack.push((child, self.ordered(child, Direction::Outgoing), 0));
            }
        }

        Ok(result)
    }

    /// Everything to highlight alongside a resource: its direct neighbours, and
    /// for kustomizations the full closure including parents.
    pub fn related(&self, id: &str) -> Result<Vec<String>, KubelinkError> {
        let mut ids = self.neighbors(id)?;
        let idx = self.index_of(id)?;
        if self.kustomizations.contains(&idx) {
            ids.extend(self.kustomization_refs(id, true)?.ids);
            ids.sort();
            ids.dedup();
        }
        Ok(ids)
    }

    /// Neighbours in the order the references were added.
    fn ordered(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self.graph.edges_directed(idx, direction).collect();
        edges.sort_by_key(|e| e.id());
        edges
            .into_iter()
            .map(|e| match direction {
                Direction::Outgoing => e.target(),
                Direction::Incoming => e.source(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::map;
    use crate::RefGraph;

    #[test]
    fn closure_recurses_through_nested_kustomizations() {
        let resources = map(
            &[
                ("overlay", "Kustomization"),
                ("base", "Kustomization"),
                ("cfg", "ConfigMap"),
                ("pod", "Pod"),
                ("patch", "Deployment"),
            ],
            &[
                ("overlay", "base"),
                ("overlay", "patch"),
                ("base", "cfg"),
                ("base", "pod"),
                ("pod", "cfg"),
            ],
        );
        let graph = RefGraph::from_resources(&resources);
        let refs = graph.kustomization_refs("overlay", false).unwrap();
        assert_eq!(refs.ids, vec!["base", "cfg", "pod", "patch"]);
        assert!(!refs.cycle_detected);
    }

    #[test]
    fn parents_are_included_on_request() {
        let resources = map(
            &[("overlay", "Kustomization"), ("base", "Kustomization"), ("cfg", "ConfigMap")],
            &[("overlay", "base"), ("base", "cfg")],
        );
        let graph = RefGraph::from_resources(&resources);
        assert_eq!(graph.kustomization_refs("base", false).unwrap().ids, vec!["cfg"]);
        assert_eq!(
            graph.kustomization_refs("base", true).unwrap().ids,
            vec!["overlay", "cfg"]
        );
    }

    #[test]
    fn cycles_terminate_and_are_reported() {
        let resources = map(
            &[("a", "Kustomization"), ("b", "Kustomization"), ("cfg", "ConfigMap")],
            &[("a", "b"), ("b", "a"), ("b", "cfg")],
        );
        let graph = RefGraph::from_resources(&resources);
        let refs = graph.kustomization_refs("a", false).unwrap();
        assert!(refs.cycle_detected);
        assert_eq!(refs.ids, vec!["b", "cfg"]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let resources = map(
            &[
                ("top", "Kustomization"),
                ("left", "Kustomization"),
                ("right", "Kustomization"),
                ("shared", "Kustomization"),
            ],
            &[("top", "left"), ("top", "right"), ("left", "shared"), ("right", "shared")],
        );
        let graph = RefGraph::from_resources(&resources);
        let refs = graph.kustomization_refs("top", false).unwrap();
        assert!(!refs.cycle_detected);
        assert_eq!(refs.ids, vec!["left", "shared", "right"]);
    }

    #[test]
    fn related_includes_closure_for_kustomizations() {
        let resources = map(
            &[("k", "Kustomization"), ("base", "Kustomization"), ("cfg", "ConfigMap")],
            &[("k", "base"), ("base", "cfg")],
        );
        let graph = RefGraph::from_resources(&resources);
        assert_eq!(graph.related("k").unwrap(), vec!["base", "cfg"]);
        assert_eq!(graph.related("cfg").unwrap(), vec!["base"]);
    }
}
