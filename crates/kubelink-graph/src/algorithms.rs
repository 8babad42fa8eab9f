use crate::RefGraph;

/// Summary counts of a reference graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefGraphStats {
    pub resources: usize,
    pub references: usize,
    pub kustomizations: usize,
}

impl RefGraph {
    /// Groups of kustomizations that compose each other, each sorted by id.
    ///
    /// Uses Tarjan's algorithm; a component counts when it has more than one
    /// member or a kustomization composes itself.
    pub fn kustomization_cycles(&self) -> Vec<Vec<String>> {
        let sccs = petgraph::algo::tarjan_scc(&self.graph);

        let mut result: Vec<Vec<String>> = sccs
            .into_iter()
            .filter(|component| component.iter().all(|idx| self.kustomizations.contains(idx)))
            .filter(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut ids: Vec<String> = component
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx).cloned())
                    .collect();
                ids.sort();
                ids
            })
            .collect();

        result.sort();
        result
    }

    pub fn stats(&self) -> RefGraphStats {
        RefGraphStats {
            resources: self.graph.node_count(),
            references: self.graph.edge_count(),
            kustomizations: self.kustomizations.len(),
        }
    }
}
