//! Incremental relinking.
//!
//! [`reprocess`] recomputes the references of a scope of resources derived
//! from a changed set, leaving every other resource's outgoing references
//! untouched. An empty changed set relinks everything.

use crate::kinds::KindRegistry;
use crate::kustomize::KustomizationComposer;
use crate::resolver::{mirror_incoming, ReferenceResolver, Resolution};
use kubelink_core::{
    Diagnostic, DiagnosticKind, FileMap, NamespaceResolver, ResourceId, ResourceMap, ResourceRef,
    PATCH_PREFIX,
};
use kubelink_graph::RefGraph;
use std::collections::{BTreeMap, BTreeSet};

/// Collaborators needed to link resources.
#[derive(Clone, Copy)]
pub struct LinkContext<'a> {
    pub registry: &'a KindRegistry,
    pub namespaces: &'a dyn NamespaceResolver,
}

impl<'a> LinkContext<'a> {
    pub fn new(registry: &'a KindRegistry, namespaces: &'a dyn NamespaceResolver) -> Self {
        Self {
            registry,
            namespaces,
        }
    }
}

/// What a reprocessing pass touched and found.
#[derive(Debug, Clone, Default)]
pub struct ReprocessOutcome {
    /// Resources whose outgoing references were recomputed.
    pub scope: BTreeSet<ResourceId>,
    /// Link diagnostics for the scope, including kustomization cycles.
    pub diagnostics: Vec<Diagnostic>,
}

/// Recompute references for `changed` and everything linked to it.
///
/// `changed` may name resources that no longer exist; references pointing at
/// them are recomputed and become unsatisfied.
pub fn reprocess(
    changed: &[ResourceId],
    resources: &mut ResourceMap,
    files: &FileMap,
    ctx: &LinkContext<'_>,
) -> ReprocessOutcome {
    let scope = if changed.is_empty() {
        resources.keys().cloned().collect()
    } else {
        affected_scope(changed, resources)
    };
    tracing::debug!(
        "Reprocessing {} of {} resources",
        scope.len(),
        resources.len()
    );

    clear_scope(&scope, resources);

    let mut computed: BTreeMap<ResourceId, Vec<ResourceRef>> = BTreeMap::new();
    let mut pending = Resolution::default();
    let mut patched: Vec<ResourceId> = Vec::new();
    {
        let snapshot: &ResourceMap = resources;
        let mut resolver = ReferenceResolver::new(ctx.registry, ctx.namespaces);
        resolver.index(snapshot);
        let composer = KustomizationComposer::new(files, snapshot);

        for id in &scope {
            let Some(resource) = snapshot.get(id) else {
                continue;
            };
            let mut resolution = resolver.resolve_outgoing(resource, snapshot);
            if resource.is_kustomization() {
                let composition = composer.compose(resource);
                resolution.extend(composition.resolution);
                patched.extend(composition.patched);
            }
            computed.insert(id.clone(), std::mem::take(&mut resolution.refs));
            pending.extend(resolution);
        }
    }

    for (id, mut authored) in computed {
        if let Some(resource) = resources.get_mut(&id) {
            authored.append(&mut resource.refs);
            resource.refs = authored;
        }
    }

    for id in patched {
        if let Some(resource) = resources.get_mut(&id) {
            if !resource.name.starts_with(PATCH_PREFIX) {
                resource.name = format!("{PATCH_PREFIX}{}", resource.name);
            }
        }
    }

    mirror_incoming(resources, pending.incoming);

    let mut diagnostics = pending.diagnostics;
    diagnostics.extend(cycle_diagnostics(resources));

    ReprocessOutcome { scope, diagnostics }
}

/// The changed resources plus everything whose links may have moved.
fn affected_scope(changed: &[ResourceId], resources: &ResourceMap) -> BTreeSet<ResourceId> {
    let changed: BTreeSet<&str> = changed.iter().map(String::as_str).collect();
    let changed_names: BTreeSet<&str> = changed
        .iter()
        .filter_map(|id| resources.get(*id))
        .map(|r| r.declared_name())
        .collect();

    let mut scope: BTreeSet<ResourceId> = changed
        .iter()
        .filter(|id| resources.contains_key(**id))
        .map(|id| id.to_string())
        .collect();

    for resource in resources.values() {
        let touches_changed = resource.refs.iter().any(|r| {
            r.target_resource_id().is_some_and(|target| changed.contains(target))
        });
        let dangling = resource.refs.iter().any(|r| {
            r.target_resource_id().is_some_and(|target| !resources.contains_key(target))
        });
        // A changed resource may satisfy a waiting ref or win a tie-break.
        let may_rebind = resource
            .refs
            .iter()
            .filter(|r| !r.ref_type.is_incoming())
            .any(|r| changed_names.contains(r.name.as_str()));

        if touches_changed || dangling || may_rebind || resource.is_kustomization() {
            scope.insert(resource.id.clone());
        }
        if changed.contains(resource.id.as_str()) {
            scope.extend(
                resource
                    .refs
                    .iter()
                    .filter_map(ResourceRef::target_resource_id)
                    .filter(|target| resources.contains_key(*target))
                    .map(str::to_string),
            );
        }
    }
    scope
}

/// Drop authored refs of the scope, and incoming refs mirrored from the scope
/// or from resources that no longer exist.
fn clear_scope(scope: &BTreeSet<ResourceId>, resources: &mut ResourceMap) {
    let existing: BTreeSet<ResourceId> = resources.keys().cloned().collect();
    for resource in resources.values_mut() {
        let in_scope = scope.contains(&resource.id);
        resource.refs.retain(|r| {
            if !r.ref_type.is_incoming() {
                return !in_scope;
            }
            match r.target_resource_id() {
                Some(source) => !scope.contains(source) && existing.contains(source),
                None => false,
            }
        });
    }
}

fn cycle_diagnostics(resources: &ResourceMap) -> Vec<Diagnostic> {
    let graph = RefGraph::from_resources(resources);
    let mut diagnostics = Vec::new();
    for cycle in graph.kustomization_cycles() {
        let members = cycle.join(", ");
        tracing::warn!("Kustomization cycle: {}", members);
        for id in &cycle {
            if let Some(resource) = resources.get(id) {
                diagnostics.push(Diagnostic::for_resource(
                    DiagnosticKind::CycleDetected,
                    resource,
                    format!("kustomization is part of a composition cycle ({members})"),
                ));
            }
        }
    }
    diagnostics
}
