//! Kustomization composition edges.
//!
//! A `Kustomization` links to what it composes:
//! - `resources` / `bases` entries naming a folder link to the kustomization
//!   inside that folder;
//! - entries naming a file link to every resource in the file (or to the file
//!   itself when it holds none);
//! - `patchesStrategicMerge` entries link to the patch file and mark the
//!   resources in it with the patch prefix.

use crate::content::{scalars_at, ScalarLocator};
use crate::document::{base_name, join_path, parent_path, resolve_relative};
use crate::resolver::{dedupe_refs, PendingIncoming, Resolution};
use kubelink_core::{
    Diagnostic, DiagnosticKind, FileEntry, FileMap, RefPosition, RefTarget, RefType, Resource,
    ResourceId, ResourceMap, ResourceRef, KUSTOMIZATION_KIND,
};
use std::collections::HashMap;

/// File names kustomize looks for inside a folder.
pub const KUSTOMIZATION_FILE_NAMES: [&str; 3] =
    ["kustomization.yaml", "kustomization.yml", "Kustomization"];

const COMPOSED_KEYS: [&str; 2] = ["resources", "bases"];
const PATCH_KEY: &str = "patchesStrategicMerge";

/// Edges of one kustomization plus the resources its patches target.
#[derive(Debug, Clone, Default)]
pub struct Composition {
    pub resolution: Resolution,
    pub patched: Vec<ResourceId>,
}

/// Resolves kustomization entries against the document store.
pub struct KustomizationComposer<'a> {
    files: &'a FileMap,
    by_file: HashMap<&'a str, Vec<&'a Resource>>,
}

impl<'a> KustomizationComposer<'a> {
    pub fn new(files: &'a FileMap, resources: &'a ResourceMap) -> Self {
        let mut by_file: HashMap<&str, Vec<&Resource>> = HashMap::new();
        for resource in resources.values().filter(|r| r.is_local()) {
            by_file.entry(resource.file_path.as_str()).or_default().push(resource);
        }
        for list in by_file.values_mut() {
            list.sort_by_key(|r| (r.range.map(|range| range.start).unwrap_or(0), r.id.clone()));
        }
        Self { files, by_file }
    }

    /// Compute the composition edges of a kustomization resource.
    pub fn compose(&self, kustomization: &Resource) -> Composition {
        let mut composition = Composition::default();
        if !kustomization.is_kustomization() || !kustomization.is_local() {
            return composition;
        }

        let folder = parent_path(&kustomization.file_path);
        let mut locator = ScalarLocator::new(&kustomization.text);

        for key in COMPOSED_KEYS {
            let path = [key, "*"];
            for hit in scalars_at(&kustomization.content, &path) {
                let position = locator.locate(&path, &hit.value);
                self.compose_entry(kustomization, &folder, &hit.value, position, &mut composition);
            }
        }

        let path = [PATCH_KEY, "*"];
        for hit in scalars_at(&kustomization.content, &path) {
            let position = locator.locate(&path, &hit.value);
            self.patch_entry(kustomization, &folder, &hit.value, position, &mut composition);
        }

        dedupe_refs(&mut composition.resolution.refs);
        composition
    }

    fn compose_entry(
        &self,
        kustomization: &Resource,
        folder: &str,
        entry: &str,
        position: Option<RefPosition>,
        composition: &mut Composition,
    ) {
        let resolution = &mut composition.resolution;
        let Some(target) = resolve_relative(folder, entry).and_then(|path| self.files.get(&path)) else {
            unresolved(kustomization, entry, position, resolution);
            return;
        };

        if target.is_dir() {
            match self.kustomization_in(target) {
                Some(nested) => link_resource(kustomization, nested, entry, position, resolution),
                None => tracing::debug!(
                    "No kustomization in {} referenced by {}",
                    target.relative_path,
                    kustomization.file_path
                ),
            }
            return;
        }

        match self.by_file.get(target.relative_path.as_str()) {
            Some(resources) if !resources.is_empty() => {
                for resource in resources {
                    link_resource(kustomization, resource, entry, position, resolution);
                }
            }
            _ => resolution.refs.push(file_ref(RefType::Outgoing, entry, &target.relative_path, position)),
        }
    }

    fn patch_entry(
        &self,
        kustomization: &Resource,
        folder: &str,
        entry: &str,
        position: Option<RefPosition>,
        composition: &mut Composition,
    ) {
        let target = resolve_relative(folder, entry)
            .and_then(|path| self.files.get(&path))
            .filter(|f| !f.is_dir());
        let Some(target) = target else {
            unresolved(kustomization, entry, position, &mut composition.resolution);
            return;
        };

        composition
            .resolution
            .refs
            .push(file_ref(RefType::Outgoing, entry, &target.relative_path, position));
        if let Some(resources) = self.by_file.get(target.relative_path.as_str()) {
            composition.patched.extend(resources.iter().map(|r| r.id.clone()));
        }
    }

    /// The kustomization resource of a folder, if the folder has one.
    fn kustomization_in(&self, folder: &FileEntry) -> Option<&'a Resource> {
        KUSTOMIZATION_FILE_NAMES.iter().find_map(|name| {
            let path = join_path(&folder.relative_path, name);
            let entry = self.files.get(&path)?;
            let resources = self.by_file.get(path.as_str())?;
            is_kustomization_file(entry, resources).then(|| resources[0])
        })
    }
}

/// True for a file named like a kustomization that holds exactly one
/// `Kustomization` resource.
pub fn is_kustomization_file(entry: &FileEntry, resources: &[&Resource]) -> bool {
    !entry.is_dir()
        && KUSTOMIZATION_FILE_NAMES.contains(&base_name(&entry.relative_path))
        && resources.len() == 1
        && resources[0].kind == KUSTOMIZATION_KIND
}

fn link_resource(
    kustomization: &Resource,
    target: &Resource,
    entry: &str,
    position: Option<RefPosition>,
    resolution: &mut Resolution,
) {
    if target.id == kustomization.id {
        return;
    }
    resolution.refs.push(ResourceRef {
        ref_type: RefType::Outgoing,
        name: entry.to_string(),
        target: Some(RefTarget::Resource {
            resource_id: target.id.clone(),
            kind: target.kind.clone(),
        }),
        position,
    });
    resolution.incoming.push(PendingIncoming {
        target_id: target.id.clone(),
        source_id: kustomization.id.clone(),
        source_kind: kustomization.kind.clone(),
        name: entry.to_string(),
        target_path: None,
    });
}

fn unresolved(
    kustomization: &Resource,
    entry: &str,
    position: Option<RefPosition>,
    resolution: &mut Resolution,
) {
    tracing::warn!("{} references missing path {}", kustomization.file_path, entry);
    resolution.refs.push(file_ref(RefType::Unsatisfied, entry, entry, position));
    resolution.diagnostics.push(Diagnostic::for_resource(
        DiagnosticKind::UnresolvedFile,
        kustomization,
        format!("'{entry}' does not resolve to a file or folder"),
    ));
}

fn file_ref(
    ref_type: RefType,
    name: &str,
    file_path: &str,
    position: Option<RefPosition>,
) -> ResourceRef {
    ResourceRef {
        ref_type,
        name: name.to_string(),
        target: Some(RefTarget::File {
            file_path: file_path.to_string(),
        }),
        position,
    }
}
