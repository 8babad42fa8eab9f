//! The resource engine: one owner for the document store, the resource map
//! and the diagnostics, with every mutation going through `&mut self`.
//!
//! Each mutation finishes extraction and relinking before it returns, so
//! readers always observe a linked resource set.

use crate::document::{is_under, resources_for_path, DocumentStore};
use crate::extractor::{
    build_resource, extract_resources_from_file, is_separator, parse_resource_text,
    reconcile_identities, refresh_metadata, Extraction, IdentityMap,
};
use crate::indexer::{Indexer, ScanResult};
use crate::kinds::KindRegistry;
use crate::kustomize::is_kustomization_file;
use crate::reprocess::{reprocess, LinkContext};
use chrono::{DateTime, Utc};
use kubelink_core::{
    Diagnostic, FileEvent, FileMap, KubelinkConfig, KubelinkError, NamespaceResolver, RefTarget,
    Resource, ResourceId, ResourceMap, ResourceRange, ScanConfig, StaticNamespace, PREVIEW_PREFIX,
    UNSAVED_PREFIX,
};
use kubelink_graph::{KustomizationRefs, RefGraph};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Parameters for [`ResourceEngine::create_resource`].
#[derive(Debug, Clone, Default)]
pub struct NewResource {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    /// Defaults to the kind's registered API version.
    pub api_version: Option<String>,
    /// Existing file to append the resource to; otherwise it stays unsaved.
    pub target_file: Option<String>,
}

/// Owns the document store and resource map of one root folder.
pub struct ResourceEngine {
    registry: KindRegistry,
    namespaces: Box<dyn NamespaceResolver>,
    indexer: Indexer,
    store: DocumentStore,
    resources: ResourceMap,
    /// Parse diagnostics by file path.
    file_diagnostics: BTreeMap<String, Vec<Diagnostic>>,
    /// Link diagnostics by resource id.
    link_diagnostics: BTreeMap<ResourceId, Vec<Diagnostic>>,
    selected_resource: Option<ResourceId>,
    selected_path: Option<String>,
    preview_source: Option<String>,
}

impl ResourceEngine {
    /// Create an engine for `root`. Nothing is read until [`Self::rescan`].
    pub fn new(
        root: &Path,
        registry: KindRegistry,
        namespaces: Box<dyn NamespaceResolver>,
        scan: &ScanConfig,
    ) -> Result<Self, KubelinkError> {
        Ok(Self {
            registry,
            namespaces,
            indexer: Indexer::new(scan)?,
            store: DocumentStore::new(root),
            resources: ResourceMap::new(),
            file_diagnostics: BTreeMap::new(),
            link_diagnostics: BTreeMap::new(),
            selected_resource: None,
            selected_path: None,
            preview_source: None,
        })
    }

    /// Create an engine with the built-in kinds and the configured namespace.
    pub fn from_config(root: &Path, config: &KubelinkConfig) -> Result<Self, KubelinkError> {
        Self::new(
            root,
            KindRegistry::with_defaults(),
            Box::new(StaticNamespace(config.resolver.default_namespace.clone())),
            &config.scan,
        )
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn files(&self) -> &FileMap {
        self.store.files()
    }

    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn selected_resource(&self) -> Option<&str> {
        self.selected_resource.as_deref()
    }

    pub fn selected_path(&self) -> Option<&str> {
        self.selected_path.as_deref()
    }

    pub fn preview_source(&self) -> Option<&str> {
        self.preview_source.as_deref()
    }

    /// All current parse and link diagnostics.
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.file_diagnostics
            .values()
            .chain(self.link_diagnostics.values())
            .flatten()
            .collect()
    }

    /// Resources of a file, or of every file below a folder, in file then range order.
    pub fn resources_for_path(&self, relative_path: &str) -> Vec<&Resource> {
        match self.store.get(relative_path) {
            Some(entry) if entry.is_dir() => {
                let mut found: Vec<&Resource> = self
                    .resources
                    .values()
                    .filter(|r| r.is_local() && is_under(&r.file_path, relative_path))
                    .collect();
                found.sort_by_key(|r| (r.file_path.clone(), r.range.map(|range| range.start)));
                found
            }
            _ => resources_for_path(relative_path, &self.resources),
        }
    }

    /// True if the path is a kustomization file holding a single Kustomization.
    pub fn is_kustomization_file(&self, relative_path: &str) -> bool {
        self.store
            .get(relative_path)
            .is_some_and(|entry| is_kustomization_file(entry, &resources_for_path(relative_path, &self.resources)))
    }

    /// Graph projection of the current references.
    pub fn graph(&self) -> RefGraph {
        RefGraph::from_resources(&self.resources)
    }

    /// Resources composed by a kustomization, optionally with its parents.
    pub fn kustomization_refs(
        &self,
        id: &str,
        include_parent: bool,
    ) -> Result<KustomizationRefs, KubelinkError> {
        let resource = self
            .resources
            .get(id)
            .ok_or_else(|| KubelinkError::NotFound(format!("Resource {id}")))?;
        if !resource.is_kustomization() {
            return Ok(KustomizationRefs::default());
        }
        self.graph().kustomization_refs(id, include_parent)
    }

    /// Container images in use: `name:tag` → ids of the resources using it.
    pub fn images(&self) -> BTreeMap<String, Vec<ResourceId>> {
        let mut images: BTreeMap<String, Vec<ResourceId>> = BTreeMap::new();
        for resource in self.resources.values() {
            for reference in resource.outgoing_refs() {
                if let Some(RefTarget::Image { name, tag }) = &reference.target {
                    let users = images.entry(format!("{name}:{tag}")).or_default();
                    if !users.contains(&resource.id) {
                        users.push(resource.id.clone());
                    }
                }
            }
        }
        images
    }

    // ── Scanning and path events ────────────────────────────────────────────

    /// Switch to a new root folder and scan it.
    pub fn open_folder(&mut self, root: &Path) -> Result<ScanResult, KubelinkError> {
        self.store = DocumentStore::new(root);
        self.rescan()
    }

    /// Drop all state and scan the root folder again.
    ///
    /// The extracted resources are moved into the engine; the returned result
    /// carries the counters and diagnostics.
    pub fn rescan(&mut self) -> Result<ScanResult, KubelinkError> {
        self.store = DocumentStore::new(&self.store.root().to_path_buf());
        self.resources.clear();
        self.file_diagnostics.clear();
        self.link_diagnostics.clear();
        self.selected_resource = None;
        self.selected_path = None;
        self.preview_source = None;

        let mut result = self.indexer.scan_folder(&mut self.store)?;
        self.insert_extracted(std::mem::take(&mut result.resources), &result.diagnostics);
        self.relink(&[]);
        Ok(result)
    }

    /// Apply one event from a document store provider.
    pub fn handle_event(&mut self, event: &FileEvent) -> Result<(), KubelinkError> {
        match event {
            FileEvent::Added(path) => self.path_added(path),
            FileEvent::Changed(path) => self.file_changed(path),
            FileEvent::Removed(path) => self.path_removed(path),
        }
    }

    /// A file or folder appeared. Known files are reloaded.
    pub fn path_added(&mut self, path: &Path) -> Result<(), KubelinkError> {
        let Some(relative) = self.relative_or_ignore(path) else {
            return Ok(());
        };
        if self.store.get(&relative).is_some_and(|e| !e.is_dir()) {
            return self.reload_file(&relative, path);
        }
        if !path.exists() {
            tracing::debug!("{} vanished before it could be added", path.display());
            return Ok(());
        }

        let mut result = self.indexer.scan_path(&mut self.store, path)?;
        let added: Vec<ResourceId> = result.resources.iter().map(|r| r.id.clone()).collect();
        tracing::debug!("Added {} with {} resources", relative, added.len());
        self.insert_extracted(std::mem::take(&mut result.resources), &result.diagnostics);
        self.relink_after_file_change(added);
        Ok(())
    }

    /// A file's contents changed. Unknown files are treated as added.
    pub fn file_changed(&mut self, path: &Path) -> Result<(), KubelinkError> {
        let Some(relative) = self.relative_or_ignore(path) else {
            return Ok(());
        };
        match self.store.get(&relative) {
            Some(entry) if !entry.is_dir() => self.reload_file(&relative, path),
            Some(_) => Ok(()),
            None => self.path_added(path),
        }
    }

    /// A file or folder disappeared, taking its descendants and their resources.
    pub fn path_removed(&mut self, path: &Path) -> Result<(), KubelinkError> {
        let Some(relative) = self.relative_or_ignore(path) else {
            return Ok(());
        };
        if !self.store.contains(&relative) {
            tracing::debug!("Ignoring removal of unknown path {}", relative);
            return Ok(());
        }

        let removed_paths: BTreeSet<String> = self.store.remove(&relative).into_iter().collect();
        let removed = self.remove_resources_where(|r| removed_paths.contains(&r.file_path));
        self.indexer.change_detector_mut().forget(&relative);
        self.file_diagnostics.retain(|path, _| !removed_paths.contains(path));
        if self
            .selected_path
            .as_deref()
            .is_some_and(|selected| is_under(selected, &relative))
        {
            self.selected_path = None;
        }

        tracing::debug!("Removed {} with {} resources", relative, removed.len());
        self.relink_after_file_change(removed);
        self.refresh_highlights();
        Ok(())
    }

    /// Re-read a known file and re-extract it if its text changed.
    fn reload_file(&mut self, relative: &str, path: &Path) -> Result<(), KubelinkError> {
        let read = self.indexer.read_file(path)?;
        let text = read.text.filter(|_| self.indexer.is_parsable(relative));

        let Some(text) = text else {
            // No longer parsable: keep the entry, drop its resources.
            if let Some(entry) = self.store.get_mut(relative) {
                entry.text = None;
                entry.timestamp = read.timestamp;
                entry.is_dirty = false;
            }
            self.indexer.change_detector_mut().forget(relative);
            self.file_diagnostics.remove(relative);
            let removed = self.remove_resources_where(|r| r.file_path == relative);
            self.relink_after_file_change(removed);
            return Ok(());
        };

        if !self.indexer.change_detector().is_changed(relative, &text) {
            tracing::debug!("{} unchanged, skipping", relative);
            return Ok(());
        }

        let identities = self.replace_file_resources(relative, &text);

        self.indexer.change_detector_mut().record(relative, &text);
        if let Some(entry) = self.store.get_mut(relative) {
            entry.text = Some(text);
            entry.timestamp = read.timestamp;
            entry.is_dirty = false;
        }

        tracing::debug!(
            "Reloaded {}: {} kept, {} added, {} removed",
            relative,
            identities.carried.len(),
            identities.added.len(),
            identities.removed.len()
        );
        self.relink_after_file_change(identities.touched());
        self.refresh_highlights();
        Ok(())
    }

    // ── Editing and saving ──────────────────────────────────────────────────

    /// Replace a resource's text.
    ///
    /// The text is parsed first; on failure the error is returned and nothing
    /// changes. Otherwise the file text is spliced, later ranges in the same
    /// file shift, the resource is relinked and marked dirty, and it loses its
    /// selection.
    pub fn update_resource(&mut self, id: &str, text: &str) -> Result<(), KubelinkError> {
        let resource = self
            .resources
            .get(id)
            .ok_or_else(|| KubelinkError::NotFound(format!("Resource {id}")))?;
        let text = preserve_framing(&resource.text, text);
        let content = parse_resource_text(&resource.file_path, &text)?;
        let file_path = resource.file_path.clone();
        let old_range = resource.range;

        let mut new_range = None;
        if let Some(range) = old_range {
            let spliced = self
                .store
                .get_mut(&file_path)
                .and_then(|entry| {
                    let file_text = entry.text.as_mut()?;
                    let span = range.start..range.end();
                    if span.end > file_text.len()
                        || !file_text.is_char_boundary(span.start)
                        || !file_text.is_char_boundary(span.end)
                    {
                        return None;
                    }
                    file_text.replace_range(span, &text);
                    entry.is_dirty = true;
                    Some(())
                })
                .is_some();

            if spliced {
                new_range = Some(ResourceRange {
                    start: range.start,
                    length: text.len(),
                });
                for other in self.resources.values_mut() {
                    if other.id == id || other.file_path != file_path {
                        continue;
                    }
                    if let Some(other_range) = other.range.as_mut() {
                        if other_range.start >= range.end() {
                            other_range.start = other_range.start + text.len() - range.length;
                        }
                    }
                }
            } else {
                tracing::warn!("Could not splice {} into {}", id, file_path);
            }
        }

        if let Some(resource) = self.resources.get_mut(id) {
            resource.text = text;
            resource.content = content;
            refresh_metadata(resource);
            resource.range = new_range.or(old_range);
            resource.is_dirty = true;
            resource.is_selected = false;
        }
        if self.selected_resource.as_deref() == Some(id) {
            self.selected_resource = None;
        }

        self.relink(&[id.to_string()]);
        self.refresh_highlights();
        Ok(())
    }

    /// Write the file holding a resource to disk.
    ///
    /// The whole file text is written, so pending edits of sibling resources
    /// are saved with it. On failure nothing changes.
    pub fn save_resource(&mut self, id: &str) -> Result<(), KubelinkError> {
        let resource = self
            .resources
            .get(id)
            .ok_or_else(|| KubelinkError::NotFound(format!("Resource {id}")))?;
        if !resource.is_local() {
            return Err(KubelinkError::NotFound(format!("File for resource {id}")));
        }
        let file_path = resource.file_path.clone();
        let text = self
            .store
            .get(&file_path)
            .and_then(|entry| entry.text.clone())
            .ok_or_else(|| KubelinkError::NotFound(format!("Text of {file_path}")))?;

        self.write_file(&file_path, &text)?;
        for resource in self.resources.values_mut() {
            if resource.file_path == file_path {
                resource.is_dirty = false;
            }
        }
        Ok(())
    }

    /// Write new text for a file, then re-extract it and relink everything.
    ///
    /// Resources that survive the edit keep their identity and selection; the
    /// file's resources are highlighted. On write failure nothing changes.
    pub fn save_file_entry(&mut self, relative_path: &str, text: &str) -> Result<(), KubelinkError> {
        if !self.store.get(relative_path).is_some_and(|e| !e.is_dir()) {
            return Err(KubelinkError::NotFound(format!("File {relative_path}")));
        }
        self.write_file(relative_path, text)?;

        let identities = self.replace_file_resources(relative_path, text);
        self.relink(&[]);
        self.refresh_highlights();
        for id in identities.carried.keys().chain(identities.added.iter()) {
            if let Some(resource) = self.resources.get_mut(id) {
                resource.is_highlighted = true;
            }
        }
        Ok(())
    }

    /// Swap a file's resources for those extracted from `text`, keeping the
    /// identity and UI state of every resource that is still there.
    fn replace_file_resources(&mut self, relative: &str, text: &str) -> IdentityMap {
        let previous: Vec<Resource> = resources_for_path(relative, &self.resources)
            .into_iter()
            .cloned()
            .collect();
        let previous_refs: Vec<&Resource> = previous.iter().collect();
        let Extraction {
            mut resources,
            diagnostics,
        } = extract_resources_from_file(relative, text);
        let identities = reconcile_identities(&previous_refs, &resources);
        identities.apply(&previous_refs, &mut resources);

        for old in &previous {
            self.resources.remove(&old.id);
        }
        if self
            .selected_resource
            .as_ref()
            .is_some_and(|selected| identities.removed.contains(selected))
        {
            self.selected_resource = None;
        }
        self.file_diagnostics.remove(relative);
        self.insert_extracted(resources, &diagnostics);
        identities
    }

    /// Write text to disk and only then update the entry.
    fn write_file(&mut self, relative_path: &str, text: &str) -> Result<(), KubelinkError> {
        let entry = self
            .store
            .get(relative_path)
            .ok_or_else(|| KubelinkError::NotFound(format!("File {relative_path}")))?;
        let absolute = entry.absolute_path.clone();

        std::fs::write(&absolute, text).map_err(|source| KubelinkError::Write {
            path: relative_path.to_string(),
            source,
        })?;

        let timestamp = std::fs::metadata(&absolute)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        if let Some(entry) = self.store.get_mut(relative_path) {
            entry.text = Some(text.to_string());
            entry.timestamp = Some(timestamp);
            entry.is_dirty = false;
        }
        self.indexer.change_detector_mut().record(relative_path, text);
        tracing::debug!("Saved {}", relative_path);
        Ok(())
    }

    /// Synthesize a new resource of a registered kind.
    pub fn create_resource(&mut self, new: NewResource) -> Result<ResourceId, KubelinkError> {
        let api_version = match new.api_version {
            Some(version) => version,
            None => self
                .registry
                .get(&new.kind)
                .map(|d| d.cluster_api_version.clone())
                .ok_or_else(|| KubelinkError::NotFound(format!("Kind {}", new.kind)))?,
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("name".into(), new.name.clone().into());
        if let Some(namespace) = &new.namespace {
            metadata.insert("namespace".into(), namespace.clone().into());
        }
        let content = serde_json::json!({
            "apiVersion": api_version,
            "kind": new.kind,
            "metadata": metadata,
        });
        let yaml = serde_yaml::to_string(&content)?;

        let mut resource = match &new.target_file {
            Some(target) => self.append_to_file(target, &yaml, content)?,
            None => {
                let mut resource = build_resource("", yaml, content, None);
                resource.file_path = format!("{UNSAVED_PREFIX}{}", resource.id);
                resource
            }
        };
        resource.is_dirty = true;

        let id = resource.id.clone();
        self.resources.insert(id.clone(), resource);
        self.relink(&[id.clone()]);
        Ok(id)
    }

    fn append_to_file(
        &mut self,
        relative_path: &str,
        yaml: &str,
        content: serde_json::Value,
    ) -> Result<Resource, KubelinkError> {
        let entry = self
            .store
            .get_mut(relative_path)
            .filter(|e| !e.is_dir())
            .ok_or_else(|| KubelinkError::NotFound(format!("File {relative_path}")))?;
        let file_text = entry.text.get_or_insert_with(String::new);

        let old_len = file_text.len();
        if !file_text.is_empty() && !file_text.ends_with('\n') {
            file_text.push('\n');
        }
        let grown = file_text.len() - old_len;
        let resource_text = if file_text.is_empty() {
            yaml.to_string()
        } else {
            format!("---\n{yaml}")
        };
        let start = file_text.len();
        file_text.push_str(&resource_text);
        entry.is_dirty = true;

        if grown > 0 {
            // Keep the last resource covering the end of the file.
            for resource in self.resources.values_mut() {
                if resource.file_path == relative_path
                    && resource.range.is_some_and(|r| r.end() == old_len)
                {
                    if let Some(range) = resource.range.as_mut() {
                        range.length += grown;
                    }
                    resource.text.push('\n');
                }
            }
        }

        let length = resource_text.len();
        Ok(build_resource(
            relative_path,
            resource_text,
            content,
            Some(ResourceRange { start, length }),
        ))
    }

    // ── Selection ───────────────────────────────────────────────────────────

    /// Select a resource and highlight everything linked to it.
    pub fn select_resource(&mut self, id: &str) -> Result<(), KubelinkError> {
        if !self.resources.contains_key(id) {
            return Err(KubelinkError::NotFound(format!("Resource {id}")));
        }
        self.selected_resource = Some(id.to_string());
        self.selected_path = None;
        self.refresh_highlights();
        Ok(())
    }

    /// Select a file or folder and highlight the resources below it.
    pub fn select_path(&mut self, relative_path: &str) -> Result<(), KubelinkError> {
        if !self.store.contains(relative_path) {
            return Err(KubelinkError::NotFound(format!("Path {relative_path}")));
        }
        self.selected_path = Some(relative_path.to_string());
        self.selected_resource = None;
        self.refresh_highlights();
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected_resource = None;
        self.selected_path = None;
        self.refresh_highlights();
    }

    fn refresh_highlights(&mut self) {
        let highlighted: BTreeSet<String> = match (&self.selected_resource, &self.selected_path) {
            (Some(id), _) => self.graph().related(id).unwrap_or_default().into_iter().collect(),
            (None, Some(path)) => self
                .resources
                .values()
                .filter(|r| r.is_local() && is_under(&r.file_path, path))
                .map(|r| r.id.clone())
                .collect(),
            (None, None) => BTreeSet::new(),
        };
        for resource in self.resources.values_mut() {
            resource.is_selected = self.selected_resource.as_deref() == Some(resource.id.as_str());
            resource.is_highlighted = highlighted.contains(&resource.id);
        }
    }

    // ── Preview ─────────────────────────────────────────────────────────────

    /// Replace all preview resources with those rendered from `source`.
    ///
    /// Preview resources only link among themselves.
    pub fn set_preview_resources(&mut self, source: &str, text: &str) -> Vec<ResourceId> {
        self.remove_preview();
        let path = format!("{PREVIEW_PREFIX}{source}");
        let Extraction {
            resources,
            diagnostics,
        } = extract_resources_from_file(&path, text);
        let ids: Vec<ResourceId> = resources.iter().map(|r| r.id.clone()).collect();
        self.insert_extracted(resources, &diagnostics);
        self.preview_source = Some(source.to_string());
        tracing::info!("Preview of {} with {} resources", source, ids.len());
        self.relink(&[]);
        ids
    }

    /// Drop every preview resource.
    pub fn clear_preview(&mut self) {
        let removed = self.remove_preview();
        self.preview_source = None;
        self.relink_after_file_change(removed);
        self.refresh_highlights();
    }

    fn remove_preview(&mut self) -> Vec<ResourceId> {
        self.file_diagnostics
            .retain(|path, _| !path.starts_with(PREVIEW_PREFIX));
        self.remove_resources_where(Resource::is_preview)
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn relative_or_ignore(&self, path: &Path) -> Option<String> {
        let relative = self.store.relative_path_of(path);
        if relative.is_none() {
            tracing::debug!("Ignoring {} outside {}", path.display(), self.root().display());
        }
        relative
    }

    fn insert_extracted(&mut self, resources: Vec<Resource>, diagnostics: &[Diagnostic]) {
        for resource in resources {
            self.resources.insert(resource.id.clone(), resource);
        }
        for diagnostic in diagnostics {
            if let Some(path) = &diagnostic.file_path {
                self.file_diagnostics
                    .entry(path.clone())
                    .or_default()
                    .push(diagnostic.clone());
            }
        }
    }

    fn remove_resources_where(&mut self, predicate: impl Fn(&Resource) -> bool) -> Vec<ResourceId> {
        let removed: Vec<ResourceId> = self
            .resources
            .values()
            .filter(|&r| predicate(r))
            .map(|r| r.id.clone())
            .collect();
        for id in &removed {
            self.resources.remove(id);
            self.link_diagnostics.remove(id);
        }
        if self
            .selected_resource
            .as_ref()
            .is_some_and(|selected| removed.contains(selected))
        {
            self.selected_resource = None;
        }
        removed
    }

    /// Relink after file-level changes; with nothing changed, still refresh
    /// kustomizations since their file entries may have come or gone.
    fn relink_after_file_change(&mut self, mut changed: Vec<ResourceId>) {
        if changed.is_empty() {
            changed = self
                .resources
                .values()
                .filter(|r| r.is_kustomization())
                .map(|r| r.id.clone())
                .collect();
        }
        if !changed.is_empty() {
            self.relink(&changed);
        }
    }

    fn relink(&mut self, changed: &[ResourceId]) {
        let ctx = LinkContext::new(&self.registry, self.namespaces.as_ref());
        let outcome = reprocess(changed, &mut self.resources, self.store.files(), &ctx);

        let resources = &self.resources;
        self.link_diagnostics
            .retain(|id, _| !outcome.scope.contains(id) && resources.contains_key(id));
        for diagnostic in outcome.diagnostics {
            if let Some(id) = diagnostic.resource_id.clone() {
                self.link_diagnostics.entry(id).or_default().push(diagnostic);
            }
        }
    }
}

/// Keep a leading separator line and trailing newline the old text had, so
/// a spliced edit cannot merge neighbouring documents.
fn preserve_framing(old: &str, new: &str) -> String {
    let mut framed = String::with_capacity(new.len() + 4);
    let old_first = old.split_inclusive('\n').next().unwrap_or("");
    let new_first = new.split_inclusive('\n').next().unwrap_or("");
    if is_separator(old_first) && !is_separator(new_first) {
        framed.push_str(old_first);
        if !old_first.ends_with('\n') {
            framed.push('\n');
        }
    }
    framed.push_str(new);
    if old.ends_with('\n') && !framed.ends_with('\n') {
        framed.push('\n');
    }
    framed
}
