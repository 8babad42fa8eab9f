//! Resource extraction from multi-document YAML text.
//!
//! A file is split at `---` separator lines into segments that tile the whole
//! text. Each segment that parses into something with a kind and a name becomes
//! a [`Resource`] whose range covers the segment, so joining the texts of a
//! file's resources in range order gives back the file. Blank, comment-only and
//! kindless segments are folded into the neighbouring resource; unparsable
//! segments are reported as diagnostics and skipped.

use crate::document::{base_name, parent_path};
use kubelink_core::{
    Diagnostic, DiagnosticKind, KubelinkError, Resource, ResourceId, ResourceRange,
    KUSTOMIZATION_KIND, ROOT_FILE_ENTRY,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Resources and diagnostics produced from one file.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub resources: Vec<Resource>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract all resources from a file's text, in document order.
///
/// Never fails as a whole: a segment that does not parse yields a
/// [`DiagnosticKind::Parse`] diagnostic and extraction continues.
pub fn extract_resources_from_file(file_path: &str, text: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let mut ranges: Vec<Range<usize>> = Vec::new();
    let mut contents: Vec<Value> = Vec::new();
    let mut pending_start: Option<usize> = None;
    let mut last_was_resource = false;

    for (ordinal, segment) in split_documents(text).into_iter().enumerate() {
        let content = match parse_document(&text[segment.clone()]) {
            Ok(Some(content)) if is_resource_content(&content, file_path) => Some(content),
            Ok(Some(_)) => {
                tracing::debug!("Document {} in {} has no kind or name", ordinal, file_path);
                None
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("Failed to parse document {} in {}: {}", ordinal, file_path, err);
                extraction.diagnostics.push(Diagnostic::for_file(
                    DiagnosticKind::Parse,
                    file_path,
                    format!("document {ordinal}: {err}"),
                ));
                pending_start = None;
                last_was_resource = false;
                continue;
            }
        };

        match content {
            Some(content) => {
                let start = pending_start.take().unwrap_or(segment.start);
                ranges.push(start..segment.end);
                contents.push(content);
                last_was_resource = true;
            }
            // Folded into the neighbouring resource's range.
            None if last_was_resource => {
                if let Some(last) = ranges.last_mut() {
                    last.end = segment.end;
                }
            }
            None => {
                pending_start.get_or_insert(segment.start);
            }
        }
    }

    for (range, content) in ranges.into_iter().zip(contents) {
        let resource_text = text[range.clone()].to_string();
        extraction.resources.push(build_resource(
            file_path,
            resource_text,
            content,
            Some(ResourceRange {
                start: range.start,
                length: range.len(),
            }),
        ));
    }

    tracing::debug!(
        "Extracted {} resources from {}",
        extraction.resources.len(),
        file_path
    );
    extraction
}

/// Split text into segments at `---` separator lines.
///
/// Segments are contiguous and cover the whole text; every segment after the
/// first starts with its separator line.
pub fn split_documents(text: &str) -> Vec<Range<usize>> {
    let mut boundaries = vec![0];
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if offset > 0 && is_separator(line) {
            boundaries.push(offset);
        }
        offset += line.len();
    }
    boundaries.push(text.len());
    boundaries.windows(2).map(|w| w[0]..w[1]).collect()
}

/// True for a `---` document separator line, optionally followed by a comment.
pub fn is_separator(line: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    match line.strip_prefix("---") {
        Some(rest) => rest.is_empty() || rest.starts_with([' ', '\t']),
        None => false,
    }
}

/// Parse a single document segment. Blank and comment-only segments give `None`.
pub fn parse_document(text: &str) -> Result<Option<Value>, serde_yaml::Error> {
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = Value::deserialize(document)?;
        if !value.is_null() {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Parse edited resource text, failing if it contains no document at all.
pub fn parse_resource_text(file_path: &str, text: &str) -> Result<Value, KubelinkError> {
    parse_document(text)
        .map_err(|e| KubelinkError::Parse {
            path: file_path.to_string(),
            message: e.to_string(),
        })?
        .ok_or_else(|| KubelinkError::Parse {
            path: file_path.to_string(),
            message: "document is empty".to_string(),
        })
}

fn is_resource_content(content: &Value, file_path: &str) -> bool {
    content.get("kind").and_then(Value::as_str).is_some() && resource_name(content, file_path).is_some()
}

fn resource_name(content: &Value, file_path: &str) -> Option<String> {
    if let Some(name) = content.pointer("/metadata/name").and_then(Value::as_str) {
        return Some(name.to_string());
    }
    // Kustomization files rarely carry metadata; name them after their folder.
    if content.get("kind").and_then(Value::as_str) == Some(KUSTOMIZATION_KIND) {
        let folder = parent_path(file_path);
        let name = if folder == ROOT_FILE_ENTRY {
            "kustomization"
        } else {
            base_name(&folder)
        };
        return Some(name.to_string());
    }
    None
}

/// Build a resource with a fresh identity from parsed content.
pub fn build_resource(
    file_path: &str,
    text: String,
    content: Value,
    range: Option<ResourceRange>,
) -> Resource {
    let kind = content
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let api_version = content
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let namespace = content
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .map(str::to_string);
    let name = resource_name(&content, file_path).unwrap_or_else(|| kind.clone());

    Resource {
        id: uuid::Uuid::new_v4().to_string(),
        file_path: file_path.to_string(),
        name,
        kind,
        api_version,
        namespace,
        is_highlighted: false,
        is_selected: false,
        is_dirty: false,
        text,
        content,
        refs: Vec::new(),
        range,
    }
}

/// Refresh kind, name, namespace and api version after the content changed.
pub fn refresh_metadata(resource: &mut Resource) {
    let file_path = resource.file_path.clone();
    let fresh = build_resource(&file_path, String::new(), resource.content.clone(), None);
    resource.kind = fresh.kind;
    resource.api_version = fresh.api_version;
    resource.namespace = fresh.namespace;
    resource.name = fresh.name;
}

// ── Identity reconciliation ─────────────────────────────────────────────────

/// Structural key used to match a re-extracted resource to its previous version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct IdentityKey {
    kind: String,
    name: String,
    namespace: Option<String>,
    ordinal: usize,
}

fn identity_keys<'a>(resources: impl Iterator<Item = &'a Resource>) -> Vec<(IdentityKey, &'a Resource)> {
    let mut seen: HashMap<(String, String, Option<String>), usize> = HashMap::new();
    resources
        .map(|r| {
            let base = (r.kind.clone(), r.declared_name().to_string(), r.namespace.clone());
            let ordinal = seen.entry(base.clone()).or_default();
            let key = IdentityKey {
                kind: base.0,
                name: base.1,
                namespace: base.2,
                ordinal: *ordinal,
            };
            *ordinal += 1;
            (key, r)
        })
        .collect()
}

/// Outcome of matching freshly extracted resources against a file's previous ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMap {
    /// Previous identity → freshly minted identity it replaces.
    pub carried: BTreeMap<ResourceId, ResourceId>,
    /// Fresh identities with no previous counterpart.
    pub added: Vec<ResourceId>,
    /// Previous identities with no fresh counterpart.
    pub removed: Vec<ResourceId>,
}

impl IdentityMap {
    /// Rewrite fresh resources to carry their previous identity and UI state.
    pub fn apply(&self, previous: &[&Resource], fresh: &mut [Resource]) {
        let by_fresh: HashMap<&str, &str> = self
            .carried
            .iter()
            .map(|(old, new)| (new.as_str(), old.as_str()))
            .collect();
        let previous_by_id: HashMap<&str, &Resource> =
            previous.iter().map(|r| (r.id.as_str(), *r)).collect();

        for resource in fresh.iter_mut() {
            if let Some(old_id) = by_fresh.get(resource.id.as_str()) {
                if let Some(old) = previous_by_id.get(old_id) {
                    resource.is_selected = old.is_selected;
                    resource.is_highlighted = old.is_highlighted;
                }
                resource.id = old_id.to_string();
            }
        }
    }

    /// Identities whose neighbourhood must be relinked.
    pub fn touched(&self) -> Vec<ResourceId> {
        self.carried
            .keys()
            .chain(self.added.iter())
            .chain(self.removed.iter())
            .cloned()
            .collect()
    }
}

/// Match fresh resources to previous ones by (kind, name, namespace, ordinal).
///
/// Both slices are expected in document order.
pub fn reconcile_identities(previous: &[&Resource], fresh: &[Resource]) -> IdentityMap {
    let previous_keys: HashMap<IdentityKey, &Resource> =
        identity_keys(previous.iter().copied()).into_iter().collect();

    let mut map = IdentityMap::default();
    let mut matched = std::collections::HashSet::new();
    for (key, resource) in identity_keys(fresh.iter()) {
        match previous_keys.get(&key) {
            Some(old) => {
                matched.insert(old.id.clone());
                map.carried.insert(old.id.clone(), resource.id.clone());
            }
            None => map.added.push(resource.id.clone()),
        }
    }
    map.removed = previous
        .iter()
        .filter(|r| !matched.contains(&r.id))
        .map(|r| r.id.clone())
        .collect();
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    const MULTI: &str = "\
# leading comment
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
data:
  a: b
---
apiVersion: v1
kind: Pod
metadata:
  name: web
  namespace: apps
spec:
  containers:
    - name: web
      image: nginx
---
";

    fn rejoin(text: &str, resources: &[Resource]) -> String {
        let mut sorted: Vec<&Resource> = resources.iter().collect();
        sorted.sort_by_key(|r| r.range.unwrap().start);
        sorted
            .iter()
            .map(|r| &text[r.range.unwrap().start..r.range.unwrap().end()])
            .collect()
    }

    #[test]
    fn extracts_documents_in_order() {
        let extraction = extract_resources_from_file("/app.yaml", MULTI);
        assert!(extraction.diagnostics.is_empty());
        let kinds: Vec<&str> = extraction.resources.iter().map(|r| r.kind.as_str()).collect();
        assert_eq!(kinds, vec!["ConfigMap", "Pod"]);
        let pod = &extraction.resources[1];
        assert_eq!(pod.name, "web");
        assert_eq!(pod.namespace.as_deref(), Some("apps"));
        assert_eq!(pod.api_version, "v1");
        assert_eq!(pod.file_path, "/app.yaml");
    }

    #[test]
    fn ranges_rejoin_to_original_text() {
        let extraction = extract_resources_from_file("/app.yaml", MULTI);
        assert_eq!(rejoin(MULTI, &extraction.resources), MULTI);
        for r in &extraction.resources {
            let range = r.range.unwrap();
            assert_eq!(r.text, &MULTI[range.start..range.end()]);
        }
    }

    #[test]
    fn leading_separator_is_folded_into_first_resource() {
        let text = "---\nkind: Secret\nmetadata:\n  name: s\n";
        let extraction = extract_resources_from_file("/s.yaml", text);
        assert_eq!(extraction.resources.len(), 1);
        assert_eq!(extraction.resources[0].range.unwrap().start, 0);
        assert_eq!(extraction.resources[0].text, text);
    }

    #[test]
    fn unparsable_segment_does_not_block_siblings() {
        let text = "kind: ConfigMap\nmetadata:\n  name: a\n---\nkind: [unclosed\n---\nkind: ConfigMap\nmetadata:\n  name: b\n";
        let extraction = extract_resources_from_file("/mixed.yaml", text);
        let names: Vec<&str> = extraction.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(extraction.diagnostics.len(), 1);
        assert_eq!(extraction.diagnostics[0].kind, DiagnosticKind::Parse);
        assert_eq!(extraction.diagnostics[0].file_path.as_deref(), Some("/mixed.yaml"));
    }

    #[test]
    fn documents_without_kind_or_name_fold_into_neighbours() {
        let text = "kind: ConfigMap\nmetadata:\n  name: a\n---\nreplicaCount: 2\n---\nkind: ConfigMap\nmetadata:\n  name: b\n";
        let extraction = extract_resources_from_file("/values.yaml", text);
        assert!(extraction.diagnostics.is_empty());
        assert_eq!(extraction.resources.len(), 2);
        assert_eq!(rejoin(text, &extraction.resources), text);
        assert!(extraction.resources[0].text.contains("replicaCount: 2"));

        let leading = "replicaCount: 2\n---\nkind: ConfigMap\nmetadata:\n  name: b\n";
        let extraction = extract_resources_from_file("/values.yaml", leading);
        assert_eq!(extraction.resources.len(), 1);
        assert_eq!(extraction.resources[0].range.unwrap().start, 0);
        assert_eq!(rejoin(leading, &extraction.resources), leading);

        let values_only = "replicaCount: 2\nimage:\n  tag: latest\n---\nkind: ConfigMap\ndata: {}\n";
        let extraction = extract_resources_from_file("/values.yaml", values_only);
        assert!(extraction.resources.is_empty());
        assert!(extraction.diagnostics.is_empty());
    }

    #[test]
    fn kustomization_without_metadata_is_named_after_folder() {
        let text = "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\nresources:\n  - a.yaml\n";
        let extraction = extract_resources_from_file("/overlays/prod/kustomization.yaml", text);
        assert_eq!(extraction.resources.len(), 1);
        assert_eq!(extraction.resources[0].name, "prod");
        assert!(extraction.resources[0].is_kustomization());
    }

    #[test]
    fn separator_detection() {
        assert!(is_separator("---\n"));
        assert!(is_separator("--- # doc\r\n"));
        assert!(!is_separator("----\n"));
        assert!(!is_separator("  ---\n"));
        assert_eq!(split_documents("a: 1\n---\nb: 2\n"), vec![0..5, 5..14]);
        assert_eq!(split_documents(""), vec![0..0]);
    }

    #[test]
    fn parse_resource_text_rejects_empty_documents() {
        assert!(parse_resource_text("/x.yaml", "# nothing\n").is_err());
        assert!(parse_resource_text("/x.yaml", "kind: [").is_err());
        assert!(parse_resource_text("/x.yaml", "kind: Pod\n").is_ok());
    }

    #[test]
    fn reconciliation_carries_identity_across_edits() {
        let before = extract_resources_from_file("/app.yaml", MULTI);
        let edited = MULTI.replace("a: b", "a: c");
        let mut after = extract_resources_from_file("/app.yaml", &edited);

        let previous: Vec<&Resource> = before.resources.iter().collect();
        let map = reconcile_identities(&previous, &after.resources);
        assert_eq!(map.carried.len(), 2);
        assert!(map.added.is_empty());
        assert!(map.removed.is_empty());

        map.apply(&previous, &mut after.resources);
        assert_eq!(after.resources[0].id, before.resources[0].id);
        assert_eq!(after.resources[1].id, before.resources[1].id);
    }

    #[test]
    fn reconciliation_preserves_selection_and_reports_changes() {
        let mut before = extract_resources_from_file("/app.yaml", MULTI);
        before.resources[1].is_selected = true;
        let renamed = MULTI.replace("name: cfg", "name: cfg2");
        let mut after = extract_resources_from_file("/app.yaml", &renamed);

        let previous: Vec<&Resource> = before.resources.iter().collect();
        let map = reconcile_identities(&previous, &after.resources);
        assert_eq!(map.removed, vec![before.resources[0].id.clone()]);
        assert_eq!(map.added, vec![after.resources[0].id.clone()]);

        map.apply(&previous, &mut after.resources);
        assert!(after.resources[1].is_selected);
        assert_ne!(after.resources[0].id, before.resources[0].id);
    }

    #[test]
    fn ordinal_disambiguates_duplicates() {
        let text = "kind: ConfigMap\nmetadata:\n  name: x\n---\nkind: ConfigMap\nmetadata:\n  name: x\n";
        let before = extract_resources_from_file("/dup.yaml", text);
        let after = extract_resources_from_file("/dup.yaml", text);
        let previous: Vec<&Resource> = before.resources.iter().collect();
        let map = reconcile_identities(&previous, &after.resources);
        assert_eq!(map.carried.get(&before.resources[0].id), Some(&after.resources[0].id));
        assert_eq!(map.carried.get(&before.resources[1].id), Some(&after.resources[1].id));
    }
}
