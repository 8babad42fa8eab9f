//! Reference resolution between resources.
//!
//! Reads the scalars named by each kind's reference rules and binds them to
//! candidate resources through an index keyed by (kind, namespace). Unmatched
//! names become unsatisfied references; matched ones are recorded as pending
//! incoming references to be mirrored on their targets.

use crate::content::{scalars_at, ScalarLocator};
use crate::kinds::{KindRegistry, RefMapperTarget};
use kubelink_core::{
    Diagnostic, DiagnosticKind, NamespaceResolver, RefTarget, RefType, Resource, ResourceId,
    ResourceMap, ResourceRef,
};
use std::collections::{HashMap, HashSet};

/// An outgoing resource edge that still has to be mirrored on its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingIncoming {
    pub target_id: ResourceId,
    pub source_id: ResourceId,
    pub source_kind: String,
    /// The raw referenced value.
    pub name: String,
    /// Path of the matched scalar inside the target, used to position the mirror.
    pub target_path: Option<Vec<String>>,
}

/// References computed for one source resource.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub refs: Vec<ResourceRef>,
    pub incoming: Vec<PendingIncoming>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn extend(&mut self, other: Resolution) {
        self.refs.extend(other.refs);
        self.incoming.extend(other.incoming);
        self.diagnostics.extend(other.diagnostics);
    }
}

/// Resolves rule-based references against an indexed resource set.
pub struct ReferenceResolver<'a> {
    registry: &'a KindRegistry,
    namespaces: &'a dyn NamespaceResolver,
    /// (kind, namespace) → candidate ids in ascending id order.
    /// Cluster-scoped kinds are indexed under an empty namespace.
    candidates: HashMap<(String, String), Vec<ResourceId>>,
}

impl<'a> ReferenceResolver<'a> {
    pub fn new(registry: &'a KindRegistry, namespaces: &'a dyn NamespaceResolver) -> Self {
        Self {
            registry,
            namespaces,
            candidates: HashMap::new(),
        }
    }

    /// Rebuild the candidate index from the full resource set.
    pub fn index(&mut self, resources: &ResourceMap) {
        self.candidates.clear();
        for resource in resources.values() {
            let key = self.scope_key(&resource.kind, self.effective_namespace(resource));
            self.candidates.entry(key).or_default().push(resource.id.clone());
        }
    }

    /// Number of indexed resources.
    pub fn candidate_count(&self) -> usize {
        self.candidates.values().map(Vec::len).sum()
    }

    /// The declared namespace, or the resolver's default.
    pub fn effective_namespace<'r>(&'r self, resource: &'r Resource) -> &'r str {
        resource
            .namespace
            .as_deref()
            .unwrap_or_else(|| self.namespaces.default_namespace())
    }

    fn scope_key(&self, kind: &str, namespace: &str) -> (String, String) {
        if self.registry.is_namespaced(kind) {
            (kind.to_string(), namespace.to_string())
        } else {
            (kind.to_string(), String::new())
        }
    }

    /// Compute the outgoing references of `source` from its kind's rules.
    pub fn resolve_outgoing(&self, source: &Resource, resources: &ResourceMap) -> Resolution {
        let mut resolution = Resolution::default();
        let Some(descriptor) = self.registry.get(&source.kind) else {
            return resolution;
        };

        let mut locator = ScalarLocator::new(&source.text);
        for mapper in &descriptor.outgoing_ref_mappers {
            let hits = scalars_at(&source.content, &mapper.source)
                .into_iter()
                .filter(|hit| mapper.applies_to(hit.parent));
            for hit in hits {
                let position = locator.locate(&mapper.source, &hit.value);
                match &mapper.target {
                    RefMapperTarget::Image => {
                        let (name, tag) = parse_image(&hit.value);
                        resolution.refs.push(ResourceRef {
                            ref_type: RefType::Outgoing,
                            name: hit.value,
                            target: Some(RefTarget::Image { name, tag }),
                            position,
                        });
                    }
                    RefMapperTarget::Resource { kind, path } => {
                        let namespace = mapper
                            .namespace_key
                            .as_deref()
                            .and_then(|key| hit.parent?.get(key)?.as_str())
                            .unwrap_or_else(|| self.effective_namespace(source));
                        let matches = self.find_targets(source, kind, path, namespace, &hit.value, resources);
                        match matches.first() {
                            Some(target) => {
                                if matches.len() > 1 {
                                    tracing::debug!(
                                        "{} '{}' referenced from {} matches {} resources",
                                        kind,
                                        hit.value,
                                        source.name,
                                        matches.len()
                                    );
                                    resolution.diagnostics.push(Diagnostic::for_resource(
                                        DiagnosticKind::AmbiguousReference,
                                        source,
                                        format!(
                                            "{kind} '{}' matches {} resources, using {}",
                                            hit.value,
                                            matches.len(),
                                            target.id
                                        ),
                                    ));
                                }
                                resolution.refs.push(ResourceRef {
                                    ref_type: RefType::Outgoing,
                                    name: hit.value.clone(),
                                    target: Some(RefTarget::Resource {
                                        resource_id: target.id.clone(),
                                        kind: target.kind.clone(),
                                    }),
                                    position,
                                });
                                resolution.incoming.push(PendingIncoming {
                                    target_id: target.id.clone(),
                                    source_id: source.id.clone(),
                                    source_kind: source.kind.clone(),
                                    name: hit.value,
                                    target_path: Some(path.clone()),
                                });
                            }
                            None => resolution.refs.push(ResourceRef {
                                ref_type: RefType::Unsatisfied,
                                name: hit.value,
                                target: None,
                                position,
                            }),
                        }
                    }
                }
            }
        }

        dedupe_refs(&mut resolution.refs);
        resolution
    }

    /// Candidates matching a name, best first: same file, then lowest id.
    fn find_targets<'r>(
        &self,
        source: &Resource,
        kind: &str,
        path: &[String],
        namespace: &str,
        name: &str,
        resources: &'r ResourceMap,
    ) -> Vec<&'r Resource> {
        let Some(ids) = self.candidates.get(&self.scope_key(kind, namespace)) else {
            return Vec::new();
        };
        let mut matches: Vec<&Resource> = ids
            .iter()
            .filter(|id| **id != source.id)
            .filter_map(|id| resources.get(id))
            .filter(|r| r.is_preview() == source.is_preview())
            .filter(|r| scalars_at(&r.content, path).iter().any(|h| h.value == name))
            .collect();
        matches.sort_by(|a, b| {
            (a.file_path != source.file_path, &a.id).cmp(&(b.file_path != source.file_path, &b.id))
        });
        matches
    }
}

/// Split an image reference into name and tag.
///
/// The tag defaults to `latest`; a digest (`@sha256:…`) is used as the tag.
/// A `:` only separates a tag when it follows the last `/`, so registry ports
/// stay part of the name.
pub fn parse_image(reference: &str) -> (String, String) {
    let (rest, digest) = match reference.split_once('@') {
        Some((rest, digest)) => (rest, Some(digest)),
        None => (reference, None),
    };
    let last_segment = rest.rfind('/').map_or(0, |idx| idx + 1);
    let (name, tag) = match rest[last_segment..].rfind(':') {
        Some(idx) => (&rest[..last_segment + idx], Some(&rest[last_segment + idx + 1..])),
        None => (rest, None),
    };
    let tag = digest.or(tag).filter(|t| !t.is_empty()).unwrap_or("latest");
    (name.to_string(), tag.to_string())
}

/// Add mirrored incoming references to their targets.
///
/// Targets that no longer exist are skipped; an incoming ref already present
/// on the target is not duplicated.
pub fn mirror_incoming(resources: &mut ResourceMap, pending: Vec<PendingIncoming>) {
    for link in pending {
        let Some(target) = resources.get_mut(&link.target_id) else {
            continue;
        };
        let position = link.target_path.as_ref().and_then(|path| {
            let mut locator = ScalarLocator::new(&target.text);
            locator.locate(path, &link.name)
        });
        let incoming = ResourceRef {
            ref_type: RefType::Incoming,
            name: link.name,
            target: Some(RefTarget::Resource {
                resource_id: link.source_id,
                kind: link.source_kind,
            }),
            position,
        };
        if !target.refs.contains(&incoming) {
            target.refs.push(incoming);
        }
    }
}

/// Drop exact duplicate references, keeping the first occurrence.
pub fn dedupe_refs(refs: &mut Vec<ResourceRef>) {
    let mut seen = HashSet::new();
    refs.retain(|r| seen.insert(r.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::extract_resources_from_file;
    use crate::kinds::{KindDescriptor, RefMapper};
    use kubelink_core::StaticNamespace;

    fn load(files: &[(&str, &str)]) -> ResourceMap {
        let mut map = ResourceMap::new();
        for (path, text) in files {
            for resource in extract_resources_from_file(path, text).resources {
                map.insert(resource.id.clone(), resource);
            }
        }
        map
    }

    fn by_name<'a>(map: &'a ResourceMap, kind: &str, name: &str) -> &'a Resource {
        map.values()
            .find(|r| r.kind == kind && r.name == name)
            .unwrap()
    }

    fn resolve(map: &ResourceMap, registry: &KindRegistry, kind: &str, name: &str) -> Resolution {
        let namespaces = StaticNamespace::default();
        let mut resolver = ReferenceResolver::new(registry, &namespaces);
        resolver.index(map);
        resolver.resolve_outgoing(by_name(map, kind, name), map)
    }

    const POD: &str = "\
apiVersion: v1
kind: Pod
metadata:
  name: web
spec:
  containers:
    - name: web
      image: registry.local:5000/team/web:1.2
      envFrom:
        - configMapRef:
            name: cfg
";

    #[test]
    fn binds_pod_to_config_map() {
        let map = load(&[
            ("/pod.yaml", POD),
            ("/cfg.yaml", "kind: ConfigMap\nmetadata:\n  name: cfg\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        let cfg = by_name(&map, "ConfigMap", "cfg");

        let config_ref = resolution
            .refs
            .iter()
            .find(|r| r.name == "cfg")
            .unwrap();
        assert_eq!(config_ref.ref_type, RefType::Outgoing);
        assert_eq!(config_ref.target_resource_id(), Some(cfg.id.as_str()));
        assert_eq!(config_ref.position.unwrap().line, 11);

        assert_eq!(resolution.incoming.len(), 1);
        assert_eq!(resolution.incoming[0].target_id, cfg.id);
        assert!(resolution.diagnostics.is_empty());
    }

    #[test]
    fn image_refs_carry_name_and_tag() {
        let map = load(&[("/pod.yaml", POD)]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        let image = resolution
            .refs
            .iter()
            .find(|r| matches!(r.target, Some(RefTarget::Image { .. })))
            .unwrap();
        assert_eq!(
            image.target,
            Some(RefTarget::Image {
                name: "registry.local:5000/team/web".into(),
                tag: "1.2".into()
            })
        );
    }

    #[test]
    fn missing_target_is_unsatisfied() {
        let map = load(&[("/pod.yaml", POD)]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        let config_ref = resolution.refs.iter().find(|r| r.name == "cfg").unwrap();
        assert_eq!(config_ref.ref_type, RefType::Unsatisfied);
        assert!(config_ref.target.is_none());
        assert!(resolution.incoming.is_empty());
    }

    #[test]
    fn namespace_scope_is_respected() {
        let map = load(&[
            ("/pod.yaml", POD),
            ("/cfg.yaml", "kind: ConfigMap\nmetadata:\n  name: cfg\n  namespace: other\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        let config_ref = resolution.refs.iter().find(|r| r.name == "cfg").unwrap();
        assert_eq!(config_ref.ref_type, RefType::Unsatisfied);
    }

    #[test]
    fn cluster_scoped_targets_ignore_namespace() {
        let map = load(&[
            (
                "/pvc.yaml",
                "kind: PersistentVolumeClaim\nmetadata:\n  name: data\n  namespace: apps\nspec:\n  volumeName: pv-1\n",
            ),
            ("/pv.yaml", "kind: PersistentVolume\nmetadata:\n  name: pv-1\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "PersistentVolumeClaim", "data");
        assert_eq!(resolution.refs[0].ref_type, RefType::Outgoing);
    }

    #[test]
    fn explicit_namespace_key_is_used() {
        let map = load(&[
            (
                "/pv.yaml",
                "kind: PersistentVolume\nmetadata:\n  name: pv-1\nspec:\n  claimRef:\n    name: data\n    namespace: apps\n",
            ),
            ("/pvc.yaml", "kind: PersistentVolumeClaim\nmetadata:\n  name: data\n  namespace: apps\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "PersistentVolume", "pv-1");
        assert_eq!(resolution.refs[0].ref_type, RefType::Outgoing);
    }

    #[test]
    fn role_binding_follows_role_ref_and_subject_kinds() {
        let binding = "kind: RoleBinding\nmetadata:\n  name: read\nroleRef:\n  apiGroup: rbac.authorization.k8s.io\n  kind: ClusterRole\n  name: view\nsubjects:\n  - kind: ServiceAccount\n    name: runner\n  - kind: User\n    name: alice\n  - kind: Group\n    name: devs\n";
        let map = load(&[
            ("/binding.yaml", binding),
            ("/role.yaml", "kind: ClusterRole\nmetadata:\n  name: view\n"),
            ("/sa.yaml", "kind: ServiceAccount\nmetadata:\n  name: runner\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "RoleBinding", "read");

        let names: Vec<&str> = resolution.refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["view", "runner"]);
        assert!(resolution.refs.iter().all(|r| r.ref_type == RefType::Outgoing));
        let role = map.values().find(|r| r.kind == "ClusterRole").unwrap();
        assert_eq!(resolution.refs[0].target_resource_id(), Some(role.id.as_str()));
    }

    #[test]
    fn ambiguous_match_prefers_same_file() {
        let pod_and_cfg = format!("{POD}---\nkind: ConfigMap\nmetadata:\n  name: cfg\n");
        let map = load(&[
            ("/a.yaml", "kind: ConfigMap\nmetadata:\n  name: cfg\n"),
            ("/pod.yaml", pod_and_cfg.as_str()),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");

        let local_cfg = map
            .values()
            .find(|r| r.kind == "ConfigMap" && r.file_path == "/pod.yaml")
            .unwrap();
        let config_ref = resolution.refs.iter().find(|r| r.name == "cfg").unwrap();
        assert_eq!(config_ref.target_resource_id(), Some(local_cfg.id.as_str()));
        assert_eq!(resolution.diagnostics.len(), 1);
        assert_eq!(resolution.diagnostics[0].kind, DiagnosticKind::AmbiguousReference);
    }

    #[test]
    fn preview_resources_do_not_bind_to_local_ones() {
        let map = load(&[
            ("preview://chart", POD),
            ("/cfg.yaml", "kind: ConfigMap\nmetadata:\n  name: cfg\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        let config_ref = resolution.refs.iter().find(|r| r.name == "cfg").unwrap();
        assert_eq!(config_ref.ref_type, RefType::Unsatisfied);
    }

    #[test]
    fn self_references_are_skipped() {
        let mut registry = KindRegistry::new();
        registry
            .register(KindDescriptor {
                kind: "Widget".into(),
                cluster_api_version: "example.com/v1".into(),
                is_namespaced: true,
                section: "Custom".into(),
                outgoing_ref_mappers: vec![RefMapper::to_resource(&["spec", "peer"], "Widget")],
            })
            .unwrap();
        let map = load(&[("/w.yaml", "kind: Widget\nmetadata:\n  name: w\nspec:\n  peer: w\n")]);
        let resolution = resolve(&map, &registry, "Widget", "w");
        assert_eq!(resolution.refs[0].ref_type, RefType::Unsatisfied);
    }

    #[test]
    fn mirror_positions_point_at_target_name() {
        let mut map = load(&[
            ("/pod.yaml", POD),
            ("/cfg.yaml", "kind: ConfigMap\nmetadata:\n  name: cfg\n"),
        ]);
        let registry = KindRegistry::with_defaults();
        let resolution = resolve(&map, &registry, "Pod", "web");
        mirror_incoming(&mut map, resolution.incoming.clone());
        mirror_incoming(&mut map, resolution.incoming);

        let cfg = by_name(&map, "ConfigMap", "cfg");
        let incoming: Vec<&ResourceRef> = cfg.incoming_refs().collect();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].position.unwrap().line, 3);
        assert_eq!(incoming[0].target_resource_id(), Some(by_name(&map, "Pod", "web").id.as_str()));
    }

    #[test]
    fn image_parsing() {
        assert_eq!(parse_image("nginx"), ("nginx".into(), "latest".into()));
        assert_eq!(parse_image("nginx:1.25"), ("nginx".into(), "1.25".into()));
        assert_eq!(parse_image("localhost:5000/app"), ("localhost:5000/app".into(), "latest".into()));
        assert_eq!(
            parse_image("nginx@sha256:abc"),
            ("nginx".into(), "sha256:abc".into())
        );
    }

    #[test]
    fn dedupe_keeps_first() {
        let r = ResourceRef {
            ref_type: RefType::Unsatisfied,
            name: "x".into(),
            target: None,
            position: None,
        };
        let mut refs = vec![r.clone(), r.clone()];
        dedupe_refs(&mut refs);
        assert_eq!(refs, vec![r]);
    }
}
