//! Kind registry for reference extraction.
//!
//! Each supported kind is described by an immutable [`KindDescriptor`]; the
//! built-in set lives in [`builtin`]. A registry is built once by the caller and
//! shared by reference with the resolver.

pub mod builtin;

use kubelink_core::KubelinkError;
use std::collections::BTreeMap;

/// What a reference rule resolves against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefMapperTarget {
    /// Resources of `kind` whose value at `path` equals the referenced name.
    Resource { kind: String, path: Vec<String> },
    /// A container image (`name[:tag]`), always satisfied.
    Image,
}

/// One outgoing reference rule: where the name lives and what it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefMapper {
    /// Content path of the referring scalar; `*` fans out over sequences.
    pub source: Vec<String>,
    pub target: RefMapperTarget,
    /// Key in the same mapping as the scalar that holds an explicit namespace.
    pub namespace_key: Option<String>,
    /// `(key, value)` a sibling of the scalar must hold for the rule to apply,
    /// e.g. `roleRef.kind: ClusterRole`.
    pub sibling_match: Option<(String, String)>,
}

impl RefMapper {
    /// A rule naming a resource of `kind` by `metadata.name`.
    pub fn to_resource(source: &[&str], kind: &str) -> Self {
        Self {
            source: to_owned(source),
            target: RefMapperTarget::Resource {
                kind: kind.to_string(),
                path: to_owned(&["metadata", "name"]),
            },
            namespace_key: None,
            sibling_match: None,
        }
    }

    /// A rule reading container images.
    pub fn to_image(source: &[&str]) -> Self {
        Self {
            source: to_owned(source),
            target: RefMapperTarget::Image,
            namespace_key: None,
            sibling_match: None,
        }
    }

    pub fn with_namespace_key(mut self, key: &str) -> Self {
        self.namespace_key = Some(key.to_string());
        self
    }

    /// Only apply the rule where the sibling `key` equals `value`.
    pub fn when_sibling(mut self, key: &str, value: &str) -> Self {
        self.sibling_match = Some((key.to_string(), value.to_string()));
        self
    }

    /// True when the mapping holding the scalar satisfies the sibling match.
    pub fn applies_to(&self, parent: Option<&serde_json::Map<String, serde_json::Value>>) -> bool {
        match &self.sibling_match {
            None => true,
            Some((key, value)) => parent
                .and_then(|p| p.get(key))
                .and_then(serde_json::Value::as_str)
                == Some(value.as_str()),
        }
    }

    /// Prefix the source path, e.g. to reuse pod rules under `spec.template.spec`.
    pub fn under(mut self, prefix: &[&str]) -> Self {
        let mut source = to_owned(prefix);
        source.append(&mut self.source);
        self.source = source;
        self
    }
}

/// Everything the engine knows about a resource kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindDescriptor {
    pub kind: String,
    /// API version used when synthesizing new resources of this kind.
    pub cluster_api_version: String,
    /// Cluster-scoped kinds match references regardless of namespace.
    pub is_namespaced: bool,
    /// Navigator section the kind is listed under.
    pub section: String,
    pub outgoing_ref_mappers: Vec<RefMapper>,
}

/// Immutable table of kind descriptors keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    descriptors: BTreeMap<String, KindDescriptor>,
}

impl KindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for descriptor in builtin::all_descriptors() {
            // Built-in kinds are unique.
            let _ = registry.register(descriptor);
        }
        registry
    }

    /// Register a descriptor. Each kind may only be registered once.
    pub fn register(&mut self, descriptor: KindDescriptor) -> Result<(), KubelinkError> {
        if self.descriptors.contains_key(&descriptor.kind) {
            return Err(KubelinkError::DuplicateKind(descriptor.kind));
        }
        self.descriptors.insert(descriptor.kind.clone(), descriptor);
        Ok(())
    }

    pub fn get(&self, kind: &str) -> Option<&KindDescriptor> {
        self.descriptors.get(kind)
    }

    /// Unknown kinds are treated as namespaced.
    pub fn is_namespaced(&self, kind: &str) -> bool {
        self.get(kind).map_or(true, |d| d.is_namespaced)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

fn to_owned(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}
