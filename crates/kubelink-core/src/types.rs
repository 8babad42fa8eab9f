use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ── Constants ───────────────────────────────────────────────────────────────

/// Key of the root sentinel entry in a [`FileMap`].
pub const ROOT_FILE_ENTRY: &str = "<root>";

/// Path prefix for resources generated in-memory by a preview session.
pub const PREVIEW_PREFIX: &str = "preview://";

/// Path prefix for resources created in-memory and not yet written to a file.
pub const UNSAVED_PREFIX: &str = "unsaved://";

/// Display-name prefix applied to resources targeted by `patchesStrategicMerge`.
pub const PATCH_PREFIX: &str = "Patch: ";

/// Kind name of kustomization resources.
pub const KUSTOMIZATION_KIND: &str = "Kustomization";

/// Resource identity. Opaque, unique across a resource map, never reused.
pub type ResourceId = String;

/// All known resources keyed by identity. Ordered so iteration is deterministic.
pub type ResourceMap = BTreeMap<ResourceId, Resource>;

/// All known paths keyed by relative path (`/dir/file.yaml`), plus the root sentinel.
pub type FileMap = BTreeMap<String, FileEntry>;

// ── Files ───────────────────────────────────────────────────────────────────

/// One path under a scanned root folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Base name of the path.
    pub name: String,
    /// Path relative to the root, always `/`-separated and starting with `/`.
    /// The root sentinel uses [`ROOT_FILE_ENTRY`].
    pub relative_path: String,
    /// Absolute path on disk.
    pub absolute_path: PathBuf,
    /// Child names in sorted order; `Some` for directories only.
    pub children: Option<Vec<String>>,
    /// Last modification time, if known.
    pub timestamp: Option<DateTime<Utc>>,
    /// Raw text including unsaved edits (files only).
    pub text: Option<String>,
    /// Set when `text` holds edits that have not been written to disk.
    pub is_dirty: bool,
    /// Set when the path matched a scan exclusion; excluded files are never parsed.
    pub is_excluded: bool,
}

impl FileEntry {
    pub fn is_dir(&self) -> bool {
        self.children.is_some()
    }

    pub fn is_root(&self) -> bool {
        self.relative_path == ROOT_FILE_ENTRY
    }
}

// ── Resources ───────────────────────────────────────────────────────────────

/// Byte range of a resource inside its multi-document file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRange {
    pub start: usize,
    pub length: usize,
}

impl ResourceRange {
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// A parsed unit of configuration, e.g. a Kubernetes object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    /// Relative path of the owning file, or a `preview://` / `unsaved://` marker.
    pub file_path: String,
    /// Display name. Starts out as `metadata.name` and may carry [`PATCH_PREFIX`].
    pub name: String,
    pub kind: String,
    pub api_version: String,
    pub namespace: Option<String>,
    pub is_highlighted: bool,
    pub is_selected: bool,
    pub is_dirty: bool,
    /// Unparsed text of this resource, exactly the bytes covered by `range`.
    pub text: String,
    /// Parsed content tree.
    pub content: serde_json::Value,
    pub refs: Vec<ResourceRef>,
    pub range: Option<ResourceRange>,
}

impl Resource {
    /// Name as declared in `metadata.name`, ignoring display prefixes.
    pub fn declared_name(&self) -> &str {
        self.content
            .pointer("/metadata/name")
            .and_then(|v| v.as_str())
            .unwrap_or_else(|| self.name.strip_prefix(PATCH_PREFIX).unwrap_or(&self.name))
    }

    pub fn is_kustomization(&self) -> bool {
        self.kind == KUSTOMIZATION_KIND
    }

    pub fn is_preview(&self) -> bool {
        self.file_path.starts_with(PREVIEW_PREFIX)
    }

    pub fn is_unsaved(&self) -> bool {
        self.file_path.starts_with(UNSAVED_PREFIX)
    }

    /// True when the resource is backed by a real file in the document store.
    pub fn is_local(&self) -> bool {
        !self.is_preview() && !self.is_unsaved()
    }

    pub fn incoming_refs(&self) -> impl Iterator<Item = &ResourceRef> {
        self.refs.iter().filter(|r| r.ref_type.is_incoming())
    }

    pub fn outgoing_refs(&self) -> impl Iterator<Item = &ResourceRef> {
        self.refs.iter().filter(|r| r.ref_type.is_outgoing())
    }

    pub fn unsatisfied_refs(&self) -> impl Iterator<Item = &ResourceRef> {
        self.refs.iter().filter(|r| r.ref_type.is_unsatisfied())
    }
}

// ── References ──────────────────────────────────────────────────────────────

/// Direction and state of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefType {
    /// A value in this resource refers elsewhere and was resolved.
    Outgoing,
    /// Mirror of another resource's outgoing reference to this one.
    Incoming,
    /// An outgoing reference whose target could not be found.
    #[serde(rename = "unsatisfied-outgoing")]
    Unsatisfied,
}

impl RefType {
    pub fn is_outgoing(self) -> bool {
        self == Self::Outgoing
    }

    pub fn is_incoming(self) -> bool {
        self == Self::Incoming
    }

    pub fn is_unsatisfied(self) -> bool {
        self == Self::Unsatisfied
    }

    /// Outgoing and unsatisfied references are authored by the resource itself.
    pub fn is_authored(self) -> bool {
        !self.is_incoming()
    }
}

impl std::fmt::Display for RefType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outgoing => write!(f, "outgoing"),
            Self::Incoming => write!(f, "incoming"),
            Self::Unsatisfied => write!(f, "unsatisfied-outgoing"),
        }
    }
}

/// What a reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RefTarget {
    Resource {
        resource_id: ResourceId,
        kind: String,
    },
    File {
        file_path: String,
    },
    Image {
        name: String,
        tag: String,
    },
}

impl RefTarget {
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            Self::Resource { resource_id, .. } => Some(resource_id),
            _ => None,
        }
    }
}

/// Location of the referring scalar inside a resource's text. 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefPosition {
    pub line: usize,
    pub column: usize,
    pub length: usize,
}

/// A directed, named reference from one resource to a resource, file or image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub ref_type: RefType,
    /// The raw referenced value, e.g. the name of a ConfigMap.
    pub name: String,
    /// Resolved target; `None` only for unsatisfied references.
    pub target: Option<RefTarget>,
    pub position: Option<RefPosition>,
}

impl ResourceRef {
    pub fn target_resource_id(&self) -> Option<&str> {
        self.target.as_ref().and_then(RefTarget::resource_id)
    }
}

// ── Diagnostics ─────────────────────────────────────────────────────────────

/// Non-fatal problems collected while extracting and linking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A document segment could not be parsed and was skipped.
    Parse,
    /// A reference matched several candidates; a tie-break picked one.
    AmbiguousReference,
    /// A referenced file or folder does not exist.
    UnresolvedFile,
    /// A kustomization composes one of its own ancestors.
    CycleDetected,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse => write!(f, "parse"),
            Self::AmbiguousReference => write!(f, "ambiguous_reference"),
            Self::UnresolvedFile => write!(f, "unresolved_file"),
            Self::CycleDetected => write!(f, "cycle_detected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub file_path: Option<String>,
    pub resource_id: Option<ResourceId>,
    pub message: String,
}

impl Diagnostic {
    pub fn for_file(kind: DiagnosticKind, file_path: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            file_path: Some(file_path.to_string()),
            resource_id: None,
            message: message.into(),
        }
    }

    pub fn for_resource(kind: DiagnosticKind, resource: &Resource, message: impl Into<String>) -> Self {
        Self {
            kind,
            file_path: Some(resource.file_path.clone()),
            resource_id: Some(resource.id.clone()),
            message: message.into(),
        }
    }
}

// ── File events ─────────────────────────────────────────────────────────────

/// Events reported by a document store provider, carrying absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Added(PathBuf),
    Changed(PathBuf),
    Removed(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Added(p) | Self::Changed(p) | Self::Removed(p) => p,
        }
    }
}
