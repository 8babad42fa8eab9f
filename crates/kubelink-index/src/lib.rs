//! kubelink-index: manifest extraction and reference resolution for kubelink.
//!
//! Turns a folder of Kubernetes manifests and Kustomize overlays into a set of
//! resources annotated with incoming, outgoing and unsatisfied references, and
//! keeps that graph current as files and resource texts change.
//!
//! # Architecture
//!
//! - **document** — Document store: relative paths, folder tree, file text
//! - **extractor** — Splits multi-document YAML into resources and reconciles identities
//! - **content** — Reads scalars out of parsed content and locates them in the source text
//! - **kinds** — Kind registry with per-kind outgoing reference rules
//! - **resolver** — Resolves reference rules to target resources and mirrors incoming refs
//! - **kustomize** — Kustomization composition edges and patch naming
//! - **reprocess** — Chooses the resources to relink after a change and runs the passes
//! - **incremental** — SHA-256 change detection so unchanged files are not re-extracted
//! - **indexer** — Folder scanning into a document store and resource set
//! - **engine** — Mutation entry points (path events, edits, saves, previews, selection)

pub mod content;
pub mod document;
pub mod engine;
pub mod extractor;
pub mod incremental;
pub mod indexer;
pub mod kinds;
pub mod kustomize;
pub mod reprocess;
pub mod resolver;

pub use document::DocumentStore;
pub use engine::{NewResource, ResourceEngine};
pub use extractor::{extract_resources_from_file, Extraction};
pub use indexer::{Indexer, ScanResult};
pub use kinds::{KindDescriptor, KindRegistry, RefMapper, RefMapperTarget};
pub use reprocess::{reprocess, LinkContext};
pub use resolver::ReferenceResolver;
