// ── Traits ──────────────────────────────────────────────────────────────────

/// Supplies the namespace assumed for resources that do not declare one.
///
/// The surrounding application usually derives this from the active kube
/// context; the engine only needs the resulting name.
pub trait NamespaceResolver: Send + Sync {
    /// Namespace used for namespace-scoped matching when neither the resource
    /// nor the reference rule names one.
    fn default_namespace(&self) -> &str;
}

/// A fixed namespace, typically taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNamespace(pub String);

impl Default for StaticNamespace {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl NamespaceResolver for StaticNamespace {
    fn default_namespace(&self) -> &str {
        &self.0
    }
}
