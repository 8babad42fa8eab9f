/// Unified error type for kubelink.
#[derive(Debug, thiserror::Error)]
pub enum KubelinkError {
    #[error("Parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate kind registration: {0}")]
    DuplicateKind(String),

    #[error("Write failed for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
