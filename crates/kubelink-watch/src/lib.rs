//! kubelink-watch: Real-time file watcher for kubelink.
//!
//! Uses `notify` with debouncing to detect manifest changes and turns them into
//! the [`FileEvent`]s a resource engine consumes. Paths inside ignored
//! directories and files that cannot hold manifests are dropped.

use crossbeam_channel::Receiver;
use kubelink_core::{FileEvent, KubelinkError, WatchConfig};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, DebouncedEventKind};
use std::collections::HashSet;
use std::path::{Component, Path};
use std::time::Duration;

/// Default ignore directory names.
pub const IGNORE_DIRS: &[&str] = &[
    "node_modules",
    ".git",
    ".svn",
    ".idea",
    ".vscode",
    "target",
    "vendor",
];

/// Extensions of files that may hold manifests.
const WATCHABLE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Check if a file extension is watchable.
pub fn is_watchable(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| WATCHABLE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

/// Check if a path is inside one of the ignored directories.
pub fn should_ignore(path: &Path, ignore_dirs: &[String]) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| ignore_dirs.iter().any(|dir| dir == name)),
        _ => false,
    })
}

/// Map a debounced path to an engine event.
///
/// Existing folders are `Added` (the engine rescans them), existing files are
/// `Changed` (unknown files are added by the engine), and missing paths are
/// `Removed` whatever their extension, since they may have been folders.
pub fn classify(path: &Path, ignore_dirs: &[String]) -> Option<FileEvent> {
    if should_ignore(path, ignore_dirs) {
        return None;
    }
    if path.is_dir() {
        Some(FileEvent::Added(path.to_path_buf()))
    } else if path.exists() {
        is_watchable(path).then(|| FileEvent::Changed(path.to_path_buf()))
    } else {
        Some(FileEvent::Removed(path.to_path_buf()))
    }
}

/// File watcher that monitors a directory for changes with debouncing.
pub struct FileWatcher {
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<FileEvent>,
}

impl FileWatcher {
    /// Watch `root` recursively, ignoring [`IGNORE_DIRS`].
    pub fn new(root: &Path, config: &WatchConfig) -> Result<Self, KubelinkError> {
        let ignore_dirs = IGNORE_DIRS.iter().map(|d| d.to_string()).collect();
        Self::with_ignore_dirs(root, config, ignore_dirs)
    }

    /// Watch `root` recursively with a custom list of ignored directory names.
    pub fn with_ignore_dirs(
        root: &Path,
        config: &WatchConfig,
        ignore_dirs: Vec<String>,
    ) -> Result<Self, KubelinkError> {
        let (tx, rx) = crossbeam_channel::unbounded::<FileEvent>();

        let mut debouncer = new_debouncer(
            Duration::from_millis(config.debounce_ms),
            move |res: Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(events) => {
                    let mut seen = HashSet::new();
                    for event in events {
                        if !seen.insert(event.path.clone()) {
                            continue;
                        }
                        if event.kind == DebouncedEventKind::AnyContinuous {
                            tracing::debug!("{} still changing", event.path.display());
                        }
                        let Some(file_event) = classify(&event.path, &ignore_dirs) else {
                            continue;
                        };
                        if tx.send(file_event).is_err() {
                            tracing::debug!("Watch receiver dropped");
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {e}");
                }
            },
        )
        .map_err(|e| KubelinkError::Watch(format!("Failed to create debouncer: {e}")))?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)
            .map_err(|e| KubelinkError::Watch(format!("Failed to watch {}: {e}", root.display())))?;

        tracing::info!("Watching {} for changes", root.display());

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    /// Get the receiver for watch events.
    pub fn receiver(&self) -> &Receiver<FileEvent> {
        &self.receiver
    }
}
