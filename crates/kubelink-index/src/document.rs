//! Document store: the folder tree under a root, keyed by relative path.
//!
//! Relative paths are `/`-separated and start with `/` (`/base/deploy.yaml`);
//! the root itself is stored under [`ROOT_FILE_ENTRY`]. The store owns file
//! metadata and text only; resources live in a separate [`ResourceMap`].

use chrono::{DateTime, Utc};
use kubelink_core::{FileEntry, FileMap, Resource, ResourceMap, ROOT_FILE_ENTRY};
use std::path::{Component, Path, PathBuf};

/// Folder tree rooted at a scanned directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
    files: FileMap,
}

impl DocumentStore {
    /// Create a store containing only the root sentinel.
    pub fn new(root: &Path) -> Self {
        let mut files = FileMap::new();
        files.insert(
            ROOT_FILE_ENTRY.to_string(),
            FileEntry {
                name: root
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ROOT_FILE_ENTRY.to_string()),
                relative_path: ROOT_FILE_ENTRY.to_string(),
                absolute_path: root.to_path_buf(),
                children: Some(Vec::new()),
                timestamp: None,
                text: None,
                is_dirty: false,
                is_excluded: false,
            },
        );
        Self {
            root: root.to_path_buf(),
            files,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn files(&self) -> &FileMap {
        &self.files
    }

    pub fn get(&self, relative_path: &str) -> Option<&FileEntry> {
        self.files.get(relative_path)
    }

    pub fn get_mut(&mut self, relative_path: &str) -> Option<&mut FileEntry> {
        self.files.get_mut(relative_path)
    }

    pub fn contains(&self, relative_path: &str) -> bool {
        self.files.contains_key(relative_path)
    }

    /// Number of entries, including the root sentinel.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.len() <= 1
    }

    /// Map an absolute path under the root to its relative key.
    pub fn relative_path_of(&self, absolute: &Path) -> Option<String> {
        let stripped = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = stripped
            .components()
            .filter_map(|c| match c {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        if parts.is_empty() {
            Some(ROOT_FILE_ENTRY.to_string())
        } else {
            Some(format!("/{}", parts.join("/")))
        }
    }

    /// Absolute path on disk for a relative key.
    pub fn absolute_path_of(&self, relative_path: &str) -> PathBuf {
        if relative_path == ROOT_FILE_ENTRY {
            return self.root.clone();
        }
        relative_path
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }

    /// Insert or replace a file entry, creating missing parent folders.
    pub fn upsert_file(
        &mut self,
        relative_path: &str,
        text: Option<String>,
        timestamp: Option<DateTime<Utc>>,
        is_excluded: bool,
    ) {
        let parent = parent_path(relative_path);
        self.ensure_dir(&parent);
        self.link_child(&parent, relative_path);

        let absolute_path = self.absolute_path_of(relative_path);
        self.files.insert(
            relative_path.to_string(),
            FileEntry {
                name: base_name(relative_path).to_string(),
                relative_path: relative_path.to_string(),
                absolute_path,
                children: None,
                timestamp,
                text,
                is_dirty: false,
                is_excluded,
            },
        );
    }

    /// Make sure a folder entry (and all of its ancestors) exists.
    pub fn ensure_dir(&mut self, relative_path: &str) {
        if self.files.contains_key(relative_path) {
            return;
        }
        let parent = parent_path(relative_path);
        self.ensure_dir(&parent);
        self.link_child(&parent, relative_path);

        let absolute_path = self.absolute_path_of(relative_path);
        self.files.insert(
            relative_path.to_string(),
            FileEntry {
                name: base_name(relative_path).to_string(),
                relative_path: relative_path.to_string(),
                absolute_path,
                children: Some(Vec::new()),
                timestamp: None,
                text: None,
                is_dirty: false,
                is_excluded: false,
            },
        );
    }

    /// Remove a path and all of its descendants. Returns the removed keys.
    /// The root sentinel is never removed.
    pub fn remove(&mut self, relative_path: &str) -> Vec<String> {
        if relative_path == ROOT_FILE_ENTRY || !self.files.contains_key(relative_path) {
            return Vec::new();
        }

        let prefix = format!("{relative_path}/");
        let removed: Vec<String> = self
            .files
            .keys()
            .filter(|k| k.as_str() == relative_path || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &removed {
            self.files.remove(key);
        }

        let parent = parent_path(relative_path);
        if let Some(children) = self.files.get_mut(&parent).and_then(|e| e.children.as_mut()) {
            let name = base_name(relative_path);
            children.retain(|c| c != name);
        }

        removed
    }

    /// All entries from the root down to `relative_path`, in that order.
    pub fn entries_for_path(&self, relative_path: &str) -> Vec<&FileEntry> {
        let mut chain = Vec::new();
        if let Some(root) = self.files.get(ROOT_FILE_ENTRY) {
            chain.push(root);
        }
        if relative_path == ROOT_FILE_ENTRY {
            return chain;
        }
        let mut current = String::new();
        for part in relative_path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(part);
            match self.files.get(&current) {
                Some(entry) => chain.push(entry),
                None => return Vec::new(),
            }
        }
        chain
    }

    /// Relative paths of all files at or below `relative_path`.
    pub fn descendant_files(&self, relative_path: &str) -> Vec<String> {
        self.files
            .values()
            .filter(|e| !e.is_dir() && is_under(&e.relative_path, relative_path))
            .map(|e| e.relative_path.clone())
            .collect()
    }

    fn link_child(&mut self, parent: &str, child: &str) {
        let name = base_name(child).to_string();
        if let Some(children) = self.files.get_mut(parent).and_then(|e| e.children.as_mut()) {
            if let Err(pos) = children.binary_search(&name) {
                children.insert(pos, name);
            }
        }
    }
}

/// Relative path of the folder containing `relative_path`.
pub fn parent_path(relative_path: &str) -> String {
    match relative_path.rfind('/') {
        Some(0) | None => ROOT_FILE_ENTRY.to_string(),
        Some(idx) => relative_path[..idx].to_string(),
    }
}

/// Last segment of a relative path.
pub fn base_name(relative_path: &str) -> &str {
    relative_path.rsplit('/').next().unwrap_or(relative_path)
}

/// Join a child name onto a folder key.
pub fn join_path(folder: &str, name: &str) -> String {
    if folder == ROOT_FILE_ENTRY {
        format!("/{name}")
    } else {
        format!("{folder}/{name}")
    }
}

/// Resolve `entry` (which may contain `.` and `..`) against a folder key.
///
/// Returns `None` for absolute entries, URLs, and paths escaping the root.
pub fn resolve_relative(folder: &str, entry: &str) -> Option<String> {
    let entry = entry.trim();
    if entry.is_empty() || entry.starts_with('/') || entry.contains("://") {
        return None;
    }

    let mut parts: Vec<&str> = if folder == ROOT_FILE_ENTRY {
        Vec::new()
    } else {
        folder.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in entry.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        Some(ROOT_FILE_ENTRY.to_string())
    } else {
        Some(format!("/{}", parts.join("/")))
    }
}

/// True when `path` equals `folder` or lies below it.
pub fn is_under(path: &str, folder: &str) -> bool {
    folder == ROOT_FILE_ENTRY || path == folder || path.starts_with(&format!("{folder}/"))
}

/// Resources owned by the file at `relative_path`, ordered by range start.
pub fn resources_for_path<'a>(relative_path: &str, resources: &'a ResourceMap) -> Vec<&'a Resource> {
    let mut found: Vec<&Resource> = resources
        .values()
        .filter(|r| r.file_path == relative_path)
        .collect();
    found.sort_by_key(|r| (r.range.map(|range| range.start).unwrap_or(0), r.id.clone()));
    found
}
