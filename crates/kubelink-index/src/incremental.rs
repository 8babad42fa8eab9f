//! SHA-256 content hashes of loaded files.
//!
//! A change event for a file whose text hashes the same as when it was last
//! extracted is a no-op, which keeps editor saves and watcher echoes from
//! reshuffling resource identities and references.

use crate::document::is_under;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Tracks the content hash each file was last extracted from.
#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    /// relative path -> SHA-256 hex digest.
    known_hashes: HashMap<String, String>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the file is unknown or its text differs from the last record.
    pub fn is_changed(&self, relative_path: &str, text: &str) -> bool {
        self.known_hashes.get(relative_path) != Some(&hash_text(text))
    }

    /// Record the text a file was extracted from.
    pub fn record(&mut self, relative_path: &str, text: &str) {
        self.known_hashes
            .insert(relative_path.to_string(), hash_text(text));
    }

    /// Forget a file, or every file below a folder.
    pub fn forget(&mut self, relative_path: &str) {
        self.known_hashes.retain(|path, _| !is_under(path, relative_path));
    }

    pub fn clear(&mut self) {
        self.known_hashes.clear();
    }

    /// Number of tracked files.
    pub fn tracked_count(&self) -> usize {
        self.known_hashes.len()
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
