//! Folder scanning.
//!
//! Walks a folder (respecting `.gitignore`), records every path in the
//! document store, and extracts resources from files matching the include
//! patterns. Excluded paths stay in the tree flagged `is_excluded`; files
//! above the size limit are listed without text.

use crate::document::{is_under, DocumentStore};
use crate::extractor::{extract_resources_from_file, Extraction};
use crate::incremental::ChangeDetector;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use kubelink_core::{Diagnostic, KubelinkError, Resource, ScanConfig};
use std::path::Path;

/// Result of scanning a folder.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Number of files walked.
    pub files_scanned: usize,
    /// Number of files whose text was extracted.
    pub files_parsed: usize,
    /// Number of files flagged by an exclusion pattern.
    pub files_excluded: usize,
    /// Number of files not read (too large or unreadable).
    pub files_skipped: usize,
    pub resources: Vec<Resource>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Include / exclude / size rules compiled from [`ScanConfig`].
#[derive(Debug, Clone)]
pub struct ScanFilter {
    includes: GlobSet,
    excludes: GlobSet,
    max_file_size: u64,
}

impl ScanFilter {
    pub fn from_config(config: &ScanConfig) -> Result<Self, KubelinkError> {
        Ok(Self {
            includes: build_globset(&config.file_includes)?,
            excludes: build_globset(&config.scan_excludes)?,
            max_file_size: config.max_file_size_kb.saturating_mul(1024),
        })
    }

    /// True if the file name or relative path matches an include pattern.
    pub fn is_included(&self, relative_path: &str) -> bool {
        let trimmed = relative_path.trim_start_matches('/');
        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        self.includes.is_match(name) || self.includes.is_match(trimmed)
    }

    /// True if the relative path, or any of its segments, matches an exclusion.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        let trimmed = relative_path.trim_start_matches('/');
        self.excludes.is_match(trimmed)
            || trimmed
                .split('/')
                .any(|segment| self.excludes.is_match(segment))
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, KubelinkError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| KubelinkError::Config(format!("invalid pattern '{pattern}': {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| KubelinkError::Config(e.to_string()))
}

/// Text and modification time of a file on disk.
#[derive(Debug, Clone)]
pub struct FileRead {
    pub text: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// The scanning pipeline.
///
/// Coordinates directory walking, filtering, change tracking and extraction.
pub struct Indexer {
    filter: ScanFilter,
    change_detector: ChangeDetector,
}

impl Indexer {
    pub fn new(config: &ScanConfig) -> Result<Self, KubelinkError> {
        Ok(Self {
            filter: ScanFilter::from_config(config)?,
            change_detector: ChangeDetector::new(),
        })
    }

    pub fn filter(&self) -> &ScanFilter {
        &self.filter
    }

    pub fn change_detector(&self) -> &ChangeDetector {
        &self.change_detector
    }

    pub fn change_detector_mut(&mut self) -> &mut ChangeDetector {
        &mut self.change_detector
    }

    /// True if files at this path are parsed for resources.
    pub fn is_parsable(&self, relative_path: &str) -> bool {
        self.filter.is_included(relative_path) && !self.filter.is_excluded(relative_path)
    }

    /// Scan everything under the store's root.
    pub fn scan_folder(&mut self, store: &mut DocumentStore) -> Result<ScanResult, KubelinkError> {
        let root = store.root().to_path_buf();
        if !root.is_dir() {
            return Err(KubelinkError::NotFound(format!("Folder {}", root.display())));
        }
        self.change_detector.clear();
        let result = self.scan_path(store, &root)?;
        tracing::info!(
            "Scanned {}: {} files, {} parsed, {} excluded, {} skipped, {} resources",
            root.display(),
            result.files_scanned,
            result.files_parsed,
            result.files_excluded,
            result.files_skipped,
            result.resources.len(),
        );
        Ok(result)
    }

    /// Scan a file or folder below the store's root, adding what it finds.
    pub fn scan_path(&mut self, store: &mut DocumentStore, path: &Path) -> Result<ScanResult, KubelinkError> {
        let mut result = ScanResult::default();
        let mut excluded_dirs: Vec<String> = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::warn!("Walk error: {}", err);
                    continue;
                }
            };
            let Some(relative) = store.relative_path_of(entry.path()) else {
                continue;
            };
            if store.get(&relative).is_some_and(|e| e.is_root()) {
                continue;
            }
            if excluded_dirs.iter().any(|dir| is_under(&relative, dir)) {
                continue;
            }

            let is_excluded = self.filter.is_excluded(&relative);
            if entry.file_type().is_some_and(|ft| ft.is_dir()) {
                store.ensure_dir(&relative);
                if is_excluded {
                    if let Some(dir) = store.get_mut(&relative) {
                        dir.is_excluded = true;
                    }
                    excluded_dirs.push(relative);
                }
                continue;
            }
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if store.contains(&relative) {
                // Known files are refreshed through their own change events.
                continue;
            }

            result.files_scanned += 1;
            if is_excluded {
                result.files_excluded += 1;
                store.upsert_file(&relative, None, None, true);
                continue;
            }
            if !self.filter.is_included(&relative) {
                store.upsert_file(&relative, None, None, false);
                continue;
            }

            let read = match self.read_file(entry.path()) {
                Ok(read) => read,
                Err(err) => {
                    tracing::warn!("Failed to read {}: {}", entry.path().display(), err);
                    result.files_skipped += 1;
                    continue;
                }
            };
            let Some(text) = read.text else {
                result.files_skipped += 1;
                store.upsert_file(&relative, None, read.timestamp, false);
                continue;
            };

            let Extraction {
                resources,
                diagnostics,
            } = extract_resources_from_file(&relative, &text);
            self.change_detector.record(&relative, &text);
            store.upsert_file(&relative, Some(text), read.timestamp, false);
            result.files_parsed += 1;
            result.resources.extend(resources);
            result.diagnostics.extend(diagnostics);
        }

        Ok(result)
    }

    /// Read a file's text and timestamp. Files above the size limit have no text.
    pub fn read_file(&self, path: &Path) -> Result<FileRead, KubelinkError> {
        let metadata = std::fs::metadata(path)?;
        let timestamp = metadata.modified().ok().map(DateTime::<Utc>::from);
        if metadata.len() > self.filter.max_file_size {
            tracing::warn!(
                "Skipping {}: {} bytes exceeds the size limit",
                path.display(),
                metadata.len()
            );
            return Ok(FileRead {
                text: None,
                timestamp,
            });
        }
        let text = std::fs::read_to_string(path)?;
        Ok(FileRead {
            text: Some(text),
            timestamp,
        })
    }
}
