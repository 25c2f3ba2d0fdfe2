//! Run report and seen-set bookkeeping
//!
//! A [`Report`] records everything one synchronization run did: the paths the
//! crawler found, the output paths it claimed (the "seen set" consulted by
//! orphan detection), and the changes made to local files. It is persisted as
//! JSON in the output directory so the next run can diff against it.

use crate::path::PurePath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

/// A path could not be claimed in the seen set
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MarkError {
    /// A previous file already claimed the exact same output path
    #[error("a previous file already used path {0}")]
    Duplicate(PurePath),

    /// Claiming the path would require a file and a directory to share a path
    #[error("file at {path} collides with previous file at {collides_with}")]
    Conflict {
        path: PurePath,
        collides_with: PurePath,
    },
}

/// A stored report could not be loaded
#[derive(Debug, Error)]
pub enum ReportLoadError {
    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialized form of a report. Lists are sorted for stable output.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ReportData {
    #[serde(default)]
    found: Vec<PurePath>,
    #[serde(default)]
    reserved: Vec<PurePath>,
    #[serde(default)]
    known: Vec<PurePath>,
    #[serde(default)]
    added: Vec<PurePath>,
    #[serde(default)]
    changed: Vec<PurePath>,
    #[serde(default)]
    deleted: Vec<PurePath>,
    #[serde(default)]
    not_deleted: Vec<PurePath>,
    #[serde(default)]
    encountered_warnings: Vec<String>,
    #[serde(default)]
    encountered_errors: Vec<String>,
}

/// A report of one synchronization run
#[derive(Debug, Default)]
pub struct Report {
    /// Paths found by the crawler, untransformed
    found_paths: BTreeSet<PurePath>,

    /// Output paths reserved for metadata files (e.g. the report itself).
    /// These can't be claimed by rules and are never cleaned up.
    reserved_files: BTreeSet<PurePath>,

    /// Output paths claimed this run: the seen set for orphan detection
    known_files: BTreeSet<PurePath>,

    added_files: BTreeSet<PurePath>,
    changed_files: BTreeSet<PurePath>,
    deleted_files: BTreeSet<PurePath>,
    /// Orphans the cleanup decided (or was configured) to keep
    not_deleted_files: BTreeSet<PurePath>,

    encountered_warnings: Vec<String>,
    encountered_errors: Vec<String>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a stored report.
    pub fn load(path: &Path) -> Result<Report, ReportLoadError> {
        let content = std::fs::read_to_string(path)?;
        let data: ReportData = serde_json::from_str(&content)?;

        let mut report = Report::new();
        report.found_paths.extend(data.found);
        report.reserved_files.extend(data.reserved);
        report.known_files.extend(data.known);
        report.added_files.extend(data.added);
        report.changed_files.extend(data.changed);
        report.deleted_files.extend(data.deleted);
        report.not_deleted_files.extend(data.not_deleted);
        report.encountered_warnings = data.encountered_warnings;
        report.encountered_errors = data.encountered_errors;
        Ok(report)
    }

    /// Stores the report as pretty-printed JSON.
    pub fn store(&self, path: &Path) -> Result<(), ReportLoadError> {
        let data = ReportData {
            found: self.found_paths.iter().cloned().collect(),
            reserved: self.reserved_files.iter().cloned().collect(),
            known: self.known_files.iter().cloned().collect(),
            added: self.added_files.iter().cloned().collect(),
            changed: self.changed_files.iter().cloned().collect(),
            deleted: self.deleted_files.iter().cloned().collect(),
            not_deleted: self.not_deleted_files.iter().cloned().collect(),
            encountered_warnings: self.encountered_warnings.clone(),
            encountered_errors: self.encountered_errors.clone(),
        };

        let mut content = serde_json::to_string_pretty(&data)?;
        content.push('\n');
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Records a path the crawler discovered, before transformation.
    pub fn found(&mut self, path: PurePath) {
        self.found_paths.insert(path);
    }

    pub fn found_paths(&self) -> &BTreeSet<PurePath> {
        &self.found_paths
    }

    /// Reserves an output path for engine metadata.
    pub fn mark_reserved(&mut self, path: PurePath) {
        self.reserved_files.insert(path);
    }

    /// Claims an output path for this run.
    ///
    /// Fails if the path was already claimed, or if claiming it would require
    /// a file and a directory to share a path (one path being a prefix of the
    /// other).
    pub fn mark(&mut self, path: PurePath) -> Result<(), MarkError> {
        for other in self.marked() {
            if path == *other {
                return Err(MarkError::Duplicate(path));
            }
            if path.starts_with(other) || other.starts_with(&path) {
                return Err(MarkError::Conflict {
                    path,
                    collides_with: other.clone(),
                });
            }
        }

        self.known_files.insert(path);
        Ok(())
    }

    /// Whether an output path belongs to this run (claimed or reserved).
    pub fn is_marked(&self, path: &PurePath) -> bool {
        self.known_files.contains(path) || self.reserved_files.contains(path)
    }

    fn marked(&self) -> impl Iterator<Item = &PurePath> {
        self.known_files.iter().chain(self.reserved_files.iter())
    }

    pub fn add_file(&mut self, path: PurePath) {
        self.added_files.insert(path);
    }

    pub fn change_file(&mut self, path: PurePath) {
        self.changed_files.insert(path);
    }

    pub fn delete_file(&mut self, path: PurePath) {
        self.deleted_files.insert(path);
    }

    pub fn not_delete_file(&mut self, path: PurePath) {
        self.not_deleted_files.insert(path);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.encountered_warnings.push(warning);
    }

    pub fn add_error(&mut self, error: String) {
        self.encountered_errors.push(error);
    }

    pub fn added_files(&self) -> &BTreeSet<PurePath> {
        &self.added_files
    }

    pub fn changed_files(&self) -> &BTreeSet<PurePath> {
        &self.changed_files
    }

    pub fn deleted_files(&self) -> &BTreeSet<PurePath> {
        &self.deleted_files
    }

    pub fn not_deleted_files(&self) -> &BTreeSet<PurePath> {
        &self.not_deleted_files
    }

    pub fn encountered_warnings(&self) -> &[String] {
        &self.encountered_warnings
    }

    pub fn encountered_errors(&self) -> &[String] {
        &self.encountered_errors
    }

    /// Whether the run recorded neither warnings nor errors.
    pub fn error_free(&self) -> bool {
        self.encountered_warnings.is_empty() && self.encountered_errors.is_empty()
    }
}
