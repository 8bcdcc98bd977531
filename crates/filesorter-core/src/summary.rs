//! Run summary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::TraversalError;

/// A file that could not be sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Source path of the file.
    pub source: PathBuf,
    /// Why it failed.
    pub reason: String,
}

/// Result of a completed sorting run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SortSummary {
    /// Files that reached a terminal state.
    pub total: usize,
    /// Files copied successfully.
    pub succeeded: usize,
    /// Files that failed.
    pub failed: usize,
    /// Bytes written to the destination.
    pub bytes_copied: u64,
    /// Failed files in the order they completed.
    pub failures: Vec<FailureRecord>,
    /// Subtrees and entries skipped during traversal.
    pub traversal_errors: Vec<TraversalError>,
    /// Whether the run was cancelled before all files were admitted.
    pub cancelled: bool,
}

impl SortSummary {
    /// Create an empty summary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a successful copy.
    pub fn record_success(&mut self, bytes: u64) {
        self.total += 1;
        self.succeeded += 1;
        self.bytes_copied += bytes;
    }

    /// Count a failed file.
    pub fn record_failure(&mut self, source: impl Into<PathBuf>, reason: impl Into<String>) {
        self.total += 1;
        self.failed += 1;
        self.failures.push(FailureRecord {
            source: source.into(),
            reason: reason.into(),
        });
    }

    /// Check if every file was sorted.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// Get a human-readable summary of the run.
    pub fn summary(&self) -> String {
        let mut text = if self.failed == 0 {
            format!("Sorted {} files", self.succeeded)
        } else {
            format!("Sorted {} files, {} failed", self.succeeded, self.failed)
        };
        if !self.traversal_errors.is_empty() {
            text.push_str(&format!(", {} skipped paths", self.traversal_errors.len()));
        }
        if self.cancelled {
            text.push_str(" (cancelled)");
        }
        text
    }
}
