//! Error types for sorting runs.
//!
//! Only [`SetupError`] aborts a run. The other kinds are caught per file or
//! per subtree and folded into the run summary.

use std::io;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bucket::Bucket;

/// Errors that stop a run before any file is processed.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Source root does not exist.
    #[error("Source root not found: {path}")]
    NotFound { path: PathBuf },

    /// Source root is not a directory.
    #[error("Source root is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Permission denied for a root path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Destination root could not be created.
    #[error("Cannot create destination root {path}: {source}")]
    DestinationUncreatable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SetupError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }
}

/// A subtree or entry that was skipped while walking the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum TraversalError {
    /// A directory could not be read.
    #[error("Cannot read directory {path}: {message}")]
    Unreadable { path: PathBuf, message: String },

    /// A symbolic link to a directory was not followed.
    #[error("Skipped symlinked directory: {path}")]
    SymlinkedDirectory { path: PathBuf },

    /// Entry metadata could not be read.
    #[error("Cannot read metadata for {path}: {message}")]
    Metadata { path: PathBuf, message: String },
}

impl TraversalError {
    /// Create an unreadable directory error.
    pub fn unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Unreadable {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a symlinked directory error.
    pub fn symlinked_directory(path: impl Into<PathBuf>) -> Self {
        Self::SymlinkedDirectory { path: path.into() }
    }

    /// Create a metadata error.
    pub fn metadata(path: impl Into<PathBuf>, error: &io::Error) -> Self {
        Self::Metadata {
            path: path.into(),
            message: error.to_string(),
        }
    }

    /// The path that was skipped.
    pub fn path(&self) -> &Path {
        match self {
            Self::Unreadable { path, .. }
            | Self::SymlinkedDirectory { path }
            | Self::Metadata { path, .. } => path,
        }
    }
}

/// Failure to copy a single file.
#[derive(Debug, Error)]
pub enum CopyError {
    /// The source could not be opened or read.
    #[error("Cannot read source {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The destination file could not be created.
    #[error("Cannot create destination {path}: {source}")]
    DestinationCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading or writing failed part-way.
    #[error("I/O error copying to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The copy was aborted by run cancellation.
    #[error("Copy to {path} cancelled")]
    Cancelled { path: PathBuf },

    /// The copy task itself failed (panicked or was aborted).
    #[error("Copy task failed: {message}")]
    TaskFailed { message: String },
}

/// No free destination name was found within the retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No free name for {file_name} in bucket {bucket} after {attempts} attempts")]
pub struct NameExhaustionError {
    pub bucket: Bucket,
    pub file_name: CompactString,
    pub attempts: u32,
}

/// Failure to reserve a destination path.
#[derive(Debug, Error)]
pub enum ReserveError {
    /// The bucket directory could not be created or listed.
    #[error("Cannot prepare bucket directory {path}: {source}")]
    BucketDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disambiguation ran out of attempts.
    #[error(transparent)]
    Exhausted(#[from] NameExhaustionError),
}
