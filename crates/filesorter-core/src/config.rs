//! Sorting run configuration.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Default number of disambiguation attempts per file.
pub const DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS: u32 = 10_000;

/// Configuration for a sorting run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SortConfig {
    /// Directory to read files from.
    pub source_root: PathBuf,

    /// Directory to create buckets in.
    pub destination_root: PathBuf,

    /// Descend into subdirectories.
    #[builder(default = "false")]
    #[serde(default)]
    pub recursive: bool,

    /// Maximum number of copies in flight.
    pub concurrency: usize,

    /// Copy modification times onto destination files (best effort).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub preserve_timestamps: bool,

    /// Abort in-flight copies when the run is cancelled.
    #[builder(default = "false")]
    #[serde(default)]
    pub abort_in_flight_on_cancel: bool,

    /// Disambiguation attempts before a file is given up on.
    #[builder(default = "DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS")]
    #[serde(default = "default_max_attempts")]
    pub max_disambiguation_attempts: u32,

    /// Threads for directory walking (0 = walk on the calling thread).
    #[builder(default = "0")]
    #[serde(default)]
    pub walk_threads: usize,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS
}

impl SortConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.source_root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Source root cannot be empty".to_string());
            }
            None => return Err("Source root is required".to_string()),
            _ => {}
        }
        match self.destination_root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Destination root cannot be empty".to_string());
            }
            None => return Err("Destination root is required".to_string()),
            _ => {}
        }
        if let Some(0) = self.concurrency {
            return Err("Concurrency must be at least 1".to_string());
        }
        if let Some(0) = self.max_disambiguation_attempts {
            return Err("Disambiguation attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl SortConfig {
    /// Create a new sort config builder.
    pub fn builder() -> SortConfigBuilder {
        SortConfigBuilder::default()
    }

    /// Create a non-recursive config with one copy per available core.
    pub fn new(source_root: impl Into<PathBuf>, destination_root: impl Into<PathBuf>) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            recursive: false,
            concurrency: default_concurrency(),
            preserve_timestamps: true,
            abort_in_flight_on_cancel: false,
            max_disambiguation_attempts: DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS,
            walk_threads: 0,
        }
    }

    /// Set the recursion flag.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Set the concurrency limit (clamped to at least 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }
}

/// Number of available cores, falling back to 1.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}
