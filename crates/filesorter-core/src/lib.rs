//! Core types for filesorter.
//!
//! This crate holds the data model shared by the walker, the naming and
//! copy engine, and the CLI: file descriptors, extension buckets, task
//! lifecycle, run configuration, the error taxonomy, and the run summary.

mod bucket;
mod config;
mod descriptor;
mod error;
mod summary;
mod task;

pub use bucket::{Bucket, NO_EXTENSION, classify, split_extension};
pub use config::{
    DEFAULT_MAX_DISAMBIGUATION_ATTEMPTS, SortConfig, SortConfigBuilder, SortConfigBuilderError,
    default_concurrency,
};
pub use descriptor::FileDescriptor;
pub use error::{CopyError, NameExhaustionError, ReserveError, SetupError, TraversalError};
pub use summary::{FailureRecord, SortSummary};
pub use task::{SortingTask, TaskState};
