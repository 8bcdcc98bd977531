//! Naming and copy engine for filesorter.
//!
//! This crate turns the walker's file descriptors into copies under a
//! destination root: each file gets a collision-free path in its bucket
//! from the [`DestinationNamer`], the [`CopyScheduler`] copies with bounded
//! concurrency, and the [`OutcomeReporter`] folds per-file outcomes into a
//! [`SortSummary`]. [`Sorter`] wires the stages together.
//!
//! # Example
//!
//! ```rust,no_run
//! use filesorter_ops::{SortConfig, Sorter};
//!
//! # async fn demo() -> Result<(), filesorter_ops::SetupError> {
//! let config = SortConfig::new("/downloads", "/sorted").with_recursive(true);
//! let summary = Sorter::new(config).run().await?;
//! println!("{}", summary.summary());
//! # Ok(())
//! # }
//! ```

mod conflict;
mod copy;
mod namer;
mod report;
mod scheduler;
mod sink;
mod sorter;

pub use conflict::disambiguated_name;
pub use copy::{COPY_CHUNK_SIZE, CopyOptions, copy_file, copy_task};
pub use namer::DestinationNamer;
pub use report::{Outcome, OutcomeRecord, OutcomeReporter, Severity};
pub use scheduler::CopyScheduler;
pub use sink::{ChannelSink, MemorySink, NullSink, OutcomeSink, TracingSink};
pub use sorter::Sorter;

// Re-export core types for convenience
pub use filesorter_core::{
    Bucket, CopyError, FileDescriptor, NameExhaustionError, ReserveError, SetupError,
    SortConfig, SortSummary, SortingTask, TaskState, TraversalError, classify,
};

/// Channel buffer size between pipeline stages.
pub const SORT_CHANNEL_SIZE: usize = 100;
