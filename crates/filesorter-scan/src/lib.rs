//! Source tree traversal for filesorter.
//!
//! This crate walks a source directory with jwalk and yields a lazy,
//! depth-first sequence of [`WalkEvent`]s: regular files as
//! [`FileDescriptor`]s, and skipped subtrees as [`TraversalError`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use filesorter_scan::{DirectoryWalker, WalkEvent};
//!
//! let walker = DirectoryWalker::new("/path/to/source").recursive(true);
//! for event in walker.traverse().unwrap() {
//!     match event {
//!         WalkEvent::File(file) => println!("{} -> {}", file.relative().display(), file.bucket()),
//!         WalkEvent::Skipped(err) => eprintln!("skipped: {err}"),
//!     }
//! }
//! ```

mod walker;

pub use walker::{DirectoryWalker, Traversal, WalkEvent, resolve_root};

// Re-export core types for convenience
pub use filesorter_core::{FileDescriptor, SetupError, TraversalError};
