//! Sorting task lifecycle.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::descriptor::FileDescriptor;

/// Lifecycle state of a [`SortingTask`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TaskState {
    /// Destination reserved, waiting for a copy slot.
    Pending,
    /// Copy in progress.
    InFlight,
    /// Copy finished.
    Completed,
    /// The task failed with the given reason.
    Failed(String),
}

/// A file paired with the destination path reserved for it.
#[derive(Debug, Clone, Serialize)]
pub struct SortingTask {
    pub descriptor: FileDescriptor,
    /// Reserved destination, `None` if reservation itself failed.
    pub destination: Option<PathBuf>,
    pub state: TaskState,
    /// Bytes written to the destination.
    pub bytes: u64,
}

impl SortingTask {
    /// Create a pending task for a reserved destination.
    pub fn new(descriptor: FileDescriptor, destination: PathBuf) -> Self {
        Self {
            descriptor,
            destination: Some(destination),
            state: TaskState::Pending,
            bytes: 0,
        }
    }

    /// Create a task that failed before a destination could be reserved.
    pub fn unreserved(descriptor: FileDescriptor, reason: impl Into<String>) -> Self {
        Self {
            descriptor,
            destination: None,
            state: TaskState::Failed(reason.into()),
            bytes: 0,
        }
    }

    /// Source path of the file.
    pub fn source(&self) -> &Path {
        self.descriptor.source()
    }

    /// Mark the copy as started.
    pub fn start(&mut self) {
        debug_assert_eq!(self.state, TaskState::Pending);
        self.state = TaskState::InFlight;
    }

    /// Mark the copy as finished.
    pub fn complete(&mut self, bytes: u64) {
        self.bytes = bytes;
        self.state = TaskState::Completed;
    }

    /// Mark the task as failed.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = TaskState::Failed(reason.into());
    }

    /// Check if the task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, TaskState::Completed | TaskState::Failed(_))
    }

    /// Failure reason, if the task failed.
    pub fn failure(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}
