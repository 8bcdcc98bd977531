//! Per-file outcome records and their reduction into a run summary.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;

use filesorter_core::{SortSummary, SortingTask, TaskState, TraversalError};

use crate::sink::OutcomeSink;

/// What happened to one source path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
    Skipped,
}

/// How loudly an outcome should be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A single outcome emitted to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRecord {
    pub source: PathBuf,
    pub destination: Option<PathBuf>,
    pub outcome: Outcome,
    pub error: Option<String>,
    pub severity: Severity,
}

impl OutcomeRecord {
    /// Build a record from a task. Returns `None` if the task is not terminal.
    pub fn from_task(task: &SortingTask) -> Option<Self> {
        let source = task.source().to_path_buf();
        match &task.state {
            TaskState::Completed => Some(Self {
                source,
                destination: task.destination.clone(),
                outcome: Outcome::Succeeded,
                error: None,
                severity: Severity::Info,
            }),
            TaskState::Failed(reason) => Some(Self {
                source,
                destination: None,
                outcome: Outcome::Failed,
                error: Some(reason.clone()),
                severity: Severity::Error,
            }),
            TaskState::Pending | TaskState::InFlight => None,
        }
    }

    /// Build a record for a path skipped during traversal.
    pub fn skipped(error: &TraversalError) -> Self {
        Self {
            source: error.path().to_path_buf(),
            destination: None,
            outcome: Outcome::Skipped,
            error: Some(error.to_string()),
            severity: Severity::Warning,
        }
    }
}

/// Collects terminal tasks, forwards their records to a sink and keeps the
/// running totals.
pub struct OutcomeReporter {
    sink: Arc<dyn OutcomeSink>,
    summary: SortSummary,
}

impl OutcomeReporter {
    /// Create a reporter that emits to `sink`.
    pub fn new(sink: Arc<dyn OutcomeSink>) -> Self {
        Self {
            sink,
            summary: SortSummary::new(),
        }
    }

    /// Record a task that reached a terminal state.
    ///
    /// Non-terminal tasks are ignored.
    pub fn record(&mut self, task: &SortingTask) {
        let Some(record) = OutcomeRecord::from_task(task) else {
            return;
        };

        match &task.state {
            TaskState::Completed => self.summary.record_success(task.bytes),
            TaskState::Failed(reason) => self.summary.record_failure(task.source(), reason.clone()),
            _ => {}
        }
        self.sink.emit(&record);
    }

    /// Record a failure for a file whose task could not be recovered.
    pub fn record_failure(&mut self, source: impl Into<PathBuf>, reason: impl Into<String>) {
        let source = source.into();
        let reason = reason.into();
        self.sink.emit(&OutcomeRecord {
            source: source.clone(),
            destination: None,
            outcome: Outcome::Failed,
            error: Some(reason.clone()),
            severity: Severity::Error,
        });
        self.summary.record_failure(source, reason);
    }

    /// Totals so far.
    pub fn summary(&self) -> &SortSummary {
        &self.summary
    }

    /// Reduce everything recorded into the final summary.
    pub fn finalize(self) -> SortSummary {
        self.summary
    }
}

impl std::fmt::Debug for OutcomeReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeReporter")
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}
