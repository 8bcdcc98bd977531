//! Destinations for outcome records.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::report::{Outcome, OutcomeRecord};

/// Receives outcome records as tasks complete.
///
/// Records arrive in completion order, which is not deterministic.
pub trait OutcomeSink: Send + Sync {
    /// Handle one record.
    fn emit(&self, record: &OutcomeRecord);
}

/// Logs each record through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutcomeSink for TracingSink {
    fn emit(&self, record: &OutcomeRecord) {
        let source = record.source.display();
        let error = record.error.as_deref().unwrap_or_default();
        match record.outcome {
            Outcome::Succeeded => {
                let dest = record.destination.as_deref().unwrap_or(Path::new(""));
                tracing::info!(target: "filesorter", "Copied: {} -> {}", source, dest.display());
            }
            Outcome::Skipped => {
                tracing::warn!(target: "filesorter", "Skipped {}: {}", source, error);
            }
            Outcome::Failed => {
                tracing::error!(target: "filesorter", "Error copying file {}: {}", source, error);
            }
        }
    }
}

/// Forwards records over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutcomeRecord>,
}

impl ChannelSink {
    /// Create a sink and the receiver its records arrive on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutcomeRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl OutcomeSink for ChannelSink {
    fn emit(&self, record: &OutcomeRecord) {
        // A dropped receiver just means nobody is listening.
        let _ = self.tx.send(record.clone());
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<OutcomeRecord>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the records received so far.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl OutcomeSink for MemorySink {
    fn emit(&self, record: &OutcomeRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutcomeSink for NullSink {
    fn emit(&self, _record: &OutcomeRecord) {}
}
