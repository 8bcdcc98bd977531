//! Bounded-concurrency copy scheduler.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use filesorter_core::{SortSummary, SortingTask};

use crate::copy::{CopyOptions, copy_task};
use crate::report::OutcomeReporter;

/// Runs copies for reserved tasks with at most `concurrency` in flight.
#[derive(Debug)]
pub struct CopyScheduler {
    concurrency: usize,
    options: CopyOptions,
    cancel: CancellationToken,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

impl CopyScheduler {
    /// Create a scheduler. A limit of 0 is treated as 1.
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            options: CopyOptions::default(),
            cancel: CancellationToken::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set copy options.
    pub fn with_options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    /// Stop admitting tasks once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Highest number of copies that ran at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Relaxed)
    }

    /// Copy every task received on `tasks` and return the summary.
    ///
    /// Tasks that arrive already failed are recorded without being copied.
    /// A failing copy never affects its siblings. On cancellation no new
    /// task is admitted; copies already running finish (or abort, if the
    /// options say so) and are folded into the summary. The summary is only
    /// marked cancelled if cancellation cut admission short.
    pub async fn run(
        &self,
        mut tasks: mpsc::Receiver<SortingTask>,
        mut reporter: OutcomeReporter,
    ) -> SortSummary {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut running: JoinSet<SortingTask> = JoinSet::new();
        let mut sources = HashMap::new();
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(in_flight = running.len(), "Cancelled, no longer admitting tasks");
                    cancelled = true;
                    break;
                }

                Some(joined) = running.join_next_with_id(), if !running.is_empty() => {
                    fold(joined, &mut sources, &mut reporter);
                }

                admission = next_admission(&mut tasks, &semaphore) => {
                    let Some((permit, task)) = admission else {
                        break;
                    };

                    if task.is_terminal() {
                        reporter.record(&task);
                        continue;
                    }

                    self.spawn(task, permit, &mut running, &mut sources);
                }
            }
        }

        tasks.close();

        while let Some(joined) = running.join_next_with_id().await {
            fold(joined, &mut sources, &mut reporter);
        }

        let mut summary = reporter.finalize();
        summary.cancelled = cancelled;
        summary
    }

    fn spawn(
        &self,
        mut task: SortingTask,
        permit: OwnedSemaphorePermit,
        running: &mut JoinSet<SortingTask>,
        sources: &mut HashMap<Id, PathBuf>,
    ) {
        task.start();
        let source = task.source().to_path_buf();
        let options = self.options.clone();
        let cancel = self.cancel.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak_in_flight);

        let handle = running.spawn(async move {
            let _permit = permit;
            let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);

            let task = copy_task(task, &options, &cancel).await;

            in_flight.fetch_sub(1, Ordering::SeqCst);
            task
        });
        sources.insert(handle.id(), source);
    }
}

/// Wait for a free slot, then for the next task.
///
/// Returns `None` once the task channel is closed and drained.
async fn next_admission(
    tasks: &mut mpsc::Receiver<SortingTask>,
    semaphore: &Arc<Semaphore>,
) -> Option<(OwnedSemaphorePermit, SortingTask)> {
    let permit = Arc::clone(semaphore).acquire_owned().await.ok()?;
    let task = tasks.recv().await?;
    Some((permit, task))
}

/// Fold a finished copy into the reporter.
fn fold(
    joined: Result<(Id, SortingTask), JoinError>,
    sources: &mut HashMap<Id, PathBuf>,
    reporter: &mut OutcomeReporter,
) {
    match joined {
        Ok((id, task)) => {
            sources.remove(&id);
            reporter.record(&task);
        }
        Err(err) => {
            let source = sources.remove(&err.id()).unwrap_or_default();
            warn!(path = %source.display(), error = %err, "Copy task did not finish");
            reporter.record_failure(source, format!("Copy task failed: {err}"));
        }
    }
}
