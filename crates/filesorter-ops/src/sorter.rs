//! The sorting pipeline: walk, reserve, copy, report.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use filesorter_core::{SetupError, SortConfig, SortSummary, SortingTask, TraversalError};
use filesorter_scan::{DirectoryWalker, WalkEvent, resolve_root};

use crate::SORT_CHANNEL_SIZE;
use crate::copy::CopyOptions;
use crate::namer::DestinationNamer;
use crate::report::{OutcomeRecord, OutcomeReporter};
use crate::scheduler::CopyScheduler;
use crate::sink::{OutcomeSink, TracingSink};

/// Sorts a source tree into extension buckets under a destination root.
pub struct Sorter {
    config: SortConfig,
    sink: Arc<dyn OutcomeSink>,
    cancel: CancellationToken,
}

impl Sorter {
    /// Create a sorter that reports through [`TracingSink`].
    pub fn new(config: SortConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            cancel: CancellationToken::new(),
        }
    }

    /// Send outcome records to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn OutcomeSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use `token` to cancel the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this run.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run configuration.
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sort every file and return the summary.
    ///
    /// Fails only if the source root is unusable or the destination root
    /// cannot be created; individual file failures end up in the summary.
    pub async fn run(&self) -> Result<SortSummary, SetupError> {
        let source = resolve_root(&self.config.source_root)?;
        let destination = prepare_destination(&self.config.destination_root).await?;
        if destination == source {
            return Err(SetupError::InvalidConfig {
                message: format!(
                    "destination root {} is the source root",
                    destination.display()
                ),
            });
        }

        info!(
            source = %source.display(),
            destination = %destination.display(),
            recursive = self.config.recursive,
            concurrency = self.config.concurrency,
            "Starting file sorting"
        );

        let walker = DirectoryWalker::new(&source)
            .recursive(self.config.recursive)
            .threads(self.config.walk_threads)
            .exclude(destination.clone());

        let (event_tx, event_rx) = mpsc::channel(SORT_CHANNEL_SIZE);
        let (setup_tx, setup_rx) = oneshot::channel();
        let walk = tokio::task::spawn_blocking(move || walk_source(walker, setup_tx, event_tx));

        match setup_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(SetupError::Io {
                    path: source,
                    source: std::io::Error::other("walker stopped before starting"),
                });
            }
        }

        let namer = DestinationNamer::new(&destination, self.config.max_disambiguation_attempts);
        let (task_tx, task_rx) = mpsc::channel(SORT_CHANNEL_SIZE);
        let reserve = tokio::spawn(reserve_stage(
            event_rx,
            namer,
            task_tx,
            Arc::clone(&self.sink),
            self.cancel.clone(),
        ));

        let scheduler = CopyScheduler::new(self.config.concurrency)
            .with_options(CopyOptions {
                preserve_timestamps: self.config.preserve_timestamps,
                abort_on_cancel: self.config.abort_in_flight_on_cancel,
            })
            .with_cancellation(self.cancel.clone());

        let mut summary = scheduler
            .run(task_rx, OutcomeReporter::new(Arc::clone(&self.sink)))
            .await;

        summary.traversal_errors = match reserve.await {
            Ok(skipped) => skipped,
            Err(err) => {
                warn!(error = %err, "Reservation stage did not finish, skipped paths are lost");
                Vec::new()
            }
        };
        if walk.await.is_err() {
            debug!("Walker thread did not finish cleanly");
        }

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.traversal_errors.len(),
            cancelled = summary.cancelled,
            "File sorting completed"
        );

        Ok(summary)
    }
}

impl std::fmt::Debug for Sorter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sorter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Create the destination root and return its canonical path.
async fn prepare_destination(root: &Path) -> Result<PathBuf, SetupError> {
    let path = root.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&path)
            .and_then(|()| path.canonicalize())
            .map_err(|source| SetupError::DestinationUncreatable {
                path: path.clone(),
                source,
            })
    })
    .await
    .unwrap_or_else(|e| {
        Err(SetupError::DestinationUncreatable {
            path: root.to_path_buf(),
            source: std::io::Error::other(e),
        })
    })
}

/// Walk the source tree on a blocking thread, feeding events to `events`.
fn walk_source(
    walker: DirectoryWalker,
    setup_tx: oneshot::Sender<Result<(), SetupError>>,
    events: mpsc::Sender<WalkEvent>,
) {
    let traversal = match walker.traverse() {
        Ok(traversal) => {
            let _ = setup_tx.send(Ok(()));
            traversal
        }
        Err(e) => {
            let _ = setup_tx.send(Err(e));
            return;
        }
    };

    for event in traversal {
        if events.blocking_send(event).is_err() {
            debug!("Walk stopped, nobody is receiving");
            break;
        }
    }
}

/// Reserve a destination for each file and pass the task to the scheduler.
///
/// Returns the traversal errors seen along the way.
async fn reserve_stage(
    mut events: mpsc::Receiver<WalkEvent>,
    namer: DestinationNamer,
    tasks: mpsc::Sender<SortingTask>,
    sink: Arc<dyn OutcomeSink>,
    cancel: CancellationToken,
) -> Vec<TraversalError> {
    let mut skipped = Vec::new();

    while let Some(event) = events.recv().await {
        if cancel.is_cancelled() {
            break;
        }

        let task = match event {
            WalkEvent::Skipped(err) => {
                sink.emit(&OutcomeRecord::skipped(&err));
                skipped.push(err);
                continue;
            }
            WalkEvent::File(file) => {
                match namer.reserve(file.bucket(), file.name()).await {
                    Ok(destination) => SortingTask::new(file, destination),
                    Err(e) => SortingTask::unreserved(file, e.to_string()),
                }
            }
        };

        if tasks.send(task).await.is_err() {
            debug!("Scheduler stopped accepting tasks");
            break;
        }
    }

    skipped
}
