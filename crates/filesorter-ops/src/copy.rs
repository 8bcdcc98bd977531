//! Byte-for-byte file copy.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use filesorter_core::{CopyError, SortingTask};

/// Size of the buffer used to copy file contents.
pub const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Options for copy operations.
#[derive(Debug, Clone)]
pub struct CopyOptions {
    /// Whether to copy the source modification time (best effort).
    pub preserve_timestamps: bool,
    /// Whether a cancelled run interrupts copies that already started.
    pub abort_on_cancel: bool,
}

impl Default for CopyOptions {
    fn default() -> Self {
        Self {
            preserve_timestamps: true,
            abort_on_cancel: false,
        }
    }
}

/// Run the copy for a pending task and return it in a terminal state.
pub async fn copy_task(
    mut task: SortingTask,
    options: &CopyOptions,
    cancel: &CancellationToken,
) -> SortingTask {
    let Some(destination) = task.destination.clone() else {
        if !task.is_terminal() {
            task.fail("No destination reserved");
        }
        return task;
    };

    let source = task.source().to_path_buf();
    let options = options.clone();
    let cancel = cancel.clone();

    let result = tokio::task::spawn_blocking(move || {
        copy_file(&source, &destination, &options, &cancel)
    })
    .await
    .unwrap_or_else(|e| {
        Err(CopyError::TaskFailed {
            message: e.to_string(),
        })
    });

    match result {
        Ok(bytes) => task.complete(bytes),
        Err(e) => task.fail(e.to_string()),
    }
    task
}

/// Copy `source` to a new file at `dest`.
///
/// The destination must not exist yet. A partially written destination is
/// removed when the copy fails. Returns the number of bytes copied.
pub fn copy_file(
    source: &Path,
    dest: &Path,
    options: &CopyOptions,
    cancel: &CancellationToken,
) -> Result<u64, CopyError> {
    let mut reader = File::open(source).map_err(|e| source_error(source, e))?;
    let metadata = reader.metadata().map_err(|e| source_error(source, e))?;

    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(dest)
        .map_err(|e| CopyError::DestinationCreate {
            path: dest.to_path_buf(),
            source: e,
        })?;

    match copy_contents(&mut reader, &mut writer, source, dest, options, cancel) {
        Ok(bytes) => {
            if options.preserve_timestamps {
                if let Ok(modified) = metadata.modified() {
                    let _ = writer.set_modified(modified);
                }
            }
            Ok(bytes)
        }
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(dest);
            Err(e)
        }
    }
}

fn copy_contents(
    reader: &mut File,
    writer: &mut File,
    source: &Path,
    dest: &Path,
    options: &CopyOptions,
    cancel: &CancellationToken,
) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        if options.abort_on_cancel && cancel.is_cancelled() {
            return Err(CopyError::Cancelled {
                path: dest.to_path_buf(),
            });
        }

        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(source_error(source, e)),
        };

        writer.write_all(&buf[..n]).map_err(|e| dest_error(dest, e))?;
        total += n as u64;
    }

    writer.flush().map_err(|e| dest_error(dest, e))?;
    Ok(total)
}

fn source_error(path: &Path, source: io::Error) -> CopyError {
    CopyError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    }
}

fn dest_error(path: &Path, source: io::Error) -> CopyError {
    CopyError::Io {
        path: PathBuf::from(path),
        source,
    }
}
