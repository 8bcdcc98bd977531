//! JWalk-based source tree walker.

use std::path::{Path, PathBuf};

use jwalk::{DirEntry, Parallelism, WalkDir};
use tracing::debug;

use filesorter_core::{FileDescriptor, SetupError, TraversalError};

type EntryResult = Result<DirEntry<((), ())>, jwalk::Error>;

/// Item produced while walking the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    /// A regular file to sort.
    File(FileDescriptor),
    /// A subtree or entry that was skipped.
    Skipped(TraversalError),
}

/// Walks a source root and yields the files to sort.
#[derive(Debug, Clone)]
pub struct DirectoryWalker {
    root: PathBuf,
    recursive: bool,
    threads: usize,
    exclude: Option<PathBuf>,
}

impl DirectoryWalker {
    /// Create a non-recursive walker for `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            threads: 0,
            exclude: None,
        }
    }

    /// Descend into subdirectories.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Threads used to read directories (0 = walk on the calling thread).
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Never yield anything under `path`.
    ///
    /// Used to keep a destination that lives inside the source tree from
    /// being sorted into itself.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.exclude = Some(path.into());
        self
    }

    /// Start walking.
    ///
    /// The root is checked before anything is yielded: a missing root or a
    /// root that is not a directory fails here.
    pub fn traverse(&self) -> Result<Traversal, SetupError> {
        let root = resolve_root(&self.root)?;

        let parallelism = match self.threads {
            0 => Parallelism::Serial,
            n => Parallelism::RayonNewPool(n),
        };

        let mut walker = WalkDir::new(&root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .min_depth(1)
            .max_depth(if self.recursive { usize::MAX } else { 1 });

        if let Some(exclude) = self.exclude.clone() {
            walker = walker.process_read_dir(move |_depth, _path, _state, children| {
                children.retain(|child| {
                    child
                        .as_ref()
                        .map(|entry| entry.path() != exclude)
                        .unwrap_or(true)
                });
            });
        }

        debug!(root = %root.display(), recursive = self.recursive, "Starting traversal");

        Ok(Traversal {
            entries: Box::new(walker.into_iter()),
            root,
        })
    }
}

/// Check that `root` is a readable directory and return its canonical path.
pub fn resolve_root(root: &Path) -> Result<PathBuf, SetupError> {
    let resolved = root.canonicalize().map_err(|e| SetupError::io(root, e))?;
    if !resolved.is_dir() {
        return Err(SetupError::NotADirectory { path: resolved });
    }
    // The walk drops the root entry, and with it any error listing the root.
    std::fs::read_dir(&resolved).map_err(|e| SetupError::io(&resolved, e))?;
    Ok(resolved)
}

/// Lazy sequence of walk events, depth-first in name order.
pub struct Traversal {
    entries: Box<dyn Iterator<Item = EntryResult>>,
    root: PathBuf,
}

impl Traversal {
    /// Canonical source root being walked.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Turn one jwalk entry into an event, or `None` if it is not reported.
    fn classify_entry(&self, entry_result: EntryResult) -> Option<WalkEvent> {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                return Some(WalkEvent::Skipped(TraversalError::unreadable(
                    path,
                    err.to_string(),
                )));
            }
        };

        let path = entry.path();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            return entry.read_children_error.as_ref().map(|err| {
                WalkEvent::Skipped(TraversalError::unreadable(&path, err.to_string()))
            });
        }

        if file_type.is_file() {
            return FileDescriptor::from_path(&self.root, path).map(WalkEvent::File);
        }

        if file_type.is_symlink() {
            return match std::fs::metadata(&path) {
                Ok(target) if target.is_dir() => Some(WalkEvent::Skipped(
                    TraversalError::symlinked_directory(path),
                )),
                Ok(target) if target.is_file() => {
                    FileDescriptor::from_path(&self.root, path).map(WalkEvent::File)
                }
                Ok(_) => {
                    debug!(path = %path.display(), "Skipping symlink to special file");
                    None
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Skipping broken symlink");
                    None
                }
                Err(err) => Some(WalkEvent::Skipped(TraversalError::metadata(path, &err))),
            };
        }

        debug!(path = %path.display(), "Skipping special file");
        None
    }
}

impl Iterator for Traversal {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry_result = self.entries.next()?;
            if let Some(event) = self.classify_entry(entry_result) {
                return Some(event);
            }
        }
    }
}

impl std::fmt::Debug for Traversal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}
