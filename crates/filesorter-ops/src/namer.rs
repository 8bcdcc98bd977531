//! Collision-free destination naming.
//!
//! Each bucket keeps an in-memory set of names already claimed during the
//! run, seeded from the bucket directory's listing on first touch. Claims
//! for one bucket are serialized by that bucket's mutex, so two callers can
//! never walk away with the same path. The filesystem is not re-queried per
//! attempt.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use compact_str::CompactString;
use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::debug;

use filesorter_core::{Bucket, NameExhaustionError, ReserveError};

use crate::conflict::disambiguated_name;

/// Names claimed in one bucket directory.
#[derive(Debug)]
struct BucketIndex {
    dir: PathBuf,
    claimed: OnceCell<Mutex<HashSet<OsString>>>,
}

/// Hands out unique destination paths under a destination root.
#[derive(Debug)]
pub struct DestinationNamer {
    root: PathBuf,
    max_attempts: u32,
    buckets: DashMap<Bucket, Arc<BucketIndex>>,
    directories_created: Arc<AtomicUsize>,
}

impl DestinationNamer {
    /// Create a namer for `root`, trying at most `max_attempts` names per file.
    pub fn new(root: impl Into<PathBuf>, max_attempts: u32) -> Self {
        Self {
            root: root.into(),
            max_attempts: max_attempts.max(1),
            buckets: DashMap::new(),
            directories_created: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Destination root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of bucket directories this namer created on disk.
    pub fn directories_created(&self) -> usize {
        self.directories_created.load(Ordering::Relaxed)
    }

    /// Claim a destination path for `file_name` in `bucket`.
    ///
    /// Creates the bucket directory on first touch. If the name is taken,
    /// numbered alternatives are tried until one is free or the attempt
    /// budget runs out.
    pub async fn reserve(
        &self,
        bucket: &Bucket,
        file_name: impl AsRef<OsStr>,
    ) -> Result<PathBuf, ReserveError> {
        let file_name = file_name.as_ref();
        let index = self.bucket_index(bucket);

        let created = Arc::clone(&self.directories_created);
        let dir = index.dir.clone();
        let claimed = index
            .claimed
            .get_or_try_init(|| open_bucket(dir, created))
            .await?;

        let mut claimed = claimed.lock().unwrap_or_else(PoisonError::into_inner);

        for attempt in 0..self.max_attempts {
            let candidate = if attempt == 0 {
                file_name.to_os_string()
            } else {
                disambiguated_name(file_name, attempt)
            };

            if claimed.insert(candidate.clone()) {
                if attempt > 0 {
                    debug!(
                        bucket = %bucket,
                        original = %file_name.to_string_lossy(),
                        name = %candidate.to_string_lossy(),
                        "Disambiguated name"
                    );
                }
                return Ok(index.dir.join(candidate));
            }
        }

        Err(NameExhaustionError {
            bucket: bucket.clone(),
            file_name: CompactString::from(file_name.to_string_lossy()),
            attempts: self.max_attempts,
        }
        .into())
    }

    /// Get or create the index for a bucket.
    fn bucket_index(&self, bucket: &Bucket) -> Arc<BucketIndex> {
        if let Some(index) = self.buckets.get(bucket) {
            return Arc::clone(index.value());
        }

        let index = self.buckets.entry(bucket.clone()).or_insert_with(|| {
            Arc::new(BucketIndex {
                dir: self.root.join(bucket.as_str()),
                claimed: OnceCell::new(),
            })
        });
        Arc::clone(index.value())
    }
}

/// Ensure a bucket directory exists and list the names already in it.
async fn open_bucket(
    dir: PathBuf,
    created: Arc<AtomicUsize>,
) -> Result<Mutex<HashSet<OsString>>, ReserveError> {
    let listing_dir = dir.clone();
    let result = tokio::task::spawn_blocking(move || {
        if ensure_dir(&listing_dir)? {
            created.fetch_add(1, Ordering::Relaxed);
        }
        list_names(&listing_dir)
    })
    .await
    .unwrap_or_else(|e| Err(io::Error::other(e)));

    match result {
        Ok(names) => {
            debug!(dir = %dir.display(), existing = names.len(), "Opened bucket");
            Ok(Mutex::new(names))
        }
        Err(source) => Err(ReserveError::BucketDirectory { path: dir, source }),
    }
}

/// Create `dir` if needed. Returns `true` if this call created it.
fn ensure_dir(dir: &Path) -> io::Result<bool> {
    match fs::create_dir(dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            if dir.is_dir() {
                Ok(false)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "a non-directory entry has the bucket's name",
                ))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(dir)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Names of every entry in `dir`.
fn list_names(dir: &Path) -> io::Result<HashSet<OsString>> {
    let mut names = HashSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name());
    }
    Ok(names)
}
