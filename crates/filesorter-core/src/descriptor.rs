//! File descriptors produced by the walker.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::bucket::{Bucket, classify};

/// A regular file found in the source tree.
///
/// The bucket is computed once from the file name when the descriptor is
/// created and never changes afterwards. The name is kept exactly as the
/// filesystem reported it; only classification sees its lossy UTF-8 form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    source: PathBuf,
    relative: PathBuf,
    name: OsString,
    bucket: Bucket,
}

impl FileDescriptor {
    /// Create a descriptor, classifying the file by its name.
    pub fn new(
        source: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        name: impl Into<OsString>,
    ) -> Self {
        let name = name.into();
        let bucket = classify(&name.to_string_lossy());
        Self {
            source: source.into(),
            relative: relative.into(),
            name,
            bucket,
        }
    }

    /// Create a descriptor from a source path relative to `root`.
    ///
    /// Returns `None` if the path has no file name.
    pub fn from_path(root: &Path, source: impl Into<PathBuf>) -> Option<Self> {
        let source = source.into();
        let name = source.file_name()?.to_os_string();
        let relative = source
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(&name));
        Some(Self::new(source, relative, name))
    }

    /// Absolute path of the source file.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Path of the source file relative to the source root.
    pub fn relative(&self) -> &Path {
        &self.relative
    }

    /// File name.
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Bucket the file sorts into.
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }
}
