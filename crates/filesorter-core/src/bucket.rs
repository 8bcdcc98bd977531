//! Extension classification.

use std::fmt;
use std::path::Path;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Bucket name for files without an extension.
pub const NO_EXTENSION: &str = "no_extension";

/// Name of a destination subdirectory, derived from a file's extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bucket(CompactString);

impl Bucket {
    /// The bucket for extensionless files.
    pub fn no_extension() -> Self {
        Self(CompactString::const_new(NO_EXTENSION))
    }

    /// Get the bucket name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if this is the extensionless bucket.
    pub fn is_no_extension(&self) -> bool {
        self.0 == NO_EXTENSION
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Bucket {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<Path> for Bucket {
    fn as_ref(&self) -> &Path {
        Path::new(self.0.as_str())
    }
}

/// Split a file name into stem and extension at the last `.`.
///
/// A leading dot does not start an extension (`.bashrc` has none), and
/// neither does a trailing one (`notes.`).
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            (&file_name[..idx], Some(&file_name[idx + 1..]))
        }
        _ => (file_name, None),
    }
}

/// Map a file name to its bucket.
///
/// The bucket is the lower-cased text after the last `.`, or
/// [`NO_EXTENSION`] when the name has no extension.
pub fn classify(file_name: &str) -> Bucket {
    match split_extension(file_name) {
        (_, Some(ext)) => Bucket(CompactString::from(ext.to_lowercase())),
        (_, None) => Bucket::no_extension(),
    }
}
