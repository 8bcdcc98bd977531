//! Disambiguated names for colliding files.

use std::ffi::{OsStr, OsString};
use std::path::Path;

/// Build the `attempt`-th alternative for `file_name`.
///
/// The counter goes between stem and extension: for "a.txt" this gives
/// "a_1.txt", "a_2.txt", etc. Names without an extension get the counter
/// appended ("README_1"). Bytes that are not valid UTF-8 are kept as is.
pub fn disambiguated_name(file_name: &OsStr, attempt: u32) -> OsString {
    let path = Path::new(file_name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) if !ext.is_empty() => {
            let mut name = stem.to_os_string();
            name.push(format!("_{attempt}."));
            name.push(ext);
            name
        }
        // No dot, a leading dot only (".bashrc") or a trailing dot ("notes.").
        _ => {
            let mut name = file_name.to_os_string();
            name.push(format!("_{attempt}"));
            name
        }
    }
}
