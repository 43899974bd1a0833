//! Destination file lifecycle.
//!
//! The merge consumer creates `<dest>.part`, preallocates it to the task's
//! total length (fallocate on Linux when available, else set_len), copies
//! each merged chunk in at its offset with positional writes, and renames
//! the file into place once the checksum matches.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

use std::path::{Path, PathBuf};

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `file.iso` → `file.iso.part`).
pub fn temp_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    PathBuf::from(o)
}
