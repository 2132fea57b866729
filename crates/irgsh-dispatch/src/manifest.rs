//! Source package manifest (`.dsc`) file listing.
//!
//! Only the `Files:` section is interpreted. Each continuation line is a
//! whitespace-separated record whose third field is a file name relative to
//! the specification's artifact directory:
//!
//! ```text
//! Files:
//!  d41d8cd98f00b204e9800998ecf8427e 2048 pkg_1.0.orig.tar.gz
//!  0cc175b9c0f1b6a831c399e269772661 4096 pkg_1.0-1.debian.tar.xz
//! ```

use std::path::{Component, Path};

use tracing::debug;

use crate::error::{DispatchError, Result};

const FILES_FIELD: &str = "Files:";
const NAME_COLUMN: usize = 2;

/// Read a manifest from disk and list the file names of its `Files:` section.
///
/// A missing or unreadable manifest is reported as `MalformedManifest`.
pub fn manifest_files(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| DispatchError::malformed(path, format!("cannot read manifest: {e}")))?;

    let files =
        parse_files_section(&content).map_err(|reason| DispatchError::malformed(path, reason))?;
    debug!(manifest = %path.display(), count = files.len(), "manifest parsed");
    Ok(files)
}

/// List the file names of the `Files:` section of manifest text, in document order.
///
/// The section starts on the line after the first line beginning with
/// `Files:` and ends at the first line that is not indented. A record with
/// fewer than three fields is an error, never a shorter file list, and so is
/// a name that is not a plain file name (absolute, `..`, or nested).
pub fn parse_files_section(content: &str) -> std::result::Result<Vec<String>, String> {
    let mut lines = content.lines().enumerate();

    if !lines.by_ref().any(|(_, line)| line.starts_with(FILES_FIELD)) {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for (index, line) in lines {
        if !line.starts_with(|c: char| c.is_whitespace()) {
            break;
        }
        let name = line.split_whitespace().nth(NAME_COLUMN).ok_or_else(|| {
            format!(
                "line {}: expected `<checksum> <size> <name>`, got {:?}",
                index + 1,
                line.trim()
            )
        })?;
        if !is_plain_file_name(name) {
            return Err(format!(
                "line {}: {name:?} is not a file name inside the artifact directory",
                index + 1
            ));
        }
        files.push(name.to_string());
    }

    Ok(files)
}

fn is_plain_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
