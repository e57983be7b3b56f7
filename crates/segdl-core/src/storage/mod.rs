//! Download file layout and filesystem helpers.
//!
//! A segmented download keeps one file per byte range in a temp directory
//! next to the destination (`file.iso` → `file.iso.parts/segment-0`, ...).
//! The merge stage turns those into the final artifact.

mod space;

pub use space::available_space;

use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Suffix of the per-download temp directory.
pub const TEMP_DIR_SUFFIX: &str = ".parts";

/// File name prefix of a segment file; the segment index follows it.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Temp directory for a destination: appends `.parts` to the final path.
pub fn temp_dir_for(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_DIR_SUFFIX);
    PathBuf::from(o)
}

/// Path of segment `index` inside `temp_dir`.
pub fn segment_path(temp_dir: &Path, index: usize) -> PathBuf {
    temp_dir.join(format!("{SEGMENT_PREFIX}{index}"))
}

/// Segment files present in `temp_dir`, ordered by index (not by name, so
/// `segment-10` sorts after `segment-2`). A missing directory yields none.
pub fn segment_files(temp_dir: &Path) -> io::Result<Vec<(usize, PathBuf)>> {
    let entries = match std::fs::read_dir(temp_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(index) = name
            .to_str()
            .and_then(|n| n.strip_prefix(SEGMENT_PREFIX))
            .and_then(|i| i.parse::<usize>().ok())
        else {
            continue;
        };
        out.push((index, entry.path()));
    }
    out.sort_by_key(|(index, _)| *index);
    Ok(out)
}

/// Length of a file, 0 if it does not exist.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Remove a directory tree; a missing directory is not an error.
pub async fn remove_dir_if_exists(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {
            tracing::debug!(path = %dir.display(), "removed temp dir");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove a file; a missing file is not an error.
pub async fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Concatenate `parts` in order into a new file at `dest`, byte for byte.
/// Returns the number of bytes written.
pub async fn concat_files(parts: &[PathBuf], dest: &Path) -> io::Result<u64> {
    let mut out = tokio::fs::File::create(dest).await?;
    let mut written = 0u64;
    for part in parts {
        let mut input = tokio::fs::File::open(part).await?;
        written += tokio::io::copy(&mut input, &mut out).await?;
    }
    out.flush().await?;
    out.sync_all().await?;
    Ok(written)
}
