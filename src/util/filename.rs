//! Data directory naming conventions and filesystem helpers.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix carried by every log segment.
pub const DATA_FILE_SUFFIX: &str = ".data";

/// Key-to-position map emitted by merge.
pub const HINT_FILE_NAME: &str = "hint-index";

/// Marker recording the first file id that did not participate in a merge.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";

/// Holds the last committed sequence number, written at close.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Sentinel file for the directory lock.
pub const LOCK_FILE_NAME: &str = "flock";

/// Backing file for the persistent B+-tree index.
pub const BPTREE_INDEX_FILE_NAME: &str = "bptree-index";

/// Suffix appended to the data directory's base name for the merge scratch dir.
pub const MERGE_DIR_SUFFIX: &str = "_merge";

/// Generate a data file path: `NNNNNNNNN.data` with a zero-padded decimal id.
pub fn data_file_path(dir_path: &Path, file_id: u32) -> PathBuf {
    dir_path.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
}

/// Generate the hint file path.
pub fn hint_file_path(dir_path: &Path) -> PathBuf {
    dir_path.join(HINT_FILE_NAME)
}

/// Generate the merge-finished marker path.
pub fn merge_finished_file_path(dir_path: &Path) -> PathBuf {
    dir_path.join(MERGE_FINISHED_FILE_NAME)
}

/// Generate the sequence-number file path.
pub fn seq_no_file_path(dir_path: &Path) -> PathBuf {
    dir_path.join(SEQ_NO_FILE_NAME)
}

/// Generate the lock file path.
pub fn lock_file_path(dir_path: &Path) -> PathBuf {
    dir_path.join(LOCK_FILE_NAME)
}

/// Generate the B+-tree index backing file path.
pub fn bptree_index_file_path(dir_path: &Path) -> PathBuf {
    dir_path.join(BPTREE_INDEX_FILE_NAME)
}

/// Generate the merge scratch directory path, a sibling of the data
/// directory named after it: `/tmp/cask` merges into `/tmp/cask_merge`.
pub fn merge_dir_path(dir_path: &Path) -> PathBuf {
    let base = dir_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match dir_path.parent() {
        Some(parent) => parent.join(format!("{}{}", base, MERGE_DIR_SUFFIX)),
        None => PathBuf::from(format!("{}{}", base, MERGE_DIR_SUFFIX)),
    }
}

/// Parse a data file name (`NNNNNNNNN.data`) into its file id.
///
/// Returns `None` if the name does not carry the data suffix or the stem is
/// not a decimal number.
pub fn parse_data_file_id(name: &str) -> Option<u32> {
    let stem = name.strip_suffix(DATA_FILE_SUFFIX)?;
    stem.parse::<u32>().ok()
}

/// Total size in bytes of all files under a directory, recursively.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut size = 0;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            size += dir_size(&entry.path())?;
        } else {
            size += metadata.len();
        }
    }
    Ok(size)
}

/// Free disk space available to the filesystem holding `path`.
pub fn available_disk_space(path: &Path) -> io::Result<u64> {
    fs2::available_space(path)
}

/// Recursively copy `src` into `dest`, skipping entries whose file name is in
/// `exclude`. `dest` is created if absent.
pub fn copy_dir(src: &Path, dest: &Path, exclude: &[&str]) -> io::Result<()> {
    if !dest.exists() {
        fs::create_dir_all(dest)?;
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude
            .iter()
            .any(|e| name.to_string_lossy().as_ref() == *e)
        {
            continue;
        }

        let src_path = entry.path();
        let dest_path = dest.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&src_path, &dest_path, exclude)?;
        } else {
            fs::copy(&src_path, &dest_path)?;
        }
    }
    Ok(())
}

/// Delete a file, ignoring "not found" errors.
pub fn delete_file(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
