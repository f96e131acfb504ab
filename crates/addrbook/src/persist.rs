//! Durable snapshot and restore of the address book.
//!
//! Writes go to a temporary file in the target's directory, are synced,
//! given their mode bits, and then renamed over the target. The target is
//! therefore always either the previous complete snapshot or the new one.

use std::fs;
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::AddressBookError;
use crate::known::KnownEndpointSnapshot;

/// Snapshot document written to disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressBookFile {
    /// Hex-encoded node identity key
    pub key: String,
    pub addrs: Vec<KnownEndpointSnapshot>,
}

/// Load a snapshot from `path`.
///
/// Returns `Ok(None)` when no file exists. A file that exists but cannot be
/// read or parsed is an error the caller must not paper over.
pub fn load_snapshot(path: &Path) -> Result<Option<AddressBookFile>, AddressBookError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(AddressBookError::io(path, err)),
    };

    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|source| AddressBookError::CorruptSnapshot {
            path: path.to_path_buf(),
            source,
        })
}

/// Serialize `snapshot` as indented JSON and atomically replace `path`.
pub fn store_snapshot(
    path: &Path,
    snapshot: &AddressBookFile,
    mode: u32,
) -> Result<(), AddressBookError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    write_file_atomic(path, &bytes, mode)
}

/// Atomically replace `path` with `bytes`.
pub fn write_file_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<(), AddressBookError> {
    let parent = parent_dir(path);
    fs::create_dir_all(&parent).map_err(|e| AddressBookError::io(&parent, e))?;
    write_file_atomic_in(&parent, path, bytes, mode)
}

// `dir` must be on the same filesystem as `path` for the rename to be atomic.
fn write_file_atomic_in(
    dir: &Path,
    path: &Path,
    bytes: &[u8],
    mode: u32,
) -> Result<(), AddressBookError> {
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| AddressBookError::io(dir, e))?;
    temp.write_all(bytes)
        .map_err(|e| AddressBookError::io(temp.path(), e))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| AddressBookError::io(temp.path(), e))?;
    set_mode(temp.as_file(), mode).map_err(|e| AddressBookError::io(temp.path(), e))?;

    // A failed persist hands the temp file back; dropping it removes it.
    temp.persist(path)
        .map_err(|e| AddressBookError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(unix)]
fn set_mode(file: &fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
