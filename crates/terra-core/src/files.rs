//! Atomic file replacement
//!
//! Readers either see the previous contents or the new contents, never a
//! partially written file.

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Result, TerraError};

/// Write `contents` to `path` through a sibling temp file and a rename.
///
/// With `private` set the file is owner-readable only (0600 on unix);
/// otherwise it is world-readable (0644).
pub fn write_atomic(path: &Path, contents: &[u8], private: bool) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        TerraError::Internal(format!("{} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    // dropped without persisting on any error, which removes it
    let mut tmp = NamedTempFile::new_in(parent)?;
    set_permissions(tmp.path(), private)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| TerraError::Io(e.error))?;
    Ok(())
}

/// Serialize a value as pretty JSON and write it atomically
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T, private: bool) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content, private)
}

/// Read a JSON file, `None` when it does not exist
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read(path)?;
    Ok(Some(serde_json::from_slice(&content)?))
}

#[cfg(unix)]
fn set_permissions(path: &Path, private: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = if private { 0o600 } else { 0o644 };
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _private: bool) -> Result<()> {
    Ok(())
}
