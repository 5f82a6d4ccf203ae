use crate::errors::{StoreError, StoreResult};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TEMP_SUFFIX: &str = ".tmp";

/// Writes `bytes` to `path` through a fsynced sibling temp file and a rename, so readers see
/// either the old content or the new content.
pub fn write(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let temp_path = temp_path_for(path)?;

    if let Err(error) = write_temp(&temp_path, bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(error);
    }

    if let Err(error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(StoreError::Io(format!(
            "failed to commit {}: {}",
            path.to_string_lossy(),
            error
        )));
    }

    if let Some(parent) = path.parent() {
        sync_dir(parent);
    }
    tracing::debug!(path = %path.to_string_lossy(), bytes = bytes.len(), "atomic write committed");
    Ok(())
}

/// Moves a file or a whole directory with a single rename.
pub fn rename(from: &Path, to: &Path) -> StoreResult<()> {
    fs::rename(from, to).map_err(|error| {
        StoreError::Io(format!(
            "failed to move {} to {}: {}",
            from.to_string_lossy(),
            to.to_string_lossy(),
            error
        ))
    })?;
    if let Some(parent) = to.parent() {
        sync_dir(parent);
    }
    tracing::debug!(from = %from.to_string_lossy(), to = %to.to_string_lossy(), "renamed");
    Ok(())
}

pub fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(TEMP_SUFFIX))
}

fn temp_path_for(path: &Path) -> StoreResult<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StoreError::Io(format!("invalid write target: {}", path.to_string_lossy())))?;
    let nonce = Uuid::new_v4().simple().to_string();
    Ok(path.with_file_name(format!("{}.{}{}", file_name, &nonce[..16], TEMP_SUFFIX)))
}

fn write_temp(temp_path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = fs::File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
