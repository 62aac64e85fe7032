//! # Atomic Writes
//!
//! Materialized files are written to `<path>.tmp` and renamed into place,
//! so a consumer never observes a partial payload. Files are created with
//! mode `0400`, directories with `0750`; atomic rename is the only
//! coordination primitive between the agent and the application.

use std::ffi::OsString;
use std::fs;
use std::io::Write as _;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

use crate::error::{AgentError, Result};

pub const FILE_MODE: u32 = 0o400;
pub const DIR_MODE: u32 = 0o750;

fn write_error(path: &Path, source: std::io::Error) -> AgentError {
    AgentError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Create `dir` (and any missing parents) with mode `0750`.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(DIR_MODE)
        .create(dir)
        .map_err(|e| write_error(dir, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".tmp");
    PathBuf::from(name)
}

/// Atomically write `bytes` to `path` with mode `0400`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }

    let tmp = temp_path(path);
    // A leftover temp file from an interrupted run is read-only; clear it
    // before recreating.
    match fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(write_error(&tmp, e)),
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .open(&tmp)
        .map_err(|e| write_error(&tmp, e))?;
    file.write_all(bytes).map_err(|e| write_error(&tmp, e))?;
    drop(file);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(write_error(path, e));
    }
    Ok(())
}
