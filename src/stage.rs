// src/stage.rs

use anyhow::{Context, Result};
use glob::{glob, Pattern};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

/// A downloaded file owned by exactly one month's iteration.
///
/// The file is removed when the guard is dropped, so every exit path out of
/// a month (success, skip, or error) leaves nothing behind.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Take ownership of `path`. The file does not have to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StagedFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the staged file on disk.
    pub fn size_bytes(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)
            .with_context(|| format!("stat staged file {}", self.path.display()))?
            .len())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        remove_quietly(&self.path);
    }
}

/// Best-effort delete. A missing file is fine; anything else is logged.
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed staged file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove staged file"),
    }
}

/// Remove staged files a killed run left in `dir`. Returns how many were found.
pub fn sweep_stale(dir: &Path) -> Result<usize> {
    let pattern = format!(
        "{}/temp_fhvhv_tripdata_*.parquet",
        Pattern::escape(&dir.display().to_string())
    );
    let mut found = 0;
    for entry in glob(&pattern).context("invalid glob pattern for staged files")? {
        match entry {
            Ok(path) if path.is_file() => {
                warn!(path = %path.display(), "removing stale staged file");
                remove_quietly(&path);
                found += 1;
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "cannot read glob entry"),
        }
    }
    Ok(found)
}
