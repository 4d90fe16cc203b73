use std::{fs::File, path::Path};

use fs4::fs_std::FileExt;
use log::debug;
use thiserror::Error;

/// Exclusive advisory lock held for as long as the value lives.
pub struct FileLock {
    _file: File,
}

#[derive(Error, Debug)]
#[error("could not lock {path}: {source}")]
pub struct Error {
    path: String,
    source: std::io::Error,
}

impl FileLock {
    /// Blocks until no other process holds the lock on `path`.
    pub fn acquire(path: &Path) -> Result<Self, Error> {
        let error = |source| Error {
            path: path.display().to_string(),
            source,
        };
        let file = File::create(path).map_err(error)?;
        debug!("Acquiring a lock on {}", path.display());
        FileExt::lock_exclusive(&file).map_err(error)?;
        debug!("Acquired a lock on {}", path.display());
        Ok(Self { _file: file })
    }
}
