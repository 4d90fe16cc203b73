use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use crate::{
    fetch::{has_entries, FetchError, Fetcher},
    flock::FileLock,
    model::{
        project::DependencyDeclaration,
        source::{SourceDescriptor, SourceType},
    },
};

const LOCK_FILE: &str = ".lock";

/// Resolved dependencies, one subdirectory per declaration.
pub struct DependencyCache {
    root: PathBuf,
    fetcher: Fetcher,
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Cache lock cannot be acquired: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("failed to resolve dependency {name}: {source}")]
    Resolve {
        name: String,
        #[source]
        source: FetchError,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl DependencyCache {
    pub fn new(root: PathBuf, fetcher: Fetcher) -> Result<DependencyCache, CacheError> {
        if root.exists() {
            if !root.is_dir() {
                return Err(CacheError::BadLocation {
                    location: root.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&root)?;
        }
        Ok(DependencyCache { root, fetcher })
    }

    /// Fetches every declaration in order, stopping at the first failure.
    ///
    /// Dependencies resolved before the failure stay in the cache.
    pub fn resolve_all(&self, deps: &[DependencyDeclaration]) -> Result<(), CacheError> {
        if deps.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)?;
        let _lock = FileLock::acquire(&self.root.join(LOCK_FILE))?;

        for dep in deps {
            self.resolve(dep)?;
        }
        info!("Resolved {} dependencies", deps.len());
        Ok(())
    }

    fn resolve(&self, dep: &DependencyDeclaration) -> Result<(), CacheError> {
        let target = self.target_path(dep);
        debug!("Resolving {} into {}", dep.name, target.display());

        let resolve_error = |source| CacheError::Resolve {
            name: dep.name.clone(),
            source,
        };
        let descriptor = SourceDescriptor::from_parts(dep.source_type, &dep.source, &dep.version);

        if dep.source_type == SourceType::WellKnown {
            if self.is_cached(&target) {
                debug!("{} is already cached", dep.name);
                return Ok(());
            }
            return self
                .fetcher
                .fetch_well_known(descriptor.version_ref(), &target)
                .map_err(|kind| {
                    resolve_error(FetchError {
                        raw: descriptor.raw().to_owned(),
                        kind,
                    })
                });
        }

        self.fetcher.fetch(&descriptor, &target).map_err(resolve_error)
    }

    pub fn target_path(&self, dep: &DependencyDeclaration) -> PathBuf {
        let dir = match &dep.path {
            Some(path) if !path.is_empty() => path.as_str(),
            _ => dep.name.as_str(),
        };
        self.root.join(dir)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        path.exists() && has_entries(path)
    }

    pub fn dependency_path(&self) -> &Path {
        &self.root
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Names of the cached dependency directories, sorted.
    pub fn list_cached(&self) -> Result<Vec<String>, CacheError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.root.exists() {
            info!("Clearing dependency cache {}.", self.root.display());
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}
