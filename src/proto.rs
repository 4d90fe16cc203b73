use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use log::trace;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("invalid exclude pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
    #[error("failed to walk {}: {source}", .path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("{} is not a .proto file", .0.display())]
    NotProto(PathBuf),
    #[error("proto file {} does not exist", .0.display())]
    Missing(PathBuf),
}

/// Sorted `.proto` files under `base_dir`.
///
/// Exclude globs match paths relative to `base_dir`, or absolute paths. An
/// excluded directory is not descended into.
pub fn find_proto_files(base_dir: &Path, excludes: &[String]) -> Result<Vec<PathBuf>, ProtoError> {
    let excludes = exclude_set(excludes)?;
    let is_excluded = |path: &Path| {
        let relative = path.strip_prefix(base_dir).unwrap_or(path);
        (!relative.as_os_str().is_empty() && excludes.is_match(relative)) || excludes.is_match(path)
    };

    let mut files = Vec::new();
    let walker = WalkDir::new(base_dir)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry.path()));
    for entry in walker {
        let entry = entry.map_err(|source| ProtoError::Walk {
            path: base_dir.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && is_proto(entry.path()) {
            trace!("Found proto file {}", entry.path().display());
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Checks that every file has a `.proto` extension and exists.
pub fn validate_proto_files(files: &[PathBuf]) -> Result<(), ProtoError> {
    for file in files {
        if !is_proto(file) {
            return Err(ProtoError::NotProto(file.clone()));
        }
        if !file.is_file() {
            return Err(ProtoError::Missing(file.clone()));
        }
    }
    Ok(())
}

fn is_proto(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "proto")
}

fn exclude_set(patterns: &[String]) -> Result<GlobSet, ProtoError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| ProtoError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| ProtoError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}
