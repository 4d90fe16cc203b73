use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use log::debug;

use super::FetchErrorKind;

/// Links `dest` to the local directory `locator`.
///
/// Local sources are always live, so no marker is written. Re-linking to the
/// same source is a no-op and a link to another source is replaced.
pub(super) fn link(locator: &str, dest: &Path) -> Result<(), FetchErrorKind> {
    let source = absolutize(Path::new(locator))?;
    let dest = absolutize(dest)?;

    if source == dest {
        debug!("{} is fetched in place", source.display());
        return Ok(());
    }
    if !source.exists() {
        return Err(FetchErrorKind::SourceNotFound(source));
    }

    if let Ok(metadata) = fs::symlink_metadata(&dest) {
        if metadata.file_type().is_symlink() {
            if fs::read_link(&dest)? == source {
                debug!("{} already links to {}", dest.display(), source.display());
                return Ok(());
            }
            debug!("Replacing stale link {}", dest.display());
            remove_link(&dest)?;
        }
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    symlink(&source, &dest).map_err(|source_err| FetchErrorKind::Link {
        link: dest.clone(),
        target: source.clone(),
        source: source_err,
    })
}

/// Absolute, lexically normalized form of `path`.
fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

#[cfg(unix)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(source, dest)
}

#[cfg(windows)]
fn symlink(source: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(source, dest)
}

#[cfg(unix)]
fn remove_link(path: &Path) -> std::io::Result<()> {
    fs::remove_file(path)
}

#[cfg(windows)]
fn remove_link(path: &Path) -> std::io::Result<()> {
    fs::remove_dir(path)
}
