use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::{archive, model::source::SourceDescriptor};

use super::{FetchErrorKind, FetchTarget, Fetcher};

/// `owner/repo` plus an optional subdirectory inside the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct GitHubCoordinate {
    pub owner: String,
    pub repo: String,
    pub subdir: Option<String>,
}

impl GitHubCoordinate {
    /// Accepts `owner/repo`, `github.com/owner/repo`, URL and SSH forms, with
    /// or without a `.git` suffix.
    pub fn parse(locator: &str) -> Result<Self, FetchErrorKind> {
        let invalid = || FetchErrorKind::InvalidGitHubLocator(locator.to_owned());

        let mut rest = locator.trim();
        for prefix in ["https://", "http://", "ssh://", "git@"] {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                rest = stripped;
                break;
            }
        }
        for host in ["github.com/", "github.com:"] {
            if let Some(stripped) = rest.strip_prefix(host) {
                rest = stripped;
                break;
            }
        }

        let mut segments = rest.split('/').filter(|segment| !segment.is_empty());
        let owner = segments.next().ok_or_else(invalid)?;
        let repo = segments.next().ok_or_else(invalid)?;
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if repo.is_empty() {
            return Err(invalid());
        }
        let subdir: Vec<&str> = segments.collect();

        Ok(GitHubCoordinate {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            subdir: if subdir.is_empty() {
                None
            } else {
                Some(subdir.join("/"))
            },
        })
    }

    /// Tags are recognised by their `v` prefix, anything else is a branch.
    pub fn archive_url(&self, base: &str, version: &str) -> String {
        let version = if version.is_empty() { "main" } else { version };
        let kind = if version.starts_with('v') {
            "tags"
        } else {
            "heads"
        };
        format!(
            "{}/{}/{}/archive/refs/{kind}/{version}.zip",
            base.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

/// Maps an entry of a GitHub archive to its path under the destination.
///
/// `root` is the archive's single top-level directory. With a subdirectory,
/// only entries below it are kept.
fn map_entry(name: &str, root: Option<&str>, subdir: Option<&str>) -> Option<PathBuf> {
    let relative = match root {
        Some(root) => name.strip_prefix(root)?,
        None => name,
    };
    let relative = match subdir {
        Some(subdir) => relative.strip_prefix(subdir)?.strip_prefix('/')?,
        None => relative,
    };
    if relative.is_empty() {
        None
    } else {
        Some(PathBuf::from(relative))
    }
}

impl Fetcher {
    pub(super) fn fetch_github(
        &self,
        descriptor: &SourceDescriptor,
        dest: &Path,
    ) -> Result<(), FetchErrorKind> {
        let coordinate = GitHubCoordinate::parse(descriptor.locator())?;
        let target = FetchTarget::new(dest);
        if target.is_fetched() {
            info!("Source already fetched to {}", dest.display());
            return Ok(());
        }

        let url = coordinate.archive_url(&self.endpoints.github, descriptor.version_ref());
        info!("Downloading from {url}...");
        let archive = archive::download(&self.client, &url)?;
        let root = archive::archive_root(archive.path())?;
        debug!("Archive root of {url} is {root:?}");

        fs::create_dir_all(dest)?;
        let subdir = coordinate.subdir.as_deref();
        let extracted = archive::extract_zip(archive.path(), dest, |name| {
            map_entry(name, root.as_deref(), subdir)
        })?;
        debug!("Extracted {extracted} files into {}", dest.display());

        target.mark_fetched(descriptor.raw())?;
        Ok(())
    }
}
