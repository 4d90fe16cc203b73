mod github;
mod local;
pub mod registry;
mod well_known;

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info, warn};
use reqwest::blocking::Client;
use thiserror::Error;

use crate::{
    archive::{self, DownloadError, ExtractError},
    model::source::{SourceDescriptor, SourceError, SourceType},
};

use self::registry::{RegistryClient, RegistryError};

pub use well_known::WELL_KNOWN_VERSION;

/// Written at the root of a destination once an archive has been extracted.
pub const FETCHED_MARKER: &str = ".protodex_fetched";

#[derive(Error, Debug)]
#[error("failed to fetch {raw}: {kind}")]
pub struct FetchError {
    pub raw: String,
    #[source]
    pub kind: FetchErrorKind,
}

#[derive(Error, Debug)]
pub enum FetchErrorKind {
    #[error("invalid source: {0}")]
    Source(#[from] SourceError),
    #[error("unsupported URL scheme in {0}, only http and https are accepted")]
    UnsupportedScheme(String),
    #[error("{0}")]
    Network(#[from] DownloadError),
    #[error("{0}")]
    Extraction(#[from] ExtractError),
    #[error("source path does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("invalid GitHub source `{0}`, expected github.com/<owner>/<repo>[/<subdir>]")]
    InvalidGitHubLocator(String),
    #[error("failed to link {} to {}: {source}", .link.display(), .target.display())]
    Link {
        link: PathBuf,
        target: PathBuf,
        source: std::io::Error,
    },
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// Base URLs the archive fetchers download from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub github: String,
    pub protobuf_releases: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Endpoints {
            github: "https://github.com".to_owned(),
            protobuf_releases: "https://github.com/protocolbuffers/protobuf/releases/download"
                .to_owned(),
        }
    }
}

/// A destination directory together with its fetch marker.
///
/// The marker only records that an extraction finished. It says nothing about
/// the upstream content, so a moved branch or re-tagged release at the same
/// destination is not fetched again.
pub struct FetchTarget<'a> {
    dest: &'a Path,
}

impl<'a> FetchTarget<'a> {
    pub fn new(dest: &'a Path) -> Self {
        FetchTarget { dest }
    }

    pub fn marker_path(&self) -> PathBuf {
        self.dest.join(FETCHED_MARKER)
    }

    /// True when the marker exists next to at least one other entry. An
    /// archive that extracted nothing is downloaded again on the next fetch.
    pub fn is_fetched(&self) -> bool {
        if !self.marker_path().is_file() {
            return false;
        }
        match fs::read_dir(self.dest) {
            Ok(entries) => entries
                .filter_map(Result::ok)
                .any(|entry| entry.file_name() != FETCHED_MARKER),
            Err(_) => false,
        }
    }

    pub fn mark_fetched(&self, origin: &str) -> std::io::Result<()> {
        fs::write(self.marker_path(), origin)
    }
}

/// True when `path` is a directory with at least one entry.
pub fn has_entries(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Materializes sources into destination directories.
pub struct Fetcher {
    client: Client,
    endpoints: Endpoints,
    registry: Box<dyn RegistryClient>,
}

impl Fetcher {
    pub fn new(client: Client, endpoints: Endpoints, registry: Box<dyn RegistryClient>) -> Self {
        Fetcher {
            client,
            endpoints,
            registry,
        }
    }

    /// Parses `raw` and fetches it into `dest`.
    pub fn fetch_str(&self, raw: &str, dest: &Path) -> Result<SourceDescriptor, FetchError> {
        let descriptor = SourceDescriptor::parse(raw).map_err(|err| FetchError {
            raw: raw.to_owned(),
            kind: err.into(),
        })?;
        self.fetch(&descriptor, dest)?;
        Ok(descriptor)
    }

    pub fn fetch(&self, descriptor: &SourceDescriptor, dest: &Path) -> Result<(), FetchError> {
        debug!(
            "Fetching {} source {} into {}",
            descriptor.source_type(),
            descriptor,
            dest.display()
        );
        let result = match descriptor.source_type() {
            SourceType::Local => local::link(descriptor.locator(), dest),
            SourceType::Registry => self
                .registry
                .pull_version(descriptor.locator(), descriptor.version_ref(), dest)
                .map_err(FetchErrorKind::from),
            SourceType::Http => self.fetch_http(descriptor, dest),
            SourceType::GitHub => self.fetch_github(descriptor, dest),
            SourceType::WellKnown => self.fetch_well_known(descriptor.version_ref(), dest),
        };
        result.map_err(|kind| FetchError {
            raw: descriptor.raw().to_owned(),
            kind,
        })
    }

    fn fetch_http(&self, descriptor: &SourceDescriptor, dest: &Path) -> Result<(), FetchErrorKind> {
        let url = http_archive_url(descriptor)?;

        let target = FetchTarget::new(dest);
        if target.is_fetched() {
            info!("Source already fetched to {}", dest.display());
            return Ok(());
        }

        info!("Downloading from {url}...");
        let archive = archive::download(&self.client, &url)?;
        fs::create_dir_all(dest)?;
        let extracted = archive::extract_zip(archive.path(), dest, |name| Some(PathBuf::from(name)))?;
        debug!("Extracted {extracted} files into {}", dest.display());

        // The content is on disk at this point.
        if let Err(err) = target.mark_fetched(descriptor.raw()) {
            warn!("Failed to write fetch marker in {}: {err}", dest.display());
        }
        Ok(())
    }
}

/// The URL to download for an HTTP source: the reference as written, minus
/// its version suffix, falling back to the locator.
fn http_archive_url(descriptor: &SourceDescriptor) -> Result<String, FetchErrorKind> {
    [descriptor.raw_without_version(), descriptor.locator()]
        .into_iter()
        .find(|candidate| has_http_scheme(candidate))
        .map(str::to_owned)
        .ok_or_else(|| FetchErrorKind::UnsupportedScheme(descriptor.raw().to_owned()))
}

fn has_http_scheme(url: &str) -> bool {
    url.split_once("://")
        .is_some_and(|(scheme, _)| matches!(scheme.to_ascii_lowercase().as_str(), "http" | "https"))
}
