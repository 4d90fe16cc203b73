//! Zip downloads and extraction shared by the fetchers and the compiler
//! bootstrap, plus the bundle uploaded on push.

use std::{
    fs::{self, File},
    io::{Cursor, Read, Seek, Write},
    path::{Component, Path, PathBuf},
    time::Duration,
};

use log::{debug, trace, warn};
use reqwest::blocking::Client;
use tempfile::TempPath;
use thiserror::Error;
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

/// Schema archives can be large and networks slow.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("request to {url} failed: {source}")]
    Network { url: String, source: reqwest::Error },
    #[error("request to {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },
    #[error("IO error while saving download: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("malformed zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry `{0}` escapes the destination directory")]
    UnsafePath(String),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("protodex/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// A downloaded archive in the system temp directory, removed on drop.
pub struct TempArchive {
    path: Option<TempPath>,
}

impl TempArchive {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or(Path::new(""))
    }
}

impl Drop for TempArchive {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let display = path.display().to_string();
            if let Err(err) = path.close() {
                warn!("Failed to remove temp file {display}: {err}");
            }
        }
    }
}

pub fn download(client: &Client, url: &str) -> Result<TempArchive, DownloadError> {
    debug!("GET {url}");
    let network = |source| DownloadError::Network {
        url: url.to_owned(),
        source,
    };
    let mut response = client.get(url).send().map_err(network)?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::HttpStatus {
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    let mut file = tempfile::Builder::new()
        .prefix("protodex-download-")
        .suffix(".zip")
        .tempfile()?;
    let size = response.copy_to(&mut file).map_err(network)?;
    file.flush()?;
    trace!("Saved {size} bytes from {url} to {}", file.path().display());

    Ok(TempArchive {
        path: Some(file.into_temp_path()),
    })
}

/// Extracts the archive at `archive` into `dest`.
///
/// `map` turns an entry name into a path relative to `dest`, or `None` to
/// skip the entry. Directory entries are always skipped. Returns the number
/// of files written.
pub fn extract_zip<F>(archive: &Path, dest: &Path, map: F) -> Result<usize, ExtractError>
where
    F: FnMut(&str) -> Option<PathBuf>,
{
    extract_zip_reader(File::open(archive)?, dest, map)
}

pub fn extract_zip_reader<R, F>(reader: R, dest: &Path, mut map: F) -> Result<usize, ExtractError>
where
    R: Read + Seek,
    F: FnMut(&str) -> Option<PathBuf>,
{
    let mut archive = ZipArchive::new(reader)?;
    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_owned();
        let relative = match map(&name) {
            Some(relative) if relative.as_os_str().is_empty() => continue,
            Some(relative) => relative,
            None => {
                trace!("Skipping archive entry {name}");
                continue;
            }
        };
        if !stays_inside(&relative) {
            return Err(ExtractError::UnsafePath(name));
        }

        let target = dest.join(&relative);
        let write_error = |source| ExtractError::Write {
            path: target.clone(),
            source,
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let mut out = File::create(&target).map_err(write_error)?;
        std::io::copy(&mut entry, &mut out).map_err(write_error)?;
        extracted += 1;
    }

    Ok(extracted)
}

/// First path segment of the first file entry, with its trailing slash.
pub fn archive_root(archive: &Path) -> Result<Option<String>, ExtractError> {
    let mut archive = ZipArchive::new(File::open(archive)?)?;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        return Ok(entry
            .name()
            .split_once('/')
            .map(|(root, _)| format!("{root}/")));
    }
    Ok(None)
}

/// Zips `files` in memory under their paths relative to `root`. Files
/// outside `root` are skipped.
pub fn bundle(root: &Path, files: &[PathBuf]) -> Result<Vec<u8>, BundleError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for file in files {
        let Some(name) = entry_name(root, file) else {
            warn!("Skipping {} outside of {}", file.display(), root.display());
            continue;
        };
        let contents = fs::read(file).map_err(|source| BundleError::Read {
            path: file.clone(),
            source,
        })?;
        trace!("Bundling {name}");
        writer.start_file(name, SimpleFileOptions::default())?;
        writer.write_all(&contents)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Zip entry names always use `/`.
fn entry_name(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    if relative.as_os_str().is_empty() || !stays_inside(relative) {
        return None;
    }
    let parts: Vec<_> = relative
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn stays_inside(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}
