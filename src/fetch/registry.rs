use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use log::{debug, info};
use reqwest::{
    blocking::{
        multipart::{Form, Part},
        Client,
    },
    header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    StatusCode,
};
use serde::Deserialize;
use thiserror::Error;

use crate::archive::{self, ExtractError};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },
    #[error("registry request failed with HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected registry response from {url}: {source}")]
    Decode { url: String, source: reqwest::Error },
    #[error("{0}")]
    Extraction(#[from] ExtractError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// A version stored by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PublishedVersion {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub created_at: String,
}

/// A package registry that serves schema files by package and version.
pub trait RegistryClient {
    fn pull_version(&self, package: &str, version: &str, dest: &Path)
        -> Result<(), RegistryError>;

    /// Uploads `archive`, a zip of the package's files, as `version`.
    fn push_version(
        &self,
        package: &str,
        version: &str,
        archive: Vec<u8>,
    ) -> Result<PublishedVersion, RegistryError>;
}

pub struct HttpRegistryClient {
    client: Client,
    base_url: String,
}

impl HttpRegistryClient {
    pub fn new(client: Client, base_url: &str) -> Self {
        HttpRegistryClient {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    fn versions_url(&self, package: &str) -> String {
        format!("{}/api/packages/{package}/versions", self.base_url)
    }

    fn files_url(&self, package: &str, version: &str) -> String {
        format!("{}/{version}/files", self.versions_url(package))
    }
}

impl RegistryClient for HttpRegistryClient {
    fn pull_version(
        &self,
        package: &str,
        version: &str,
        dest: &Path,
    ) -> Result<(), RegistryError> {
        let url = self.files_url(package, version);
        info!("Pulling {package}@{version} from {url}");
        let request_error = |source| RegistryError::Request {
            url: url.clone(),
            source,
        };

        let response = self.client.get(&url).send().map_err(request_error)?;
        let status = response.status();
        let content_type = header_value(&response, CONTENT_TYPE);
        let disposition = header_value(&response, CONTENT_DISPOSITION);
        let body = response.bytes().map_err(request_error)?;

        if !status.is_success() {
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        fs::create_dir_all(dest)?;
        if is_zip(content_type.as_deref(), disposition.as_deref()) {
            let extracted = archive::extract_zip_reader(Cursor::new(body), dest, |name| {
                Some(PathBuf::from(name))
            })?;
            debug!("Extracted {extracted} files into {}", dest.display());
        } else {
            let file_name = disposition
                .as_deref()
                .and_then(attachment_file_name)
                .unwrap_or_else(|| format!("{package}-{version}.proto"));
            let path = dest.join(file_name);
            fs::write(&path, &body)?;
            debug!("Wrote {}", path.display());
        }
        Ok(())
    }

    fn push_version(
        &self,
        package: &str,
        version: &str,
        archive: Vec<u8>,
    ) -> Result<PublishedVersion, RegistryError> {
        let url = self.versions_url(package);
        info!("Pushing {package}@{version} to {url}");
        let request_error = |source| RegistryError::Request {
            url: url.clone(),
            source,
        };

        let zip = Part::bytes(archive)
            .file_name(format!("{package}-{version}.zip"))
            .mime_str("application/zip")
            .map_err(request_error)?;
        let form = Form::new().text("version", version.to_owned()).part("zip", zip);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .map_err(request_error)?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().map_err(request_error)?;
            return Err(RegistryError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<PublishedVersion>()
            .map_err(|source| RegistryError::Decode {
                url: url.clone(),
                source,
            })
    }
}

fn header_value(
    response: &reqwest::blocking::Response,
    name: reqwest::header::HeaderName,
) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

fn is_zip(content_type: Option<&str>, disposition: Option<&str>) -> bool {
    let zip_type = content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/zip"));
    let zip_attachment = disposition
        .and_then(attachment_file_name)
        .is_some_and(|name| name.ends_with(".zip"));
    zip_type || zip_attachment
}

/// File name from a `Content-Disposition` header, reduced to its last path
/// component.
fn attachment_file_name(disposition: &str) -> Option<String> {
    let (_, value) = disposition.split_once("filename=")?;
    let value = value.split(';').next().unwrap_or(value);
    let value = value.trim().trim_matches('"');
    let name = Path::new(value).file_name()?.to_str()?;
    Some(name.to_owned())
}

#[cfg(test)]
#[derive(Default)]
pub struct MockRegistry {
    pub pulls: std::sync::Arc<std::sync::Mutex<Vec<(String, String, PathBuf)>>>,
    pub pushes: std::sync::Arc<std::sync::Mutex<Vec<(String, String, Vec<u8>)>>>,
}

#[cfg(test)]
impl RegistryClient for MockRegistry {
    fn pull_version(
        &self,
        package: &str,
        version: &str,
        dest: &Path,
    ) -> Result<(), RegistryError> {
        self.pulls.lock().unwrap().push((
            package.to_owned(),
            version.to_owned(),
            dest.to_path_buf(),
        ));
        Ok(())
    }

    fn push_version(
        &self,
        package: &str,
        version: &str,
        archive: Vec<u8>,
    ) -> Result<PublishedVersion, RegistryError> {
        let mut pushes = self.pushes.lock().unwrap();
        pushes.push((package.to_owned(), version.to_owned(), archive));
        Ok(PublishedVersion {
            id: format!("v-{}", pushes.len()),
            version: version.to_owned(),
            created_at: String::new(),
        })
    }
}
