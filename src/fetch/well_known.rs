use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use crate::archive;

use super::{has_entries, FetchErrorKind, Fetcher};

/// protobuf release whose `include/` tree provides the well-known types.
pub const WELL_KNOWN_VERSION: &str = "v32.0";

/// Release tag and bare version for `version`, which may omit the `v`.
fn release_versions(version: &str) -> (String, &str) {
    let version = if version.is_empty() {
        WELL_KNOWN_VERSION
    } else {
        version
    };
    let bare = version.strip_prefix('v').unwrap_or(version);
    (format!("v{bare}"), bare)
}

fn map_include_entry(name: &str) -> Option<PathBuf> {
    let relative = name.strip_prefix("include/")?;
    let relative = relative.strip_prefix("google/protobuf/").unwrap_or(relative);
    Some(PathBuf::from(relative))
}

impl Fetcher {
    /// Downloads the well-known `.proto` files into `dest`.
    ///
    /// Nothing is downloaded when `dest` already has content.
    pub fn fetch_well_known(&self, version: &str, dest: &Path) -> Result<(), FetchErrorKind> {
        if has_entries(dest) {
            debug!("Well-known types already present in {}", dest.display());
            return Ok(());
        }

        let (tag, bare) = release_versions(version);
        let url = format!(
            "{}/{tag}/protoc-{bare}-linux-x86_64.zip",
            self.endpoints.protobuf_releases.trim_end_matches('/')
        );
        info!("Downloading well-known types from {url}...");
        let archive = archive::download(&self.client, &url)?;

        fs::create_dir_all(dest)?;
        let extracted = archive::extract_zip(archive.path(), dest, map_include_entry)?;
        debug!("Extracted {extracted} well-known files into {}", dest.display());
        Ok(())
    }
}
