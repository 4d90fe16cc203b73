use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use log::{debug, info};
use reqwest::blocking::Client;

use crate::archive;

use super::ToolchainError;

pub const PROTOC_RELEASES_URL: &str = "https://github.com/protocolbuffers/protobuf/releases/download";

/// The protoc binary, downloaded on first use when missing.
pub struct Compiler {
    bin: PathBuf,
    version: String,
    client: Client,
    releases_url: String,
    search_path: Option<OsString>,
}

impl Compiler {
    pub fn new(bin: PathBuf, version: &str, client: Client) -> Self {
        Compiler {
            bin,
            version: version.trim_start_matches('v').to_owned(),
            client,
            releases_url: PROTOC_RELEASES_URL.to_owned(),
            search_path: None,
        }
    }

    pub fn with_releases_url(mut self, url: &str) -> Self {
        self.releases_url = url.trim_end_matches('/').to_owned();
        self
    }

    /// Where a bare binary name is looked up instead of `PATH`.
    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn bin(&self) -> &Path {
        &self.bin
    }

    /// The executable to run. A bare name such as `protoc` is looked up on
    /// the search path, anything else is taken as a file path.
    pub fn locate(&self) -> Option<PathBuf> {
        if !is_bare_name(&self.bin) {
            return is_executable(&self.bin).then(|| self.bin.clone());
        }
        let found = match &self.search_path {
            Some(paths) => which::which_in(&self.bin, Some(paths), Path::new(".")),
            None => which::which(&self.bin),
        };
        found.ok()
    }

    /// Makes sure the configured binary exists, downloading the release for
    /// the current platform otherwise.
    ///
    /// Only a file path is installed to. A bare name missing from the search
    /// path is an error.
    pub fn ensure(&self) -> Result<(), ToolchainError> {
        if self.bin.as_os_str().is_empty() {
            return Err(ToolchainError::ToolchainMissing(self.bin.clone()));
        }
        if let Some(found) = self.locate() {
            debug!("Using protoc at {}", found.display());
            return Ok(());
        }
        if is_bare_name(&self.bin) {
            return Err(ToolchainError::ToolchainMissing(self.bin.clone()));
        }

        let platform = platform_for(std::env::consts::OS, std::env::consts::ARCH)?;
        let url = self.download_url(platform);
        info!("protoc not found at {}, downloading {url}...", self.bin.display());
        let archive = archive::download(&self.client, &url)?;
        extract_compiler(archive.path(), &self.bin)?;

        if self.locate().is_none() {
            return Err(ToolchainError::ToolchainMissing(self.bin.clone()));
        }
        info!("Installed protoc {} to {}", self.version, self.bin.display());
        Ok(())
    }

    fn download_url(&self, platform: &str) -> String {
        format!(
            "{}/v{version}/protoc-{version}-{platform}.zip",
            self.releases_url,
            version = self.version
        )
    }

    /// Runs protoc with `args`, sharing this process's stdio.
    pub fn run(&self, args: &[String]) -> Result<(), ToolchainError> {
        let program = self.locate().unwrap_or_else(|| self.bin.clone());
        debug!("Running {} {}", program.display(), args.join(" "));
        let status = Command::new(&program)
            .args(args)
            .status()
            .map_err(|source| ToolchainError::Spawn { program, source })?;
        if !status.success() {
            return Err(ToolchainError::CompilerFailed(status.to_string()));
        }
        Ok(())
    }
}

/// Release asset suffix for an `std::env::consts` OS and architecture.
pub fn platform_for(os: &str, arch: &str) -> Result<&'static str, ToolchainError> {
    match (os, arch) {
        ("linux", "x86_64") => Ok("linux-x86_64"),
        ("linux", "aarch64") => Ok("linux-aarch_64"),
        ("macos", "x86_64") => Ok("osx-x86_64"),
        ("macos", "aarch64") => Ok("osx-aarch_64"),
        ("windows", "x86_64") => Ok("win64"),
        _ => Err(ToolchainError::UnsupportedPlatform {
            os: os.to_owned(),
            arch: arch.to_owned(),
        }),
    }
}

/// Extracts the protoc executable from a release archive to `bin`.
pub fn extract_compiler(archive: &Path, bin: &Path) -> Result<(), ToolchainError> {
    let (Some(parent), Some(file_name)) = (bin.parent(), bin.file_name()) else {
        return Err(ToolchainError::ToolchainMissing(bin.to_path_buf()));
    };
    fs::create_dir_all(parent)?;

    let mut found = false;
    archive::extract_zip(archive, parent, |name| {
        if !found && (name.ends_with("bin/protoc") || name.ends_with("bin/protoc.exe")) {
            found = true;
            Some(PathBuf::from(file_name))
        } else {
            None
        }
    })?;
    if !found {
        return Err(ToolchainError::BinaryNotInArchive(archive.display().to_string()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(bin, fs::Permissions::from_mode(0o755))?;
    }
    Ok(())
}

fn is_bare_name(path: &Path) -> bool {
    path.components().count() == 1 && path.file_name().is_some() && !path.is_absolute()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
