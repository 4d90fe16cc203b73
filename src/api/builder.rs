use std::{env, path::PathBuf};

use crate::{
    archive::{http_client, DOWNLOAD_TIMEOUT},
    config::ProtodexConfig,
    model::project::PROJECT_FILE_NAME,
    Protodex,
};

pub struct ProtodexBuilder {
    // Relative paths are resolved against `root`
    root: Option<PathBuf>,
    project_file_name: Option<PathBuf>,
    cache_directory_path: Option<PathBuf>,
    config_file: Option<PathBuf>,
    auto_install: bool,
}

impl Default for ProtodexBuilder {
    fn default() -> Self {
        ProtodexBuilder {
            root: None,
            project_file_name: None,
            cache_directory_path: None,
            config_file: None,
            auto_install: true,
        }
    }
}

impl ProtodexBuilder {
    /// Project root directory.
    ///
    /// Defaults to the current directory.
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.root = Some(path.into());
        self
    }

    /// Name of the project file.
    ///
    /// Defaults to `protodex.toml`.
    pub fn project_file_name(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_file_name = Some(path.into());
        self
    }

    /// Location of the dependency cache.
    ///
    /// Overrides the configured directory, which defaults to
    /// `$HOME/.protodex/deps`.
    pub fn cache_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_directory_path = Some(path.into());
        self
    }

    /// Tool configuration file.
    ///
    /// Defaults to `$HOME/.protodex/config.toml`, which may be absent.
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Whether missing base plugins are installed with their install command.
    pub fn auto_install(mut self, enabled: bool) -> Self {
        self.auto_install = enabled;
        self
    }

    pub fn try_build(self) -> anyhow::Result<Protodex> {
        let Self {
            root,
            project_file_name,
            cache_directory_path,
            config_file,
            auto_install,
        } = self;
        let root = match root {
            Some(root) => root,
            None => env::current_dir()?,
        };

        let project_file_name =
            project_file_name.unwrap_or_else(|| PathBuf::from(PROJECT_FILE_NAME));

        let mut config = ProtodexConfig::load(config_file.as_deref())?;
        if let Some(cache_directory) = cache_directory_path {
            config.cache_dir = root.join(cache_directory);
        }

        let client = http_client(DOWNLOAD_TIMEOUT)?;

        Ok(Protodex {
            root,
            project_file_name,
            config,
            client,
            auto_install,
        })
    }
}
