use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use config::{Config, ConfigError, Environment, File, FileFormat};
use log::debug;
use serde::Deserialize;

pub const DEFAULT_PROTOC_VERSION: &str = "32.0";
pub const DEFAULT_REGISTRY_URL: &str = "http://localhost:8080";

/// Tool settings, shared by every project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtodexConfig {
    /// The file settings were read from, when one was looked for.
    pub config_file: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub protoc_bin: PathBuf,
    pub protoc_version: String,
    pub registry_url: String,
}

impl ProtodexConfig {
    /// Reads `file`, or `$HOME/.protodex/config.toml` when it exists, and
    /// overlays `PROTODEX_*` environment variables.
    pub fn load(file: Option<&Path>) -> anyhow::Result<Self> {
        let home = protodex_home();
        let (file, required) = match file {
            Some(file) => (Some(file.to_path_buf()), true),
            None => (home.as_ref().map(|home| home.join("config.toml")), false),
        };
        let raw_config = RawConfig::load(file.as_deref(), required, None)?;
        Ok(Self::from_raw(raw_config, home.as_deref(), file))
    }

    fn from_raw(raw: RawConfig, home: Option<&Path>, config_file: Option<PathBuf>) -> Self {
        let home = home.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".protodex"));
        Self {
            config_file,
            cache_dir: raw.cache.dir.unwrap_or_else(|| home.join("deps")),
            protoc_bin: raw
                .protoc
                .bin
                .unwrap_or_else(|| home.join("bin").join(protoc_file_name())),
            protoc_version: raw
                .protoc
                .version
                .unwrap_or_else(|| DEFAULT_PROTOC_VERSION.to_owned()),
            registry_url: raw
                .registry
                .url
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_owned()),
        }
    }
}

fn protodex_home() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".protodex"))
}

fn protoc_file_name() -> &'static str {
    if cfg!(windows) {
        "protoc.exe"
    } else {
        "protoc"
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    protoc: ProtocConfig,
    #[serde(default)]
    registry: RegistryConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ProtocConfig {
    bin: Option<PathBuf>,
    version: Option<String>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RegistryConfig {
    url: Option<String>,
}

impl RawConfig {
    fn load(
        file: Option<&Path>,
        required: bool,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = file {
            debug!("Reading tool configuration from {}", file.display());
            builder = builder.add_source(
                File::new(&file.to_string_lossy(), FileFormat::Toml).required(required),
            );
        }
        builder
            .add_source(
                Environment::with_prefix("PROTODEX")
                    .separator("_")
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_empty() {
        let env = HashMap::from([]);
        let config = RawConfig::load(None, false, Some(env)).unwrap();
        assert_eq!(config, RawConfig::default())
    }

    #[test]
    fn load_environment() {
        let env = HashMap::from([
            ("PROTODEX_CACHE_DIR".to_owned(), "/cache".to_owned()),
            ("PROTODEX_PROTOC_BIN".to_owned(), "/opt/protoc".to_owned()),
            ("PROTODEX_PROTOC_VERSION".to_owned(), "31.1".to_owned()),
            ("PROTODEX_REGISTRY_URL".to_owned(), "https://registry".to_owned()),
        ]);
        let config = RawConfig::load(None, false, Some(env)).unwrap();
        assert_eq!(
            config,
            RawConfig {
                cache: CacheConfig {
                    dir: Some("/cache".into())
                },
                protoc: ProtocConfig {
                    bin: Some("/opt/protoc".into()),
                    version: Some("31.1".to_owned()),
                },
                registry: RegistryConfig {
                    url: Some("https://registry".to_owned())
                },
            }
        )
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(
            &file,
            "[cache]\ndir = \"/from-file\"\n\n[registry]\nurl = \"https://file\"\n",
        )
        .unwrap();
        let env = HashMap::from([("PROTODEX_CACHE_DIR".to_owned(), "/from-env".to_owned())]);

        let config = RawConfig::load(Some(&file), true, Some(env)).unwrap();

        assert_eq!(config.cache.dir, Some("/from-env".into()));
        assert_eq!(config.registry.url, Some("https://file".to_owned()));
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.toml");

        assert!(RawConfig::load(Some(&file), true, Some(HashMap::new())).is_err());
        assert!(RawConfig::load(Some(&file), false, Some(HashMap::new())).is_ok());
    }

    #[test]
    fn defaults_live_under_home() {
        let home = Path::new("/home/dev/.protodex");
        let config = ProtodexConfig::from_raw(
            RawConfig::default(),
            Some(home),
            Some(home.join("config.toml")),
        );
        assert_eq!(
            config,
            ProtodexConfig {
                config_file: Some(home.join("config.toml")),
                cache_dir: home.join("deps"),
                protoc_bin: home.join("bin").join(protoc_file_name()),
                protoc_version: "32.0".to_owned(),
                registry_url: "http://localhost:8080".to_owned(),
            }
        );
    }
}
