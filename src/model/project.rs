use std::{collections::BTreeMap, path::Path};

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::model::{source::SourceType, ParseError};

pub const PROJECT_FILE_NAME: &str = "protodex.toml";

/// Contents of a `protodex.toml` project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub package: PackageConfig,
    #[serde(default)]
    pub files: FileConfig,
    #[serde(default, rename = "gen")]
    pub generation: GenerationConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deps: Vec<DependencyDeclaration>,
    /// Plugins applied to every language.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginDeclaration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl Default for FileConfig {
    fn default() -> Self {
        FileConfig {
            base_dir: default_base_dir(),
            exclude: Vec::new(),
        }
    }
}

fn default_base_dir() -> String {
    ".".to_owned()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub languages: Vec<LanguageConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageConfig {
    pub name: String,
    #[serde(default)]
    pub output_dir: String,
    /// Base language options, passed to protoc as `--key=value`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<PluginDeclaration>,
}

/// A protoc plugin such as `protoc-gen-twirp`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDeclaration {
    /// Used for the `--<name>_out` flag.
    pub name: String,
    /// Executable looked up on the search path.
    pub command: String,
    /// Defaults to the output directory of the language being generated.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub output_dir: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDeclaration {
    /// Cache key, unique within a project.
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Cache subdirectory used instead of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> ProjectConfig {
        ProjectConfig {
            package: PackageConfig {
                name: name.into(),
                description: description.into(),
            },
            files: FileConfig::default(),
            generation: GenerationConfig {
                languages: vec![LanguageConfig {
                    name: "go".to_owned(),
                    output_dir: "./gen/go".to_owned(),
                    ..Default::default()
                }],
            },
            deps: vec![DependencyDeclaration {
                name: "google/protobuf".to_owned(),
                source_type: SourceType::WellKnown,
                source: String::new(),
                version: String::new(),
                path: None,
            }],
            plugins: Vec::new(),
        }
    }

    pub fn from_file(path: &Path) -> Result<ProjectConfig, ParseError> {
        debug!("Attempting to read project file {}", path.display());
        let contents = std::fs::read_to_string(path)?;

        let config = ProjectConfig::from_toml_str(&contents);
        if let Err(err) = &config {
            error!("Could not build a valid project config from {} due to err {err}", path.display())
        }
        config
    }

    /// Loads `root/file_name`, or the default configuration named after
    /// `root` when the file does not exist.
    pub fn load_or_default(root: &Path, file_name: &Path) -> Result<ProjectConfig, ParseError> {
        let path = root.join(file_name);
        if path.exists() {
            return ProjectConfig::from_file(&path);
        }

        let name = root
            .canonicalize()
            .ok()
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "protodex".to_owned());
        debug!("No project file at {}, using defaults", path.display());
        let description = format!("Protodex project {name}");
        Ok(ProjectConfig::new(name, description))
    }

    pub fn from_toml_str(data: &str) -> Result<ProjectConfig, ParseError> {
        let mut config: ProjectConfig = toml::from_str(data)?;
        if config.files.base_dir.is_empty() {
            config.files.base_dir = default_base_dir();
        }
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ParseError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ParseError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn language(&self, name: &str) -> Option<&LanguageConfig> {
        self.generation.languages.iter().find(|l| l.name == name)
    }

    /// Global plugins first, then the ones scoped to `language`.
    pub fn all_plugins(&self, language: &str) -> Vec<PluginDeclaration> {
        let mut plugins = self.plugins.clone();
        if let Some(language) = self.language(language) {
            plugins.extend(language.plugins.iter().cloned());
        }
        plugins
    }

    pub fn dependency(&self, name: &str) -> Option<&DependencyDeclaration> {
        self.deps.iter().find(|d| d.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn load_full_project() {
        let str = r#"
            [package]
            name = "billing"
            description = "billing schemas"

            [files]
            base_dir = "proto"
            exclude = ["vendor/*"]

            [[gen.languages]]
            name = "go"
            output_dir = "./gen/go"
            options = { go_opt = "paths=source_relative" }

            [[gen.languages.plugins]]
            name = "go-grpc"
            command = "protoc-gen-go-grpc"
            required = true

            [[deps]]
            name = "google/protobuf"
            type = "google-well-known"

            [[deps]]
            name = "common"
            type = "github"
            source = "acme/common"
            version = "v1.0.0"

            [[plugins]]
            name = "validate"
            command = "protoc-gen-validate"
            output_dir = "./gen/validate"
            options = { validate_opt = "lang=go" }
        "#;
        let config = ProjectConfig::from_toml_str(str).unwrap();

        assert_eq!(config.package.name, "billing");
        assert_eq!(config.files.base_dir, "proto");
        assert_eq!(config.files.exclude, vec!["vendor/*".to_owned()]);
        assert_eq!(
            config.language("go").unwrap().options.get("go_opt"),
            Some(&"paths=source_relative".to_owned())
        );
        assert_eq!(
            config.deps[1],
            DependencyDeclaration {
                name: "common".to_owned(),
                source_type: SourceType::GitHub,
                source: "acme/common".to_owned(),
                version: "v1.0.0".to_owned(),
                path: None,
            }
        );
        assert!(config.language("python").is_none());
    }

    #[test]
    fn all_plugins_puts_global_first() {
        let mut config = ProjectConfig::new("demo", "");
        config.plugins.push(PluginDeclaration {
            name: "global".to_owned(),
            command: "protoc-gen-global".to_owned(),
            ..Default::default()
        });
        config.generation.languages[0]
            .plugins
            .push(PluginDeclaration {
                name: "local".to_owned(),
                command: "protoc-gen-local".to_owned(),
                ..Default::default()
            });

        let names: Vec<String> = config
            .all_plugins("go")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["global".to_owned(), "local".to_owned()]);

        let names: Vec<String> = config
            .all_plugins("java")
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["global".to_owned()]);
    }

    #[test]
    fn default_project_survives_serialization() {
        let config = ProjectConfig::new("demo", "Protodex project demo");
        let str = config.to_toml_string().unwrap();
        assert_eq!(ProjectConfig::from_toml_str(&str).unwrap(), config);
    }

    #[test]
    fn empty_base_dir_defaults_to_current() {
        let str = r#"
            [package]
            name = "demo"
            [files]
            base_dir = ""
        "#;
        let config = ProjectConfig::from_toml_str(str).unwrap();
        assert_eq!(config.files.base_dir, ".");
    }

    #[test]
    fn missing_project_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProjectConfig::load_or_default(dir.path(), Path::new(PROJECT_FILE_NAME))
            .unwrap();
        let expected_name = dir
            .path()
            .canonicalize()
            .unwrap()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert_eq!(config.package.name, expected_name);
        assert_eq!(config.deps[0].source_type, SourceType::WellKnown);
        assert_eq!(config.language("go").unwrap().output_dir, "./gen/go");
    }
}
