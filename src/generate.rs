use std::{collections::BTreeMap, path::PathBuf};

use log::{info, warn};
use thiserror::Error;

use crate::{
    cache::{CacheError, DependencyCache},
    model::project::{PluginDeclaration, ProjectConfig},
    proto::{self, ProtoError},
    toolchain::{self, Toolchain, ToolchainError},
};

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("no proto files to compile")]
    NoProtoFiles,
    #[error("no language given")]
    MissingLanguageName,
    #[error("language {0} is not configured in the project")]
    UnknownLanguage(String),
    #[error("no output directory configured for {0}")]
    MissingOutputDir(String),
    #[error("{0}")]
    Proto(#[from] ProtoError),
    #[error("{0}")]
    Dependencies(#[from] CacheError),
    #[error("failed to generate {language}: {source}")]
    Language {
        language: String,
        #[source]
        source: ToolchainError,
    },
    #[error("validation failed: {0}")]
    Validation(#[source] ToolchainError),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// One generation run. Non-empty fields override the project's settings
/// for the language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationRequest {
    pub language: String,
    pub output_dir: Option<String>,
    pub options: BTreeMap<String, String>,
    pub plugins: Vec<PluginDeclaration>,
}

impl GenerationRequest {
    pub fn new(language: impl Into<String>) -> Self {
        GenerationRequest {
            language: language.into(),
            ..Default::default()
        }
    }
}

/// Resolves a project's dependencies and runs protoc for its languages.
pub struct Generator {
    project: ProjectConfig,
    cache: DependencyCache,
    toolchain: Toolchain,
}

impl Generator {
    pub fn new(project: ProjectConfig, cache: DependencyCache, toolchain: Toolchain) -> Self {
        Generator {
            project,
            cache,
            toolchain,
        }
    }

    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    pub fn generate(
        &self,
        proto_files: &[PathBuf],
        request: &GenerationRequest,
    ) -> Result<(), GenerateError> {
        if proto_files.is_empty() {
            return Err(GenerateError::NoProtoFiles);
        }
        let name = request.language.as_str();
        if name.is_empty() {
            return Err(GenerateError::MissingLanguageName);
        }
        let language = self
            .project
            .language(name)
            .ok_or_else(|| GenerateError::UnknownLanguage(name.to_owned()))?;
        let output_dir = match request.output_dir.as_deref() {
            Some(dir) if !dir.is_empty() => dir,
            _ => language.output_dir.as_str(),
        };
        if output_dir.is_empty() {
            return Err(GenerateError::MissingOutputDir(name.to_owned()));
        }
        let options = if request.options.is_empty() {
            &language.options
        } else {
            &request.options
        };
        let plugins = if request.plugins.is_empty() {
            self.project.all_plugins(name)
        } else {
            let mut plugins = self.project.plugins.clone();
            plugins.extend(request.plugins.iter().cloned());
            plugins
        };

        self.cache.resolve_all(&self.project.deps)?;
        std::fs::create_dir_all(output_dir)?;

        let language_error = |source| GenerateError::Language {
            language: name.to_owned(),
            source,
        };
        self.toolchain.compiler().ensure().map_err(language_error)?;
        let mut args = self
            .toolchain
            .build_args(name, output_dir, &plugins)
            .map_err(language_error)?;
        args.extend(toolchain::option_args(options));
        args.extend(proto_files.iter().map(|file| file.display().to_string()));

        info!("Generating {name} code into {output_dir}");
        self.toolchain.compiler().run(&args).map_err(language_error)
    }

    /// Generates every configured language in order, stopping at the first
    /// failure.
    pub fn generate_all(&self, proto_files: &[PathBuf]) -> Result<(), GenerateError> {
        if self.project.generation.languages.is_empty() {
            warn!("No languages configured in the project");
        }
        for language in &self.project.generation.languages {
            self.generate(proto_files, &GenerationRequest::new(language.name.clone()))?;
        }
        Ok(())
    }

    /// Checks that the files compile, writing the descriptor set to a
    /// temporary file that is discarded.
    pub fn validate(&self, proto_files: &[PathBuf]) -> Result<(), GenerateError> {
        if proto_files.is_empty() {
            return Err(GenerateError::NoProtoFiles);
        }
        proto::validate_proto_files(proto_files)?;
        self.cache.resolve_all(&self.project.deps)?;

        let compiler = self.toolchain.compiler();
        compiler.ensure().map_err(GenerateError::Validation)?;

        let descriptors = tempfile::Builder::new()
            .prefix("protodex-descriptors-")
            .suffix(".pb")
            .tempfile()?
            .into_temp_path();
        let mut args = vec![format!("--descriptor_set_out={}", descriptors.display())];
        args.extend(self.toolchain.proto_path_args());
        args.extend(proto_files.iter().map(|file| file.display().to_string()));

        compiler.run(&args).map_err(GenerateError::Validation)?;
        if let Err(err) = descriptors.close() {
            warn!("Failed to remove temp file: {err}");
        }
        info!("Validated {} proto files", proto_files.len());
        Ok(())
    }
}
