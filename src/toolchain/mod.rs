pub mod compiler;
pub mod plugin;

use std::path::PathBuf;

use log::{debug, warn};
use thiserror::Error;

use crate::{
    archive::{DownloadError, ExtractError},
    model::project::PluginDeclaration,
};

pub use compiler::Compiler;
pub use plugin::{
    CommandInstaller, DisabledInstaller, Installer, PluginError, PluginManager,
};

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("no protoc release for {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },
    #[error("protoc is not available at `{}`", .0.display())]
    ToolchainMissing(PathBuf),
    #[error("failed to download protoc: {0}")]
    Download(#[from] DownloadError),
    #[error("failed to extract protoc: {0}")]
    Extraction(#[from] ExtractError),
    #[error("no protoc binary in {0}")]
    BinaryNotInArchive(String),
    #[error("{0}")]
    Plugin(#[from] PluginError),
    #[error("failed to run {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },
    #[error("protoc failed with {0}")]
    CompilerFailed(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

/// The compiler and plugins used to generate code for a project.
pub struct Toolchain {
    compiler: Compiler,
    plugins: PluginManager,
    project_path: PathBuf,
    cache_path: PathBuf,
}

impl Toolchain {
    pub fn new(
        compiler: Compiler,
        plugins: PluginManager,
        project_path: PathBuf,
        cache_path: PathBuf,
    ) -> Self {
        Toolchain {
            compiler,
            plugins,
            project_path,
            cache_path,
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    /// `--proto_path` flags for the project and, when set, the dependency
    /// cache.
    pub fn proto_path_args(&self) -> Vec<String> {
        let mut args = vec![format!("--proto_path={}", self.project_path.display())];
        if !self.cache_path.as_os_str().is_empty() {
            args.push(format!("--proto_path={}", self.cache_path.display()));
        }
        args
    }

    /// Arguments that make protoc emit `language` into `output_dir` along
    /// with the output of every available plugin.
    ///
    /// A missing optional plugin is skipped with a warning.
    pub fn build_args(
        &self,
        language: &str,
        output_dir: &str,
        plugins: &[PluginDeclaration],
    ) -> Result<Vec<String>, ToolchainError> {
        self.plugins.ensure_base_plugin(language)?;

        let mut args = self.proto_path_args();
        args.push(format!("--{language}_out={output_dir}"));

        for plugin in plugins {
            let command = plugin_command(plugin);
            if self.plugins.find(&command).is_none() {
                if plugin.required {
                    return Err(PluginError::Required {
                        name: plugin.name.clone(),
                        command,
                    }
                    .into());
                }
                warn!("Optional plugin {} (`{command}`) not found, skipping it", plugin.name);
                continue;
            }

            let plugin_output = if plugin.output_dir.is_empty() {
                output_dir
            } else {
                plugin.output_dir.as_str()
            };
            debug!("Adding plugin {} writing to {plugin_output}", plugin.name);
            args.push(format!("--{}_out={plugin_output}", plugin.name));
            args.extend(option_args(&plugin.options));
        }
        Ok(args)
    }
}

/// Executable for a plugin, `protoc-gen-<name>` unless given.
fn plugin_command(plugin: &PluginDeclaration) -> String {
    if plugin.command.is_empty() {
        format!("protoc-gen-{}", plugin.name)
    } else {
        plugin.command.clone()
    }
}

/// `--key=value` flags, in key order.
pub fn option_args(options: &std::collections::BTreeMap<String, String>) -> Vec<String> {
    options
        .iter()
        .map(|(key, value)| format!("--{key}={value}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::{
        path::Path,
        sync::{Arc, Mutex},
    };

    use crate::test_support;
    use plugin::tests::RecordingInstaller;
    use pretty_assertions::assert_eq;

    fn toolchain(search_path: &Path, installer: Box<dyn Installer>, cache: &str) -> Toolchain {
        Toolchain::new(
            Compiler::new(PathBuf::from("protoc"), "32.0", test_support::client()),
            PluginManager::new(installer).with_search_path(search_path),
            PathBuf::from("/project"),
            PathBuf::from(cache),
        )
    }

    fn plugin(name: &str, required: bool) -> PluginDeclaration {
        PluginDeclaration {
            name: name.to_owned(),
            command: format!("protoc-gen-{name}"),
            required,
            ..Default::default()
        }
    }

    #[test]
    fn proto_paths_come_first() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "/cache");

        let args = toolchain.build_args("cpp", "./gen/cpp", &[]).unwrap();

        assert_eq!(
            args,
            vec![
                "--proto_path=/project",
                "--proto_path=/cache",
                "--cpp_out=./gen/cpp",
            ]
        );
    }

    #[test]
    fn empty_cache_path_is_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "");

        assert_eq!(toolchain.proto_path_args(), vec!["--proto_path=/project"]);
    }

    #[cfg(unix)]
    #[test]
    fn available_plugins_are_added_with_their_options() {
        let dir = tempfile::tempdir().unwrap();
        test_support::write_executable(&dir.path().join("protoc-gen-grpc"), "#!/bin/sh\n");
        test_support::write_executable(&dir.path().join("protoc-gen-docs"), "#!/bin/sh\n");
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "");

        let mut docs = plugin("docs", false);
        docs.output_dir = "./gen/docs".to_owned();
        docs.options.insert("zeta".to_owned(), "1".to_owned());
        docs.options.insert("alpha".to_owned(), "2".to_owned());

        let args = toolchain
            .build_args("cpp", "./gen/cpp", &[plugin("grpc", true), docs])
            .unwrap();

        assert_eq!(
            args,
            vec![
                "--proto_path=/project",
                "--cpp_out=./gen/cpp",
                "--grpc_out=./gen/cpp",
                "--docs_out=./gen/docs",
                "--alpha=2",
                "--zeta=1",
            ]
        );
    }

    #[test]
    fn missing_optional_plugin_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "");

        let args = toolchain
            .build_args("cpp", "./gen/cpp", &[plugin("lint", false)])
            .unwrap();

        assert_eq!(args, vec!["--proto_path=/project", "--cpp_out=./gen/cpp"]);
    }

    #[test]
    fn missing_required_plugin_fails() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "");

        let err = toolchain
            .build_args("cpp", "./gen/cpp", &[plugin("grpc", true)])
            .unwrap_err();

        match err {
            ToolchainError::Plugin(PluginError::Required { name, command }) => {
                assert_eq!(name, "grpc");
                assert_eq!(command, "protoc-gen-grpc");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn go_installs_its_base_plugin() {
        let dir = tempfile::tempdir().unwrap();
        test_support::write_executable(&dir.path().join("protoc-gen-twirp"), "#!/bin/sh\n");
        let installed = Arc::new(Mutex::new(Vec::new()));
        let installer = RecordingInstaller {
            dir: Some(dir.path().to_path_buf()),
            installed: installed.clone(),
        };
        let toolchain = toolchain(dir.path(), Box::new(installer), "");
        let twirp = PluginDeclaration {
            name: "twirp".to_owned(),
            command: String::new(),
            ..Default::default()
        };

        let args = toolchain.build_args("go", "./gen/go", &[twirp]).unwrap();

        assert_eq!(installed.lock().unwrap().clone(), vec!["protoc-gen-go"]);
        assert_eq!(
            args,
            vec![
                "--proto_path=/project",
                "--go_out=./gen/go",
                "--twirp_out=./gen/go",
            ]
        );
    }

    #[test]
    fn base_plugin_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let toolchain = toolchain(dir.path(), Box::new(DisabledInstaller), "");

        assert!(matches!(
            toolchain.build_args("swift", "./gen/swift", &[]),
            Err(ToolchainError::Plugin(PluginError::BaseInstall { .. }))
        ));
    }
}
