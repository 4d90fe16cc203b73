use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Command,
};

use anyhow::bail;
use log::{debug, info};
use thiserror::Error;

/// The plugin protoc needs for a language it does not generate natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasePlugin {
    pub language: &'static str,
    pub plugin: &'static str,
    pub install: &'static [&'static str],
}

const BASE_PLUGINS: &[BasePlugin] = &[
    BasePlugin {
        language: "go",
        plugin: "protoc-gen-go",
        install: &[
            "go",
            "install",
            "google.golang.org/protobuf/cmd/protoc-gen-go@latest",
        ],
    },
    BasePlugin {
        language: "dart",
        plugin: "protoc-gen-dart",
        install: &["dart", "pub", "global", "activate", "protoc_plugin"],
    },
    BasePlugin {
        language: "rust",
        plugin: "protoc-gen-rs",
        install: &["cargo", "install", "protobuf-codegen"],
    },
    BasePlugin {
        language: "swift",
        plugin: "protoc-gen-swift",
        install: &["brew", "install", "swift-protobuf"],
    },
    BasePlugin {
        language: "ts",
        plugin: "protoc-gen-ts",
        install: &["npm", "install", "-g", "ts-proto"],
    },
    BasePlugin {
        language: "js",
        plugin: "protoc-gen-es",
        install: &["npm", "install", "-g", "@bufbuild/protoc-gen-es"],
    },
];

/// None for languages protoc generates itself.
pub fn base_plugin(language: &str) -> Option<&'static BasePlugin> {
    BASE_PLUGINS
        .iter()
        .find(|base| base.language.eq_ignore_ascii_case(language))
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("required plugin {name} (`{command}`) was not found")]
    Required { name: String, command: String },
    #[error("could not install {plugin} for {language}: {reason}")]
    BaseInstall {
        language: String,
        plugin: String,
        reason: String,
    },
}

/// Installs a missing base plugin.
pub trait Installer {
    fn install(&self, plugin: &BasePlugin) -> anyhow::Result<()>;
}

/// Runs the plugin's install command with inherited stdio.
pub struct CommandInstaller;

impl Installer for CommandInstaller {
    fn install(&self, plugin: &BasePlugin) -> anyhow::Result<()> {
        let Some((program, args)) = plugin.install.split_first() else {
            bail!("no install command for {}", plugin.plugin);
        };
        info!("Installing {} with `{}`", plugin.plugin, plugin.install.join(" "));
        let status = Command::new(program).args(args).status()?;
        if !status.success() {
            bail!("`{}` exited with {status}", plugin.install.join(" "));
        }
        Ok(())
    }
}

pub struct DisabledInstaller;

impl Installer for DisabledInstaller {
    fn install(&self, plugin: &BasePlugin) -> anyhow::Result<()> {
        bail!(
            "automatic installation is disabled, install it with `{}`",
            plugin.install.join(" ")
        )
    }
}

/// Finds plugin executables on a search path.
pub struct PluginManager {
    search_path: Option<OsString>,
    installer: Box<dyn Installer>,
}

impl PluginManager {
    /// Searches `PATH`.
    pub fn new(installer: Box<dyn Installer>) -> Self {
        PluginManager {
            search_path: None,
            installer,
        }
    }

    pub fn with_search_path(mut self, search_path: impl Into<OsString>) -> Self {
        self.search_path = Some(search_path.into());
        self
    }

    pub fn find(&self, command: &str) -> Option<PathBuf> {
        let found = match &self.search_path {
            Some(paths) => which::which_in(command, Some(paths), Path::new(".")),
            None => which::which(command),
        };
        found.ok()
    }

    /// Makes sure the base plugin for `language` is available, installing it
    /// when missing.
    pub fn ensure_base_plugin(&self, language: &str) -> Result<(), PluginError> {
        let Some(base) = base_plugin(language) else {
            debug!("{language} needs no base plugin");
            return Ok(());
        };
        if let Some(path) = self.find(base.plugin) {
            debug!("Found {} at {}", base.plugin, path.display());
            return Ok(());
        }

        let install_error = |reason: String| PluginError::BaseInstall {
            language: language.to_owned(),
            plugin: base.plugin.to_owned(),
            reason,
        };
        self.installer
            .install(base)
            .map_err(|err| install_error(format!("{err:#}")))?;
        match self.find(base.plugin) {
            Some(_) => Ok(()),
            None => Err(install_error(
                "the plugin is still not on the search path after installing".to_owned(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    /// Records installs and, on unix, drops a stub executable into `dir`.
    pub struct RecordingInstaller {
        pub dir: Option<PathBuf>,
        pub installed: Arc<Mutex<Vec<String>>>,
    }

    impl Installer for RecordingInstaller {
        fn install(&self, plugin: &BasePlugin) -> anyhow::Result<()> {
            self.installed.lock().unwrap().push(plugin.plugin.to_owned());
            #[cfg(unix)]
            if let Some(dir) = &self.dir {
                crate::test_support::write_executable(&dir.join(plugin.plugin), "#!/bin/sh\n");
            }
            Ok(())
        }
    }

    #[test]
    fn base_plugins_match_case_insensitively() {
        assert_eq!(base_plugin("Go").unwrap().plugin, "protoc-gen-go");
        assert_eq!(base_plugin("TS").unwrap().plugin, "protoc-gen-ts");
        assert_eq!(
            base_plugin("js").unwrap().install,
            &["npm", "install", "-g", "@bufbuild/protoc-gen-es"]
        );
        assert_eq!(base_plugin("cpp"), None);
        assert_eq!(base_plugin("python"), None);
    }

    #[test]
    fn builtin_languages_need_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::new(Box::new(DisabledInstaller)).with_search_path(dir.path());
        manager.ensure_base_plugin("cpp").unwrap();
    }

    #[test]
    fn disabled_installer_reports_the_command() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PluginManager::new(Box::new(DisabledInstaller)).with_search_path(dir.path());

        let err = manager.ensure_base_plugin("dart").unwrap_err();

        match err {
            PluginError::BaseInstall {
                language,
                plugin,
                reason,
            } => {
                assert_eq!(language, "dart");
                assert_eq!(plugin, "protoc-gen-dart");
                assert!(reason.contains("dart pub global activate protoc_plugin"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn missing_base_plugin_is_installed() {
        let dir = tempfile::tempdir().unwrap();
        let installed = Arc::new(Mutex::new(Vec::new()));
        let installer = RecordingInstaller {
            dir: Some(dir.path().to_path_buf()),
            installed: installed.clone(),
        };
        let manager = PluginManager::new(Box::new(installer)).with_search_path(dir.path());

        manager.ensure_base_plugin("go").unwrap();
        manager.ensure_base_plugin("go").unwrap();

        assert_eq!(installed.lock().unwrap().clone(), vec!["protoc-gen-go"]);
    }

    #[test]
    fn install_that_does_not_provide_the_plugin_fails() {
        let dir = tempfile::tempdir().unwrap();
        let installer = RecordingInstaller {
            dir: None,
            installed: Arc::default(),
        };
        let manager = PluginManager::new(Box::new(installer)).with_search_path(dir.path());

        assert!(matches!(
            manager.ensure_base_plugin("rust"),
            Err(PluginError::BaseInstall { .. })
        ));
    }
}
