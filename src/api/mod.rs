use std::path::{Path, PathBuf};

use reqwest::blocking::Client;

use crate::{
    cache::DependencyCache,
    cli::command_handlers::{
        do_add_dependency, do_clear_cache, do_generate, do_init, do_list_cached,
        do_list_dependencies, do_pull, do_push, do_resolve, do_show_config, do_validate,
    },
    config::ProtodexConfig,
    fetch::{registry::HttpRegistryClient, Endpoints, Fetcher},
    generate::Generator,
    model::project::ProjectConfig,
    toolchain::{
        CommandInstaller, Compiler, DisabledInstaller, Installer, PluginManager, Toolchain,
    },
};

mod builder;

pub use builder::ProtodexBuilder;

pub struct Protodex {
    root: PathBuf,
    project_file_name: PathBuf,
    config: ProtodexConfig,
    client: Client,
    auto_install: bool,
}

impl Protodex {
    pub fn builder() -> ProtodexBuilder {
        ProtodexBuilder::default()
    }

    pub fn config(&self) -> &ProtodexConfig {
        &self.config
    }

    /// Writes a default project file
    pub fn init(&self, name: Option<String>) -> anyhow::Result<()> {
        do_init(&self.root, name, &self.project_file_name)
    }

    /// Generates code for `language`, or for every configured language.
    ///
    /// `source` is the project to generate from. Remote sources are fetched
    /// into a temporary directory that is removed afterwards.
    pub fn generate(
        &self,
        language: Option<&str>,
        source: &str,
        output_dir: Option<&str>,
    ) -> anyhow::Result<()> {
        do_generate(self, language, source, output_dir)
    }

    /// Checks that the project's proto files compile
    pub fn validate(&self) -> anyhow::Result<()> {
        do_validate(self)
    }

    /// Pulls `package[@version]` from the registry into `output`
    pub fn pull(&self, reference: &str, output: &Path) -> anyhow::Result<()> {
        do_pull(&self.registry(), reference, &self.root.join(output))
    }

    /// Uploads the project in `dir` to the registry as `version`
    pub fn push(&self, version: &str, dir: &Path) -> anyhow::Result<()> {
        do_push(
            &self.registry(),
            &self.root.join(dir),
            &self.project_file_name,
            version,
        )?;
        Ok(())
    }

    /// Prints the effective tool configuration
    pub fn show_config(&self) -> anyhow::Result<()> {
        do_show_config(&self.config, &mut std::io::stdout().lock())
    }

    /// Fetches every declared dependency into the cache
    pub fn resolve_dependencies(&self) -> anyhow::Result<()> {
        let project = self.project(&self.root)?;
        do_resolve(&self.cache()?, &project)
    }

    pub fn list_dependencies(&self) -> anyhow::Result<()> {
        do_list_dependencies(&self.project(&self.root)?)
    }

    /// Declares a new dependency in the project file
    pub fn add_dependency(&self, name: &str, source: &str, resolve: bool) -> anyhow::Result<()> {
        let cache = if resolve { Some(self.cache()?) } else { None };
        do_add_dependency(
            &self.root,
            &self.project_file_name,
            name,
            source,
            cache.as_ref(),
        )
    }

    pub fn list_cached(&self) -> anyhow::Result<()> {
        do_list_cached(&self.cache()?)
    }

    pub fn clear_cache(&self) -> anyhow::Result<()> {
        do_clear_cache(&self.cache()?)
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn project(&self, root: &Path) -> anyhow::Result<ProjectConfig> {
        Ok(ProjectConfig::load_or_default(root, &self.project_file_name)?)
    }

    pub(crate) fn fetcher(&self) -> Fetcher {
        Fetcher::new(
            self.client.clone(),
            Endpoints::default(),
            Box::new(self.registry()),
        )
    }

    pub(crate) fn cache(&self) -> anyhow::Result<DependencyCache> {
        Ok(DependencyCache::new(
            self.config.cache_dir.clone(),
            self.fetcher(),
        )?)
    }

    /// A generator for the project rooted at `root`.
    pub(crate) fn generator(
        &self,
        root: &Path,
        project: ProjectConfig,
    ) -> anyhow::Result<Generator> {
        let cache = self.cache()?;
        let installer: Box<dyn Installer> = if self.auto_install {
            Box::new(CommandInstaller)
        } else {
            Box::new(DisabledInstaller)
        };
        let toolchain = Toolchain::new(
            Compiler::new(
                self.config.protoc_bin.clone(),
                &self.config.protoc_version,
                self.client.clone(),
            ),
            PluginManager::new(installer),
            root.join(&project.files.base_dir),
            cache.dependency_path().to_path_buf(),
        );
        Ok(Generator::new(project, cache, toolchain))
    }

    fn registry(&self) -> HttpRegistryClient {
        HttpRegistryClient::new(self.client.clone(), &self.config.registry_url)
    }
}
