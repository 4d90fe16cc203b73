use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use log::{info, warn};

use crate::{
    api::Protodex,
    archive,
    cache::DependencyCache,
    config::ProtodexConfig,
    fetch::registry::{PublishedVersion, RegistryClient},
    generate::GenerationRequest,
    model::{
        project::{DependencyDeclaration, ProjectConfig},
        source::{SourceDescriptor, SourceType},
    },
    proto,
};

/// Handler to init command
pub fn do_init(root: &Path, name: Option<String>, project_file_name: &Path) -> anyhow::Result<()> {
    let project_file_path = root.join(project_file_name);
    if project_file_path.exists() {
        bail!("File already exists: {}", project_file_path.display());
    }

    let name = build_project_name(name, root)?;
    let description = format!("Protodex project {name}");
    ProjectConfig::new(name, description).save(&project_file_path)?;
    info!("Wrote {}", project_file_path.display());
    Ok(())
}

/// Handler to generate command
///
/// A non-local `source` is fetched into a temporary directory which then acts
/// as the project root.
pub fn do_generate(
    protodex: &Protodex,
    language: Option<&str>,
    source: &str,
    output_dir: Option<&str>,
) -> anyhow::Result<()> {
    let descriptor = SourceDescriptor::parse(source)?;
    let checkout = if descriptor.source_type() == SourceType::Local {
        None
    } else {
        let dir = tempfile::Builder::new()
            .prefix("protodex-generate-")
            .tempdir()?;
        protodex.fetcher().fetch(&descriptor, dir.path())?;
        Some(dir)
    };
    let root = match &checkout {
        Some(dir) => dir.path().to_path_buf(),
        None => protodex.root().join(descriptor.locator()),
    };

    let result = generate_in(protodex, &root, language, output_dir);

    if let Some(dir) = checkout {
        let display = dir.path().display().to_string();
        if let Err(err) = dir.close() {
            warn!("Failed to remove temp directory {display}: {err}");
        }
    }
    result
}

fn generate_in(
    protodex: &Protodex,
    root: &Path,
    language: Option<&str>,
    output_dir: Option<&str>,
) -> anyhow::Result<()> {
    let project = protodex.project(root)?;
    let files = project_proto_files(root, &project)?;
    info!("Validating {} proto files", files.len());
    proto::validate_proto_files(&files)?;

    let generator = protodex.generator(root, project)?;
    match language {
        Some(language) => {
            let request = GenerationRequest {
                language: language.to_owned(),
                output_dir: output_dir.map(str::to_owned),
                ..Default::default()
            };
            generator.generate(&files, &request)?;
        }
        None => {
            if output_dir.is_some() {
                warn!("--output is ignored when generating every configured language");
            }
            generator.generate_all(&files)?;
        }
    }
    info!("Code generation completed successfully");
    Ok(())
}

/// Handler to validate command
pub fn do_validate(protodex: &Protodex) -> anyhow::Result<()> {
    let root = protodex.root();
    let project = protodex.project(root)?;
    let files = project_proto_files(root, &project)?;
    protodex.generator(root, project)?.validate(&files)?;
    Ok(())
}

/// Handler to pull command
pub fn do_pull(registry: &dyn RegistryClient, reference: &str, output: &Path) -> anyhow::Result<()> {
    let (package, version) = parse_package_ref(reference)?;
    std::fs::create_dir_all(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    registry.pull_version(package, version, output)?;
    info!("Pulled {package}@{version} to {}", output.display());
    Ok(())
}

/// Handler to push command
///
/// Bundles the project's proto files, together with its project file and
/// README.md when present, and uploads them as `version` of the package.
pub fn do_push(
    registry: &dyn RegistryClient,
    project_dir: &Path,
    project_file_name: &Path,
    version: &str,
) -> anyhow::Result<PublishedVersion> {
    if version.is_empty() {
        bail!("A version to push is required");
    }
    if !project_dir.is_dir() {
        bail!("Project directory does not exist: {}", project_dir.display());
    }
    let project = ProjectConfig::load_or_default(project_dir, project_file_name)?;
    let package = project.package.name.as_str();
    if package.is_empty() {
        bail!("Package name not found, set package.name in {}", project_file_name.display());
    }

    let mut files = project_proto_files(project_dir, &project)?;
    info!("Validating {} proto files", files.len());
    proto::validate_proto_files(&files)?;
    for extra in [project_dir.join(project_file_name), project_dir.join("README.md")] {
        if extra.is_file() {
            files.push(extra);
        }
    }

    info!("Bundling {} files", files.len());
    let bundle = archive::bundle(project_dir, &files)
        .with_context(|| format!("failed to bundle {}", project_dir.display()))?;
    let published = registry
        .push_version(package, version, bundle)
        .context("failed to push to registry")?;
    info!(
        "Pushed {package}@{} (id {})",
        published.version, published.id
    );
    Ok(published)
}

/// Handler to config command
pub fn do_show_config(config: &ProtodexConfig, out: &mut impl Write) -> anyhow::Result<()> {
    match &config.config_file {
        Some(file) if file.is_file() => writeln!(out, "Configuration file: {}", file.display())?,
        Some(file) => writeln!(out, "Configuration file: {} (not found)", file.display())?,
        None => writeln!(out, "Configuration file: none")?,
    }
    writeln!(out)?;
    writeln!(out, "cache_dir: {}", config.cache_dir.display())?;
    writeln!(
        out,
        "protoc_bin: {} ({})",
        config.protoc_bin.display(),
        config.protoc_version
    )?;
    writeln!(out, "registry: {}", config.registry_url)?;
    Ok(())
}

pub fn do_resolve(cache: &DependencyCache, project: &ProjectConfig) -> anyhow::Result<()> {
    cache.resolve_all(&project.deps)?;
    info!(
        "Dependencies are cached in {}",
        cache.dependency_path().display()
    );
    Ok(())
}

pub fn do_list_dependencies(project: &ProjectConfig) -> anyhow::Result<()> {
    if project.deps.is_empty() {
        info!("No dependencies declared");
    }
    for dep in &project.deps {
        println!("{}", describe_dependency(dep));
    }
    Ok(())
}

/// Handler to deps add command
/// Appends the dependency to the project file and optionally resolves it.
pub fn do_add_dependency(
    root: &Path,
    project_file_name: &Path,
    name: &str,
    source: &str,
    cache: Option<&DependencyCache>,
) -> anyhow::Result<()> {
    let mut project = ProjectConfig::load_or_default(root, project_file_name)?;
    if project.dependency(name).is_some() {
        bail!("Dependency {name} is already declared");
    }

    let dependency = declaration(name, &SourceDescriptor::parse(source)?);
    project.deps.push(dependency.clone());
    let project_file_path = root.join(project_file_name);
    project.save(&project_file_path)?;
    info!("Added {} to {}", describe_dependency(&dependency), project_file_path.display());

    if let Some(cache) = cache {
        cache.resolve_all(std::slice::from_ref(&dependency))?;
    }
    Ok(())
}

pub fn do_list_cached(cache: &DependencyCache) -> anyhow::Result<()> {
    let cached = cache.list_cached()?;
    if cached.is_empty() {
        info!("No cached dependencies in {}", cache.dependency_path().display());
    }
    for name in cached {
        println!("{name}");
    }
    Ok(())
}

pub fn do_clear_cache(cache: &DependencyCache) -> anyhow::Result<()> {
    cache.clear()?;
    Ok(())
}

fn project_proto_files(root: &Path, project: &ProjectConfig) -> anyhow::Result<Vec<PathBuf>> {
    let base_dir = root.join(&project.files.base_dir);
    let files = proto::find_proto_files(&base_dir, &project.files.exclude)?;
    if files.is_empty() {
        bail!("No proto files found in {}", base_dir.display());
    }
    Ok(files)
}

/// HTTP sources keep the full URL since the locator alone loses the scheme.
fn declaration(name: &str, descriptor: &SourceDescriptor) -> DependencyDeclaration {
    let (source, version) = match descriptor.source_type() {
        SourceType::Http => (descriptor.raw_without_version(), ""),
        SourceType::Local => (descriptor.locator(), ""),
        _ => (descriptor.locator(), descriptor.version_ref()),
    };
    DependencyDeclaration {
        name: name.to_owned(),
        source_type: descriptor.source_type(),
        source: source.to_owned(),
        version: version.to_owned(),
        path: None,
    }
}

fn describe_dependency(dep: &DependencyDeclaration) -> String {
    let mut description = format!("{} ({}) {}", dep.name, dep.source_type, dep.source);
    if !dep.version.is_empty() {
        description.push('@');
        description.push_str(&dep.version);
    }
    description
}

/// Splits `package[@version]`, with or without the `protodex://` scheme.
fn parse_package_ref(reference: &str) -> anyhow::Result<(&str, &str)> {
    let reference = reference.strip_prefix("protodex://").unwrap_or(reference);
    let (package, version) = match reference.split_once('@') {
        Some((package, version)) if !version.is_empty() => (package, version),
        Some((package, _)) => (package, SourceType::Registry.default_version()),
        None => (reference, SourceType::Registry.default_version()),
    };
    if package.is_empty() {
        bail!("Invalid package reference `{reference}`, expected <package>[@<version>]");
    }
    Ok((package, version))
}

/// Name if present otherwise attempt to extract from directory
fn build_project_name(name: Option<String>, path: &Path) -> anyhow::Result<String> {
    match name {
        Some(name) => Ok(name),
        None => match path.canonicalize()?.file_name() {
            Some(dir) => Ok(dir.to_string_lossy().to_string()),
            None => bail!("Project name not given and could not convert location to directory name"),
        },
    }
}
