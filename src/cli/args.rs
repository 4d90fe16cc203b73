use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Protobuf schema dependency manager and code generator.
#[derive(Debug, Parser)]
#[clap(version)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Project root directory
    #[clap(short, long, global = true, default_value = ".")]
    pub root: PathBuf,
    /// Tool configuration file, defaults to $HOME/.protodex/config.toml
    #[clap(long, global = true, env = "PROTODEX_CONFIG")]
    pub config: Option<PathBuf>,
    /// Dependency cache directory, overrides the configured one
    #[clap(long, global = true)]
    pub cache_dir: Option<PathBuf>,
    /// Log debug output
    #[clap(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a protodex.toml in the project root
    Init {
        #[clap(short, long)]
        name: Option<String>,
    },
    /// Generates code for a language, or for every configured language
    Generate {
        language: Option<String>,
        /// Project to generate from: a local directory or any remote source
        #[clap(short, long, default_value = ".")]
        source: String,
        /// Output directory, overrides the project configuration
        #[clap(short, long)]
        output: Option<String>,
    },
    /// Checks that the project's proto files compile
    Validate,
    /// Pulls a package from the registry
    Pull {
        /// <package>[@<version>]
        reference: String,
        #[clap(short, long, default_value = ".")]
        output: PathBuf,
    },
    /// Pushes the project's proto files to the registry
    Push {
        /// Version to publish, e.g. v1.0.0
        version: String,
        /// Project directory
        #[clap(default_value = ".")]
        dir: PathBuf,
    },
    /// Shows the effective tool configuration
    Config,
    /// Manages project dependencies
    Deps {
        #[clap(subcommand)]
        cmd: DepsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum DepsCommand {
    /// Fetches every declared dependency into the cache
    Resolve,
    /// Lists declared dependencies
    List,
    /// Declares a new dependency
    Add {
        name: String,
        /// Source reference, e.g. github://owner/repo@v1.0.0
        source: String,
        /// Resolve the dependency right away
        #[clap(long)]
        resolve: bool,
    },
    /// Lists cached dependency directories
    Cached,
    /// Removes the dependency cache
    Clear,
}
