use clap::Parser;
use protodex::{
    cli::args::{CliArgs, Command, DepsCommand},
    Protodex,
};

fn main() {
    let cli_args = CliArgs::parse();

    let default_filter = if cli_args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(cli_args) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli_args: CliArgs) -> anyhow::Result<()> {
    let mut builder = Protodex::builder().root(&cli_args.root);
    if let Some(config) = &cli_args.config {
        builder = builder.config_file(config);
    }
    if let Some(cache_dir) = &cli_args.cache_dir {
        builder = builder.cache_directory(cache_dir);
    }
    let protodex = builder.try_build()?;

    match cli_args.cmd {
        Command::Init { name } => protodex.init(name),
        Command::Generate {
            language,
            source,
            output,
        } => protodex.generate(language.as_deref(), &source, output.as_deref()),
        Command::Validate => protodex.validate(),
        Command::Pull { reference, output } => protodex.pull(&reference, &output),
        Command::Push { version, dir } => protodex.push(&version, &dir),
        Command::Config => protodex.show_config(),
        Command::Deps { cmd } => match cmd {
            DepsCommand::Resolve => protodex.resolve_dependencies(),
            DepsCommand::List => protodex.list_dependencies(),
            DepsCommand::Add {
                name,
                source,
                resolve,
            } => protodex.add_dependency(&name, &source, resolve),
            DepsCommand::Cached => protodex.list_cached(),
            DepsCommand::Clear => protodex.clear_cache(),
        },
    }
}
