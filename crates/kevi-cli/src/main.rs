//! Kevi CLI - Package cluster configuration as content-addressed artifacts

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

#[derive(Parser)]
#[command(name = "kevi")]
#[command(version)]
#[command(about = "Package manifests and charts into a content-addressed store and relocate it", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/kevi/config.yaml)
    #[arg(long, global = true, env = "KEVI_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pack package-sets into a local store
    Pack {
        /// Package-set file(s); a file may hold several YAML documents
        #[arg(short = 'f', long = "file", required = true)]
        files: Vec<PathBuf>,

        /// Store root
        #[arg(short, long)]
        store: Option<PathBuf>,

        /// Also write the whole store as a tar.gz archive
        #[arg(long)]
        archive: Option<PathBuf>,
    },

    /// Copy every artifact of a store to another registry
    Relocate {
        /// Target registry host, e.g. registry.local:5000
        registry: String,

        /// Store root
        #[arg(short, long)]
        store: Option<PathBuf>,

        #[command(flatten)]
        registry_args: commands::RegistryArgs,

        /// Give up after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout: u64,
    },

    /// Fetch a package from a registry and render it
    Render {
        /// Registry host holding the packages
        registry: String,

        /// Package to render
        #[arg(short, long)]
        package: String,

        /// Package-set file naming the package
        #[arg(short = 'f', long = "file", conflicts_with = "set")]
        file: Option<PathBuf>,

        /// Package-set stored in the registry
        #[arg(long)]
        set: Option<String>,

        /// Rewrite container images onto this registry host
        #[arg(long)]
        rewrite_images: Option<String>,

        #[command(flatten)]
        registry_args: commands::RegistryArgs,
    },

    /// List container images referenced by rendered manifests
    Images {
        /// Rendered YAML file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// List the contents of a store
    Ls {
        /// Store root
        #[arg(short, long)]
        store: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    miette::set_panic_hook();
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    let result = match cli.command {
        Commands::Pack {
            files,
            store,
            archive,
        } => commands::pack::run(config, &files, store.as_deref(), archive.as_deref()).await,

        Commands::Relocate {
            registry,
            store,
            registry_args,
            timeout,
        } => commands::relocate::run(config, &registry, store.as_deref(), &registry_args, timeout).await,

        Commands::Render {
            registry,
            package,
            file,
            set,
            rewrite_images,
            registry_args,
        } => {
            commands::render::run(
                config,
                &registry,
                &package,
                file.as_deref(),
                set.as_deref(),
                rewrite_images.as_deref(),
                &registry_args,
            )
            .await
        }

        Commands::Images { input } => commands::images::run(&input),

        Commands::Ls { store } => commands::ls::run(config, store.as_deref()),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
    std::process::exit(exit_codes::SUCCESS);
}
