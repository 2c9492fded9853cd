//! Plugkit CLI - Main entry point

mod commands;
mod confirm;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use plugkit_foundation::RuntimeConfig;

/// Plugkit - dynamic plugin runtime
#[derive(Parser, Debug)]
#[command(name = "plugkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Plugins directory (overrides config and env)
    #[arg(long, global = true)]
    plugins_path: Option<std::path::PathBuf>,

    /// Registry URL (overrides config and env)
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install plugins from a directory, archive, URL or registry
    Install {
        /// Specifiers (path, .tgz, URL, name[@version])
        #[arg(required = true)]
        specifiers: Vec<String>,

        /// Version or dist-tag to install
        #[arg(long)]
        version: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Uninstall plugins by name
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Update plugins (all when no name is given)
    Update { names: Vec<String> },
    /// Check whether a newer version is available
    Check { name: String },
    /// List installed plugins
    List {
        /// Include inactive plugins
        #[arg(short, long)]
        all: bool,
    },
    /// Activate a plugin
    Enable { name: String },
    /// Deactivate a plugin
    Disable { name: String },
    /// Run an activation point for every active plugin
    Trigger { point: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let mut config = RuntimeConfig::load().unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config: {}", e);
        RuntimeConfig::new()
    });
    if let Some(path) = args.plugins_path {
        config = config.with_plugins_path(path);
    }
    if let Some(url) = args.registry {
        config = config.with_registry_url(url);
    }

    match args.command {
        Command::Install {
            specifiers,
            version,
            yes,
        } => commands::install(&config, specifiers, version, yes).await,
        Command::Uninstall { names } => commands::uninstall(&config, names).await,
        Command::Update { names } => commands::update(&config, names).await,
        Command::Check { name } => commands::check(&config, &name).await,
        Command::List { all } => commands::list(&config, all).await,
        Command::Enable { name } => commands::toggle(&config, &name, true).await,
        Command::Disable { name } => commands::toggle(&config, &name, false).await,
        Command::Trigger { point } => commands::trigger(&config, &point).await,
    }
}
