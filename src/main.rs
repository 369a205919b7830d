use anyhow::Result;
use clap::{Parser, Subcommand};
use rollcall::config::Config;
use rollcall::{gateway, store};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rollcall",
    version,
    about = "User roster service over an immutable object store"
)]
struct Cli {
    /// Path to the TOML config file (defaults to ./rollcall.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway (the default).
    Serve,
    /// Bootstrap the roster document if no pointer exists yet.
    Init,
    /// Check that the object store is reachable.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => gateway::run_gateway(config).await,
        Command::Init => init(config).await,
        Command::Check => check(config).await,
    }
}

/// Explicit bootstrap with a hard error path, unlike the serving path
/// which degrades to fallback reads.
async fn init(config: Config) -> Result<()> {
    let store = store::create_object_store(&config.store)?;
    let seed = gateway::load_seed(&config);
    let state = gateway::build_state(&config, store, seed);

    if state.users.ensure_initialized().await? {
        tracing::info!("Roster document bootstrapped");
    } else {
        tracing::info!("Roster document already initialized, nothing to do");
    }
    Ok(())
}

async fn check(config: Config) -> Result<()> {
    let store = store::create_object_store(&config.store)?;
    if !store.health_check().await {
        anyhow::bail!("Object store '{}' is unreachable", store.name());
    }
    tracing::info!("Object store '{}' is reachable", store.name());
    Ok(())
}
