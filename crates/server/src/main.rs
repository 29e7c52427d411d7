use std::path::PathBuf;

use clap::Parser;
use eyre::{eyre, Result, WrapErr};
use orchestrator_keys::{KeyStore, Reaper};
use orchestrator_server::{default_config, load_config, shutdown_signal, start_server};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Token Orchestrator API
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[clap(short, long, value_parser)]
    config: Option<PathBuf>,

    /// Bind address for the server
    #[clap(short, long, value_parser)]
    bind: Option<String>,

    /// Port to listen on, keeping the configured host
    #[clap(short, long, env = "PORT")]
    port: Option<u16>,

    /// Enable verbose logging (can be specified multiple times)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    // `.env` must be applied before clap reads `PORT`
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "orchestrator_keys=info,orchestrator_server=info,tower_http=debug".into()
        }),
        1 => tracing_subscriber::EnvFilter::new("debug"),
        _ => tracing_subscriber::EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(path) = env_file {
        info!("Loaded environment from {}", path.display());
    }

    let mut config = if let Some(config_path) = &cli.config {
        info!("Loading configuration from {}", config_path.display());
        let path = config_path
            .to_str()
            .ok_or_else(|| eyre!("configuration path is not valid UTF-8"))?;
        load_config(path).wrap_err("failed to load configuration")?
    } else {
        info!("Using default configuration");
        default_config()
    };

    if let Some(bind) = cli.bind {
        config.listen_addr = bind.parse()?;
    } else if let Some(port) = cli.port {
        config.listen_addr.set_port(port);
    }

    let lease = config.lease.lease_duration()?;
    let reap_interval = config.lease.reap_interval()?;

    info!(
        lease_secs = config.lease.lease_secs,
        reap_interval_secs = config.lease.reap_interval_secs,
        "Starting token orchestrator"
    );

    let store = KeyStore::new(lease);
    let reaper = Reaper::new(store.clone(), reap_interval).spawn();

    let result = start_server(&config, store, shutdown_signal()).await;

    reaper.shutdown().await;

    result
}
