use std::path::PathBuf;

use clap::{Parser, Subcommand};
use garden_core::config::{load_config, GardenConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "garden-broker", about = "Smart garden irrigation broker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the broker server (default if no subcommand is given).
    Serve {
        #[arg(long, default_value = "garden.toml")]
        config: PathBuf,
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load and print the effective configuration, then exit.
    PrintConfig {
        #[arg(long, default_value = "garden.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve { config: "garden.toml".into(), bind: None }) {
        Command::Serve { config, bind } => serve(config, bind).await,
        Command::PrintConfig { config } => print_config(config),
    }
}

fn print_config(path: PathBuf) -> anyhow::Result<()> {
    let config = load_config(&path).unwrap_or_default();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

async fn serve(config_path: PathBuf, bind_override: Option<String>) -> anyhow::Result<()> {
    let mut config = load_config(&config_path).unwrap_or_else(|err| {
        info!(error = %err, "using default configuration");
        GardenConfig::default()
    });
    if let Some(bind) = bind_override {
        config.server.bind = bind;
    }

    garden_broker::serve(config, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
}
