//! ITv2 gateway CLI.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};

use itv2_gateway::config::{init_logging, GatewayConfig};
use itv2_gateway::error::Result;
use itv2_gateway::server::Gateway;
use itv2_gateway::VERSION;

#[derive(Parser)]
#[command(name = "itv2-gateway", version = VERSION, about = "ITv2 panel-integration gateway")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level filter (overrides the config file).
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the gateway.
    Serve {
        /// Listen port (overrides the config file).
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate the configuration and print the effective values.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GatewayConfig::load(path)?,
        None => GatewayConfig::default(),
    };
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.listen_addr.set_port(port);
            }
            init_logging(&config.logging)?;
            config.validate()?;
            serve(config).await
        }
        Commands::CheckConfig => {
            config.validate()?;
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| itv2_gateway::Error::Config(e.to_string()))?
            );
            Ok(())
        }
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    let (gateway, mut events) = Gateway::new(config);

    // Out-of-scope domain handlers subscribe here; the binary just logs.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(
                session = %event.session_id,
                message = event.message.name(),
                "panel notification"
            );
        }
    });

    let runner = Arc::clone(&gateway);
    tokio::select! {
        result = runner.run() => result,
        _ = signal::ctrl_c() => {
            warn!("interrupt received; shutting down");
            gateway.shutdown();
            Ok(())
        }
    }
}
