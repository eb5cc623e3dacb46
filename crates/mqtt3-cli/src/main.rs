//! `mqtt3d` — standalone MQTT 3.1.1 broker daemon.

use anyhow::{Context, Result};
use clap::Parser;
use mqtt3::broker::{BrokerConfig, MqttBroker};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mqtt3d", version, about = "MQTT 3.1.1 broker")]
struct Args {
    /// Configuration file path (JSON format); flags below override it
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// TCP bind address (e.g. `0.0.0.0:1883`)
    #[arg(long, short = 'H')]
    host: Option<SocketAddr>,

    /// Allow anonymous access (no authentication required)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    allow_anonymous: Option<bool>,

    /// Password file path (format: username:password per line)
    #[arg(long)]
    password_file: Option<PathBuf>,

    /// Per-connection idle-read timeout in seconds
    #[arg(long)]
    idle_timeout_secs: Option<u64>,

    /// Session registry sweep interval in seconds
    #[arg(long)]
    sweep_interval_secs: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<BrokerConfig> {
        let mut config = match self.config {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => BrokerConfig::default(),
        };

        if let Some(host) = self.host {
            config = config.with_bind_address(host);
        }
        if let Some(allow) = self.allow_anonymous {
            config = config.with_allow_anonymous(allow);
        }
        if let Some(path) = self.password_file {
            config = config.with_password_file(path);
        }
        if let Some(secs) = self.idle_timeout_secs {
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = self.sweep_interval_secs {
            config = config.with_sweep_interval(Duration::from_secs(secs));
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;
    let mut broker = MqttBroker::with_config(config)
        .await
        .context("Failed to start broker")?;

    tokio::select! {
        result = broker.run() => {
            result.context("Broker terminated with error")?;
        }
        _ = signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            broker.shutdown().ok();
        }
    }

    Ok(())
}
