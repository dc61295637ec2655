//! tunnel-proxy binary.
//!
//! Loads the configuration, merges command-line nodes into the base route,
//! builds every router and serves until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use tunnel_proxy::config::{read_config, validate_config, BaseConfig, ConfigError};
use tunnel_proxy::lifecycle::{serve_all, wait_for_shutdown, DRAIN_TIMEOUT};
use tunnel_proxy::observability::{logging, metrics};

#[derive(Debug, Parser)]
#[command(name = "tunnel-proxy", version, about = "Multi-protocol tunnelling proxy")]
struct Cli {
    /// Configuration file (JSON, or TOML with a .toml extension).
    #[arg(short = 'C', long = "config")]
    config: Option<PathBuf>,

    /// Serve node, e.g. socks5://:1080. Repeatable.
    #[arg(short = 'L', value_name = "NODE")]
    serve_nodes: Vec<String>,

    /// Chain node, in traversal order. Repeatable.
    #[arg(short = 'F', value_name = "NODE")]
    chain_nodes: Vec<String>,

    /// Enable debug logging.
    #[arg(short = 'D', long = "debug")]
    debug: bool,

    /// Expose Prometheus metrics on this address.
    #[arg(long = "metrics", value_name = "ADDR")]
    metrics: Option<SocketAddr>,
}

impl Cli {
    /// The configuration file, if any, with command-line nodes appended to
    /// its base route.
    fn into_config(self) -> Result<(BaseConfig, Option<SocketAddr>), ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => BaseConfig::default(),
        };
        config.route.serve_nodes.extend(self.serve_nodes);
        config.route.chain_nodes.extend(self.chain_nodes);
        config.debug |= self.debug;
        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok((config, self.metrics))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let (config, metrics_addr) = match cli.into_config() {
        Ok(loaded) => loaded,
        Err(err) => {
            logging::init(false);
            tracing::error!(error = %err, "Invalid configuration");
            return Err(err.into());
        }
    };

    logging::init(config.debug);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "tunnel-proxy starting");

    if let Some(addr) = metrics_addr {
        if let Err(err) = metrics::init_metrics(addr) {
            tracing::error!(metrics_address = %addr, error = %err, "Metrics exporter not started");
        }
    }

    let routers = match tunnel_proxy::build(&config).await {
        Ok(routers) => routers,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build routes");
            return Err(err.into());
        }
    };

    let running = serve_all(routers);
    wait_for_shutdown().await;

    tracing::info!("Shutting down");
    running.shutdown(DRAIN_TIMEOUT).await;
    tracing::info!("Shutdown complete");
    Ok(())
}
