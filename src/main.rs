use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use nodegate::admission::Registry;
use nodegate::config::{LoggingConfig, NodegateConfig};
use nodegate::http::HttpServer;
use nodegate::simulate::{self, SimulationConfig, Targeting};

/// First-fit admission control for rate-limited backend nodes.
#[derive(Debug, Parser)]
#[command(name = "nodegate", version, about)]
struct Cli {
    /// Service configuration file (YAML, JSON or TOML)
    #[arg(short, long, env = "NODEGATE_CONFIG")]
    config: Option<PathBuf>,

    /// JSON node list, appended after any nodes in the configuration file
    #[arg(short, long)]
    nodes: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP ingress (default)
    Serve,
    /// Replay simulated traffic against the configured nodes and exit
    Simulate {
        /// Number of requests
        #[arg(long, default_value_t = 200)]
        requests: u32,
        /// Body size of each request in bytes
        #[arg(long, default_value_t = 100)]
        body_size: u64,
        /// Random size variation around the body size
        #[arg(long, default_value_t = 0)]
        size_jitter: u64,
        /// Delay between requests in milliseconds
        #[arg(long, default_value_t = 100)]
        delay_ms: u64,
        /// Send requests to each node in turn instead of first-fit
        #[arg(long)]
        alternate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = NodegateConfig::load(cli.config.as_deref())?;
    if let Some(nodes) = cli.nodes {
        config.nodes_file = Some(nodes);
    }
    if let Some(listen) = cli.listen {
        config.server.http_addr = listen;
    }
    if cli.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting Nodegate Admission Service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // A bad node list is fatal; the registry is never partially populated
    let nodes = config.load_nodes()?;
    let registry = Arc::new(Registry::from_descriptors(nodes)?);
    if registry.is_empty() {
        warn!("No nodes configured, every request will be rejected");
    }
    info!(nodes = registry.len(), "Registry initialized");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let server = HttpServer::new(config.server.http_addr, registry)
                .with_max_body_bytes(config.server.max_body_bytes);

            server.serve_with_shutdown(shutdown_signal()).await?;
            info!("Nodegate Admission Service stopped");
        }
        Command::Simulate {
            requests,
            body_size,
            size_jitter,
            delay_ms,
            alternate,
        } => {
            let simulation = SimulationConfig {
                requests,
                body_size,
                size_jitter,
                delay: Duration::from_millis(delay_ms),
                targeting: if alternate {
                    Targeting::Alternate
                } else {
                    Targeting::FirstFit
                },
            };

            let report = simulate::run(&registry, &simulation).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
