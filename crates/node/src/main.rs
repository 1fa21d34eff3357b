//! Ringmine compute node daemon.

use anyhow::Result;
use clap::Parser;
use ringmine_node::config::DEFAULT_POW_DIFFICULTY_BITS;
use ringmine_node::{ComputeNode, NodeConfig};
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Ringmine compute node
#[derive(Parser)]
#[command(name = "ringmined")]
#[command(version)]
#[command(about = "Ringmine compute node", long_about = None)]
struct Cli {
    /// Registry host
    registry_host: String,

    /// Registry port
    registry_port: u16,

    /// The logging level (trace|debug|info|warn|error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// The logging format (json|plain)
    #[arg(long, default_value = "plain")]
    log_format: String,

    /// Disable colored logs
    #[arg(long, default_value = "false")]
    log_no_color: bool,

    /// Proof-of-work difficulty in leading zero bits
    #[arg(long, default_value_t = DEFAULT_POW_DIFFICULTY_BITS)]
    pow_difficulty: u32,

    /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9100)
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, &cli.log_format, cli.log_no_color);
    ringmine_metrics::init();

    let mut config = NodeConfig::new(format!("{}:{}", cli.registry_host, cli.registry_port))
        .with_pow_difficulty_bits(cli.pow_difficulty);
    if let Some(addr) = cli.metrics_addr {
        config = config.with_metrics_addr(addr);
        ringmine_metrics::spawn_metrics_server(addr);
    }

    let node = ComputeNode::bind(config).await?;
    info!(addr = %node.handle().self_addr(), "compute node live");

    node.run().await;
    Ok(())
}

fn init_tracing(log_level: &str, log_format: &str, no_color: bool) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_ansi(!no_color);

    match log_format {
        "json" => subscriber.json().init(),
        _ => subscriber.init(),
    }
}
