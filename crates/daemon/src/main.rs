use anyhow::Result;
use clap::Parser;
use peerchat_daemon::logging::{LogFormat, init_logging};
use peerchat_daemon::{CliOverrides, Daemon, Settings};
use std::path::PathBuf;
use tracing::{Level, info};

/// peerchat - relay text between peers over iroh, driven over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "PEERCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP gateway port
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,

    /// HTTP gateway bind address
    #[arg(long = "host")]
    host: Option<String>,

    /// P2P endpoint port (0 for random)
    #[arg(long = "p2p-port")]
    p2p_port: Option<u16>,

    /// Use this relay server instead of the default ones
    #[arg(long = "relay-url", conflicts_with = "no_relay")]
    relay_url: Option<String>,

    /// Disable relay servers; direct connections only
    #[arg(long = "no-relay")]
    no_relay: bool,

    /// Hex encoded node identity file, created if missing
    #[arg(long = "secret-key")]
    secret_key: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long = "log-level", default_value = "info")]
    log_level: Level,

    /// Console log format
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long = "log-file")]
    log_file: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            http_host: self.host.clone(),
            http_port: self.port,
            p2p_port: self.p2p_port,
            relay_url: self.relay_url.clone(),
            no_relay: self.no_relay,
            secret_key_path: self.secret_key.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level, cli.log_format, cli.log_file.as_deref())?;

    if let Some(path) = &cli.config {
        info!("Loading configuration from: {}", path.display());
    }
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())?;

    let daemon = Daemon::start(&settings).await?;

    println!("Peer ID: {}", daemon.node().node_id());
    println!("Listening on:");
    for addr in daemon.listen_addrs().await {
        println!("  {addr}");
    }
    println!("HTTP gateway running at: http://{}/", daemon.http_addr());

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    daemon.shutdown().await;
    Ok(())
}
