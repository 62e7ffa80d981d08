//! `tcp-bootstrap`: runs the server with a line-echo pipeline.
//!
//! ```text
//! tcp-bootstrap --config server.toml
//! tcp-bootstrap --port 18080 --log-json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use tcp_bootstrap::config::{load_config, ServerConfig};
use tcp_bootstrap::lifecycle::signals::shutdown_signal;
use tcp_bootstrap::observability::{logging, metrics};
use tcp_bootstrap::{Connection, TcpServer};

#[derive(Parser)]
#[command(name = "tcp-bootstrap")]
#[command(about = "Event-loop TCP server with a line-echo pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to bind, overriding the configuration file.
    #[arg(short, long, required_unless_present = "config")]
    port: Option<u16>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match (&cli.config, cli.port) {
        (Some(path), _) => load_config(path)?,
        (None, Some(port)) => ServerConfig::new(i64::from(port)),
        (None, None) => return Err("either --config or --port is required".into()),
    };
    if let Some(port) = cli.port {
        config.transport.port = i64::from(port);
    }
    if cli.log_json {
        config.observability.log_json = true;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("tcp-bootstrap v{} starting", env!("CARGO_PKG_VERSION"));

    let options = config.transport_options()?;
    tracing::info!(
        address = %options.socket_addr(),
        backlog = options.backlog_size(),
        acceptor_threads = options.acceptor_threads(),
        worker_threads = options.worker_threads(),
        keep_alive = options.keep_alive(),
        no_delay = options.no_delay(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = tokio::task::spawn_blocking(move || {
        let mut server = TcpServer::new();
        server.start(&options, echo).map(|_| server)
    })
    .await??;

    shutdown_signal().await;

    let grace_period = config.shutdown.grace_period();
    let status = tokio::task::spawn_blocking(move || {
        let mut server = server;
        server.stop(grace_period)
    })
    .await?;

    tracing::info!(graceful = status.is_graceful(), "Shutdown complete");
    Ok(())
}

/// Echo each received line back until the peer closes or the worker drains.
async fn echo(connection: Connection) {
    let id = connection.id();
    let (mut stream, mut shutdown) = connection.into_parts();
    let (reader, mut writer) = stream.split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(mut line)) => {
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    tracing::debug!(connection_id = %id, error = %e, "Write failed");
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Read failed");
                break;
            }
        }
    }
}
