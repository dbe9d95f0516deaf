use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use telemetry_relay::export::TrainingExporter;
use telemetry_relay::hub::HubConfig;
use telemetry_relay::{RelayServer, ServerConfig};

/// Relay drone telemetry from one simulator to many WebSocket dashboards
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay", version)]
struct Cli {
    /// Address the simulator connects to
    #[arg(long, default_value = "0.0.0.0:8766", env = "RELAY_PRODUCER_ADDR")]
    producer_addr: SocketAddr,

    /// Address dashboards connect to over WebSocket
    #[arg(long, default_value = "0.0.0.0:8765", env = "RELAY_SUBSCRIBER_ADDR")]
    subscriber_addr: SocketAddr,

    /// Per-subscriber queue size before eviction
    #[arg(long, default_value_t = 256, env = "RELAY_QUEUE_CAPACITY")]
    queue_capacity: usize,

    /// Maximum concurrent subscribers (0 = unlimited)
    #[arg(long, default_value_t = 0, env = "RELAY_MAX_SUBSCRIBERS")]
    max_subscribers: usize,

    /// End a producer session after this many idle seconds
    #[arg(long, env = "RELAY_PRODUCER_IDLE_SECS")]
    producer_idle_secs: Option<u64>,

    /// Do not send session_status notices to subscribers
    #[arg(long, env = "RELAY_NO_SESSION_NOTICES")]
    no_session_notices: bool,

    /// Append every relayed record to this CSV file
    #[arg(long, env = "RELAY_EXPORT_PATH")]
    export_path: Option<PathBuf>,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let hub = HubConfig::default()
            .queue_capacity(self.queue_capacity)
            .notify_sessions(!self.no_session_notices);

        let mut config = ServerConfig::with_addrs(self.producer_addr, self.subscriber_addr)
            .max_subscribers(self.max_subscribers)
            .hub(hub);
        if let Some(secs) = self.producer_idle_secs {
            config = config.producer_idle_timeout(Duration::from_secs(secs));
        }
        config
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "telemetry_relay=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let server = match RelayServer::bind(cli.server_config()).await {
        Ok(server) => server,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let export = match &cli.export_path {
        Some(path) => match TrainingExporter::open(server.hub().clone(), path).await {
            Ok(exporter) => Some(exporter.spawn()),
            Err(e) => {
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "Training export disabled"
                );
                None
            }
        },
        None => None,
    };

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    };

    if let Err(e) = server.run_until(shutdown).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // hub is closed by now; let the exporter flush its backlog
    if let Some(handle) = export {
        let _ = handle.await;
    }
}
