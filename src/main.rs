use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use skyward_server::config::ServerConfig;
use skyward_server::metrics::{self, Metrics};
use skyward_server::net::tls::TlsConfig;
use skyward_server::net::webtransport::WebTransportServer;
use skyward_server::net::Host;
use skyward_server::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Skyward Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {}:{}, tick_rate={}, max_players={}",
        config.bind_address, config.port, config.tick_rate, config.max_players
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());

    if config.metrics_port != 0 {
        let metrics_clone = metrics.clone();
        let metrics_port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let tls_config = TlsConfig::load(config.tls_cert_path.as_deref(), config.tls_key_path.as_deref()).await?;

    // The simulation thread owns the host; I/O tasks reach it through the acceptor
    let host = Host::new();
    let server = WebTransportServer::new(config.port, tls_config, host.acceptor(), metrics.clone());

    info!("Server ready on https://{}:{}", config.bind_address, config.port);
    info!(
        "Chrome flag: --ignore-certificate-errors-spki-list={}",
        server.cert_hash()
    );

    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let simulation = Server::new(config, host, metrics).spawn_simulation(shutdown_flag.clone())?;

    // Shutdown signal handler
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    shutdown_flag.store(true, Ordering::Relaxed);
    if simulation.join().is_err() {
        error!("Simulation thread panicked");
    }
    info!("Server stopped");

    Ok(())
}
