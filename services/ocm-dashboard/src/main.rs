//! OCM Dashboard
//!
//! Serves the dashboard backend against the hub cluster reachable through the
//! ambient kubeconfig or in-cluster service account.
//!
//! If the hub cannot be reached at startup the server still comes up: `/readyz`
//! reports not-ready, REST views answer 503 and streams send a single error
//! frame.

use anyhow::{Context, Result};
use dashboard_server::{DashboardConfig, DashboardServer};
use ocm_client::{OcmClient, OcmClientTrait};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube talks TLS through rustls; pin the ring provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting OCM Dashboard");

    let config = DashboardConfig::from_env().context("invalid dashboard configuration")?;
    info!("Configuration:");
    info!("  Bind address: {}", config.bind_address);
    info!("  Keepalive: {:?}", config.keepalive);
    info!("  Available condition: {}", config.available_condition_type);

    let client: Option<Arc<dyn OcmClientTrait>> = match OcmClient::try_default().await {
        Ok(client) => Some(Arc::new(client.with_watch_timeout(config.watch_timeout_secs))),
        Err(e) => {
            warn!(error = %e, "OCM hub unavailable, serving without a client");
            None
        }
    };

    let server = DashboardServer::new(config, client).context("failed to build dashboard server")?;
    server.run(shutdown_signal()).await.context("dashboard server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
