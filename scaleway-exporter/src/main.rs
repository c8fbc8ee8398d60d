/**
 * SCALEWAY EXPORTER - Exporter entry point
 *
 * ROLE : wires configuration, the Scaleway client, the collector and the HTTP
 * listener together, then serves scrapes until Ctrl-C / SIGTERM.
 *
 * STARTUP FAILURES : missing credentials, an invalid region/zone, an invalid
 * timeout or an unbindable port stop the process before it serves anything.
 */

use anyhow::{Context, Result};
use scaleway_exporter::collector::Collector;
use scaleway_exporter::config::load_config;
use scaleway_exporter::exposition::Exposition;
use scaleway_exporter::http::{self, AppState};
use scaleway_exporter::source::ScalewayClient;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scaleway_exporter=info".into()),
        )
        .with_target(false)
        .init();

    info!("Scaleway exporter v{}", env!("CARGO_PKG_VERSION"));

    let cfg = load_config().await.context("Failed to load configuration")?;
    info!(config = ?cfg.redacted(), "configuration loaded");

    // Scaleway client: credentials and region/zone defaults are settled here
    let client = ScalewayClient::new(&cfg).context("Failed to create scaleway client")?;
    let collector = Arc::new(Collector::new(Arc::new(client), &cfg));

    let exposition = Arc::new(Exposition::new().context("Failed to register process metrics")?);

    let app = http::build_router(AppState { collector, exposition }, &cfg.metric_endpoint);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.http_port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("starting http server on port {}, metrics at {}", cfg.http_port, cfg.metric_endpoint);
    axum::serve(listener, app)
        .with_graceful_shutdown(http::shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("exporter stopped");
    Ok(())
}
