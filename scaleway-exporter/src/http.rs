/*!
HTTP surface of the exporter.

Routes:
- `GET /`                 liveness text, "Running..."
- `GET /health`           "ok"
- `GET {metric endpoint}` one collection cycle, rendered in Prometheus text format

A cycle that aborts on discovery still answers 200 with whatever families are
left (process metrics); only an encoding failure turns into a 500.
*/

use crate::collector::Collector;
use crate::exposition::{Exposition, TEXT_FORMAT};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Router};
use std::sync::Arc;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub collector: Arc<Collector>,
    pub exposition: Arc<Exposition>,
}

pub fn build_router(app_state: AppState, metric_endpoint: &str) -> Router {
    Router::new()
        .route("/", get(|| async { "Running..." }))
        .route("/health", get(|| async { "ok" }))
        .route(metric_endpoint, get(scrape))
        .with_state(app_state)
}

// GET {metric endpoint}
async fn scrape(State(app): State<AppState>) -> Response {
    let samples = app.collector.collect().await;

    match app.exposition.render(&samples) {
        Ok(body) => ([(header::CONTENT_TYPE, TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!("failed to encode metrics: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
