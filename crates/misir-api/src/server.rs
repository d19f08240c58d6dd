//! Axum router wiring and the bind/serve loop.

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::handlers::{analytics, artifacts, search, spaces};
use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/artifacts/capture", post(artifacts::capture_artifact))
        .route("/api/v1/artifacts/batch", post(artifacts::batch_capture))
        .route(
            "/api/v1/artifacts/{id}",
            get(artifacts::get_artifact).patch(artifacts::update_artifact).delete(artifacts::delete_artifact),
        )
        .route("/api/v1/artifacts", get(artifacts::list_artifacts))
        .route("/api/v1/search", get(search::search))
        .route("/api/v1/spaces", get(spaces::list_spaces).post(spaces::create_space))
        .route(
            "/api/v1/spaces/{id}",
            get(spaces::get_space).patch(spaces::update_space).delete(spaces::delete_space),
        )
        .route(
            "/api/v1/spaces/{id}/subspaces",
            get(spaces::list_subspaces).post(spaces::create_subspace),
        )
        .route(
            "/api/v1/spaces/{id}/subspaces/{sid}",
            axum::routing::patch(spaces::update_subspace).delete(spaces::delete_subspace),
        )
        .route("/api/v1/spaces/{id}/subspaces/{sid}/merge", post(spaces::merge_subspace))
        .route("/api/v1/spaces/{id}/subspaces/{sid}/analytics/drift", get(analytics::drift))
        .route("/api/v1/spaces/{id}/subspaces/{sid}/analytics/velocity", get(analytics::velocity))
        .route("/api/v1/spaces/{id}/subspaces/{sid}/analytics/confidence", get(analytics::confidence))
        .route(
            "/api/v1/spaces/{id}/subspaces/{sid}/analytics/margin_distribution",
            get(analytics::margin_distribution),
        )
        .route("/api/v1/spaces/{id}/subspaces/{sid}/analytics/alerts", get(analytics::alerts))
        .route("/api/v1/analytics/global", get(analytics::global))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves, returning once a shutdown signal is received.
pub async fn serve(addr: SocketAddr, state: SharedState) -> std::io::Result<()> {
    let app = build_router(state);

    info!(%addr, "misir-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl+c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

