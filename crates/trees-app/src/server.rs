//! HTTP server — serves the request pipeline through axum.
//!
//! Every path is routed to a single fallback handler that buffers the body
//! and hands the request to [`Trees::handle`] on the blocking pool, since
//! plugin callbacks are synchronous.

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use trees_core::config::app::ServerConfig;
use trees_core::error::AppError;
use trees_core::result::AppResult;

use crate::application::Trees;
use crate::error::ApiError;

/// State shared by the fallback handler.
#[derive(Debug, Clone)]
struct ServerState {
    /// The application.
    trees: Arc<Trees>,
    /// Maximum buffered body size.
    body_limit: usize,
}

/// Builds the axum app serving `trees`.
pub fn build_app(trees: Arc<Trees>, body_limit: usize) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(ServerState { trees, body_limit })
        .layer(TraceLayer::new_for_http())
}

async fn dispatch(State(state): State<ServerState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = match to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return (StatusCode::PAYLOAD_TOO_LARGE, format!("Request body rejected: {e}"))
                .into_response();
        }
    };
    let request = http::Request::from_parts(parts, bytes);

    let trees = state.trees.clone();
    match tokio::task::spawn_blocking(move || trees.handle(request)).await {
        Ok(Ok(response)) => response.map(Body::from),
        Ok(Err(e)) => ApiError(e).into_response(),
        Err(e) => {
            ApiError(AppError::internal(format!("Request handler panicked: {e}"))).into_response()
        }
    }
}

/// Binds `config.host:config.port` and serves until Ctrl+C or SIGTERM.
pub async fn serve(trees: Arc<Trees>, config: &ServerConfig) -> AppResult<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!(addr = %addr, "Trees server listening");

    axum::serve(listener, build_app(trees, config.body_limit_bytes))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    info!("Trees server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
