//! HTTP/SSE server: boots the agent and serves the chat API.

pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::ChatAgent;
use crate::config::LoopConfig;
use crate::error::LoopError;

pub use routes::AppState;

/// Build the API router with all routes, middleware and state.
pub fn build_router(agent: Arc<ChatAgent>, listen_addr: SocketAddr) -> Router {
    let state = AppState { agent };

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/tools", get(routes::list_tools))
        .route("/api/conversations", post(routes::create_conversation))
        .route("/api/conversations/:id/end", post(routes::end_conversation))
        .route(
            "/api/conversations/:id/approvals",
            get(routes::pending_approvals),
        )
        .route("/api/chat/stream", post(routes::chat_stream))
        .route("/api/chat/approve", post(routes::approve))
        .layer(TraceLayer::new_for_http())
        .layer(local_cors(listen_addr))
        .with_state(state)
}

/// CORS restricted to the origins the server itself answers on.
fn local_cors(listen_addr: SocketAddr) -> CorsLayer {
    let port = listen_addr.port();
    let origins: Vec<HeaderValue> = [
        format!("http://{listen_addr}"),
        format!("http://localhost:{port}"),
        format!("http://127.0.0.1:{port}"),
    ]
    .iter()
    .filter_map(|origin| origin.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Bind `config.listen_addr` and serve until Ctrl+C or SIGTERM.
pub async fn serve(config: LoopConfig) -> Result<(), LoopError> {
    let agent = Arc::new(ChatAgent::from_config(&config)?);
    let app = build_router(agent, config.listen_addr);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!(
        addr = %config.listen_addr,
        model = %config.model,
        max_iterations = config.max_iterations,
        "loopgate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
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
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C received, shutting down"),
        _ = terminate => info!("SIGTERM received, shutting down"),
    }
}
