use std::net::SocketAddr;

use {
    anyhow::Context,
    axum::{
        Router,
        routing::{any, get},
    },
    tokio::net::TcpListener,
    tower_http::trace::TraceLayer,
    tracing::info,
};

use crate::{proxy, state::AppState};

/// Build the proxy router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", any(proxy::proxy_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, bind: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}")
        .parse()
        .context("invalid bind address")?;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "cocoon listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}
