//! HTTP front end of the gateway

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::relay::{relay, RelayOptions};
use super::translate::{translate, HttpRequestContext};
use crate::config::GatewayConfig;
use crate::error::Result;

/// Shared handler state
#[derive(Clone)]
pub struct GatewayState {
    relay: Arc<RelayOptions>,
}

impl GatewayState {
    pub fn new(relay: RelayOptions) -> Self {
        Self {
            relay: Arc::new(relay),
        }
    }
}

/// Router that forwards every method and path to the controller
pub fn router(options: RelayOptions) -> Router {
    Router::new()
        .fallback(forward)
        .with_state(GatewayState::new(options))
        .layer(CorsLayer::permissive())
}

async fn forward(
    State(state): State<GatewayState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let ctx = HttpRequestContext::from_parts(method.as_str(), uri.path(), uri.query(), content_type, &body);

    let request = translate(&ctx);
    let reply = relay(&request, &state.relay).await;
    info!(method = %request.method, uri = %request.uri, bytes = reply.len(), "Relayed request");

    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], reply).into_response()
}

/// Bind the HTTP listener and serve until ctrl-c
pub async fn serve(config: &GatewayConfig) -> Result<()> {
    let options = RelayOptions::from(config);
    let target = options.target();
    let listener = TcpListener::bind(config.listen_addr()).await?;
    info!(
        "Gateway listening on {}, relaying to {}",
        listener.local_addr()?,
        target
    );

    axum::serve(listener, router(options))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
