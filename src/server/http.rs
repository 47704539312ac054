//! HTTP transport: the same JSON-RPC envelope carried over a single POST
//! route, plus a liveness probe.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::Value;
use tracing::info;

use super::McpServer;

pub fn router(server: Arc<McpServer>) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp))
        .route("/healthz", get(healthz))
        .with_state(server)
}

pub async fn serve(server: Arc<McpServer>, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving on http");
    axum::serve(listener, router(server)).await?;
    Ok(())
}

async fn handle_mcp(
    State(server): State<Arc<McpServer>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    match server.handle_value(body).await {
        Some(response) => {
            let value = serde_json::to_value(&response).unwrap_or(Value::Null);
            (StatusCode::OK, Json(value)).into_response()
        }
        // Notifications are accepted without a body.
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}
