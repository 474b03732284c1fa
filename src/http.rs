//! HTTP server for message retrieval, admin deletion, health, and metrics.
//!
//! Runs on a separate tokio task. `/chat/messages` is authenticated with the
//! same bearer credentials the WebSocket events carry; a caller can only read
//! its own mailbox.

use crate::identity::{Identity, IdentityResolver};
use crate::store::MessageStore;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Clone)]
pub struct HttpState {
    pub resolver: IdentityResolver,
    pub store: Arc<dyn MessageStore>,
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Resolve the caller's identity from an `Authorization: Bearer` header.
/// Missing header is 401, unverifiable credential is 403.
fn bearer_identity(
    headers: &HeaderMap,
    resolver: &IdentityResolver,
) -> Result<Identity, StatusCode> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;
    resolver.resolve(value).map_err(|_| StatusCode::FORBIDDEN)
}

/// GET /chat/messages - the caller's stored messages, oldest first.
async fn list_messages(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    let identity = bearer_identity(&headers, &state.resolver)?;
    let messages = state
        .store
        .query_by_receiver(&identity)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "message query failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(json!({ "messages": messages, "success": true })))
}

#[derive(Deserialize)]
struct DeleteRequest {
    message_ids: Vec<i64>,
}

/// DELETE /chat/messages - bulk delete by id after a client has fetched them.
async fn delete_messages(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<Value>, StatusCode> {
    bearer_identity(&headers, &state.resolver)?;
    if req.message_ids.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let deleted = state
        .store
        .delete_by_ids(&req.message_ids)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "message deletion failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    Ok(Json(json!({ "deleted": deleted, "success": true })))
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route(
            "/chat/messages",
            get(list_messages).delete(delete_messages),
        )
        .with_state(state)
}

/// Run the HTTP server.
///
/// Binds to `0.0.0.0:port`. This is a long-running task that should be
/// spawned in the background.
pub async fn run_http_server(port: u16, state: HttpState) {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("HTTP server listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind HTTP server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("HTTP server error: {}", e);
    }
}
