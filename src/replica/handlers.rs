use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::handler::{ReplicaError, ReplicaHandler};
use super::protocol::{
    DumpResponse, ENDPOINT_DUMP, ENDPOINT_GET, ENDPOINT_PUT, ENDPOINT_REPLICATE, GetResponse,
    PutRequest, PutResponse, ReplicateRequest,
};

/// Assembles the node's RPC surface. Served to clients and peers alike; no
/// authentication distinguishes them. Routes are built from the shared
/// endpoint constants so the client side cannot drift.
pub fn router(handler: Arc<ReplicaHandler>) -> Router {
    Router::new()
        .route(ENDPOINT_PUT, post(handle_put))
        .route(&format!("{ENDPOINT_GET}/:key"), get(handle_get))
        .route(ENDPOINT_REPLICATE, post(handle_replicate))
        .route(ENDPOINT_DUMP, get(handle_dump))
        .layer(Extension(handler))
}

pub async fn handle_get(
    Extension(handler): Extension<Arc<ReplicaHandler>>,
    Path(key): Path<String>,
) -> (StatusCode, Json<GetResponse>) {
    match handler.get(&key) {
        Ok(value) => (
            StatusCode::OK,
            Json(GetResponse {
                value: value.unwrap_or_default(),
            }),
        ),
        Err(ReplicaError::NotPrimary) => (
            StatusCode::CONFLICT,
            Json(GetResponse {
                value: String::new(),
            }),
        ),
    }
}

pub async fn handle_put(
    Extension(handler): Extension<Arc<ReplicaHandler>>,
    Json(req): Json<PutRequest>,
) -> (StatusCode, Json<PutResponse>) {
    match handler.put(req.key, req.value).await {
        Ok(()) => (StatusCode::OK, Json(PutResponse { success: true })),
        Err(ReplicaError::NotPrimary) => {
            tracing::debug!("rejected put: not primary");
            (StatusCode::CONFLICT, Json(PutResponse { success: false }))
        }
    }
}

pub async fn handle_replicate(
    Extension(handler): Extension<Arc<ReplicaHandler>>,
    Json(req): Json<ReplicateRequest>,
) -> (StatusCode, Json<PutResponse>) {
    handler.replicate(req.key, req.value).await;
    (StatusCode::OK, Json(PutResponse { success: true }))
}

pub async fn handle_dump(
    Extension(handler): Extension<Arc<ReplicaHandler>>,
) -> (StatusCode, Json<DumpResponse>) {
    (
        StatusCode::OK,
        Json(DumpResponse {
            entries: handler.dump(),
        }),
    )
}
