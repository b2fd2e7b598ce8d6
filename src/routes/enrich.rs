//! Classification endpoint.
//!
//! Always answers with a valid classification: the provider falls back to
//! the rule engine internally, so deep AI failures never block the
//! create-incident flow. The per-IP rate ceiling is the only rejection path
//! besides input validation.

use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::app::AppState;
use crate::domain::classify::{EnrichRequest, Enrichment};
use crate::error::ApiError;
use crate::middleware::rate_limit::client_ip;
use crate::middleware::request_id::RequestIdExt;

/// POST /enrich
pub async fn enrich(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<EnrichRequest>,
) -> Result<Json<Enrichment>, ApiError> {
    let client = client_ip(&headers, peer);
    if !state.rate_limiter.try_acquire(client) {
        return Err(ApiError::TooManyRequests(
            "enrichment rate limit exceeded, try again in a minute".to_string(),
        ));
    }

    let description = req.description.trim();
    if description.is_empty() {
        return Err(ApiError::bad_request("description is required"));
    }

    tracing::debug!(
        request_id = ?headers.request_id(),
        client = %client,
        "Enrichment requested"
    );

    let enrichment = state
        .ai
        .classify(description, req.address.as_deref())
        .await;

    Ok(Json(enrichment))
}
