//! Catalog route handlers: health, worlds, world steps.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};

use super::state::AppState;
use super::{engine_error, json_error};

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// GET /worlds
pub(crate) async fn handle_list_worlds(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let worlds: Vec<serde_json::Value> = state
        .engine
        .catalog()
        .worlds()
        .map(|world| {
            serde_json::json!({
                "id": world.id(),
                "name": world.name(),
                "step_count": world.steps().len(),
                "first_step_id": &world.first_step().id,
            })
        })
        .collect();

    (StatusCode::OK, Json(serde_json::json!({ "worlds": worlds })))
}

/// GET /worlds/{world_id}/steps
///
/// Templates never change while the server runs, so clients may cache the
/// listing: the response carries an ETag and honours If-None-Match.
pub(crate) async fn handle_world_steps(
    State(state): State<Arc<AppState>>,
    Path(world_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let steps = match state.engine.steps(&world_id) {
        Ok(steps) => steps,
        Err(e) => return engine_error(e),
    };

    let body = serde_json::json!({ "world_id": world_id, "steps": steps });
    let etag = match compute_etag(&body) {
        Ok(etag) => etag,
        Err(e) => {
            return json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("serialization error: {}", e),
            )
            .into_response()
        }
    };
    let etag_quoted = format!("\"{}\"", etag);

    if let Some(inm) = headers.get(header::IF_NONE_MATCH) {
        if let Ok(inm_str) = inm.to_str() {
            if inm_str == etag_quoted || inm_str == etag {
                return StatusCode::NOT_MODIFIED.into_response();
            }
        }
    }

    let mut response = Json(body).into_response();
    if let Ok(val) = etag_quoted.parse() {
        response.headers_mut().insert(header::ETAG, val);
    }
    response
}

/// Hex SHA-256 of the compact JSON serialization.
fn compute_etag(value: &serde_json::Value) -> Result<String, serde_json::Error> {
    let canonical = serde_json::to_string(value)?;
    Ok(format!("{:x}", Sha256::digest(canonical.as_bytes())))
}
