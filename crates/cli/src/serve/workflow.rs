//! Case progress route handlers: queries and step transitions.
//!
//! Every transition responds with the affected progress row. Clients re-read
//! `/progress` or `/timeline` afterwards to see auto-advanced successors.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseflow_engine::{EngineResult, StepProgress};

use super::state::AppState;
use super::{engine_error, json_error, parse_body};

/// Actor recorded when a rollback names nobody.
const ANONYMOUS_ACTOR: &str = "anonymous";

fn row_response(result: EngineResult<StepProgress>) -> Response {
    match result {
        Ok(row) => (StatusCode::OK, Json(row)).into_response(),
        Err(e) => engine_error(e),
    }
}

fn optional_str(body: &serde_json::Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_str(body: &serde_json::Value, field: &str) -> Result<String, Response> {
    optional_str(body, field).ok_or_else(|| {
        json_error(
            StatusCode::BAD_REQUEST,
            &format!("missing '{}' field", field),
        )
        .into_response()
    })
}

// ── Queries ───────────────────────────────────────────────────────────────────

/// GET /cases/{case_id}/progress
pub(crate) async fn handle_progress(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Response {
    match state.engine.progress(&case_id).await {
        Ok(rows) => {
            let body = serde_json::json!({ "case_id": case_id, "progress": rows });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// GET /cases/{case_id}/steps/{step_id}/rollback-eligibility
pub(crate) async fn handle_rollback_eligibility(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
) -> Response {
    match state.engine.rollback_eligibility(&case_id, &step_id).await {
        Ok(eligibility) => {
            let body = serde_json::json!({
                "case_id": case_id,
                "step_id": step_id,
                "allowed": eligibility.allowed,
                "reason": eligibility.reason,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => engine_error(e),
    }
}

// ── Transitions ───────────────────────────────────────────────────────────────

/// POST /cases/{case_id}/start
///
/// Body: `{"world_id": "..."}`.
pub(crate) async fn handle_start(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let world_id = match required_str(&body, "world_id") {
        Ok(w) => w,
        Err(resp) => return resp,
    };
    match state.engine.start_case(&case_id, &world_id).await {
        Ok(row) => (StatusCode::CREATED, Json(row)).into_response(),
        Err(e) => engine_error(e),
    }
}

/// POST /cases/{case_id}/steps/{step_id}/enter
pub(crate) async fn handle_enter(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
) -> Response {
    row_response(state.engine.enter_step(&case_id, &step_id).await)
}

/// POST /cases/{case_id}/steps/{step_id}/form-data
///
/// Body: `{"data": <any JSON>}`. The engine stores it unexamined.
pub(crate) async fn handle_form_data(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let mut body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let data = match body.get_mut("data") {
        Some(data) => data.take(),
        None => {
            return json_error(StatusCode::BAD_REQUEST, "missing 'data' field").into_response()
        }
    };
    row_response(state.engine.save_form_data(&case_id, &step_id, data).await)
}

/// POST /cases/{case_id}/steps/{step_id}/complete
///
/// Body (optional): `{"notes": "..."}`.
pub(crate) async fn handle_complete(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let notes = optional_str(&body, "notes");
    row_response(state.engine.complete_step(&case_id, &step_id, notes).await)
}

/// POST /cases/{case_id}/steps/{step_id}/decide
///
/// Body: `{"decision": true|false, "notes": "..."}`.
pub(crate) async fn handle_decide(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let decision = match body.get("decision") {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(_) => {
            return json_error(StatusCode::BAD_REQUEST, "'decision' must be a boolean")
                .into_response()
        }
        None => {
            return json_error(StatusCode::BAD_REQUEST, "missing 'decision' field")
                .into_response()
        }
    };
    let notes = optional_str(&body, "notes");
    row_response(
        state
            .engine
            .decide_step(&case_id, &step_id, decision, notes)
            .await,
    )
}

/// POST /cases/{case_id}/steps/{step_id}/block
///
/// Body: `{"reason": "..."}`.
pub(crate) async fn handle_block(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = match required_str(&body, "reason") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    row_response(state.engine.block_step(&case_id, &step_id, &reason).await)
}

/// POST /cases/{case_id}/steps/{step_id}/unblock
pub(crate) async fn handle_unblock(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
) -> Response {
    row_response(state.engine.unblock_step(&case_id, &step_id).await)
}

/// POST /cases/{case_id}/steps/{step_id}/skip
///
/// Body (optional): `{"notes": "..."}`.
pub(crate) async fn handle_skip(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let notes = optional_str(&body, "notes");
    row_response(state.engine.skip_step(&case_id, &step_id, notes).await)
}

/// POST /cases/{case_id}/steps/{step_id}/rollback
///
/// Body: `{"reason": "...", "actor": "..."}`. Without `actor` the
/// `X-Actor` header is used, then `"anonymous"`.
pub(crate) async fn handle_rollback(
    State(state): State<Arc<AppState>>,
    Path((case_id, step_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let reason = match required_str(&body, "reason") {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let actor = optional_str(&body, "actor")
        .or_else(|| {
            headers
                .get("x-actor")
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| ANONYMOUS_ACTOR.to_string());

    row_response(
        state
            .engine
            .rollback(&case_id, &step_id, &reason, &actor)
            .await,
    )
}
