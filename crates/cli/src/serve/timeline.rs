//! Timeline and ancillary event handlers.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use caseflow_engine::AncillaryEvent;
use tracing::debug;

use super::state::AppState;
use super::{engine_error, json_error, parse_body};

/// GET /cases/{case_id}/timeline
///
/// Entries come newest step first; events inside an entry newest first.
pub(crate) async fn handle_timeline(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> Response {
    match state.engine.timeline(&case_id).await {
        Ok(timeline) => {
            let timeline = timeline.recent_first();
            let body = serde_json::json!({
                "case_id": case_id,
                "entries": timeline.entries,
                "unassigned": timeline.unassigned,
            });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => engine_error(e),
    }
}

/// POST /cases/{case_id}/events
///
/// Body: one ancillary event, tagged by `kind`.
pub(crate) async fn handle_record_event(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let event: AncillaryEvent = match serde_json::from_value(body) {
        Ok(e) => e,
        Err(e) => {
            return json_error(
                StatusCode::BAD_REQUEST,
                &format!("invalid event: {}", e),
            )
            .into_response()
        }
    };

    debug!(case_id = %case_id, event_id = event.id(), kind = %event.kind(), "Event recorded");
    state.events.record(&case_id, event.clone());
    (StatusCode::CREATED, Json(event)).into_response()
}
