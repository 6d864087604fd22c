//! `caseflow serve` -- HTTP JSON API over the workflow engine.
//!
//! Runs the engine against the in-memory progress store. Ancillary events
//! come from an in-memory source that can be seeded from a file and fed
//! through `POST /cases/{case_id}/events`.
//!
//! Security features:
//! - CORS headers on all responses (permissive for local dev)
//! - Per-IP rate limiting (default: 60 req/min, configurable)
//! - Optional API key authentication (`CASEFLOW_API_KEY` or `[server] api_key`)
//!
//! Endpoints:
//! - GET  /health                                          - Server status (exempt from auth)
//! - GET  /worlds                                          - Loaded worlds
//! - GET  /worlds/{world_id}/steps                         - Ordered step templates, with ETag
//! - GET  /cases/{case_id}/progress                        - Progress rows of a case
//! - POST /cases/{case_id}/start                           - Enter a world's first step
//! - POST /cases/{case_id}/steps/{step_id}/enter           - Enter a step
//! - POST /cases/{case_id}/steps/{step_id}/form-data       - Save form data
//! - POST /cases/{case_id}/steps/{step_id}/complete        - Complete a linear step
//! - POST /cases/{case_id}/steps/{step_id}/decide          - Decide a decision step
//! - POST /cases/{case_id}/steps/{step_id}/block           - Block an active step
//! - POST /cases/{case_id}/steps/{step_id}/unblock         - Resume a blocked step
//! - POST /cases/{case_id}/steps/{step_id}/skip            - Skip an optional step
//! - POST /cases/{case_id}/steps/{step_id}/rollback        - Roll back a completed step
//! - GET  /cases/{case_id}/steps/{step_id}/rollback-eligibility
//! - GET  /cases/{case_id}/timeline                        - Timeline, newest step first
//! - POST /cases/{case_id}/events                          - Record an ancillary event
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;
mod timeline;
mod workflow;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use caseflow_engine::{EngineError, InMemoryEventSource, InMemoryProgressStore, WorkflowEngine};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use self::handlers::{handle_health, handle_list_worlds, handle_not_found, handle_world_steps};
use self::middleware::{auth_middleware, rate_limit_middleware};
use self::state::{AppState, RateLimiter};
use self::timeline::{handle_record_event, handle_timeline};
use self::workflow::{
    handle_block, handle_complete, handle_decide, handle_enter, handle_form_data,
    handle_progress, handle_rollback, handle_rollback_eligibility, handle_skip, handle_start,
    handle_unblock,
};
use crate::config::ServeSettings;

/// Maximum request body size: 10 MB.
const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Rate limit window duration in seconds (1 minute).
const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"error": message})))
}

/// HTTP status for an engine error code.
fn status_for(code: &str) -> StatusCode {
    match code {
        "unknown_step" | "unknown_world" | "not_found" => StatusCode::NOT_FOUND,
        "already_active" | "already_started" | "rollback_not_allowed" | "invalid_transition" => {
            StatusCode::CONFLICT
        }
        "wrong_step_type" | "not_optional" | "decision_required" | "world_mismatch"
        | "invalid_graph" => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render an engine error as `{"error": ..., "code": ...}`.
fn engine_error(err: EngineError) -> Response {
    let code = err.code();
    let status = status_for(code);
    if status.is_server_error() {
        error!(code, error = %err, "Request failed");
    }
    let body = serde_json::json!({
        "error": err.to_string(),
        "code": code,
    });
    (status, Json(body)).into_response()
}

/// Parse an optional JSON request body. An empty body reads as `{}`.
fn parse_body(body: &Bytes) -> Result<serde_json::Value, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_slice(body).map_err(|e| {
        json_error(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e)).into_response()
    })
}

/// Start the HTTP server with resolved settings.
///
/// Security:
/// - CORS: Permissive (`Any` origin) for local dev; tighten for production.
/// - Rate limit: Per-IP fixed window, `settings.rate_limit` requests per minute.
/// - API key: If configured, all endpoints except /health require auth.
pub async fn start_server(settings: ServeSettings) -> Result<(), Box<dyn std::error::Error>> {
    let catalog = crate::load_catalog(&settings.catalog)?;
    info!(
        catalog = %settings.catalog.display(),
        worlds = catalog.worlds().count(),
        steps = catalog.step_count(),
        "Loaded catalog"
    );

    let events = match &settings.events {
        Some(path) => {
            let seeded = crate::read_events_file(path)?;
            info!(events = %path.display(), cases = seeded.len(), "Loaded ancillary events");
            Arc::new(InMemoryEventSource::from_map(seeded))
        }
        None => Arc::new(InMemoryEventSource::new()),
    };

    let engine = WorkflowEngine::new(Arc::new(catalog), Arc::new(InMemoryProgressStore::new()))
        .with_event_source(events.clone())
        .with_rollback_observer(events.clone());

    if settings.api_key.is_some() {
        info!("API key authentication enabled");
    }
    info!(rate_limit = settings.rate_limit, "Rate limit per IP per minute");

    let state = Arc::new(AppState {
        engine,
        events,
        rate_limiter: RateLimiter::new(settings.rate_limit),
        api_key: settings.api_key,
    });

    let app = router(state);

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Caseflow listening on http://{}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shut down");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    // CORS: permissive for local dev
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/worlds", get(handle_list_worlds))
        .route("/worlds/{world_id}/steps", get(handle_world_steps))
        .route("/cases/{case_id}/progress", get(handle_progress))
        .route("/cases/{case_id}/start", post(handle_start))
        .route("/cases/{case_id}/steps/{step_id}/enter", post(handle_enter))
        .route(
            "/cases/{case_id}/steps/{step_id}/form-data",
            post(handle_form_data),
        )
        .route(
            "/cases/{case_id}/steps/{step_id}/complete",
            post(handle_complete),
        )
        .route("/cases/{case_id}/steps/{step_id}/decide", post(handle_decide))
        .route("/cases/{case_id}/steps/{step_id}/block", post(handle_block))
        .route(
            "/cases/{case_id}/steps/{step_id}/unblock",
            post(handle_unblock),
        )
        .route("/cases/{case_id}/steps/{step_id}/skip", post(handle_skip))
        .route(
            "/cases/{case_id}/steps/{step_id}/rollback",
            post(handle_rollback),
        )
        .route(
            "/cases/{case_id}/steps/{step_id}/rollback-eligibility",
            get(handle_rollback_eligibility),
        )
        .route("/cases/{case_id}/timeline", get(handle_timeline))
        .route("/cases/{case_id}/events", post(handle_record_event))
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not install Ctrl+C handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_statuses() {
        assert_eq!(status_for("unknown_step"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("not_found"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("already_active"), StatusCode::CONFLICT);
        assert_eq!(status_for("rollback_not_allowed"), StatusCode::CONFLICT);
        assert_eq!(status_for("wrong_step_type"), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for("decision_required"), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for("storage_error"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status_for("event_source_error"),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn empty_body_reads_as_empty_object() {
        assert_eq!(
            parse_body(&Bytes::from_static(b"")).unwrap(),
            serde_json::json!({})
        );
        assert_eq!(
            parse_body(&Bytes::from_static(b" \n")).unwrap(),
            serde_json::json!({})
        );
        assert!(parse_body(&Bytes::from_static(b"{not json")).is_err());
    }
}
