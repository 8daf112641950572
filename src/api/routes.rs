//! HTTP handlers

use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::ws::websocket_handler;
use super::AppState;
use crate::capture::StartOutcome;
use crate::error::SessionError;
use crate::sync::MarkerWrite;

/// Largest accepted upload body
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

const UPLOAD_FIELD: &str = "file";

type ApiResult = Result<Json<Value>, ApiError>;

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/sessions", get(list_sessions))
        .route("/api/session/create", post(create_session))
        .route("/api/session/{session_id}", get(get_session))
        .route("/api/session/{session_id}/start", post(start_session))
        .route("/api/session/{session_id}/stop", post(stop_session))
        .route("/api/session/{session_id}/sync-marker", post(set_sync_marker))
        .route(
            "/api/session/{session_id}/upload/{file_type}",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct CreateSessionForm {
    subject_id: String,
    session_type: String,
}

#[derive(Debug, Deserialize)]
struct PhoneTimestampForm {
    phone_timestamp: i64,
}

#[derive(Debug, Deserialize)]
struct SyncMarkerForm {
    marker_name: String,
    timestamp: i64,
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "collect-server running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(service): State<AppState>) -> Json<Value> {
    Json(json!(service.health().await))
}

async fn list_sessions(State(service): State<AppState>) -> Json<Value> {
    Json(json!({ "sessions": service.list_sessions().await }))
}

async fn create_session(
    State(service): State<AppState>,
    Form(form): Form<CreateSessionForm>,
) -> ApiResult {
    let session = service
        .create_session(&form.subject_id, &form.session_type)
        .await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

async fn get_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult {
    let session = service.get_session(&session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

async fn start_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<PhoneTimestampForm>,
) -> ApiResult {
    let outcome = service
        .start_session(&session_id, form.phone_timestamp)
        .await?;
    let message = match outcome {
        StartOutcome::Started => "Recording started",
        StartOutcome::AlreadyActive => "Recording already active",
        StartOutcome::Skipped => "Session already stopped",
    };
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn stop_session(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<PhoneTimestampForm>,
) -> ApiResult {
    let outcome = service
        .stop_session(&session_id, form.phone_timestamp)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Recording stopped",
        "recovery": outcome.recovery,
    })))
}

async fn set_sync_marker(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
    Form(form): Form<SyncMarkerForm>,
) -> ApiResult {
    let write = service
        .set_marker(&session_id, &form.marker_name, form.timestamp)
        .await?;
    let message = match write {
        MarkerWrite::Applied | MarkerWrite::UnknownSession => {
            format!("Updated {}", form.marker_name)
        }
        MarkerWrite::Kept => format!("{} already set", form.marker_name),
    };
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn upload_file(
    State(service): State<AppState>,
    Path((session_id, file_type)): Path<(String, String)>,
    mut multipart: Multipart,
) -> ApiResult {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        SessionError::InvalidInput(format!("malformed multipart body: {}", e))
    };

    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let contents = field.bytes().await.map_err(invalid)?;
        service
            .upload_file(&session_id, &file_type, &contents)
            .await?;
        return Ok(Json(json!({
            "success": true,
            "message": format!("Uploaded {}.csv", file_type),
        })));
    }

    Err(SessionError::InvalidInput(format!("missing multipart field '{}'", UPLOAD_FIELD)).into())
}
