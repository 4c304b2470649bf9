use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::engine::scan::ScanOutcome;
use crate::errors::AppError;
use crate::jobs::deadline_scan::ScheduleState;
use crate::models::notification::{NewNotification, Notification};
use crate::models::source::{Actor, Role};
use crate::session::UserSession;
use crate::AppState;

/// Header carrying the signed-in user the request acts for.
pub const USER_HEADER: &str = "x-user-id";

// ── Request / Response DTOs ──────────────────────────────────

#[derive(Deserialize)]
pub struct ActivateSessionRequest {
    pub user_id: Uuid,
    pub broker_id: Option<String>,
    pub role: String,
}

#[derive(Serialize)]
pub struct SessionResponse {
    pub user_id: Uuid,
    pub role: Role,
    pub state: &'static str,
    pub notifications: usize,
    pub unread: usize,
}

#[derive(Serialize)]
pub struct CreateNotificationResponse {
    /// False when an equivalent notification already exists in the window.
    pub created: bool,
    pub notification: Option<Notification>,
}

fn state_label(state: ScheduleState) -> &'static str {
    match state {
        ScheduleState::Idle => "idle",
        ScheduleState::Scanning => "scanning",
        ScheduleState::Stopped => "stopped",
    }
}

/// Resolve the caller's active session from the `x-user-id` header.
fn session_for(state: &AppState, headers: &HeaderMap) -> Result<Arc<UserSession>, AppError> {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or(AppError::Unauthenticated)?;
    state.sessions.get(user_id)
}

// ── Session Handlers ─────────────────────────────────────────

/// POST /api/v1/sessions
/// Activate the engine for a signed-in user. Replaces any previous session.
pub async fn activate_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ActivateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let role: Role = payload
        .role
        .parse()
        .map_err(|e: anyhow::Error| AppError::InvalidRequest(e.to_string()))?;

    let session = state
        .sessions
        .activate(Actor {
            user_id: payload.user_id,
            broker_id: payload.broker_id.filter(|b| !b.trim().is_empty()),
            role,
        })
        .await;

    let body = SessionResponse {
        user_id: session.actor.user_id,
        role: session.actor.role,
        state: state_label(session.schedule_state()),
        notifications: session.center.notifications().await.len(),
        unread: session.center.unread_count().await,
    };
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /api/v1/sessions/:user_id
/// Sign-out: stops the user's scan loop.
pub async fn deactivate_session(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> StatusCode {
    if state.sessions.deactivate(user_id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ── Notification Handlers ────────────────────────────────────

/// GET /api/v1/notifications
/// Visible notifications, newest first.
pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, AppError> {
    let session = session_for(&state, &headers)?;
    Ok(Json(session.center.notifications().await))
}

/// GET /api/v1/notifications/unread
pub async fn count_unread_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = session_for(&state, &headers)?;
    Ok(Json(json!({ "count": session.center.unread_count().await })))
}

/// POST /api/v1/notifications
/// Record a notification directly, bypassing the classifier.
pub async fn create_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<NewNotification>,
) -> Result<impl IntoResponse, AppError> {
    let session = session_for(&state, &headers)?;

    if payload.title.trim().is_empty() || payload.related_id.trim().is_empty() {
        return Err(AppError::InvalidRequest(
            "title and related_id are required".into(),
        ));
    }

    let notification = session.center.create_notification(payload).await?;
    let status = if notification.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreateNotificationResponse {
            created: notification.is_some(),
            notification,
        }),
    ))
}

/// POST /api/v1/notifications/:id/read
pub async fn mark_notification_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = session_for(&state, &headers)?;
    session.center.mark_as_read(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_notifications_read(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = session_for(&state, &headers)?;
    let updated = session.center.mark_all_as_read().await?;
    Ok(Json(json!({ "updated": updated })))
}

/// DELETE /api/v1/notifications/:id
/// Dismiss. The record is kept so the alert is not raised again.
pub async fn dismiss_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let session = session_for(&state, &headers)?;
    session.center.delete_notification(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/clear-read
pub async fn dismiss_read_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let session = session_for(&state, &headers)?;
    let dismissed = session.center.delete_all_read().await?;
    Ok(Json(json!({ "dismissed": dismissed })))
}

/// POST /api/v1/notifications/refresh
pub async fn refresh_notifications(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Notification>>, AppError> {
    let session = session_for(&state, &headers)?;
    session.center.refresh_notifications().await?;
    Ok(Json(session.center.notifications().await))
}

/// POST /api/v1/notifications/scan
/// Run a pass now instead of waiting for the next tick.
pub async fn trigger_scan(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let session = session_for(&state, &headers)?;
    let outcome = session.scanner.check_and_create_deadline_notifications().await;
    let status = match outcome {
        ScanOutcome::Completed(_) => StatusCode::OK,
        ScanOutcome::AlreadyRunning => StatusCode::CONFLICT,
    };
    Ok((status, Json(outcome)))
}
