//! Event log (nhat ky su kien) API endpoints.
//!
//! Event logs embed their handling records under `xulysukientbs`. Writes
//! that carry that list go through `db::reconcile`, which matches entries by
//! machine identifier and runs the whole nested write in one transaction.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::db::{self, reconcile, EventLogPayload, EventLogResponse, User};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::handling_records::collect_payload_errors;
use super::validation::{parse_id, validate_title};

fn not_found() -> ApiError {
    ApiError::not_found("Event log not found")
}

/// Validate an event log payload together with its nested handling records
fn validate_payload(req: &EventLogPayload) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    if let Err(e) = validate_title(&req.title) {
        errors.add("title", e);
    }

    if let Some(entries) = &req.xulysukientbs {
        for (i, entry) in entries.iter().enumerate() {
            collect_payload_errors(entry, &format!("xulysukientbs[{}].", i), true, &mut errors);
        }
    }

    errors.finish()
}

/// List the requester's event logs, newest first
///
/// GET /themnhatkysukien/
pub async fn list_event_logs(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<EventLogResponse>>, ApiError> {
    let logs = db::list_event_logs(&state.db, user.id).await?;
    let mut records = db::handling_records_by_event_log(&state.db, user.id).await?;

    let response = logs
        .into_iter()
        .map(|log| {
            let linked = records.remove(&log.id).unwrap_or_default();
            EventLogResponse::new(log, linked)
        })
        .collect();

    Ok(Json(response))
}

/// Get a single event log
///
/// GET /themnhatkysukien/:id/
pub async fn get_event_log(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<Json<EventLogResponse>, ApiError> {
    let id = parse_id(&id).ok_or_else(not_found)?;

    let mut conn = state.db.acquire().await?;
    let log = db::get_event_log(&mut conn, user.id, id)
        .await?
        .ok_or_else(not_found)?;
    let records = db::handling_records_for(&mut conn, log.id).await?;

    Ok(Json(EventLogResponse::new(log, records)))
}

/// Create an event log owned by the requester
///
/// POST /themnhatkysukien/
pub async fn create_event_log(
    State(state): State<Arc<AppState>>,
    user: User,
    WithRejection(Json(req), _): WithRejection<Json<EventLogPayload>, ApiError>,
) -> Result<(StatusCode, Json<EventLogResponse>), ApiError> {
    validate_payload(&req)?;

    let (log, records) = reconcile::create_event_log(&state.db, user.id, req).await?;

    tracing::info!(
        user_id = user.id,
        event_log_id = log.id,
        handling_records = records.len(),
        "Created event log"
    );

    Ok((StatusCode::CREATED, Json(EventLogResponse::new(log, records))))
}

/// Update an event log. PUT and PATCH share this handler; when
/// `xulysukientbs` is present the handling record set is replaced by it.
///
/// PUT/PATCH /themnhatkysukien/:id/
pub async fn update_event_log(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<EventLogPayload>, ApiError>,
) -> Result<Json<EventLogResponse>, ApiError> {
    let id = parse_id(&id).ok_or_else(not_found)?;

    // Answer 404 before 400 for logs the requester cannot see
    {
        let mut conn = state.db.acquire().await?;
        if db::get_event_log(&mut conn, user.id, id).await?.is_none() {
            return Err(not_found());
        }
    }

    validate_payload(&req)?;

    let (log, records) = reconcile::update_event_log(&state.db, user.id, id, req)
        .await?
        .ok_or_else(not_found)?;

    tracing::info!(user_id = user.id, event_log_id = log.id, "Updated event log");

    Ok(Json(EventLogResponse::new(log, records)))
}

/// Delete an event log. Its handling records are kept.
///
/// DELETE /themnhatkysukien/:id/
pub async fn delete_event_log(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id).ok_or_else(not_found)?;

    if !db::delete_event_log(&state.db, user.id, id).await? {
        return Err(not_found());
    }

    tracing::info!(user_id = user.id, event_log_id = id, "Deleted event log");

    Ok(StatusCode::NO_CONTENT)
}
