//! Handling record (xu ly su kien) API endpoints.
//!
//! There is no create endpoint: handling records come into existence through
//! event log writes. Every lookup is scoped to the requesting user, and a
//! record owned by someone else answers 404 exactly like a missing one.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::db::{self, HandlingRecordPayload, HandlingRecordResponse, User};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use super::validation::{parse_id, validate_machine, validate_title};

fn not_found() -> ApiError {
    ApiError::not_found("Handling record not found")
}

/// Add the field errors of one handling record payload to `errors`.
///
/// `prefix` namespaces the field names for nested entries, e.g.
/// `xulysukientbs[1].`. With `require_machine` a missing `Tomay` is an error.
pub(super) fn collect_payload_errors(
    req: &HandlingRecordPayload,
    prefix: &str,
    require_machine: bool,
    errors: &mut ValidationErrorBuilder,
) {
    if let Err(e) = validate_title(&req.title) {
        errors.add(format!("{}title", prefix), e);
    }

    match &req.machine {
        Some(machine) => {
            if let Err(e) = validate_machine(machine) {
                errors.add(format!("{}Tomay", prefix), e);
            }
        }
        None if require_machine => {
            errors.add(format!("{}Tomay", prefix), "This field is required");
        }
        None => {}
    }
}

/// List the requester's handling records, machine identifier descending
///
/// GET /xulysukientb/
pub async fn list_handling_records(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<HandlingRecordResponse>>, ApiError> {
    let records = db::list_handling_records(&state.db, user.id).await?;
    Ok(Json(records.into_iter().map(HandlingRecordResponse::from).collect()))
}

/// Update a handling record. PUT and PATCH share this handler: every field
/// is optional, so absent fields are left as they are for both.
///
/// PUT/PATCH /xulysukientb/:id/
pub async fn update_handling_record(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
    WithRejection(Json(req), _): WithRejection<Json<HandlingRecordPayload>, ApiError>,
) -> Result<Json<HandlingRecordResponse>, ApiError> {
    let id = parse_id(&id).ok_or_else(not_found)?;

    let mut tx = db::begin_immediate(&state.db).await?;
    let mut record = db::get_handling_record(&mut tx, user.id, id)
        .await?
        .ok_or_else(not_found)?;

    let mut errors = ValidationErrorBuilder::new();
    collect_payload_errors(&req, "", false, &mut errors);
    errors.finish()?;

    record.apply(req);
    db::save_handling_record(&mut tx, &record).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, handling_record_id = record.id, "Updated handling record");

    Ok(Json(HandlingRecordResponse::from(record)))
}

/// Delete a handling record
///
/// DELETE /xulysukientb/:id/
pub async fn delete_handling_record(
    State(state): State<Arc<AppState>>,
    user: User,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id).ok_or_else(not_found)?;

    if !db::delete_handling_record(&state.db, user.id, id).await? {
        return Err(not_found());
    }

    tracing::info!(user_id = user.id, handling_record_id = id, "Deleted handling record");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{body_json, send, TestApp};
    use axum::http::Method;
    use serde_json::json;

    const LIST_URL: &str = "/xulysukientb/";

    fn detail_url(id: i64) -> String {
        format!("/xulysukientb/{}/", id)
    }

    #[tokio::test]
    async fn test_auth_required() {
        let app = TestApp::new().await;
        let response = send(&app.router, Method::GET, LIST_URL, None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_retrieve_handling_records() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        app.handling_record(user.id, "H1").await;
        app.handling_record(user.id, "H2").await;

        let response = send(&app.router, Method::GET, LIST_URL, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let machines: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["Tomay"].as_str().unwrap())
            .collect();
        assert_eq!(machines, vec!["H2", "H1"]);
    }

    #[tokio::test]
    async fn test_handling_records_limited_to_user() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        let (other, _) = app.user_with_token("user2@example.com").await;
        app.handling_record(other.id, "H2").await;
        let mine = app.handling_record(user.id, "H1").await;

        let response = send(&app.router, Method::GET, LIST_URL, Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["Tomay"], "H1");
        assert_eq!(items[0]["id"], mine.id);
    }

    #[tokio::test]
    async fn test_update_handling_record() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        let record = app.handling_record(user.id, "H2").await;

        let payload = json!({
            "Tomay": "H1",
            "Noidung_xuly": "Cắt máy cắt",
            "Quatrinh_kiemtra": "Theo dõi",
        });
        let response = send(
            &app.router,
            Method::PATCH,
            &detail_url(record.id),
            Some(&token),
            Some(payload),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["Tomay"], "H1");
        assert_eq!(body["Noidung_xuly"], "Cắt máy cắt");

        let mut conn = app.pool.acquire().await.unwrap();
        let reloaded = db::get_handling_record(&mut conn, user.id, record.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.machine, "H1");
        assert_eq!(reloaded.inspection_process, "Theo dõi");
    }

    #[tokio::test]
    async fn test_put_leaves_absent_fields_untouched() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        let record = app.handling_record(user.id, "H2").await;

        let response = send(
            &app.router,
            Method::PUT,
            &detail_url(record.id),
            Some(&token),
            Some(json!({"Tinhtrang_xuly": "Đã xử lý"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["Tomay"], "H2");
        assert_eq!(body["Tinhtrang_xuly"], "Đã xử lý");
    }

    #[tokio::test]
    async fn test_update_rejects_blank_machine() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        let record = app.handling_record(user.id, "H2").await;

        let response = send(
            &app.router,
            Method::PATCH,
            &detail_url(record.id),
            Some(&token),
            Some(json!({"Tomay": ""})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert!(body["error"]["details"]["Tomay"].is_array());
    }

    #[tokio::test]
    async fn test_update_other_users_record_is_not_found() {
        let app = TestApp::new().await;
        let (_, token) = app.user_with_token("user@example.com").await;
        let (other, _) = app.user_with_token("user2@example.com").await;
        let record = app.handling_record(other.id, "H2").await;

        let response = send(
            &app.router,
            Method::PATCH,
            &detail_url(record.id),
            Some(&token),
            Some(json!({"Tomay": "stolen"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_handling_record() {
        let app = TestApp::new().await;
        let (user, token) = app.user_with_token("user@example.com").await;
        let record = app.handling_record(user.id, "H2").await;

        let response = send(
            &app.router,
            Method::DELETE,
            &detail_url(record.id),
            Some(&token),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(db::list_handling_records(&app.pool, user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_other_users_record_is_not_found() {
        let app = TestApp::new().await;
        let (_, token) = app.user_with_token("user@example.com").await;
        let (other, _) = app.user_with_token("user2@example.com").await;
        let record = app.handling_record(other.id, "H2").await;

        for url in [detail_url(record.id), "/xulysukientb/not-a-number/".to_string()] {
            let response = send(&app.router, Method::DELETE, &url, Some(&token), None).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
        assert_eq!(db::list_handling_records(&app.pool, other.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_no_create_endpoint() {
        let app = TestApp::new().await;
        let (_, token) = app.user_with_token("user@example.com").await;

        let response = send(
            &app.router,
            Method::POST,
            LIST_URL,
            Some(&token),
            Some(json!({"Tomay": "H1"})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
