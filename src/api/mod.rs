pub mod auth;
pub mod error;
mod event_logs;
mod handling_records;
mod validation;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Protected routes
    let api_routes = Router::new()
        // Event logs
        .route(
            "/themnhatkysukien/",
            get(event_logs::list_event_logs).post(event_logs::create_event_log),
        )
        .route(
            "/themnhatkysukien/:id/",
            get(event_logs::get_event_log)
                .put(event_logs::update_event_log)
                .patch(event_logs::update_event_log)
                .delete(event_logs::delete_event_log),
        )
        // Handling records
        .route("/xulysukientb/", get(handling_records::list_handling_records))
        .route(
            "/xulysukientb/:id/",
            put(handling_records::update_handling_record)
                .patch(handling_records::update_handling_record)
                .delete(handling_records::delete_handling_record),
        )
        // Current user
        .route("/api/user/me/", get(auth::me))
        // Protected by auth
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        // Auth routes (public)
        .route("/api/user/token/", post(auth::login))
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
