//! API handlers and routing

pub mod achievements;
pub mod assignments;
pub mod auth;
pub mod integrity;
pub mod pathways;
pub mod points;
pub mod portfolio;
pub mod privacy;
pub mod tutoring;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::websocket::ws_handler;
use axum::{
    extract::FromRequest,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// JSON body extractor whose rejections use the API error format
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

impl<T: Serialize> IntoResponse for AppJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// Path ids that are not UUIDs cannot exist, so they are reported as 404
pub fn parse_id(raw: &str, what: &str) -> ApiResult<String> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::not_found(what))
}

pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

/// Reject empty or over-long text fields
pub fn require_text<'a>(value: &'a str, field: &str, max_chars: usize) -> ApiResult<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(ApiError::bad_request(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(trimmed)
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // WebSocket notifications
        .route("/ws", get(ws_handler))
        // === AUTH ===
        .route("/api/v1/auth/register", post(auth::register))
        .route("/api/v1/auth/login", post(auth::login))
        .route("/api/v1/auth/refresh", post(auth::refresh))
        .route("/api/v1/auth/logout", post(auth::logout))
        .route("/api/v1/auth/me", get(auth::me))
        // === ASSIGNMENTS ===
        .route(
            "/api/v1/assignments",
            get(assignments::list_assignments).post(assignments::create_assignment),
        )
        .route(
            "/api/v1/assignments/:id",
            get(assignments::get_assignment)
                .patch(assignments::update_assignment)
                .delete(assignments::delete_assignment),
        )
        .route(
            "/api/v1/assignments/:id/analyze",
            post(assignments::analyze_assignment),
        )
        .route(
            "/api/v1/assignments/:id/analysis",
            get(assignments::get_analysis),
        )
        .route(
            "/api/v1/assignments/:id/submissions",
            get(assignments::list_submissions).post(assignments::submit_assignment),
        )
        .route(
            "/api/v1/assignments/:id/milestones",
            get(assignments::list_milestones),
        )
        .route(
            "/api/v1/submissions/:id/grade",
            post(assignments::grade_submission),
        )
        .route(
            "/api/v1/milestones/:id/complete",
            post(assignments::complete_milestone),
        )
        // === PATHWAYS ===
        .route(
            "/api/v1/pathways",
            get(pathways::list_pathways).post(pathways::create_pathway),
        )
        .route("/api/v1/pathways/:id", get(pathways::get_pathway))
        .route("/api/v1/pathways/:id/enroll", post(pathways::enroll))
        .route("/api/v1/pathways/:id/progress", get(pathways::get_progress))
        .route(
            "/api/v1/pathways/:id/checkpoints/:checkpoint_id/complete",
            post(pathways::complete_checkpoint),
        )
        // === POINTS ===
        .route("/api/v1/points/balance", get(points::get_balance))
        .route("/api/v1/points/transactions", get(points::list_transactions))
        .route("/api/v1/points/leaderboard", get(points::get_leaderboard))
        .route("/api/v1/points/award", post(points::manual_award))
        .route("/api/v1/points/redeem", post(points::redeem))
        .route("/api/v1/fraud/logs", get(points::list_fraud_logs))
        .route("/api/v1/fraud/summary", get(points::fraud_summary))
        // === ACHIEVEMENTS ===
        .route("/api/v1/achievements", get(achievements::list_catalog))
        .route("/api/v1/achievements/me", get(achievements::list_mine))
        // === TUTORING ===
        .route(
            "/api/v1/tutoring/sessions",
            get(tutoring::list_sessions).post(tutoring::start_session),
        )
        .route(
            "/api/v1/tutoring/sessions/:id/messages",
            get(tutoring::list_messages).post(tutoring::send_message),
        )
        .route(
            "/api/v1/tutoring/sessions/:id/end",
            post(tutoring::end_session),
        )
        // === INTEGRITY ===
        .route(
            "/api/v1/integrity/reports",
            get(integrity::list_reports).post(integrity::create_report),
        )
        .route(
            "/api/v1/integrity/reports/:id",
            get(integrity::get_report).patch(integrity::update_report),
        )
        .route(
            "/api/v1/integrity/submissions/:id/similarity",
            post(integrity::check_similarity),
        )
        // === PRIVACY ===
        .route(
            "/api/v1/privacy/consents",
            get(privacy::get_consents).post(privacy::set_consent),
        )
        .route(
            "/api/v1/privacy/consents/history",
            get(privacy::consent_history),
        )
        .route("/api/v1/privacy/export", get(privacy::export_data))
        .route("/api/v1/privacy/delete", post(privacy::delete_account))
        .route("/api/v1/privacy/requests", get(privacy::list_requests))
        // === PORTFOLIO ===
        .route(
            "/api/v1/portfolio",
            get(portfolio::list_items).post(portfolio::create_item),
        )
        .route("/api/v1/portfolio/export", get(portfolio::export_archive))
        .route("/api/v1/portfolio/:id", delete(portfolio::delete_item))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(parse_id(&id, "Assignment").unwrap(), id);

        let err = parse_id("not-a-uuid", "Assignment").unwrap_err();
        assert_eq!(err.to_string(), "Assignment not found");
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None, 50, 200), 50);
        assert_eq!(clamp_limit(Some(0), 50, 200), 1);
        assert_eq!(clamp_limit(Some(10_000), 50, 200), 200);
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("  Essay  ", "title", 200).unwrap(), "Essay");
        assert!(require_text("   ", "title", 200).is_err());
        assert!(require_text(&"x".repeat(201), "title", 200).is_err());
    }
}
