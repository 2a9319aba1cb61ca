//! Points, leaderboard and fraud review handlers

use crate::api::auth::{ensure_active, require_admin, require_auth, require_staff};
use crate::api::{clamp_limit, require_text, AppJson};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::observability::{AuditEntry, AuditEventType, AuditLogger};
use crate::points;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

const MAX_MANUAL_AWARD: i64 = 500;
const MAX_REASON_LEN: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct FraudLogQuery {
    pub user_id: Option<String>,
    pub limit: Option<i64>,
}

pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<PointsBalance>> {
    let claims = require_auth(&state, &headers)?;
    Ok(Json(queries::get_balance(&state.db, &claims.sub).await?))
}

pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<PointsTransaction>>> {
    let claims = require_auth(&state, &headers)?;
    let limit = clamp_limit(query.limit, 50, 200);
    Ok(Json(
        queries::list_transactions(&state.db, &claims.sub, limit).await?,
    ))
}

pub async fn get_leaderboard(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<LeaderboardEntry>>> {
    require_auth(&state, &headers)?;
    let limit = clamp_limit(query.limit, 20, 100);
    Ok(Json(queries::get_leaderboard(&state.db, limit).await?))
}

pub async fn manual_award(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<ManualAwardRequest>,
) -> ApiResult<Json<AwardOutcome>> {
    let claims = require_staff(&state, &headers)?;
    if req.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("user_id is required"));
    }
    if !(1..=MAX_MANUAL_AWARD).contains(&req.amount) {
        return Err(ApiError::bad_request(format!(
            "amount must be between 1 and {}",
            MAX_MANUAL_AWARD
        )));
    }
    let reason = require_text(&req.reason, "Reason", MAX_REASON_LEN)?;
    ensure_active(&state, &claims).await?;

    let user_id = Uuid::parse_str(req.user_id.trim())
        .map_err(|_| ApiError::not_found("User"))?
        .to_string();
    queries::get_user(&state.db, &user_id)
        .await?
        .filter(|u| u.deleted_at.is_none())
        .ok_or_else(|| ApiError::not_found("User"))?;

    let outcome = points::manual_award(&state, &claims.sub, &user_id, req.amount, reason).await?;
    Ok(Json(outcome))
}

pub async fn redeem(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<RedeemRequest>,
) -> ApiResult<Json<PointsTransaction>> {
    let claims = require_auth(&state, &headers)?;
    if req.amount <= 0 {
        return Err(ApiError::bad_request("amount must be positive"));
    }
    let reward = require_text(&req.reward, "Reward", MAX_REASON_LEN)?;
    ensure_active(&state, &claims).await?;

    let tx = points::redeem(&state, &claims.sub, req.amount, reward).await?;

    AuditLogger::log(
        &state,
        AuditEntry::new(AuditEventType::PointsRedeemed)
            .entity("user", &claims.sub)
            .actor(&claims.sub, Some(claims.role.as_str()))
            .with_payload(serde_json::json!({ "amount": req.amount, "reward": reward })),
    )
    .await;

    Ok(Json(tx))
}

// ============================================================================
// FRAUD REVIEW (admin)
// ============================================================================

pub async fn list_fraud_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FraudLogQuery>,
) -> ApiResult<Json<Vec<FraudLog>>> {
    require_admin(&state, &headers)?;
    let user_id = match query.user_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::bad_request("Invalid user_id"))?
                .to_string(),
        ),
        None => None,
    };
    let limit = clamp_limit(query.limit, 100, 500);
    Ok(Json(
        queries::list_fraud_logs(&state.db, user_id.as_deref(), limit).await?,
    ))
}

pub async fn fraud_summary(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<FraudSummary>> {
    require_admin(&state, &headers)?;
    Ok(Json(queries::fraud_summary(&state.db, 10).await?))
}
