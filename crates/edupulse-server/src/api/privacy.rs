//! Privacy handlers: consent, data export and account erasure

use crate::api::auth::{ensure_active, require_auth};
use crate::api::AppJson;
use crate::auth::now;
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::observability::{AuditEventType, AuditLogger};
use crate::privacy::{anonymized_email, current_consents, ANONYMIZED_NAME};
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Ledger rows included in an export
const EXPORT_LEDGER_LIMIT: i64 = 100_000;

#[derive(Debug, Serialize)]
pub struct TutoringTranscript {
    #[serde(flatten)]
    pub session: TutoringSession,
    pub messages: Vec<TutoringMessage>,
}

/// Everything stored about one user
#[derive(Debug, Serialize)]
pub struct DataExport {
    pub exported_at: i64,
    pub profile: User,
    pub submissions: Vec<AssignmentSubmission>,
    pub points_balance: PointsBalance,
    pub points_ledger: Vec<PointsTransaction>,
    pub achievements: HashMap<String, i64>,
    pub pathway_progress: Vec<PathwayProgress>,
    pub tutoring: Vec<TutoringTranscript>,
    pub portfolio: Vec<PortfolioItem>,
    pub consents: Vec<ConsentRecord>,
    pub request: PrivacyRequest,
}

pub async fn get_consents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ConsentState>>> {
    let claims = require_auth(&state, &headers)?;
    let history = queries::list_consents(&state.db, &claims.sub).await?;
    Ok(Json(current_consents(&history)))
}

pub async fn set_consent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<SetConsentRequest>,
) -> ApiResult<Json<Vec<ConsentState>>> {
    let claims = require_auth(&state, &headers)?;
    let purpose = ConsentPurpose::parse(req.purpose.trim()).ok_or_else(|| {
        ApiError::bad_request("purpose must be one of analytics, ai_tutoring, marketing, research")
    })?;
    let granted = req
        .granted
        .ok_or_else(|| ApiError::bad_request("granted is required"))?;
    ensure_active(&state, &claims).await?;

    let record = queries::record_consent(&state.db, &claims.sub, purpose, granted).await?;
    AuditLogger::privacy(
        &state,
        AuditEventType::ConsentChanged,
        &claims.sub,
        serde_json::json!({ "purpose": purpose, "granted": granted, "record_id": record.id }),
    )
    .await;

    let history = queries::list_consents(&state.db, &claims.sub).await?;
    Ok(Json(current_consents(&history)))
}

pub async fn consent_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ConsentRecord>>> {
    let claims = require_auth(&state, &headers)?;
    Ok(Json(queries::list_consents(&state.db, &claims.sub).await?))
}

pub async fn export_data(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<DataExport>> {
    let claims = require_auth(&state, &headers)?;
    let db = &state.db;
    let profile = queries::get_user(db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;

    let sessions = queries::list_tutoring_sessions(db, &claims.sub).await?;
    let mut tutoring = Vec::with_capacity(sessions.len());
    for session in sessions {
        let messages = queries::list_tutoring_messages(db, &session.id).await?;
        tutoring.push(TutoringTranscript { session, messages });
    }

    let export = DataExport {
        exported_at: now(),
        submissions: queries::list_user_submissions(db, &claims.sub).await?,
        points_balance: queries::get_balance(db, &claims.sub).await?,
        points_ledger: queries::list_transactions(db, &claims.sub, EXPORT_LEDGER_LIMIT).await?,
        achievements: queries::get_user_achievement_times(db, &claims.sub).await?,
        pathway_progress: queries::list_user_progress(db, &claims.sub).await?,
        tutoring,
        portfolio: queries::list_portfolio_items(db, &claims.sub).await?,
        consents: queries::list_consents(db, &claims.sub).await?,
        request: queries::create_privacy_request(db, &claims.sub, PrivacyRequestKind::Export)
            .await?,
        profile,
    };

    AuditLogger::privacy(
        &state,
        AuditEventType::DataExported,
        &claims.sub,
        serde_json::json!({
            "request_id": export.request.id,
            "submissions": export.submissions.len(),
            "tutoring_sessions": export.tutoring.len(),
        }),
    )
    .await;
    info!(user = %claims.sub, "Personal data exported");

    Ok(Json(export))
}

/// Erase the caller's account. Requires `{"confirm": true}`.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<DeletionRequest>,
) -> ApiResult<Json<PrivacyRequest>> {
    let claims = require_auth(&state, &headers)?;
    if !req.confirm {
        return Err(ApiError::bad_request(
            "Account deletion must be confirmed with \"confirm\": true",
        ));
    }

    let user = queries::get_user(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    if user.deleted_at.is_some() {
        return Err(ApiError::Conflict("Account already deleted".to_string()));
    }

    let request = queries::erase_user(
        &state.db,
        &claims.sub,
        &anonymized_email(&claims.sub),
        ANONYMIZED_NAME,
    )
    .await?;

    AuditLogger::privacy(
        &state,
        AuditEventType::AccountErased,
        &claims.sub,
        serde_json::json!({ "request_id": request.id }),
    )
    .await;
    info!(user = %claims.sub, "Account erased");

    Ok(Json(request))
}

pub async fn list_requests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PrivacyRequest>>> {
    let claims = require_auth(&state, &headers)?;
    Ok(Json(
        queries::list_privacy_requests(&state.db, &claims.sub).await?,
    ))
}
