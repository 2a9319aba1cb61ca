//! AI tutoring session handlers

use crate::api::auth::{ensure_active, require_auth};
use crate::api::{parse_id, require_text, AppJson};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::points::{self, PointsReceipt};
use crate::privacy::is_granted;
use crate::state::AppState;
use crate::tutor_proxy::{history_with_question, TutorRequest};
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

const MAX_SUBJECT_LEN: usize = 100;
const MAX_MESSAGE_LEN: usize = 4000;
/// Student turns needed before ending a session earns points
const MIN_MESSAGES_FOR_AWARD: i64 = 2;

#[derive(Debug, Serialize)]
pub struct SessionEnded {
    pub session: TutoringSession,
    pub messages: i64,
    pub points: PointsReceipt,
}

/// Load a session and make sure the caller owns it
async fn owned_session(state: &AppState, raw_id: &str, user_id: &str) -> ApiResult<TutoringSession> {
    let id = parse_id(raw_id, "Tutoring session")?;
    let session = queries::get_tutoring_session(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Tutoring session"))?;
    if session.user_id != user_id {
        return Err(ApiError::forbidden("Not your tutoring session"));
    }
    Ok(session)
}

/// Consent can be revoked mid-session, so every tutor call checks it
async fn require_tutoring_consent(state: &AppState, user_id: &str) -> ApiResult<()> {
    let consents = queries::list_consents(&state.db, user_id).await?;
    if !is_granted(&consents, ConsentPurpose::AiTutoring) {
        return Err(ApiError::forbidden(
            "AI tutoring requires the ai_tutoring consent",
        ));
    }
    Ok(())
}

pub async fn start_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<StartTutoringRequest>,
) -> ApiResult<(StatusCode, Json<TutoringSession>)> {
    let claims = require_auth(&state, &headers)?;
    let subject = require_text(&req.subject, "Subject", MAX_SUBJECT_LEN)?;
    ensure_active(&state, &claims).await?;

    require_tutoring_consent(&state, &claims.sub).await?;

    let assignment_id = match req.assignment_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let id = parse_id(raw, "Assignment")?;
            queries::get_assignment(&state.db, &id)
                .await?
                .ok_or_else(|| ApiError::not_found("Assignment"))?;
            Some(id)
        }
        None => None,
    };

    let session = queries::create_tutoring_session(
        &state.db,
        &claims.sub,
        subject,
        assignment_id.as_deref(),
    )
    .await?;

    info!(session = %session.id, user = %claims.sub, subject = %subject, "Tutoring session started");
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<TutoringSession>>> {
    let claims = require_auth(&state, &headers)?;
    Ok(Json(
        queries::list_tutoring_sessions(&state.db, &claims.sub).await?,
    ))
}

pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<TutoringMessage>>> {
    let claims = require_auth(&state, &headers)?;
    let session = owned_session(&state, &id, &claims.sub).await?;
    Ok(Json(
        queries::list_tutoring_messages(&state.db, &session.id).await?,
    ))
}

/// Ask the tutor service, then store both turns. A failed upstream call
/// stores nothing, so it never counts toward the session award.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<TutoringMessageRequest>,
) -> ApiResult<Json<TutoringExchange>> {
    let claims = require_auth(&state, &headers)?;
    let content = require_text(&req.content, "Content", MAX_MESSAGE_LEN)?;
    ensure_active(&state, &claims).await?;
    let session = owned_session(&state, &id, &claims.sub).await?;
    if session.status != TutoringStatus::Active {
        return Err(ApiError::Conflict("Tutoring session has ended".to_string()));
    }
    require_tutoring_consent(&state, &claims.sub).await?;

    let tutor = state.tutor.as_ref().ok_or_else(|| {
        ApiError::ServiceUnavailable("Tutor service is not configured".to_string())
    })?;

    let history = queries::list_tutoring_messages(&state.db, &session.id).await?;
    let reply = tutor
        .respond(&TutorRequest {
            session_id: session.id.clone(),
            subject: session.subject.clone(),
            messages: history_with_question(&history, content),
        })
        .await?;

    let (question, answer) =
        queries::add_tutoring_exchange(&state.db, &session.id, content, reply.reply.trim()).await?;

    debug!(session = %session.id, turns = history.len() + 2, "Tutor replied");
    Ok(Json(TutoringExchange { question, answer }))
}

pub async fn end_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionEnded>> {
    let claims = require_auth(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let session = owned_session(&state, &id, &claims.sub).await?;

    let session = queries::end_tutoring_session(&state.db, &session.id)
        .await?
        .ok_or_else(|| ApiError::Conflict("Tutoring session already ended".to_string()))?;

    let messages = queries::count_student_messages(&state.db, &session.id).await?;
    let mut receipt = PointsReceipt::default();
    if messages >= MIN_MESSAGES_FOR_AWARD {
        receipt.record(
            points::award_standard(
                &state,
                &claims.sub,
                PointsAction::TutorSessionCompleted,
                Some(&session.id),
                Some(&session.subject),
            )
            .await,
        );
    } else {
        points::unlock_quietly(&state, &claims.sub).await;
    }

    info!(session = %session.id, messages, "Tutoring session ended");
    Ok(Json(SessionEnded {
        session,
        messages,
        points: receipt,
    }))
}
