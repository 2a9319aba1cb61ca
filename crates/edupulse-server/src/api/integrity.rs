//! Academic integrity handlers
//!
//! Staff open reports against submissions and move them through the review
//! workflow. Teachers only see submissions on their own assignments. The similarity check compares one submission with the rest of
//! its assignment and may open a plagiarism report on its own.

use crate::api::assignments::ensure_owner;
use crate::api::auth::{ensure_active, require_staff};
use crate::api::{clamp_limit, parse_id, require_text, AppJson};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::observability::{AuditEntry, AuditEventType, AuditLogger};
use crate::similarity::{rank_matches, round_score, AUTO_FLAG_THRESHOLD};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

const MAX_DESCRIPTION_LEN: usize = 5000;
const MAX_RESOLUTION_LEN: usize = 5000;

#[derive(Debug, Deserialize)]
pub struct ReportListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

async fn load_submission(state: &AppState, raw_id: &str) -> ApiResult<AssignmentSubmission> {
    let id = parse_id(raw_id, "Submission")?;
    queries::get_submission(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Submission"))
}

/// Teachers review submissions on their own assignments; admins review all
async fn authorize_submission(
    state: &AppState,
    claims: &Claims,
    submission: &AssignmentSubmission,
) -> ApiResult<()> {
    let assignment = queries::get_assignment(&state.db, &submission.assignment_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assignment"))?;
    ensure_owner(claims, &assignment)
}

async fn load_report(state: &AppState, claims: &Claims, raw_id: &str) -> ApiResult<IntegrityReport> {
    let id = parse_id(raw_id, "Integrity report")?;
    let report = queries::get_integrity_report(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Integrity report"))?;
    let submission = queries::get_submission(&state.db, &report.submission_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Integrity report"))?;
    authorize_submission(state, claims, &submission).await?;
    Ok(report)
}

/// Teacher whose assignments bound a report listing; `None` for admins
fn report_scope(claims: &Claims) -> Option<&str> {
    if claims.role == Role::Admin {
        None
    } else {
        Some(claims.sub.as_str())
    }
}

/// Audit the new report and tell the student about it
async fn announce_report(
    state: &AppState,
    report: &IntegrityReport,
    student_id: &str,
    actor: Option<(&str, Role)>,
) {
    let mut entry = AuditEntry::new(AuditEventType::IntegrityReportOpened)
        .entity("integrity_report", &report.id)
        .with_payload(serde_json::json!({
            "submission_id": report.submission_id,
            "kind": report.kind,
            "similarity": report.similarity,
        }));
    if let Some((id, role)) = actor {
        entry = entry.actor(id, Some(role.as_str()));
    }
    AuditLogger::log(state, entry).await;

    state.notify(WsEvent::IntegrityReportOpened(IntegrityReportEvent {
        user_id: student_id.to_string(),
        report_id: report.id.clone(),
        kind: report.kind,
    }));
}

pub async fn create_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateReportRequest>,
) -> ApiResult<(StatusCode, Json<IntegrityReport>)> {
    let claims = require_staff(&state, &headers)?;
    if req.submission_id.trim().is_empty() {
        return Err(ApiError::bad_request("submission_id is required"));
    }
    let kind = ReportKind::parse(req.kind.trim()).ok_or_else(|| {
        ApiError::bad_request("kind must be one of plagiarism, collusion, ai_generated, other")
    })?;
    let description = require_text(&req.description, "Description", MAX_DESCRIPTION_LEN)?;
    ensure_active(&state, &claims).await?;
    let submission = load_submission(&state, req.submission_id.trim()).await?;
    authorize_submission(&state, &claims, &submission).await?;

    let report = queries::create_integrity_report(
        &state.db,
        &submission.id,
        Some(&claims.sub),
        kind,
        description,
        None,
    )
    .await?;

    announce_report(
        &state,
        &report,
        &submission.student_id,
        Some((&claims.sub, claims.role)),
    )
    .await;
    info!(report = %report.id, submission = %submission.id, kind = kind.as_str(), "Integrity report opened");

    Ok((StatusCode::CREATED, Json(report)))
}

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ReportListQuery>,
) -> ApiResult<Json<Vec<IntegrityReport>>> {
    let claims = require_staff(&state, &headers)?;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            ReportStatus::parse(raw).ok_or_else(|| ApiError::bad_request("Invalid status filter"))?,
        ),
        None => None,
    };
    let limit = clamp_limit(query.limit, 50, 200);
    Ok(Json(
        queries::list_integrity_reports(&state.db, status, report_scope(&claims), limit).await?,
    ))
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<IntegrityReport>> {
    let claims = require_staff(&state, &headers)?;
    Ok(Json(load_report(&state, &claims, &id).await?))
}

pub async fn update_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateReportRequest>,
) -> ApiResult<Json<IntegrityReport>> {
    let claims = require_staff(&state, &headers)?;
    let next = ReportStatus::parse(req.status.trim())
        .ok_or_else(|| ApiError::bad_request("Invalid status"))?;
    let resolution = match req.resolution.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(text) => Some(require_text(text, "Resolution", MAX_RESOLUTION_LEN)?),
        None => None,
    };

    ensure_active(&state, &claims).await?;
    let current = load_report(&state, &claims, &id).await?;
    if !current.status.can_transition_to(next) {
        return Err(ApiError::bad_request(format!(
            "Cannot move report from {} to {}",
            current.status.as_str(),
            next.as_str()
        )));
    }

    // The status guard in the update makes concurrent reviews lose cleanly
    let report = queries::update_report_status(&state.db, &current.id, current.status, next, resolution)
        .await?
        .ok_or_else(|| ApiError::Conflict("Report was updated concurrently".to_string()))?;

    AuditLogger::log(
        &state,
        AuditEntry::new(AuditEventType::IntegrityReportUpdated)
            .entity("integrity_report", &report.id)
            .actor(&claims.sub, Some(claims.role.as_str()))
            .with_payload(serde_json::json!({
                "from": current.status,
                "to": next,
                "resolution": resolution,
            })),
    )
    .await;

    Ok(Json(report))
}

pub async fn check_similarity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<SimilarityReport>> {
    let claims = require_staff(&state, &headers)?;
    let submission = load_submission(&state, &id).await?;
    authorize_submission(&state, &claims, &submission).await?;
    let peers = queries::list_peer_submissions(&state.db, &submission).await?;

    let owners: HashMap<&str, &str> = peers
        .iter()
        .map(|p| (p.id.as_str(), p.student_id.as_str()))
        .collect();
    let matches: Vec<SimilarityMatch> = rank_matches(
        &submission.content,
        peers.iter().map(|p| (p.id.as_str(), p.content.as_str())),
    )
    .into_iter()
    .map(|(peer_id, score)| SimilarityMatch {
        student_id: owners.get(peer_id.as_str()).copied().unwrap_or_default().to_string(),
        submission_id: peer_id,
        similarity: round_score(score),
    })
    .collect();

    let mut report = None;
    if let Some(best) = matches.first().filter(|m| m.similarity >= AUTO_FLAG_THRESHOLD) {
        if !queries::has_open_report(&state.db, &submission.id, ReportKind::Plagiarism).await? {
            let opened = queries::create_integrity_report(
                &state.db,
                &submission.id,
                None,
                ReportKind::Plagiarism,
                &format!(
                    "Automatic flag: {:.0}% similar to submission {}",
                    best.similarity * 100.0,
                    best.submission_id
                ),
                Some(best.similarity),
            )
            .await?;
            warn!(
                submission = %submission.id,
                similarity = best.similarity,
                "Submission auto-flagged for plagiarism"
            );
            announce_report(&state, &opened, &submission.student_id, None).await;
            report = Some(opened);
        }
    }

    Ok(Json(SimilarityReport {
        submission_id: submission.id,
        compared: peers.len(),
        matches,
        report,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(sub: &str, role: Role) -> Claims {
        Claims {
            sub: sub.to_string(),
            role,
            iat: 0,
            exp: i64::MAX,
        }
    }

    #[test]
    fn test_teachers_list_only_their_reports() {
        assert_eq!(report_scope(&claims("t1", Role::Teacher)), Some("t1"));
        assert_eq!(report_scope(&claims("admin", Role::Admin)), None);
    }
}
