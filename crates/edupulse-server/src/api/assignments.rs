//! Assignment, submission and milestone handlers

use crate::analysis;
use crate::api::auth::{ensure_active, require_auth, require_staff};
use crate::api::{clamp_limit, parse_id, require_text, AppJson};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::observability::{AuditEntry, AuditEventType, AuditLogger};
use crate::points::{self, PointsReceipt};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 50_000;
const MAX_SUBMISSION_LEN: usize = 200_000;
const MAX_FEEDBACK_LEN: usize = 10_000;
const MAX_POINTS_RANGE: std::ops::RangeInclusive<i32> = 1..=1000;
const DEFAULT_MAX_POINTS: i32 = 100;
/// Submissions this far ahead of the due date earn the early bonus
const EARLY_SUBMISSION_SECS: i64 = 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct AssignmentListQuery {
    pub subject: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionReceipt {
    pub submission: AssignmentSubmission,
    pub points: PointsReceipt,
}

#[derive(Debug, Serialize)]
pub struct MilestoneStatus {
    #[serde(flatten)]
    pub milestone: Milestone,
    pub completed: bool,
}

#[derive(Debug, Serialize)]
pub struct MilestoneCompletion {
    pub milestone: Milestone,
    pub points: PointsReceipt,
}

fn validate_max_points(value: i32) -> ApiResult<i32> {
    if !MAX_POINTS_RANGE.contains(&value) {
        return Err(ApiError::bad_request(format!(
            "max_points must be between {} and {}",
            MAX_POINTS_RANGE.start(),
            MAX_POINTS_RANGE.end()
        )));
    }
    Ok(value)
}

fn normalize_subject(subject: Option<&str>) -> Option<String> {
    subject
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Only the teacher who created an assignment, or an admin, manages it
pub(crate) fn ensure_owner(claims: &Claims, assignment: &Assignment) -> ApiResult<()> {
    if claims.role == Role::Admin || claims.sub == assignment.teacher_id {
        Ok(())
    } else {
        Err(ApiError::forbidden("Not the owner of this assignment"))
    }
}

fn is_early(due_at: Option<i64>, submitted_at: i64) -> bool {
    due_at
        .map(|due| due - submitted_at >= EARLY_SUBMISSION_SECS)
        .unwrap_or(false)
}

async fn load_assignment(state: &AppState, raw_id: &str) -> ApiResult<Assignment> {
    let id = parse_id(raw_id, "Assignment")?;
    queries::get_assignment(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Assignment"))
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

pub async fn create_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreateAssignmentRequest>,
) -> ApiResult<(StatusCode, Json<Assignment>)> {
    let claims = require_staff(&state, &headers)?;
    let title = require_text(&req.title, "Title", MAX_TITLE_LEN)?;
    let description = require_text(&req.description, "Description", MAX_DESCRIPTION_LEN)?;
    let max_points = validate_max_points(req.max_points.unwrap_or(DEFAULT_MAX_POINTS))?;
    let subject = normalize_subject(req.subject.as_deref());
    ensure_active(&state, &claims).await?;

    let assignment = queries::create_assignment(
        &state.db,
        &claims.sub,
        title,
        description,
        subject.as_deref(),
        req.due_at,
        max_points,
    )
    .await?;

    info!(assignment = %assignment.id, teacher = %claims.sub, "Assignment created");
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn list_assignments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<AssignmentListQuery>,
) -> ApiResult<Json<Vec<Assignment>>> {
    require_auth(&state, &headers)?;
    let subject = normalize_subject(query.subject.as_deref());
    let limit = clamp_limit(query.limit, 50, 200);
    let assignments = queries::list_assignments(&state.db, subject.as_deref(), limit).await?;
    Ok(Json(assignments))
}

pub async fn get_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Assignment>> {
    require_auth(&state, &headers)?;
    Ok(Json(load_assignment(&state, &id).await?))
}

pub async fn update_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(mut req): AppJson<UpdateAssignmentRequest>,
) -> ApiResult<Json<Assignment>> {
    let claims = require_staff(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let assignment = load_assignment(&state, &id).await?;
    ensure_owner(&claims, &assignment)?;

    if let Some(title) = req.title.as_deref() {
        req.title = Some(require_text(title, "Title", MAX_TITLE_LEN)?.to_string());
    }
    if let Some(description) = req.description.as_deref() {
        req.description =
            Some(require_text(description, "Description", MAX_DESCRIPTION_LEN)?.to_string());
    }
    if let Some(max_points) = req.max_points {
        validate_max_points(max_points)?;
    }
    req.subject = normalize_subject(req.subject.as_deref());

    let updated = queries::update_assignment(&state.db, &assignment.id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Assignment"))?;
    Ok(Json(updated))
}

pub async fn delete_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = require_staff(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let assignment = load_assignment(&state, &id).await?;
    ensure_owner(&claims, &assignment)?;

    if !queries::delete_assignment(&state.db, &assignment.id).await? {
        return Err(ApiError::not_found("Assignment"));
    }

    info!(assignment = %assignment.id, by = %claims.sub, "Assignment deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

// ============================================================================
// ANALYSIS
// ============================================================================

pub async fn analyze_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<AnalysisResult>)> {
    let claims = require_staff(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let assignment = load_assignment(&state, &id).await?;
    ensure_owner(&claims, &assignment)?;

    let analysis = analysis::analyze(&assignment.description);
    let result = queries::save_analysis(&state.db, &assignment.id, &analysis).await?;

    info!(
        assignment = %assignment.id,
        difficulty = result.difficulty.as_str(),
        milestones = result.milestones.len(),
        "Assignment analyzed"
    );
    Ok((StatusCode::CREATED, Json(result)))
}

pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<AnalysisResult>> {
    require_auth(&state, &headers)?;
    let assignment = load_assignment(&state, &id).await?;
    let analysis = queries::get_latest_analysis(&state.db, &assignment.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Analysis"))?;
    Ok(Json(analysis))
}

// ============================================================================
// SUBMISSIONS
// ============================================================================

pub async fn submit_assignment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<SubmitAssignmentRequest>,
) -> ApiResult<(StatusCode, Json<SubmissionReceipt>)> {
    let claims = require_auth(&state, &headers)?;
    if claims.role != Role::Student {
        return Err(ApiError::forbidden("Only students can submit assignments"));
    }
    let content = require_text(&req.content, "Content", MAX_SUBMISSION_LEN)?;
    ensure_active(&state, &claims).await?;
    let assignment = load_assignment(&state, &id).await?;

    let submission = queries::create_submission(&state.db, &assignment.id, &claims.sub, content)
        .await?
        .ok_or_else(|| ApiError::Conflict("Assignment already submitted".to_string()))?;
    info!(submission = %submission.id, assignment = %assignment.id, "Assignment submitted");

    let mut receipt = PointsReceipt::default();
    receipt.record(
        points::award_standard(
            &state,
            &claims.sub,
            PointsAction::AssignmentSubmitted,
            Some(&submission.id),
            Some(&assignment.title),
        )
        .await,
    );

    if is_early(assignment.due_at, submission.submitted_at) {
        receipt.record(
            points::award_standard(
                &state,
                &claims.sub,
                PointsAction::EarlySubmission,
                Some(&submission.id),
                Some(&assignment.title),
            )
            .await,
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(SubmissionReceipt {
            submission,
            points: receipt,
        }),
    ))
}

/// Owners see every submission, students only their own
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AssignmentSubmission>>> {
    let claims = require_auth(&state, &headers)?;
    let assignment = load_assignment(&state, &id).await?;

    let student_filter = if claims.role.is_staff() {
        ensure_owner(&claims, &assignment)?;
        None
    } else {
        Some(claims.sub.as_str())
    };

    let submissions = queries::list_submissions(&state.db, &assignment.id, student_filter).await?;
    Ok(Json(submissions))
}

pub async fn grade_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    AppJson(req): AppJson<GradeSubmissionRequest>,
) -> ApiResult<Json<AssignmentSubmission>> {
    let claims = require_staff(&state, &headers)?;
    let score = req
        .score
        .ok_or_else(|| ApiError::bad_request("score is required"))?;
    let feedback = req
        .feedback
        .as_deref()
        .map(str::trim)
        .filter(|f| !f.is_empty());
    if feedback.map(|f| f.chars().count() > MAX_FEEDBACK_LEN).unwrap_or(false) {
        return Err(ApiError::bad_request(format!(
            "Feedback must be at most {} characters",
            MAX_FEEDBACK_LEN
        )));
    }

    let submission_id = parse_id(&id, "Submission")?;
    ensure_active(&state, &claims).await?;
    let submission = queries::get_submission(&state.db, &submission_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Submission"))?;
    let assignment = load_assignment(&state, &submission.assignment_id).await?;
    ensure_owner(&claims, &assignment)?;

    if score < 0 || score > assignment.max_points {
        return Err(ApiError::bad_request(format!(
            "score must be between 0 and {}",
            assignment.max_points
        )));
    }

    let graded = queries::grade_submission(&state.db, &submission.id, score, feedback)
        .await?
        .ok_or_else(|| ApiError::not_found("Submission"))?;

    AuditLogger::log(
        &state,
        AuditEntry::new(AuditEventType::SubmissionGraded)
            .entity("submission", &graded.id)
            .actor(&claims.sub, Some(claims.role.as_str()))
            .with_payload(serde_json::json!({ "score": score, "max_points": assignment.max_points })),
    )
    .await;

    Ok(Json(graded))
}

// ============================================================================
// MILESTONES
// ============================================================================

pub async fn list_milestones(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MilestoneStatus>>> {
    let claims = require_auth(&state, &headers)?;
    let assignment = load_assignment(&state, &id).await?;

    let milestones = queries::list_milestones(&state.db, &assignment.id).await?;
    let completed = queries::completed_milestone_ids(&state.db, &assignment.id, &claims.sub).await?;

    Ok(Json(
        milestones
            .into_iter()
            .map(|m| MilestoneStatus {
                completed: completed.contains(&m.id),
                milestone: m,
            })
            .collect(),
    ))
}

pub async fn complete_milestone(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<MilestoneCompletion>> {
    let claims = require_auth(&state, &headers)?;
    if claims.role != Role::Student {
        return Err(ApiError::forbidden("Only students can complete milestones"));
    }
    ensure_active(&state, &claims).await?;

    let milestone_id = parse_id(&id, "Milestone")?;
    let milestone = queries::get_milestone(&state.db, &milestone_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Milestone"))?;

    if !queries::complete_milestone(&state.db, &milestone.id, &claims.sub).await? {
        return Err(ApiError::Conflict("Milestone already completed".to_string()));
    }

    let mut receipt = PointsReceipt::default();
    if milestone.points > 0 {
        receipt.record(
            points::award(
                &state,
                &claims.sub,
                PointsAction::MilestoneCompleted,
                milestone.points as i64,
                Some(&milestone.id),
                Some(&milestone.title),
            )
            .await,
        );
    }

    Ok(Json(MilestoneCompletion {
        milestone,
        points: receipt,
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

    fn assignment(teacher: &str) -> Assignment {
        Assignment {
            id: "a1".to_string(),
            teacher_id: teacher.to_string(),
            title: "Essay".to_string(),
            description: "Write an essay".to_string(),
            subject: None,
            due_at: None,
            max_points: 100,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_ownership() {
        let a = assignment("t1");
        assert!(ensure_owner(&claims("t1", Role::Teacher), &a).is_ok());
        assert!(ensure_owner(&claims("admin", Role::Admin), &a).is_ok());
        assert!(matches!(
            ensure_owner(&claims("t2", Role::Teacher), &a),
            Err(ApiError::Forbidden(_))
        ));
    }

    #[test]
    fn test_early_submission_window() {
        let now = 1_700_000_000;
        assert!(is_early(Some(now + EARLY_SUBMISSION_SECS), now));
        assert!(is_early(Some(now + 3 * EARLY_SUBMISSION_SECS), now));
        assert!(!is_early(Some(now + EARLY_SUBMISSION_SECS - 1), now));
        assert!(!is_early(Some(now - 10), now));
        assert!(!is_early(None, now));
    }

    #[test]
    fn test_max_points_bounds() {
        assert!(validate_max_points(1).is_ok());
        assert!(validate_max_points(1000).is_ok());
        assert!(validate_max_points(0).is_err());
        assert!(validate_max_points(1001).is_err());
    }

    #[test]
    fn test_subject_normalization() {
        assert_eq!(normalize_subject(Some("  math ")), Some("math".to_string()));
        assert_eq!(normalize_subject(Some("   ")), None);
        assert_eq!(normalize_subject(None), None);
    }
}
