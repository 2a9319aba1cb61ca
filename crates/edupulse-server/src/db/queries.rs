//! Database queries for EduPulse (PostgreSQL)

use crate::analysis::Analysis;
use crate::models::{
    Achievement, AchievementMetric, AnalysisResult, Assignment, AssignmentSubmission,
    ConsentPurpose, ConsentRecord, Difficulty, FraudLog, FraudSummary, FraudUserCount,
    IntegrityReport, LeaderboardEntry, MessageSender, Milestone, NewCheckpoint, Pathway,
    PathwayProgress, PathwaySummary, PointsAction, PointsBalance, PointsTransaction,
    PortfolioItem, PrivacyRequest, PrivacyRequestKind, RefreshSession, ReportKind, ReportStatus,
    Role, TutoringMessage, TutoringSession, TutoringStatus, UpdateAssignmentRequest, User,
    UserStats,
};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio_postgres::Row;
use uuid::Uuid;

// ============================================================================
// ROW HELPERS
// ============================================================================

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|_| anyhow!("Invalid id: {}", id))
}

fn parse_opt_id(id: Option<&str>) -> Result<Option<Uuid>> {
    id.map(parse_id).transpose()
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| anyhow!("Timestamp out of range: {}", secs))
}

fn id_at(row: &Row, idx: usize) -> String {
    row.get::<_, Uuid>(idx).to_string()
}

fn opt_id_at(row: &Row, idx: usize) -> Option<String> {
    row.get::<_, Option<Uuid>>(idx).map(|id| id.to_string())
}

fn ts_at(row: &Row, idx: usize) -> i64 {
    row.get::<_, DateTime<Utc>>(idx).timestamp()
}

fn opt_ts_at(row: &Row, idx: usize) -> Option<i64> {
    row.get::<_, Option<DateTime<Utc>>>(idx).map(|dt| dt.timestamp())
}

fn string_list_at(row: &Row, idx: usize) -> Vec<String> {
    serde_json::from_value(row.get::<_, serde_json::Value>(idx)).unwrap_or_default()
}

// ============================================================================
// USERS
// ============================================================================

const USER_COLUMNS: &str = "id, email, name, role, created_at, deleted_at";

fn user_from_row(row: &Row) -> User {
    User {
        id: id_at(row, 0),
        email: row.get(1),
        name: row.get(2),
        role: Role::from(row.get::<_, String>(3).as_str()),
        created_at: ts_at(row, 4),
        deleted_at: opt_ts_at(row, 5),
    }
}

/// Insert a new user. Returns `None` when the email is already taken.
pub async fn create_user(
    pool: &Pool,
    email: &str,
    password_hash: &str,
    name: &str,
    role: Role,
) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "INSERT INTO users (email, password_hash, name, role)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (email) DO NOTHING
                 RETURNING {}",
                USER_COLUMNS
            ),
            &[&email, &password_hash, &name, &role.as_str()],
        )
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

pub async fn get_user(pool: &Pool, id: &str) -> Result<Option<User>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(user_from_row))
}

/// Active user and password hash for login
pub async fn get_user_credentials(pool: &Pool, email: &str) -> Result<Option<(User, String)>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "SELECT {}, password_hash FROM users WHERE email = $1 AND deleted_at IS NULL",
                USER_COLUMNS
            ),
            &[&email],
        )
        .await?;

    Ok(row.map(|row| (user_from_row(&row), row.get(6))))
}

// ============================================================================
// SESSIONS
// ============================================================================

pub async fn create_session(
    pool: &Pool,
    user_id: &str,
    token_hash: &str,
    expires_at: i64,
) -> Result<RefreshSession> {
    let uuid = parse_id(user_id)?;
    let expires = from_unix(expires_at)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO sessions (user_id, token_hash, expires_at)
             VALUES ($1, $2, $3)
             RETURNING id",
            &[&uuid, &token_hash, &expires],
        )
        .await?;

    Ok(RefreshSession {
        id: id_at(&row, 0),
        user_id: user_id.to_string(),
        expires_at,
        revoked: false,
    })
}

/// Revoke the session behind `old_hash` and open a new one for the same user.
///
/// Returns `None` when the old token is unknown, revoked, expired or belongs
/// to an erased account. Nothing is written in that case.
pub async fn rotate_session(
    pool: &Pool,
    old_hash: &str,
    new_hash: &str,
    new_expires_at: i64,
) -> Result<Option<RefreshSession>> {
    let expires = from_unix(new_expires_at)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let revoked = tx
        .query_opt(
            "UPDATE sessions s SET revoked_at = NOW()
             FROM users u
             WHERE s.token_hash = $1
               AND s.revoked_at IS NULL
               AND s.expires_at > NOW()
               AND u.id = s.user_id
               AND u.deleted_at IS NULL
             RETURNING s.user_id",
            &[&old_hash],
        )
        .await?;

    let Some(revoked) = revoked else {
        return Ok(None);
    };
    let user_id: Uuid = revoked.get(0);

    let row = tx
        .query_one(
            "INSERT INTO sessions (user_id, token_hash, expires_at)
             VALUES ($1, $2, $3)
             RETURNING id",
            &[&user_id, &new_hash, &expires],
        )
        .await?;

    tx.commit().await?;

    Ok(Some(RefreshSession {
        id: id_at(&row, 0),
        user_id: user_id.to_string(),
        expires_at: new_expires_at,
        revoked: false,
    }))
}

/// Returns true if an active session was revoked
pub async fn revoke_session(pool: &Pool, token_hash: &str) -> Result<bool> {
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE sessions SET revoked_at = NOW()
             WHERE token_hash = $1 AND revoked_at IS NULL",
            &[&token_hash],
        )
        .await?;
    Ok(updated > 0)
}

// ============================================================================
// ASSIGNMENTS
// ============================================================================

const ASSIGNMENT_COLUMNS: &str =
    "id, teacher_id, title, description, subject, due_at, max_points, created_at, updated_at";

fn assignment_from_row(row: &Row) -> Assignment {
    Assignment {
        id: id_at(row, 0),
        teacher_id: id_at(row, 1),
        title: row.get(2),
        description: row.get(3),
        subject: row.get(4),
        due_at: opt_ts_at(row, 5),
        max_points: row.get(6),
        created_at: ts_at(row, 7),
        updated_at: ts_at(row, 8),
    }
}

pub async fn create_assignment(
    pool: &Pool,
    teacher_id: &str,
    title: &str,
    description: &str,
    subject: Option<&str>,
    due_at: Option<i64>,
    max_points: i32,
) -> Result<Assignment> {
    let teacher = parse_id(teacher_id)?;
    let due = due_at.map(from_unix).transpose()?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO assignments (teacher_id, title, description, subject, due_at, max_points)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING {}",
                ASSIGNMENT_COLUMNS
            ),
            &[&teacher, &title, &description, &subject, &due, &max_points],
        )
        .await?;

    Ok(assignment_from_row(&row))
}

pub async fn list_assignments(
    pool: &Pool,
    subject: Option<&str>,
    limit: i64,
) -> Result<Vec<Assignment>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM assignments
                 WHERE ($1::TEXT IS NULL OR subject = $1)
                 ORDER BY created_at DESC
                 LIMIT $2",
                ASSIGNMENT_COLUMNS
            ),
            &[&subject, &limit],
        )
        .await?;

    Ok(rows.iter().map(assignment_from_row).collect())
}

pub async fn get_assignment(pool: &Pool, id: &str) -> Result<Option<Assignment>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {} FROM assignments WHERE id = $1", ASSIGNMENT_COLUMNS),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(assignment_from_row))
}

/// Apply the provided fields, leaving the others untouched
pub async fn update_assignment(
    pool: &Pool,
    id: &str,
    req: &UpdateAssignmentRequest,
) -> Result<Option<Assignment>> {
    let uuid = parse_id(id)?;
    let due = req.due_at.map(from_unix).transpose()?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "UPDATE assignments SET
                    title = COALESCE($2, title),
                    description = COALESCE($3, description),
                    subject = COALESCE($4, subject),
                    due_at = COALESCE($5, due_at),
                    max_points = COALESCE($6, max_points),
                    updated_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                ASSIGNMENT_COLUMNS
            ),
            &[
                &uuid,
                &req.title,
                &req.description,
                &req.subject,
                &due,
                &req.max_points,
            ],
        )
        .await?;

    Ok(row.as_ref().map(assignment_from_row))
}

pub async fn delete_assignment(pool: &Pool, id: &str) -> Result<bool> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let deleted = client
        .execute("DELETE FROM assignments WHERE id = $1", &[&uuid])
        .await?;
    Ok(deleted > 0)
}

// ============================================================================
// SUBMISSIONS
// ============================================================================

const SUBMISSION_COLUMNS: &str =
    "id, assignment_id, student_id, content, submitted_at, score, feedback, graded_at";

fn submission_from_row(row: &Row) -> AssignmentSubmission {
    AssignmentSubmission {
        id: id_at(row, 0),
        assignment_id: id_at(row, 1),
        student_id: id_at(row, 2),
        content: row.get(3),
        submitted_at: ts_at(row, 4),
        score: row.get(5),
        feedback: row.get(6),
        graded_at: opt_ts_at(row, 7),
    }
}

/// Returns `None` if the student already submitted this assignment
pub async fn create_submission(
    pool: &Pool,
    assignment_id: &str,
    student_id: &str,
    content: &str,
) -> Result<Option<AssignmentSubmission>> {
    let assignment = parse_id(assignment_id)?;
    let student = parse_id(student_id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "INSERT INTO assignment_submissions (assignment_id, student_id, content)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (assignment_id, student_id) DO NOTHING
                 RETURNING {}",
                SUBMISSION_COLUMNS
            ),
            &[&assignment, &student, &content],
        )
        .await?;

    Ok(row.as_ref().map(submission_from_row))
}

pub async fn get_submission(pool: &Pool, id: &str) -> Result<Option<AssignmentSubmission>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM assignment_submissions WHERE id = $1",
                SUBMISSION_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(submission_from_row))
}

/// Submissions for an assignment, optionally restricted to one student
pub async fn list_submissions(
    pool: &Pool,
    assignment_id: &str,
    student_id: Option<&str>,
) -> Result<Vec<AssignmentSubmission>> {
    let assignment = parse_id(assignment_id)?;
    let student = parse_opt_id(student_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM assignment_submissions
                 WHERE assignment_id = $1 AND ($2::UUID IS NULL OR student_id = $2)
                 ORDER BY submitted_at ASC",
                SUBMISSION_COLUMNS
            ),
            &[&assignment, &student],
        )
        .await?;

    Ok(rows.iter().map(submission_from_row).collect())
}

pub async fn list_user_submissions(pool: &Pool, user_id: &str) -> Result<Vec<AssignmentSubmission>> {
    let uuid = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM assignment_submissions
                 WHERE student_id = $1
                 ORDER BY submitted_at ASC",
                SUBMISSION_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(rows.iter().map(submission_from_row).collect())
}

/// Other students' submissions to the same assignment
pub async fn list_peer_submissions(
    pool: &Pool,
    submission: &AssignmentSubmission,
) -> Result<Vec<AssignmentSubmission>> {
    let assignment = parse_id(&submission.assignment_id)?;
    let student = parse_id(&submission.student_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM assignment_submissions
                 WHERE assignment_id = $1 AND student_id <> $2 AND content <> ''",
                SUBMISSION_COLUMNS
            ),
            &[&assignment, &student],
        )
        .await?;

    Ok(rows.iter().map(submission_from_row).collect())
}

pub async fn grade_submission(
    pool: &Pool,
    id: &str,
    score: i32,
    feedback: Option<&str>,
) -> Result<Option<AssignmentSubmission>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "UPDATE assignment_submissions
                 SET score = $2, feedback = $3, graded_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                SUBMISSION_COLUMNS
            ),
            &[&uuid, &score, &feedback],
        )
        .await?;

    Ok(row.as_ref().map(submission_from_row))
}

// ============================================================================
// ANALYSIS & MILESTONES
// ============================================================================

const MILESTONE_COLUMNS: &str = "id, assignment_id, position, title, description, points";

fn milestone_from_row(row: &Row) -> Milestone {
    Milestone {
        id: id_at(row, 0),
        assignment_id: id_at(row, 1),
        position: row.get(2),
        title: row.get(3),
        description: row.get(4),
        points: row.get(5),
    }
}

/// Store an analysis and replace the assignment's milestones with the
/// suggested ones.
pub async fn save_analysis(
    pool: &Pool,
    assignment_id: &str,
    analysis: &Analysis,
) -> Result<AnalysisResult> {
    let assignment = parse_id(assignment_id)?;
    let skills = serde_json::to_value(&analysis.skills)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_one(
            "INSERT INTO analysis_results
                (assignment_id, word_count, difficulty, estimated_hours, skills)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, created_at",
            &[
                &assignment,
                &analysis.word_count,
                &analysis.difficulty.as_str(),
                &analysis.estimated_hours,
                &skills,
            ],
        )
        .await?;

    tx.execute(
        "DELETE FROM milestones WHERE assignment_id = $1",
        &[&assignment],
    )
    .await?;

    let mut milestones = Vec::with_capacity(analysis.milestones.len());
    for (position, planned) in analysis.milestones.iter().enumerate() {
        let position = position as i32;
        let m = tx
            .query_one(
                &format!(
                    "INSERT INTO milestones (assignment_id, position, title, description, points)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING {}",
                    MILESTONE_COLUMNS
                ),
                &[
                    &assignment,
                    &position,
                    &planned.title,
                    &planned.description,
                    &planned.points,
                ],
            )
            .await?;
        milestones.push(milestone_from_row(&m));
    }

    tx.commit().await?;

    Ok(AnalysisResult {
        id: id_at(&row, 0),
        assignment_id: assignment_id.to_string(),
        word_count: analysis.word_count,
        difficulty: analysis.difficulty,
        estimated_hours: analysis.estimated_hours,
        skills: analysis.skills.clone(),
        milestones,
        created_at: ts_at(&row, 1),
    })
}

pub async fn get_latest_analysis(pool: &Pool, assignment_id: &str) -> Result<Option<AnalysisResult>> {
    let assignment = parse_id(assignment_id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT id, word_count, difficulty, estimated_hours, skills, created_at
             FROM analysis_results
             WHERE assignment_id = $1
             ORDER BY created_at DESC
             LIMIT 1",
            &[&assignment],
        )
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let milestones = list_milestones(pool, assignment_id).await?;

    Ok(Some(AnalysisResult {
        id: id_at(&row, 0),
        assignment_id: assignment_id.to_string(),
        word_count: row.get(1),
        difficulty: Difficulty::from(row.get::<_, String>(2).as_str()),
        estimated_hours: row.get(3),
        skills: string_list_at(&row, 4),
        milestones,
        created_at: ts_at(&row, 5),
    }))
}

pub async fn list_milestones(pool: &Pool, assignment_id: &str) -> Result<Vec<Milestone>> {
    let assignment = parse_id(assignment_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM milestones WHERE assignment_id = $1 ORDER BY position",
                MILESTONE_COLUMNS
            ),
            &[&assignment],
        )
        .await?;

    Ok(rows.iter().map(milestone_from_row).collect())
}

pub async fn get_milestone(pool: &Pool, id: &str) -> Result<Option<Milestone>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {} FROM milestones WHERE id = $1", MILESTONE_COLUMNS),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(milestone_from_row))
}

/// Returns false if the user had already completed the milestone
pub async fn complete_milestone(pool: &Pool, milestone_id: &str, user_id: &str) -> Result<bool> {
    let milestone = parse_id(milestone_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let inserted = client
        .execute(
            "INSERT INTO milestone_completions (milestone_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
            &[&milestone, &user],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn completed_milestone_ids(
    pool: &Pool,
    assignment_id: &str,
    user_id: &str,
) -> Result<HashSet<String>> {
    let assignment = parse_id(assignment_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT mc.milestone_id FROM milestone_completions mc
             JOIN milestones m ON m.id = mc.milestone_id
             WHERE m.assignment_id = $1 AND mc.user_id = $2",
            &[&assignment, &user],
        )
        .await?;

    Ok(rows.iter().map(|r| id_at(r, 0)).collect())
}

// ============================================================================
// PATHWAYS
// ============================================================================

const CHECKPOINT_COLUMNS: &str = "id, pathway_id, position, title, description, points";

fn checkpoint_from_row(row: &Row) -> crate::models::Checkpoint {
    crate::models::Checkpoint {
        id: id_at(row, 0),
        pathway_id: id_at(row, 1),
        position: row.get(2),
        title: row.get(3),
        description: row.get(4),
        points: row.get(5),
    }
}

pub async fn create_pathway(
    pool: &Pool,
    created_by: &str,
    title: &str,
    description: &str,
    checkpoints: &[NewCheckpoint],
) -> Result<Pathway> {
    let creator = parse_id(created_by)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_one(
            "INSERT INTO pathways (title, description, created_by)
             VALUES ($1, $2, $3)
             RETURNING id, created_at",
            &[&title, &description, &creator],
        )
        .await?;
    let pathway_id: Uuid = row.get(0);

    let mut stored = Vec::with_capacity(checkpoints.len());
    for (position, cp) in checkpoints.iter().enumerate() {
        let position = position as i32;
        let c = tx
            .query_one(
                &format!(
                    "INSERT INTO checkpoints (pathway_id, position, title, description, points)
                     VALUES ($1, $2, $3, $4, $5)
                     RETURNING {}",
                    CHECKPOINT_COLUMNS
                ),
                &[&pathway_id, &position, &cp.title, &cp.description, &cp.points],
            )
            .await?;
        stored.push(checkpoint_from_row(&c));
    }

    tx.commit().await?;

    Ok(Pathway {
        id: pathway_id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        created_by: created_by.to_string(),
        created_at: ts_at(&row, 1),
        checkpoints: stored,
    })
}

pub async fn list_pathways(pool: &Pool) -> Result<Vec<PathwaySummary>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT p.id, p.title, p.description, COUNT(c.id), p.created_at
             FROM pathways p
             LEFT JOIN checkpoints c ON c.pathway_id = p.id
             GROUP BY p.id
             ORDER BY p.created_at DESC",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| PathwaySummary {
            id: id_at(row, 0),
            title: row.get(1),
            description: row.get(2),
            checkpoint_count: row.get(3),
            created_at: ts_at(row, 4),
        })
        .collect())
}

pub async fn get_pathway(pool: &Pool, id: &str) -> Result<Option<Pathway>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let Some(row) = client
        .query_opt(
            "SELECT id, title, description, created_by, created_at FROM pathways WHERE id = $1",
            &[&uuid],
        )
        .await?
    else {
        return Ok(None);
    };

    let checkpoints = client
        .query(
            &format!(
                "SELECT {} FROM checkpoints WHERE pathway_id = $1 ORDER BY position",
                CHECKPOINT_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(Some(Pathway {
        id: id_at(&row, 0),
        title: row.get(1),
        description: row.get(2),
        created_by: id_at(&row, 3),
        created_at: ts_at(&row, 4),
        checkpoints: checkpoints.iter().map(checkpoint_from_row).collect(),
    }))
}

/// Returns false if the user is already enrolled
pub async fn enroll(pool: &Pool, pathway_id: &str, user_id: &str) -> Result<bool> {
    let pathway = parse_id(pathway_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let inserted = client
        .execute(
            "INSERT INTO pathway_progress (pathway_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
            &[&pathway, &user],
        )
        .await?;
    Ok(inserted > 0)
}

const PROGRESS_SELECT: &str = "SELECT p.pathway_id, p.user_id,
        (SELECT COUNT(*) FROM checkpoint_completions cc
           JOIN checkpoints c ON c.id = cc.checkpoint_id
          WHERE c.pathway_id = p.pathway_id AND cc.user_id = p.user_id),
        (SELECT COUNT(*) FROM checkpoints c WHERE c.pathway_id = p.pathway_id),
        p.enrolled_at, p.completed_at
     FROM pathway_progress p";

fn progress_from_row(row: &Row) -> PathwayProgress {
    let completed: i64 = row.get(2);
    let total: i64 = row.get(3);
    PathwayProgress {
        pathway_id: id_at(row, 0),
        user_id: id_at(row, 1),
        completed_checkpoints: completed,
        total_checkpoints: total,
        percent: PathwayProgress::percent_of(completed, total),
        enrolled_at: ts_at(row, 4),
        completed_at: opt_ts_at(row, 5),
    }
}

/// `None` when the user is not enrolled
pub async fn get_progress(
    pool: &Pool,
    pathway_id: &str,
    user_id: &str,
) -> Result<Option<PathwayProgress>> {
    let pathway = parse_id(pathway_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("{} WHERE p.pathway_id = $1 AND p.user_id = $2", PROGRESS_SELECT),
            &[&pathway, &user],
        )
        .await?;

    Ok(row.as_ref().map(progress_from_row))
}

pub async fn list_user_progress(pool: &Pool, user_id: &str) -> Result<Vec<PathwayProgress>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!("{} WHERE p.user_id = $1 ORDER BY p.enrolled_at", PROGRESS_SELECT),
            &[&user],
        )
        .await?;

    Ok(rows.iter().map(progress_from_row).collect())
}

pub async fn completed_checkpoint_ids(
    pool: &Pool,
    pathway_id: &str,
    user_id: &str,
) -> Result<HashSet<String>> {
    let pathway = parse_id(pathway_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT cc.checkpoint_id FROM checkpoint_completions cc
             JOIN checkpoints c ON c.id = cc.checkpoint_id
             WHERE c.pathway_id = $1 AND cc.user_id = $2",
            &[&pathway, &user],
        )
        .await?;

    Ok(rows.iter().map(|r| id_at(r, 0)).collect())
}

/// Returns false if the checkpoint was already completed
pub async fn complete_checkpoint(pool: &Pool, checkpoint_id: &str, user_id: &str) -> Result<bool> {
    let checkpoint = parse_id(checkpoint_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let inserted = client
        .execute(
            "INSERT INTO checkpoint_completions (checkpoint_id, user_id)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
            &[&checkpoint, &user],
        )
        .await?;
    Ok(inserted > 0)
}

/// Returns true only for the call that actually marked completion
pub async fn mark_pathway_completed(pool: &Pool, pathway_id: &str, user_id: &str) -> Result<bool> {
    let pathway = parse_id(pathway_id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let updated = client
        .execute(
            "UPDATE pathway_progress SET completed_at = NOW()
             WHERE pathway_id = $1 AND user_id = $2 AND completed_at IS NULL",
            &[&pathway, &user],
        )
        .await?;
    Ok(updated > 0)
}

// ============================================================================
// POINTS LEDGER
// ============================================================================

const TRANSACTION_COLUMNS: &str =
    "id, user_id, action, amount, balance_after, source_id, description, created_at";

fn transaction_from_row(row: &Row) -> PointsTransaction {
    PointsTransaction {
        id: id_at(row, 0),
        user_id: id_at(row, 1),
        action: PointsAction::from(row.get::<_, String>(2).as_str()),
        amount: row.get(3),
        balance_after: row.get(4),
        source_id: row.get(5),
        description: row.get(6),
        created_at: ts_at(row, 7),
    }
}

/// Credit `amount` points and append the ledger row in one transaction
pub async fn record_points(
    pool: &Pool,
    user_id: &str,
    action: PointsAction,
    amount: i64,
    source_id: Option<&str>,
    description: Option<&str>,
) -> Result<PointsTransaction> {
    if amount <= 0 {
        return Err(anyhow!("Credited amount must be positive, got {}", amount));
    }
    let user = parse_id(user_id)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let balance_row = tx
        .query_one(
            "INSERT INTO points_balances (user_id, balance, lifetime_earned, updated_at)
             VALUES ($1, $2, $2, NOW())
             ON CONFLICT (user_id) DO UPDATE SET
                balance = points_balances.balance + EXCLUDED.balance,
                lifetime_earned = points_balances.lifetime_earned + EXCLUDED.lifetime_earned,
                updated_at = NOW()
             RETURNING balance",
            &[&user, &amount],
        )
        .await?;
    let balance_after: i64 = balance_row.get(0);

    let row = tx
        .query_one(
            &format!(
                "INSERT INTO points_transactions
                    (user_id, action, amount, balance_after, source_id, description)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 RETURNING {}",
                TRANSACTION_COLUMNS
            ),
            &[
                &user,
                &action.as_str(),
                &amount,
                &balance_after,
                &source_id,
                &description,
            ],
        )
        .await?;

    tx.commit().await?;
    Ok(transaction_from_row(&row))
}

/// Debit `amount` points. Returns `None` (and writes nothing) when the
/// balance does not cover it.
pub async fn spend_points(
    pool: &Pool,
    user_id: &str,
    amount: i64,
    reward: &str,
) -> Result<Option<PointsTransaction>> {
    let user = parse_id(user_id)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let Some(balance_row) = tx
        .query_opt(
            "UPDATE points_balances
             SET balance = balance - $2, updated_at = NOW()
             WHERE user_id = $1 AND balance >= $2
             RETURNING balance",
            &[&user, &amount],
        )
        .await?
    else {
        return Ok(None);
    };
    let balance_after: i64 = balance_row.get(0);

    let row = tx
        .query_one(
            &format!(
                "INSERT INTO points_transactions
                    (user_id, action, amount, balance_after, description)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {}",
                TRANSACTION_COLUMNS
            ),
            &[
                &user,
                &PointsAction::Redemption.as_str(),
                &(-amount),
                &balance_after,
                &reward,
            ],
        )
        .await?;

    tx.commit().await?;
    Ok(Some(transaction_from_row(&row)))
}

/// Recent activity the fraud detector scores an award against
#[derive(Debug, Clone, Default)]
pub struct AwardActivity {
    pub awards_last_hour: i64,
    pub duplicate_source_awards: i64,
    pub earned_today: i64,
    pub account_age_hours: i64,
}

pub async fn get_award_activity(
    pool: &Pool,
    user_id: &str,
    action: PointsAction,
    source_id: Option<&str>,
) -> Result<AwardActivity> {
    let user = parse_id(user_id)?;
    let learner_actions = PointsAction::daily_cap_actions();
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT
                (SELECT COUNT(*) FROM points_transactions
                  WHERE user_id = $1 AND amount > 0 AND action = ANY($4)
                    AND created_at > NOW() - INTERVAL '1 hour'),
                (SELECT COUNT(*) FROM points_transactions
                  WHERE user_id = $1 AND action = $2
                    AND $3::TEXT IS NOT NULL AND source_id = $3),
                (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM points_transactions
                  WHERE user_id = $1 AND amount > 0 AND action = ANY($4)
                    AND created_at >= date_trunc('day', NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC'),
                (SELECT (EXTRACT(EPOCH FROM (NOW() - created_at)) / 3600)::BIGINT
                   FROM users WHERE id = $1)",
            &[&user, &action.as_str(), &source_id, &learner_actions],
        )
        .await?;

    Ok(AwardActivity {
        awards_last_hour: row.get(0),
        duplicate_source_awards: row.get(1),
        earned_today: row.get(2),
        account_age_hours: row.get::<_, Option<i64>>(3).unwrap_or(0),
    })
}

pub async fn get_balance(pool: &Pool, user_id: &str) -> Result<PointsBalance> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            "SELECT balance, lifetime_earned FROM points_balances WHERE user_id = $1",
            &[&user],
        )
        .await?;

    Ok(PointsBalance {
        user_id: user_id.to_string(),
        balance: row.as_ref().map(|r| r.get(0)).unwrap_or(0),
        lifetime_earned: row.as_ref().map(|r| r.get(1)).unwrap_or(0),
    })
}

/// Newest first
pub async fn list_transactions(
    pool: &Pool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<PointsTransaction>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM points_transactions
                 WHERE user_id = $1
                 ORDER BY created_at DESC, id
                 LIMIT $2",
                TRANSACTION_COLUMNS
            ),
            &[&user, &limit],
        )
        .await?;

    Ok(rows.iter().map(transaction_from_row).collect())
}

pub async fn get_leaderboard(pool: &Pool, limit: i64) -> Result<Vec<LeaderboardEntry>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT b.user_id, u.name, b.balance, b.lifetime_earned
             FROM points_balances b
             JOIN users u ON u.id = b.user_id
             WHERE u.deleted_at IS NULL
             ORDER BY b.balance DESC, b.lifetime_earned DESC, u.created_at ASC
             LIMIT $1",
            &[&limit],
        )
        .await?;

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, row)| LeaderboardEntry {
            rank: (i + 1) as u32,
            user_id: id_at(row, 0),
            name: row.get(1),
            balance: row.get(2),
            lifetime_earned: row.get(3),
        })
        .collect())
}

// ============================================================================
// FRAUD LOGS
// ============================================================================

pub async fn create_fraud_log(
    pool: &Pool,
    user_id: &str,
    action: PointsAction,
    amount: i64,
    score: i32,
    reasons: &[String],
    blocked: bool,
) -> Result<()> {
    let user = parse_id(user_id)?;
    let reasons = serde_json::to_value(reasons)?;
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO fraud_logs (user_id, action, amount, score, reasons, blocked)
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[&user, &action.as_str(), &amount, &score, &reasons, &blocked],
        )
        .await?;
    Ok(())
}

pub async fn list_fraud_logs(
    pool: &Pool,
    user_id: Option<&str>,
    limit: i64,
) -> Result<Vec<FraudLog>> {
    let user = parse_opt_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id, user_id, action, amount, score, reasons, blocked, created_at
             FROM fraud_logs
             WHERE ($1::UUID IS NULL OR user_id = $1)
             ORDER BY created_at DESC
             LIMIT $2",
            &[&user, &limit],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| FraudLog {
            id: id_at(row, 0),
            user_id: id_at(row, 1),
            action: PointsAction::from(row.get::<_, String>(2).as_str()),
            amount: row.get(3),
            score: row.get(4),
            reasons: string_list_at(row, 5),
            blocked: row.get(6),
            created_at: ts_at(row, 7),
        })
        .collect())
}

pub async fn fraud_summary(pool: &Pool, top: i64) -> Result<FraudSummary> {
    let client = pool.get().await?;

    let totals = client
        .query_one(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE blocked) FROM fraud_logs",
            &[],
        )
        .await?;
    let total: i64 = totals.get(0);
    let blocked: i64 = totals.get(1);

    let reason_rows = client
        .query(
            "SELECT r, COUNT(*) FROM fraud_logs, jsonb_array_elements_text(reasons) AS r
             GROUP BY r",
            &[],
        )
        .await?;
    let by_reason: BTreeMap<String, i64> = reason_rows
        .iter()
        .map(|row| (row.get(0), row.get(1)))
        .collect();

    let user_rows = client
        .query(
            "SELECT user_id, COUNT(*), COUNT(*) FILTER (WHERE blocked), MAX(score)
             FROM fraud_logs
             GROUP BY user_id
             ORDER BY COUNT(*) DESC, MAX(score) DESC
             LIMIT $1",
            &[&top],
        )
        .await?;
    let top_users = user_rows
        .iter()
        .map(|row| FraudUserCount {
            user_id: id_at(row, 0),
            flags: row.get(1),
            blocked: row.get(2),
            max_score: row.get(3),
        })
        .collect();

    Ok(FraudSummary {
        total,
        flagged: total - blocked,
        blocked,
        by_reason,
        top_users,
    })
}

// ============================================================================
// ACHIEVEMENTS
// ============================================================================

pub async fn list_achievements(pool: &Pool) -> Result<Vec<Achievement>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT code, name, description, metric, threshold, reward_points
             FROM achievements
             ORDER BY metric, threshold, code",
            &[],
        )
        .await?;

    Ok(rows
        .iter()
        .map(|row| Achievement {
            code: row.get(0),
            name: row.get(1),
            description: row.get(2),
            metric: AchievementMetric::from(row.get::<_, String>(3).as_str()),
            threshold: row.get(4),
            reward_points: row.get(5),
        })
        .collect())
}

/// Achievement code -> unlock time
pub async fn get_user_achievement_times(pool: &Pool, user_id: &str) -> Result<HashMap<String, i64>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT achievement_code, unlocked_at FROM user_achievements WHERE user_id = $1",
            &[&user],
        )
        .await?;

    Ok(rows.iter().map(|row| (row.get(0), ts_at(row, 1))).collect())
}

/// Returns false if it was already unlocked
pub async fn unlock_achievement(pool: &Pool, user_id: &str, code: &str) -> Result<bool> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let inserted = client
        .execute(
            "INSERT INTO user_achievements (user_id, achievement_code)
             VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
            &[&user, &code],
        )
        .await?;
    Ok(inserted > 0)
}

pub async fn get_user_stats(pool: &Pool, user_id: &str) -> Result<UserStats> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT
                COALESCE((SELECT lifetime_earned FROM points_balances WHERE user_id = $1), 0),
                (SELECT COUNT(*) FROM assignment_submissions WHERE student_id = $1),
                (SELECT COUNT(*) FROM milestone_completions WHERE user_id = $1),
                (SELECT COUNT(*) FROM checkpoint_completions WHERE user_id = $1),
                (SELECT COUNT(*) FROM pathway_progress
                  WHERE user_id = $1 AND completed_at IS NOT NULL),
                (SELECT COUNT(*) FROM tutoring_sessions
                  WHERE user_id = $1 AND status = 'ended')",
            &[&user],
        )
        .await?;

    Ok(UserStats {
        lifetime_points: row.get(0),
        submissions: row.get(1),
        milestones_completed: row.get(2),
        checkpoints_completed: row.get(3),
        pathways_completed: row.get(4),
        tutoring_sessions: row.get(5),
    })
}

// ============================================================================
// TUTORING
// ============================================================================

const TUTORING_SESSION_COLUMNS: &str =
    "id, user_id, subject, assignment_id, status, started_at, ended_at";

fn tutoring_session_from_row(row: &Row) -> TutoringSession {
    TutoringSession {
        id: id_at(row, 0),
        user_id: id_at(row, 1),
        subject: row.get(2),
        assignment_id: opt_id_at(row, 3),
        status: TutoringStatus::from(row.get::<_, String>(4).as_str()),
        started_at: ts_at(row, 5),
        ended_at: opt_ts_at(row, 6),
    }
}

fn tutoring_message_from_row(row: &Row) -> TutoringMessage {
    TutoringMessage {
        id: id_at(row, 0),
        session_id: id_at(row, 1),
        sender: MessageSender::from(row.get::<_, String>(2).as_str()),
        content: row.get(3),
        created_at: ts_at(row, 4),
    }
}

pub async fn create_tutoring_session(
    pool: &Pool,
    user_id: &str,
    subject: &str,
    assignment_id: Option<&str>,
) -> Result<TutoringSession> {
    let user = parse_id(user_id)?;
    let assignment = parse_opt_id(assignment_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO tutoring_sessions (user_id, subject, assignment_id)
                 VALUES ($1, $2, $3)
                 RETURNING {}",
                TUTORING_SESSION_COLUMNS
            ),
            &[&user, &subject, &assignment],
        )
        .await?;

    Ok(tutoring_session_from_row(&row))
}

pub async fn get_tutoring_session(pool: &Pool, id: &str) -> Result<Option<TutoringSession>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "SELECT {} FROM tutoring_sessions WHERE id = $1",
                TUTORING_SESSION_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(tutoring_session_from_row))
}

pub async fn list_tutoring_sessions(pool: &Pool, user_id: &str) -> Result<Vec<TutoringSession>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM tutoring_sessions WHERE user_id = $1 ORDER BY started_at DESC",
                TUTORING_SESSION_COLUMNS
            ),
            &[&user],
        )
        .await?;

    Ok(rows.iter().map(tutoring_session_from_row).collect())
}

/// Store a student turn and the tutor's answer together
pub async fn add_tutoring_exchange(
    pool: &Pool,
    session_id: &str,
    question: &str,
    answer: &str,
) -> Result<(TutoringMessage, TutoringMessage)> {
    let session = parse_id(session_id)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let insert = "INSERT INTO tutoring_messages (session_id, sender, content)
                  VALUES ($1, $2, $3)
                  RETURNING id, session_id, sender, content, created_at";
    let question_row = tx
        .query_one(insert, &[&session, &MessageSender::Student.as_str(), &question])
        .await?;
    let answer_row = tx
        .query_one(insert, &[&session, &MessageSender::Tutor.as_str(), &answer])
        .await?;

    tx.commit().await?;
    Ok((
        tutoring_message_from_row(&question_row),
        tutoring_message_from_row(&answer_row),
    ))
}

/// Oldest first
pub async fn list_tutoring_messages(pool: &Pool, session_id: &str) -> Result<Vec<TutoringMessage>> {
    let session = parse_id(session_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id, session_id, sender, content, created_at
             FROM tutoring_messages
             WHERE session_id = $1
             ORDER BY created_at, id",
            &[&session],
        )
        .await?;

    Ok(rows.iter().map(tutoring_message_from_row).collect())
}

/// Returns `None` if the session was not active
pub async fn end_tutoring_session(pool: &Pool, id: &str) -> Result<Option<TutoringSession>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "UPDATE tutoring_sessions SET status = 'ended', ended_at = NOW()
                 WHERE id = $1 AND status = 'active'
                 RETURNING {}",
                TUTORING_SESSION_COLUMNS
            ),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(tutoring_session_from_row))
}

pub async fn count_student_messages(pool: &Pool, session_id: &str) -> Result<i64> {
    let session = parse_id(session_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT COUNT(*) FROM tutoring_messages WHERE session_id = $1 AND sender = 'student'",
            &[&session],
        )
        .await?;
    Ok(row.get(0))
}

// ============================================================================
// INTEGRITY REPORTS
// ============================================================================

const REPORT_COLUMNS: &str = "id, submission_id, reporter_id, kind, status, description, \
     resolution, similarity, created_at, updated_at";

fn report_from_row(row: &Row) -> IntegrityReport {
    IntegrityReport {
        id: id_at(row, 0),
        submission_id: id_at(row, 1),
        reporter_id: opt_id_at(row, 2),
        kind: ReportKind::parse(&row.get::<_, String>(3)).unwrap_or(ReportKind::Other),
        status: ReportStatus::parse(&row.get::<_, String>(4)).unwrap_or(ReportStatus::Open),
        description: row.get(5),
        resolution: row.get(6),
        similarity: row.get(7),
        created_at: ts_at(row, 8),
        updated_at: ts_at(row, 9),
    }
}

pub async fn create_integrity_report(
    pool: &Pool,
    submission_id: &str,
    reporter_id: Option<&str>,
    kind: ReportKind,
    description: &str,
    similarity: Option<f64>,
) -> Result<IntegrityReport> {
    let submission = parse_id(submission_id)?;
    let reporter = parse_opt_id(reporter_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO integrity_reports
                    (submission_id, reporter_id, kind, description, similarity)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {}",
                REPORT_COLUMNS
            ),
            &[&submission, &reporter, &kind.as_str(), &description, &similarity],
        )
        .await?;

    Ok(report_from_row(&row))
}

pub async fn get_integrity_report(pool: &Pool, id: &str) -> Result<Option<IntegrityReport>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!("SELECT {} FROM integrity_reports WHERE id = $1", REPORT_COLUMNS),
            &[&uuid],
        )
        .await?;

    Ok(row.as_ref().map(report_from_row))
}

/// Reports newest first. `teacher_id` limits them to submissions on that
/// teacher's assignments.
pub async fn list_integrity_reports(
    pool: &Pool,
    status: Option<ReportStatus>,
    teacher_id: Option<&str>,
    limit: i64,
) -> Result<Vec<IntegrityReport>> {
    let status = status.map(|s| s.as_str());
    let teacher = parse_opt_id(teacher_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM integrity_reports
                 WHERE ($1::TEXT IS NULL OR status = $1)
                   AND ($3::UUID IS NULL OR submission_id IN (
                        SELECT s.id FROM assignment_submissions s
                        JOIN assignments a ON a.id = s.assignment_id
                        WHERE a.teacher_id = $3))
                 ORDER BY created_at DESC
                 LIMIT $2",
                REPORT_COLUMNS
            ),
            &[&status, &limit, &teacher],
        )
        .await?;

    Ok(rows.iter().map(report_from_row).collect())
}

/// Move a report from `from` to `to`. Returns `None` if its status changed
/// concurrently.
pub async fn update_report_status(
    pool: &Pool,
    id: &str,
    from: ReportStatus,
    to: ReportStatus,
    resolution: Option<&str>,
) -> Result<Option<IntegrityReport>> {
    let uuid = parse_id(id)?;
    let client = pool.get().await?;
    let row = client
        .query_opt(
            &format!(
                "UPDATE integrity_reports
                 SET status = $3, resolution = COALESCE($4, resolution), updated_at = NOW()
                 WHERE id = $1 AND status = $2
                 RETURNING {}",
                REPORT_COLUMNS
            ),
            &[&uuid, &from.as_str(), &to.as_str(), &resolution],
        )
        .await?;

    Ok(row.as_ref().map(report_from_row))
}

/// Whether an unresolved report of this kind exists for the submission
pub async fn has_open_report(pool: &Pool, submission_id: &str, kind: ReportKind) -> Result<bool> {
    let submission = parse_id(submission_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            "SELECT EXISTS(
                SELECT 1 FROM integrity_reports
                WHERE submission_id = $1 AND kind = $2
                  AND status IN ('open', 'investigating'))",
            &[&submission, &kind.as_str()],
        )
        .await?;
    Ok(row.get(0))
}

// ============================================================================
// PRIVACY
// ============================================================================

pub async fn record_consent(
    pool: &Pool,
    user_id: &str,
    purpose: ConsentPurpose,
    granted: bool,
) -> Result<ConsentRecord> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            "INSERT INTO privacy_consents (user_id, purpose, granted)
             VALUES ($1, $2, $3)
             RETURNING id, created_at",
            &[&user, &purpose.as_str(), &granted],
        )
        .await?;

    Ok(ConsentRecord {
        id: id_at(&row, 0),
        user_id: user_id.to_string(),
        purpose,
        granted,
        created_at: ts_at(&row, 1),
    })
}

/// Full consent history, oldest first
pub async fn list_consents(pool: &Pool, user_id: &str) -> Result<Vec<ConsentRecord>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            "SELECT id, purpose, granted, created_at
             FROM privacy_consents
             WHERE user_id = $1
             ORDER BY created_at, id",
            &[&user],
        )
        .await?;

    Ok(rows
        .iter()
        .filter_map(|row| {
            let purpose = ConsentPurpose::parse(&row.get::<_, String>(1))?;
            Some(ConsentRecord {
                id: id_at(row, 0),
                user_id: user_id.to_string(),
                purpose,
                granted: row.get(2),
                created_at: ts_at(row, 3),
            })
        })
        .collect())
}

const PRIVACY_REQUEST_COLUMNS: &str = "id, user_id, kind, status, created_at, completed_at";

fn privacy_request_from_row(row: &Row) -> PrivacyRequest {
    PrivacyRequest {
        id: id_at(row, 0),
        user_id: id_at(row, 1),
        kind: PrivacyRequestKind::from(row.get::<_, String>(2).as_str()),
        status: row.get(3),
        created_at: ts_at(row, 4),
        completed_at: opt_ts_at(row, 5),
    }
}

/// Record a fulfilled privacy request
pub async fn create_privacy_request(
    pool: &Pool,
    user_id: &str,
    kind: PrivacyRequestKind,
) -> Result<PrivacyRequest> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO privacy_requests (user_id, kind, status, completed_at)
                 VALUES ($1, $2, 'completed', NOW())
                 RETURNING {}",
                PRIVACY_REQUEST_COLUMNS
            ),
            &[&user, &kind.as_str()],
        )
        .await?;

    Ok(privacy_request_from_row(&row))
}

pub async fn list_privacy_requests(pool: &Pool, user_id: &str) -> Result<Vec<PrivacyRequest>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM privacy_requests WHERE user_id = $1 ORDER BY created_at",
                PRIVACY_REQUEST_COLUMNS
            ),
            &[&user],
        )
        .await?;

    Ok(rows.iter().map(privacy_request_from_row).collect())
}

/// Anonymize an account and drop its personal content in one transaction.
///
/// The user row, ledger and achievements stay so aggregate figures remain
/// consistent.
pub async fn erase_user(
    pool: &Pool,
    user_id: &str,
    anonymized_email: &str,
    anonymized_name: &str,
) -> Result<PrivacyRequest> {
    let user = parse_id(user_id)?;
    let mut client = pool.get().await?;
    let tx = client.transaction().await?;

    let updated = tx
        .execute(
            "UPDATE users
             SET email = $2, name = $3, password_hash = '', deleted_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
            &[&user, &anonymized_email, &anonymized_name],
        )
        .await?;
    if updated == 0 {
        return Err(anyhow!("User {} not found or already erased", user_id));
    }

    tx.execute(
        "UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        &[&user],
    )
    .await?;
    tx.execute("DELETE FROM tutoring_sessions WHERE user_id = $1", &[&user])
        .await?;
    tx.execute("DELETE FROM portfolio_items WHERE user_id = $1", &[&user])
        .await?;
    tx.execute(
        "UPDATE assignment_submissions SET content = '', feedback = NULL WHERE student_id = $1",
        &[&user],
    )
    .await?;

    let row = tx
        .query_one(
            &format!(
                "INSERT INTO privacy_requests (user_id, kind, status, completed_at)
                 VALUES ($1, 'deletion', 'completed', NOW())
                 RETURNING {}",
                PRIVACY_REQUEST_COLUMNS
            ),
            &[&user],
        )
        .await?;

    tx.commit().await?;
    Ok(privacy_request_from_row(&row))
}

// ============================================================================
// PORTFOLIO
// ============================================================================

const PORTFOLIO_COLUMNS: &str = "id, user_id, title, description, submission_id, tags, created_at";

fn portfolio_item_from_row(row: &Row) -> PortfolioItem {
    PortfolioItem {
        id: id_at(row, 0),
        user_id: id_at(row, 1),
        title: row.get(2),
        description: row.get(3),
        submission_id: opt_id_at(row, 4),
        tags: string_list_at(row, 5),
        created_at: ts_at(row, 6),
    }
}

pub async fn create_portfolio_item(
    pool: &Pool,
    user_id: &str,
    title: &str,
    description: &str,
    submission_id: Option<&str>,
    tags: &[String],
) -> Result<PortfolioItem> {
    let user = parse_id(user_id)?;
    let submission = parse_opt_id(submission_id)?;
    let tags = serde_json::to_value(tags)?;
    let client = pool.get().await?;
    let row = client
        .query_one(
            &format!(
                "INSERT INTO portfolio_items (user_id, title, description, submission_id, tags)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {}",
                PORTFOLIO_COLUMNS
            ),
            &[&user, &title, &description, &submission, &tags],
        )
        .await?;

    Ok(portfolio_item_from_row(&row))
}

/// Oldest first, the order items appear in an export
pub async fn list_portfolio_items(pool: &Pool, user_id: &str) -> Result<Vec<PortfolioItem>> {
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let rows = client
        .query(
            &format!(
                "SELECT {} FROM portfolio_items WHERE user_id = $1 ORDER BY created_at, id",
                PORTFOLIO_COLUMNS
            ),
            &[&user],
        )
        .await?;

    Ok(rows.iter().map(portfolio_item_from_row).collect())
}

/// Returns false if no such item belongs to the user
pub async fn delete_portfolio_item(pool: &Pool, id: &str, user_id: &str) -> Result<bool> {
    let uuid = parse_id(id)?;
    let user = parse_id(user_id)?;
    let client = pool.get().await?;
    let deleted = client
        .execute(
            "DELETE FROM portfolio_items WHERE id = $1 AND user_id = $2",
            &[&uuid, &user],
        )
        .await?;
    Ok(deleted > 0)
}

// ============================================================================
// EVENTS (audit trail)
// ============================================================================

pub async fn log_event(
    pool: &Pool,
    event_type: &str,
    entity_type: Option<&str>,
    entity_id: Option<&str>,
    payload: Option<&serde_json::Value>,
    actor_id: Option<&str>,
) -> Result<()> {
    let client = pool.get().await?;
    client
        .execute(
            "INSERT INTO events (event_type, entity_type, entity_id, payload, actor_id)
             VALUES ($1, $2, $3, $4, $5)",
            &[&event_type, &entity_type, &entity_id, &payload, &actor_id],
        )
        .await?;
    Ok(())
}
