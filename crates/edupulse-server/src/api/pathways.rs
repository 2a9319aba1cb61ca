//! Learning pathway handlers

use crate::api::auth::{ensure_active, require_auth, require_staff};
use crate::api::{parse_id, require_text, AppJson};
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::models::*;
use crate::points::{self, PointsReceipt};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 10_000;
const MAX_CHECKPOINTS: usize = 100;
const MAX_CHECKPOINT_POINTS: i32 = 500;

#[derive(Debug, Serialize)]
pub struct CheckpointCompletion {
    pub checkpoint: Checkpoint,
    pub progress: PathwayProgress,
    pub points: PointsReceipt,
}

fn validate_checkpoints(checkpoints: &[NewCheckpoint]) -> ApiResult<Vec<NewCheckpoint>> {
    if checkpoints.is_empty() {
        return Err(ApiError::bad_request("At least one checkpoint is required"));
    }
    if checkpoints.len() > MAX_CHECKPOINTS {
        return Err(ApiError::bad_request(format!(
            "A pathway can have at most {} checkpoints",
            MAX_CHECKPOINTS
        )));
    }

    checkpoints
        .iter()
        .enumerate()
        .map(|(i, cp)| {
            let title = require_text(&cp.title, &format!("Checkpoint {} title", i + 1), MAX_TITLE_LEN)?;
            if !(0..=MAX_CHECKPOINT_POINTS).contains(&cp.points) {
                return Err(ApiError::bad_request(format!(
                    "Checkpoint {} points must be between 0 and {}",
                    i + 1,
                    MAX_CHECKPOINT_POINTS
                )));
            }
            Ok(NewCheckpoint {
                title: title.to_string(),
                description: cp.description.trim().to_string(),
                points: cp.points,
            })
        })
        .collect()
}

/// Checkpoints are completed strictly in order
fn check_order(
    pathway: &Pathway,
    checkpoint: &Checkpoint,
    completed: &HashSet<String>,
) -> ApiResult<()> {
    if completed.contains(&checkpoint.id) {
        return Err(ApiError::Conflict("Checkpoint already completed".to_string()));
    }
    let blocked = pathway
        .checkpoints
        .iter()
        .any(|c| c.position < checkpoint.position && !completed.contains(&c.id));
    if blocked {
        return Err(ApiError::bad_request(
            "Previous checkpoints must be completed first",
        ));
    }
    Ok(())
}

async fn load_pathway(state: &AppState, raw_id: &str) -> ApiResult<Pathway> {
    let id = parse_id(raw_id, "Pathway")?;
    queries::get_pathway(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::not_found("Pathway"))
}

pub async fn create_pathway(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreatePathwayRequest>,
) -> ApiResult<(StatusCode, Json<Pathway>)> {
    let claims = require_staff(&state, &headers)?;
    let title = require_text(&req.title, "Title", MAX_TITLE_LEN)?;
    let description = req.description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("Description is too long"));
    }
    let checkpoints = validate_checkpoints(&req.checkpoints)?;
    ensure_active(&state, &claims).await?;

    let pathway =
        queries::create_pathway(&state.db, &claims.sub, title, description, &checkpoints).await?;

    info!(
        pathway = %pathway.id,
        checkpoints = pathway.checkpoints.len(),
        "Pathway created"
    );
    Ok((StatusCode::CREATED, Json(pathway)))
}

pub async fn list_pathways(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PathwaySummary>>> {
    require_auth(&state, &headers)?;
    Ok(Json(queries::list_pathways(&state.db).await?))
}

pub async fn get_pathway(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<Pathway>> {
    require_auth(&state, &headers)?;
    Ok(Json(load_pathway(&state, &id).await?))
}

pub async fn enroll(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<PathwayProgress>)> {
    let claims = require_auth(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let pathway = load_pathway(&state, &id).await?;

    if !queries::enroll(&state.db, &pathway.id, &claims.sub).await? {
        return Err(ApiError::Conflict("Already enrolled in this pathway".to_string()));
    }

    let progress = queries::get_progress(&state.db, &pathway.id, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))?;

    info!(pathway = %pathway.id, user = %claims.sub, "Enrolled in pathway");
    Ok((StatusCode::CREATED, Json(progress)))
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<PathwayProgress>> {
    let claims = require_auth(&state, &headers)?;
    let pathway_id = parse_id(&id, "Pathway")?;
    let progress = queries::get_progress(&state.db, &pathway_id, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))?;
    Ok(Json(progress))
}

pub async fn complete_checkpoint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, checkpoint_id)): Path<(String, String)>,
) -> ApiResult<Json<CheckpointCompletion>> {
    let claims = require_auth(&state, &headers)?;
    ensure_active(&state, &claims).await?;
    let pathway = load_pathway(&state, &id).await?;
    let checkpoint_id = parse_id(&checkpoint_id, "Checkpoint")?;
    let checkpoint = pathway
        .checkpoints
        .iter()
        .find(|c| c.id == checkpoint_id)
        .cloned()
        .ok_or_else(|| ApiError::not_found("Checkpoint"))?;

    if queries::get_progress(&state.db, &pathway.id, &claims.sub)
        .await?
        .is_none()
    {
        return Err(ApiError::forbidden("Not enrolled in this pathway"));
    }

    let completed = queries::completed_checkpoint_ids(&state.db, &pathway.id, &claims.sub).await?;
    check_order(&pathway, &checkpoint, &completed)?;

    if !queries::complete_checkpoint(&state.db, &checkpoint.id, &claims.sub).await? {
        return Err(ApiError::Conflict("Checkpoint already completed".to_string()));
    }

    let mut receipt = PointsReceipt::default();
    if checkpoint.points > 0 {
        receipt.record(
            points::award(
                &state,
                &claims.sub,
                PointsAction::CheckpointCompleted,
                checkpoint.points as i64,
                Some(&checkpoint.id),
                Some(&checkpoint.title),
            )
            .await,
        );
    }

    let finished = completed.len() + 1 >= pathway.checkpoints.len();
    if finished && queries::mark_pathway_completed(&state.db, &pathway.id, &claims.sub).await? {
        info!(pathway = %pathway.id, user = %claims.sub, "Pathway completed");
        receipt.record(
            points::award_standard(
                &state,
                &claims.sub,
                PointsAction::PathwayCompleted,
                Some(&pathway.id),
                Some(&pathway.title),
            )
            .await,
        );
    }

    if receipt.outcomes.is_empty() {
        points::unlock_quietly(&state, &claims.sub).await;
    }

    let progress = queries::get_progress(&state.db, &pathway.id, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("Enrollment"))?;

    state.notify(WsEvent::CheckpointCompleted(CheckpointCompletedEvent {
        user_id: claims.sub.clone(),
        pathway_id: pathway.id.clone(),
        checkpoint_id: checkpoint.id.clone(),
        percent: progress.percent,
    }));

    Ok(Json(CheckpointCompletion {
        checkpoint,
        progress,
        points: receipt,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pathway(n: usize) -> Pathway {
        Pathway {
            id: "p1".to_string(),
            title: "Intro to Rust".to_string(),
            description: String::new(),
            created_by: "t1".to_string(),
            created_at: 0,
            checkpoints: (0..n)
                .map(|i| Checkpoint {
                    id: format!("c{}", i),
                    pathway_id: "p1".to_string(),
                    position: i as i32,
                    title: format!("Step {}", i),
                    description: String::new(),
                    points: 20,
                })
                .collect(),
        }
    }

    fn done(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_first_checkpoint_is_always_open() {
        let p = pathway(3);
        assert!(check_order(&p, &p.checkpoints[0], &done(&[])).is_ok());
    }

    #[test]
    fn test_out_of_order_is_rejected() {
        let p = pathway(3);
        assert!(matches!(
            check_order(&p, &p.checkpoints[2], &done(&["c0"])),
            Err(ApiError::BadRequest(_))
        ));
        assert!(check_order(&p, &p.checkpoints[2], &done(&["c0", "c1"])).is_ok());
    }

    #[test]
    fn test_repeat_is_conflict() {
        let p = pathway(2);
        assert!(matches!(
            check_order(&p, &p.checkpoints[0], &done(&["c0"])),
            Err(ApiError::Conflict(_))
        ));
    }

    #[test]
    fn test_checkpoint_validation() {
        assert!(validate_checkpoints(&[]).is_err());

        let too_rich = NewCheckpoint {
            title: "Boss level".to_string(),
            description: String::new(),
            points: 501,
        };
        assert!(validate_checkpoints(&[too_rich]).is_err());

        let untitled = NewCheckpoint {
            title: "  ".to_string(),
            description: String::new(),
            points: 10,
        };
        assert!(validate_checkpoints(&[untitled]).is_err());

        let ok = NewCheckpoint {
            title: " Read chapter 1 ".to_string(),
            description: " notes ".to_string(),
            points: 0,
        };
        let cleaned = validate_checkpoints(&[ok]).unwrap();
        assert_eq!(cleaned[0].title, "Read chapter 1");
        assert_eq!(cleaned[0].description, "notes");
    }
}
