//! Portfolio handlers

use crate::api::auth::{ensure_active, require_auth};
use crate::api::{parse_id, require_text, AppJson};
use crate::auth::now;
use crate::db::queries;
use crate::error::{ApiError, ApiResult};
use crate::export::build_portfolio_archive;
use crate::models::*;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

const MAX_TITLE_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 20_000;
const MAX_TAGS: usize = 10;
const MAX_TAG_LEN: usize = 50;

fn clean_tags(tags: &[String]) -> ApiResult<Vec<String>> {
    let cleaned: Vec<String> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.len() > MAX_TAGS {
        return Err(ApiError::bad_request(format!(
            "At most {} tags are allowed",
            MAX_TAGS
        )));
    }
    if cleaned.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
        return Err(ApiError::bad_request(format!(
            "Tags must be at most {} characters",
            MAX_TAG_LEN
        )));
    }
    Ok(cleaned)
}

pub async fn create_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppJson(req): AppJson<CreatePortfolioItemRequest>,
) -> ApiResult<(StatusCode, Json<PortfolioItem>)> {
    let claims = require_auth(&state, &headers)?;
    let title = require_text(&req.title, "Title", MAX_TITLE_LEN)?;
    let description = req.description.trim();
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApiError::bad_request("Description is too long"));
    }
    let tags = clean_tags(&req.tags)?;
    ensure_active(&state, &claims).await?;

    let submission_id = match req.submission_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => {
            let id = parse_id(raw, "Submission")?;
            let submission = queries::get_submission(&state.db, &id)
                .await?
                .ok_or_else(|| ApiError::not_found("Submission"))?;
            if submission.student_id != claims.sub {
                return Err(ApiError::forbidden("Submission belongs to another user"));
            }
            Some(id)
        }
        None => None,
    };

    let item = queries::create_portfolio_item(
        &state.db,
        &claims.sub,
        title,
        description,
        submission_id.as_deref(),
        &tags,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<PortfolioItem>>> {
    let claims = require_auth(&state, &headers)?;
    Ok(Json(
        queries::list_portfolio_items(&state.db, &claims.sub).await?,
    ))
}

pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let claims = require_auth(&state, &headers)?;
    let id = parse_id(&id, "Portfolio item")?;
    ensure_active(&state, &claims).await?;
    if !queries::delete_portfolio_item(&state.db, &id, &claims.sub).await? {
        return Err(ApiError::not_found("Portfolio item"));
    }
    Ok(Json(serde_json::json!({ "success": true, "deleted": id })))
}

/// ZIP download of the caller's portfolio
pub async fn export_archive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let claims = require_auth(&state, &headers)?;
    let owner = queries::get_user(&state.db, &claims.sub)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    let items = queries::list_portfolio_items(&state.db, &claims.sub).await?;

    let archive = build_portfolio_archive(&owner, &items, now())?;
    info!(user = %claims.sub, items = items.len(), bytes = archive.len(), "Portfolio exported");

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"portfolio.zip\"",
            ),
        ],
        archive,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_trimmed_and_blank_ones_dropped() {
        let tags = clean_tags(&[" rust ".to_string(), "  ".to_string(), "web".to_string()]).unwrap();
        assert_eq!(tags, vec!["rust", "web"]);
    }

    #[test]
    fn test_tag_limits() {
        let many: Vec<String> = (0..11).map(|i| format!("t{}", i)).collect();
        assert!(clean_tags(&many).is_err());

        let ten: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        assert_eq!(clean_tags(&ten).unwrap().len(), 10);

        assert!(clean_tags(&["x".repeat(51)]).is_err());
    }
}
