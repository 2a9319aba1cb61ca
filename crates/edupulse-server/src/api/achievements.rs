//! Achievement catalog handlers

use crate::achievements::progress_view;
use crate::api::auth::require_auth;
use crate::db::queries;
use crate::error::ApiResult;
use crate::models::*;
use crate::state::AppState;
use axum::{extract::State, http::HeaderMap, Json};
use std::sync::Arc;

pub async fn list_catalog(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Achievement>>> {
    require_auth(&state, &headers)?;
    Ok(Json(queries::list_achievements(&state.db).await?))
}

/// Full catalog with the caller's progress and unlock times
pub async fn list_mine(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<UserAchievement>>> {
    let claims = require_auth(&state, &headers)?;
    let catalog = queries::list_achievements(&state.db).await?;
    let stats = queries::get_user_stats(&state.db, &claims.sub).await?;
    let unlocked_at = queries::get_user_achievement_times(&state.db, &claims.sub).await?;
    Ok(Json(progress_view(&catalog, &stats, &unlocked_at)))
}
