use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use uuid::Uuid;

use heirloom_types::api::{Claims, ToggleResponse};

use crate::auth::{AppState, blocking, viewer};
use crate::error::ApiError;
use crate::stories::readable_story;

#[derive(Debug, Clone, Copy)]
enum Reaction {
    Like,
    Bookmark,
}

async fn toggle(state: AppState, claims: Claims, story_id: Uuid, reaction: Reaction) -> Result<ToggleResponse, ApiError> {
    let viewer = viewer(&state, &claims).await?;
    blocking(&state, move |s| {
        readable_story(s, &viewer, story_id)?;
        let (active, count) = match reaction {
            Reaction::Like => s.db.toggle_like(viewer.user_id, story_id)?,
            Reaction::Bookmark => s.db.toggle_bookmark(viewer.user_id, story_id)?,
        };
        Ok(ToggleResponse { active, count })
    })
    .await
}

/// POST /stories/{id}/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(toggle(state, claims, story_id, Reaction::Like).await?))
}

/// POST /stories/{id}/bookmark
pub async fn toggle_bookmark(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(toggle(state, claims, story_id, Reaction::Bookmark).await?))
}
