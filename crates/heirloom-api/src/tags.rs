use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::{AppState, blocking};
use crate::error::ApiError;
use crate::views;

/// GET /tags: every tag, alphabetically.
pub async fn list_tags(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let tags = blocking(&state, |s| Ok(s.db.all_tags()?)).await?;
    Ok(Json(views::tag_badges(&tags)))
}
