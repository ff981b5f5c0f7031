use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use heirloom_feed::backend::Backend;
use heirloom_feed::comments::{self, MAX_COMMENT_LEN};
use heirloom_types::api::{Claims, CreateCommentRequest};

use crate::auth::{AppState, blocking, viewer};
use crate::error::ApiError;
use crate::stories::readable_story;

/// POST /stories/{id}/comments
pub async fn create_comment(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer(&state, &claims).await?;
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::BadRequest("comment cannot be empty".into()));
    }
    if content.chars().count() > MAX_COMMENT_LEN {
        return Err(ApiError::BadRequest(format!(
            "comment is longer than {MAX_COMMENT_LEN} characters"
        )));
    }

    let comment = blocking(&state, move |s| {
        readable_story(s, &viewer, story_id)?;
        if let Some(parent_id) = req.parent_id {
            let parent = s.db.get_comment(parent_id)?;
            if parent.is_none_or(|p| p.story_id != story_id) {
                return Err(ApiError::BadRequest("reply target not found on this story".into()));
            }
        }
        Ok(s.db.insert_comment(story_id, viewer.user_id, req.parent_id, &content)?)
    })
    .await?;

    info!("Comment {} added to story {}", comment.id, story_id);
    Ok((StatusCode::CREATED, Json(comment)))
}

/// DELETE /comments/{id}: author only. Responds with the story's remaining
/// comment threads.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let author = claims.sub;

    let remaining = blocking(&state, move |s| {
        let comment = s.db.get_comment(comment_id)?.ok_or(ApiError::NotFound)?;
        if comment.user_id != author {
            return Err(ApiError::Forbidden("only the author can delete this comment".into()));
        }
        let tree = comments::build_tree(s.db.comments_for_story(comment.story_id)?);
        if !s.db.delete_comment(comment_id, author)? {
            return Err(ApiError::NotFound);
        }
        Ok(comments::detach(tree, comment_id).unwrap_or_default())
    })
    .await?;

    info!("Comment {} deleted by {}", comment_id, author);
    Ok(Json(remaining))
}
