use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State, multipart::Field},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use heirloom_feed::backend::Backend;
use heirloom_feed::comments;
use heirloom_feed::present::{FeedItem, STORIES_PAGE_SIZE};
use heirloom_feed::publish::{self, MediaUpload, StoryDraft};
use heirloom_feed::query::{self, FeedQuery};
use heirloom_feed::{ObjectStore, ViewerContext};
use heirloom_types::api::{AuthorSummary, Claims, CreateStoryResponse, FeedParams, StoryDetailResponse};
use heirloom_types::models::{Relationship, Story};

use crate::auth::{AppState, AppStateInner, blocking, viewer};
use crate::error::ApiError;
use crate::views;

/// Request body limit for story submissions: every allowed file at its cap.
pub const MAX_SUBMISSION_BYTES: usize =
    (publish::MAX_IMAGES + publish::MAX_AUDIO + publish::MAX_VIDEOS) * publish::MAX_FILE_BYTES + 1024 * 1024;

/// Splits a comma-separated or repeated form value.
fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

pub fn feed_query(params: &FeedParams) -> FeedQuery {
    let tags: Vec<&str> = params.tags.as_deref().map(|t| split_list(t).collect()).unwrap_or_default();
    FeedQuery::new(STORIES_PAGE_SIZE)
        .search(params.q.clone().unwrap_or_default())
        .tags(&tags)
        .sort(params.sort)
        .page(params.page)
}

/// GET /stories: the searchable feed.
pub async fn list_stories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<FeedParams>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer(&state, &claims).await?;
    let query = feed_query(&params);

    let page = blocking(&state, move |s| Ok(query::load(&s.db, &viewer, &query))).await?;
    debug!("Feed page {} of {} ({} stories)", page.page, page.total_pages, page.total_count);

    Ok(Json(views::feed_response(&state, page)))
}

/// Fetches a story the viewer may read. Stories outside the viewer's
/// visibility are reported as missing.
pub(crate) fn readable_story(s: &AppStateInner, viewer: &ViewerContext, story_id: Uuid) -> Result<Story, ApiError> {
    let story = s.db.story(story_id)?.ok_or(ApiError::NotFound)?;
    if story.user_id == viewer.user_id {
        return Ok(story);
    }
    let categories = s.db.visibility_for_story(story_id)?;
    if !story.is_published || !viewer.can_view(story.user_id, &categories) {
        return Err(ApiError::NotFound);
    }
    Ok(story)
}

/// GET /stories/{id}
pub async fn get_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer(&state, &claims).await?;

    let detail = blocking(&state, move |s| {
        let story = readable_story(s, &viewer, story_id)?;
        s.db.increment_view_count(story_id)?;

        let mut tags = s.db.tags_for_stories(&[story_id])?.remove(&story_id).unwrap_or_default();
        tags.sort_by(|a, b| a.name.cmp(&b.name));

        let author = s.db.get_profile(story.user_id)?;
        let media = s.db.media_for_story(story_id)?;
        let like_count = s.db.like_count(story_id)?;
        let liked = s.db.is_liked(viewer.user_id, story_id)?;
        let bookmarked = s.db.is_bookmarked(viewer.user_id, story_id)?;
        let tree = comments::build_tree(s.db.comments_for_story(story_id)?);
        let next = query::next_story(&s.db, &viewer, &story)?;

        let now = Utc::now();
        let transcript_question = story.transcript_question.clone();
        let transcript_answer = story.transcript_answer.clone();
        let mut card = views::story_card(s, &FeedItem { story, tags }, now);
        card.view_count += 1;

        Ok(StoryDetailResponse {
            story: card,
            author: author.map(|p| AuthorSummary {
                id: p.id,
                avatar_url: p.avatar_key.as_deref().map(|k| s.store.public_url(k)),
                full_name: p.full_name,
            }),
            media: media
                .iter()
                .map(|m| s.store.signed_url(&m.object_key, s.signed_url_ttl))
                .collect(),
            transcript_question,
            transcript_answer,
            like_count,
            liked,
            bookmarked,
            comment_count: comments::count(&tree),
            comments: tree,
            next_story: next.map(|item| views::story_card(s, &item, now)),
        })
    })
    .await?;

    Ok(Json(detail))
}

/// POST /stories: multipart story submission.
pub async fn create_story(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let author = viewer(&state, &claims).await?;
    let (draft, uploads) = read_submission(multipart).await?;

    let published = publish::publish(&state.db, &state.store, author.user_id, draft, uploads).await?;
    info!(
        "Story {} published by {} ({} new tag(s))",
        published.story.id,
        author.user_id,
        published.created_tags.len()
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateStoryResponse {
            id: published.story.id,
            tags_created: published.created_tags.into_iter().map(|t| t.name).collect(),
            media_count: published.media.len(),
        }),
    ))
}

/// DELETE /stories/{id}: owner only.
pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = publish::retract(&state.db, &state.store, claims.sub, story_id).await?;
    info!("Story {} deleted by {} ({} object(s) removed)", story_id, claims.sub, removed);
    Ok(StatusCode::NO_CONTENT)
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed form field: {e}")))
}

async fn read_submission(mut multipart: Multipart) -> Result<(StoryDraft, Vec<MediaUpload>), ApiError> {
    let mut draft = StoryDraft::default();
    let mut uploads = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed form: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => draft.title = field_text(field).await?,
            "description" => draft.description = field_text(field).await?,
            "tags" | "tags[]" => {
                let raw = field_text(field).await?;
                draft.tags.extend(split_list(&raw).map(str::to_string));
            }
            "visibility" | "visibility[]" => {
                let raw = field_text(field).await?;
                for value in split_list(&raw) {
                    let category: Relationship = value.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))?;
                    draft.visibility.push(category);
                }
            }
            "transcript_question" => draft.transcript_question = Some(field_text(field).await?),
            "transcript_answer" => draft.transcript_answer = Some(field_text(field).await?),
            "duration_seconds" => {
                let raw = field_text(field).await?;
                draft.duration_seconds = raw
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::BadRequest("duration must be a whole number of seconds".into()))?;
            }
            "files" | "files[]" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| mime_guess::from_path(&file_name).first_or_octet_stream().to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("upload of {file_name} failed: {e}")))?;
                uploads.push(MediaUpload {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok((draft, uploads))
}
