use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{CommentNode, Relationship, SortOrder};

// -- JWT Claims --

/// JWT claims issued by the auth endpoints and checked by the
/// `require_auth` middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

// -- Profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileSetupRequest {
    pub full_name: String,
    pub email: String,
    pub relationship: String,
    #[serde(default)]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub relationship: Option<Relationship>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub is_verified: bool,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

// -- Stories --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    #[serde(default)]
    pub q: Option<String>,
    /// Comma-separated tag names.
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub sort: SortOrder,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagBadge {
    pub name: String,
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryCard {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_url: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    /// `M:SS` rendering of the media duration.
    pub duration: String,
    pub view_count: u64,
    pub is_new: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub tags: Vec<TagBadge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedResponse {
    pub stories: Vec<StoryCard>,
    pub total_count: u64,
    pub total_pages: u32,
    pub page: u32,
    pub page_size: u32,
    /// User-facing message when the feed could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateStoryResponse {
    pub id: Uuid,
    pub tags_created: Vec<String>,
    pub media_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub full_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoryDetailResponse {
    #[serde(flatten)]
    pub story: StoryCard,
    pub author: Option<AuthorSummary>,
    pub media: Vec<String>,
    pub transcript_question: Option<String>,
    pub transcript_answer: Option<String>,
    pub like_count: u64,
    pub liked: bool,
    pub bookmarked: bool,
    pub comment_count: usize,
    pub comments: Vec<CommentNode>,
    pub next_story: Option<StoryCard>,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

// -- Likes / bookmarks --

#[derive(Debug, Serialize, Deserialize)]
pub struct ToggleResponse {
    /// true when the like/bookmark now exists.
    pub active: bool,
    pub count: u64,
}

// -- Dashboard --

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardParams {
    #[serde(default = "default_page")]
    pub page: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DashboardResponse {
    pub featured: Option<StoryCard>,
    pub recent: Vec<StoryCard>,
    pub bookmarks: Vec<StoryCard>,
    pub latest: FeedResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}
