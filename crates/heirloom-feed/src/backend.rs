use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use heirloom_types::models::{
    Comment, MediaKind, Profile, Relationship, SortOrder, Story, StoryMedia, Tag,
};

/// Failure of a single call against the data or object store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("object storage failed: {0}")]
    Storage(String),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Row order for a story listing. The three feed sort keys map onto the first
/// three variants; `UpdatedDesc` is used by the dashboard's "recent" strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoryOrder {
    CreatedDesc,
    CreatedAsc,
    TitleAsc,
    UpdatedDesc,
}

impl From<SortOrder> for StoryOrder {
    fn from(sort: SortOrder) -> Self {
        match sort {
            SortOrder::Recent => Self::CreatedDesc,
            SortOrder::Oldest => Self::CreatedAsc,
            SortOrder::Az => Self::TitleAsc,
        }
    }
}

/// One retrieval request against the stories table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryFilter {
    /// Case-insensitive substring matched against title OR description.
    pub search: Option<String>,
    /// Inclusion list; `None` means unrestricted.
    pub story_ids: Option<Vec<Uuid>>,
    /// A story qualifies when at least one of its visibility rows is listed here.
    pub visibility: Vec<Relationship>,
    pub published_only: bool,
    pub created_after: Option<DateTime<Utc>>,
    pub order: StoryOrder,
}

impl StoryFilter {
    pub fn visible_to(visibility: &[Relationship]) -> Self {
        Self {
            search: None,
            story_ids: None,
            visibility: visibility.to_vec(),
            published_only: true,
            created_after: None,
            order: StoryOrder::CreatedDesc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: u64,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStory {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub transcript_question: Option<String>,
    pub transcript_answer: Option<String>,
    pub duration_seconds: u32,
}

/// The relational half of the hosted-backend contract the feed is written
/// against. Every call is an independent round trip; there is no
/// cross-call transaction.
pub trait Backend: Send + Sync {
    fn profile(&self, user_id: Uuid) -> BackendResult<Option<Profile>>;

    // -- Tags --

    /// Exact, case-sensitive name match.
    fn tags_by_name(&self, names: &[String]) -> BackendResult<Vec<Tag>>;
    /// Fails with [`BackendError::Conflict`] when the name already exists.
    fn insert_tag(&self, name: &str, icon: &str) -> BackendResult<Tag>;
    /// Deletes the tag when no story references it. Returns whether it was deleted.
    fn delete_tag_if_unused(&self, tag_id: Uuid) -> BackendResult<bool>;
    fn story_ids_for_tags(&self, tag_ids: &[Uuid]) -> BackendResult<Vec<Uuid>>;
    fn tags_for_stories(&self, story_ids: &[Uuid]) -> BackendResult<HashMap<Uuid, Vec<Tag>>>;
    /// Inserts all associations or none.
    fn associate_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> BackendResult<()>;

    // -- Stories --

    fn count_stories(&self, filter: &StoryFilter) -> BackendResult<u64>;
    fn list_stories(&self, filter: &StoryFilter, window: PageWindow) -> BackendResult<Vec<Story>>;
    fn story(&self, story_id: Uuid) -> BackendResult<Option<Story>>;
    fn visibility_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Relationship>>;
    fn insert_story(&self, story: &NewStory) -> BackendResult<Story>;
    fn insert_visibility(&self, story_id: Uuid, categories: &[Relationship]) -> BackendResult<()>;
    /// Records uploaded objects and backfills the story's thumbnail/audio/video keys.
    fn attach_media(&self, story_id: Uuid, media: &[StoryMedia]) -> BackendResult<()>;
    fn media_for_story(&self, story_id: Uuid) -> BackendResult<Vec<StoryMedia>>;
    /// Removes the story and its visibility, tag, media, comment, like and bookmark rows.
    fn delete_story(&self, story_id: Uuid) -> BackendResult<()>;

    // -- Per-user relations --

    /// Bookmarked story ids, most recently bookmarked first.
    fn bookmarked_story_ids(&self, user_id: Uuid) -> BackendResult<Vec<Uuid>>;
    fn comments_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Comment>>;
}

/// The blob half of the hosted-backend contract.
pub trait ObjectStore: Send + Sync {
    fn put(&self, key: &str, content_type: &str, bytes: &[u8])
    -> impl Future<Output = BackendResult<()>> + Send;

    /// Removing a missing object is not an error.
    fn remove(&self, key: &str) -> impl Future<Output = BackendResult<()>> + Send;

    fn public_url(&self, key: &str) -> String;

    fn signed_url(&self, key: &str, ttl: Duration) -> String;
}

/// Object keys a story shows up front: its first image, audio and video.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryMedia {
    pub thumbnail: Option<String>,
    pub audio: Option<String>,
    pub video: Option<String>,
}

impl PrimaryMedia {
    pub fn pick(media: &[StoryMedia]) -> Self {
        let mut sorted: Vec<&StoryMedia> = media.iter().collect();
        sorted.sort_by_key(|m| m.position);
        let first = |kind: MediaKind| {
            sorted
                .iter()
                .find(|m| m.kind == kind)
                .map(|m| m.object_key.clone())
        };
        Self {
            thumbnail: first(MediaKind::Image),
            audio: first(MediaKind::Audio),
            video: first(MediaKind::Video),
        }
    }
}
