//! Story creation and removal.
//!
//! Publishing touches the stories table, the visibility rows, the object
//! store, the media rows and the tag tables in separate calls. It runs as a
//! [`Saga`]: if any step fails, everything already done is undone in reverse.
//! A submission whose uploads partly fail is aborted as a whole.

use futures_util::future::join_all;
use tracing::{error, info, warn};
use uuid::Uuid;

use heirloom_types::models::{MediaKind, Relationship, Story, StoryMedia, Tag};

use crate::backend::{Backend, BackendError, NewStory, ObjectStore};
use crate::saga::Saga;
use crate::tags::{self, MAX_TAGS_PER_STORY};

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_IMAGES: usize = 3;
pub const MAX_AUDIO: usize = 3;
pub const MAX_VIDEOS: usize = 1;
/// Per-file upload limit.
pub const MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryDraft {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub visibility: Vec<Relationship>,
    pub transcript_question: Option<String>,
    pub transcript_answer: Option<String>,
    pub duration_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("title is required")]
    MissingTitle,

    #[error("title is longer than {MAX_TITLE_LEN} characters")]
    TitleTooLong,

    #[error("choose between 1 and {MAX_TAGS_PER_STORY} tags (got {0})")]
    TagCount(usize),

    #[error("select who can see this post")]
    NoVisibility,

    #[error("{file_name}: unsupported file type '{content_type}'")]
    UnsupportedMedia {
        file_name: String,
        content_type: String,
    },

    #[error("{0} is empty")]
    EmptyFile(String),

    #[error("{name} exceeds the {limit} MB limit", name = .0, limit = MAX_FILE_BYTES / (1024 * 1024))]
    FileTooLarge(String),

    #[error("maximum three images allowed")]
    TooManyImages,

    #[error("maximum three audio files allowed")]
    TooManyAudio,

    #[error("only a single video file allowed")]
    TooManyVideos,

    #[error("cannot upload both video and audio files")]
    VideoWithAudio,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("{} of {total} upload(s) failed", failed.len())]
    Uploads { failed: Vec<String>, total: usize },
}

fn step(step: &'static str) -> impl FnOnce(BackendError) -> PublishError {
    move |source| PublishError::Step { step, source }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub story: Story,
    pub tags: Vec<Tag>,
    pub created_tags: Vec<Tag>,
    pub media: Vec<StoryMedia>,
}

/// Checks a submission before anything is written. Returns the media kind of
/// each upload, in order.
pub fn validate(draft: &StoryDraft, uploads: &[MediaUpload]) -> Result<Vec<MediaKind>, ValidationError> {
    let title = draft.title.trim();
    if title.is_empty() {
        return Err(ValidationError::MissingTitle);
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ValidationError::TitleTooLong);
    }

    let tag_count = tags::normalize_names(&draft.tags).len();
    if !(1..=MAX_TAGS_PER_STORY).contains(&tag_count) {
        return Err(ValidationError::TagCount(tag_count));
    }

    if draft.visibility.is_empty() {
        return Err(ValidationError::NoVisibility);
    }

    let mut kinds = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let kind = MediaKind::from_content_type(&upload.content_type).ok_or_else(|| {
            ValidationError::UnsupportedMedia {
                file_name: upload.file_name.clone(),
                content_type: upload.content_type.clone(),
            }
        })?;
        if upload.bytes.is_empty() {
            return Err(ValidationError::EmptyFile(upload.file_name.clone()));
        }
        if upload.bytes.len() > MAX_FILE_BYTES {
            return Err(ValidationError::FileTooLarge(upload.file_name.clone()));
        }
        kinds.push(kind);
    }

    let count = |k: MediaKind| kinds.iter().filter(|&&x| x == k).count();
    let (images, audio, videos) = (count(MediaKind::Image), count(MediaKind::Audio), count(MediaKind::Video));
    if images > MAX_IMAGES {
        return Err(ValidationError::TooManyImages);
    }
    if videos > MAX_VIDEOS {
        return Err(ValidationError::TooManyVideos);
    }
    if audio > MAX_AUDIO {
        return Err(ValidationError::TooManyAudio);
    }
    if videos > 0 && audio > 0 {
        return Err(ValidationError::VideoWithAudio);
    }

    Ok(kinds)
}

/// Object key for the `position`-th upload of a story.
pub fn object_key(story_id: Uuid, position: usize, kind: MediaKind, file_name: &str) -> String {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    format!(
        "stories/{}/{}-{}-{}.{}",
        kind.folder(),
        story_id,
        position,
        Uuid::new_v4().simple(),
        ext
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Undo {
    DeleteStory(Uuid),
    RemoveObject(String),
    DeleteTag(Uuid),
}

/// Creates a story with its visibility rows, media and tags.
pub async fn publish<B, S>(
    backend: &B,
    store: &S,
    owner: Uuid,
    draft: StoryDraft,
    uploads: Vec<MediaUpload>,
) -> Result<Published, PublishError>
where
    B: Backend + ?Sized,
    S: ObjectStore,
{
    let kinds = validate(&draft, &uploads)?;

    let mut saga = Saga::new("publish story");
    match run(backend, store, owner, draft, uploads, kinds, &mut saga).await {
        Ok(published) => {
            saga.commit();
            info!(
                "Published story {} with {} media file(s) and {} tag(s)",
                published.story.id,
                published.media.len(),
                published.tags.len()
            );
            Ok(published)
        }
        Err(e) => {
            warn!("Publishing story for {} failed: {}", owner, e);
            rollback(backend, store, saga).await;
            Err(e)
        }
    }
}

async fn run<B, S>(
    backend: &B,
    store: &S,
    owner: Uuid,
    draft: StoryDraft,
    uploads: Vec<MediaUpload>,
    kinds: Vec<MediaKind>,
    saga: &mut Saga<Undo>,
) -> Result<Published, PublishError>
where
    B: Backend + ?Sized,
    S: ObjectStore,
{
    let mut visibility = draft.visibility.clone();
    visibility.sort();
    visibility.dedup();
    let tag_names = tags::normalize_names(&draft.tags);

    // Created tags are compensated last, after the story and its tag links are gone.
    let resolved = match tags::resolve(backend, &tag_names) {
        Ok(resolved) => {
            for tag in &resolved.created {
                saga.record("create tag", Undo::DeleteTag(tag.id));
            }
            resolved
        }
        Err(e) => {
            for tag in &e.created {
                saga.record("create tag", Undo::DeleteTag(tag.id));
            }
            return Err(PublishError::Step {
                step: "resolve tags",
                source: e.source,
            });
        }
    };

    let story = backend
        .insert_story(&NewStory {
            user_id: owner,
            title: draft.title.trim().to_string(),
            description: draft.description.trim().to_string(),
            transcript_question: draft.transcript_question.filter(|s| !s.trim().is_empty()),
            transcript_answer: draft.transcript_answer.filter(|s| !s.trim().is_empty()),
            duration_seconds: draft.duration_seconds,
        })
        .map_err(step("insert story"))?;
    saga.record("insert story", Undo::DeleteStory(story.id));

    backend
        .insert_visibility(story.id, &visibility)
        .map_err(step("insert visibility"))?;

    let media = upload_all(store, story.id, uploads, kinds, saga).await?;
    if !media.is_empty() {
        backend
            .attach_media(story.id, &media)
            .map_err(step("attach media"))?;
    }

    backend
        .associate_tags(story.id, &resolved.ids())
        .map_err(step("associate tags"))?;

    let story = backend
        .story(story.id)
        .map_err(step("reload story"))?
        .ok_or_else(|| PublishError::Step {
            step: "reload story",
            source: BackendError::NotFound(format!("story {}", story.id)),
        })?;

    Ok(Published {
        story,
        tags: resolved.tags,
        created_tags: resolved.created,
        media,
    })
}

/// Uploads every file concurrently and collects the outcomes. Any failure
/// fails the whole batch after logging each failed file.
async fn upload_all<S: ObjectStore>(
    store: &S,
    story_id: Uuid,
    uploads: Vec<MediaUpload>,
    kinds: Vec<MediaKind>,
    saga: &mut Saga<Undo>,
) -> Result<Vec<StoryMedia>, PublishError> {
    let planned: Vec<(usize, String, MediaKind, MediaUpload)> = uploads
        .into_iter()
        .zip(kinds)
        .enumerate()
        .map(|(i, (upload, kind))| (i, object_key(story_id, i, kind, &upload.file_name), kind, upload))
        .collect();

    let results = join_all(
        planned
            .iter()
            .map(|(_, key, _, upload)| store.put(key, &upload.content_type, &upload.bytes)),
    )
    .await;

    let total = planned.len();
    let mut media = Vec::with_capacity(total);
    let mut failed = Vec::new();
    for ((position, key, kind, upload), result) in planned.into_iter().zip(results) {
        match result {
            Ok(()) => {
                saga.record("upload media", Undo::RemoveObject(key.clone()));
                media.push(StoryMedia {
                    story_id,
                    kind,
                    object_key: key,
                    position: position as u32,
                });
            }
            Err(e) => {
                warn!("Upload of '{}' for story {} failed: {}", upload.file_name, story_id, e);
                failed.push(upload.file_name);
            }
        }
    }

    if failed.is_empty() {
        Ok(media)
    } else {
        Err(PublishError::Uploads { failed, total })
    }
}

async fn rollback<B, S>(backend: &B, store: &S, saga: Saga<Undo>)
where
    B: Backend + ?Sized,
    S: ObjectStore,
{
    for (step, undo) in saga.unwind() {
        let result = match &undo {
            Undo::DeleteStory(id) => backend.delete_story(*id),
            Undo::RemoveObject(key) => store.remove(key).await,
            Undo::DeleteTag(id) => backend.delete_tag_if_unused(*id).map(|_| ()),
        };
        if let Err(e) = result {
            error!("Compensation for '{}' ({:?}) failed: {}", step, undo, e);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetractError {
    /// Missing, or owned by someone else.
    #[error("story not found")]
    NotFound,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Deletes a story owned by `owner`, then its stored media. Returns how many
/// objects were removed; objects that fail to delete are logged and left.
pub async fn retract<B, S>(backend: &B, store: &S, owner: Uuid, story_id: Uuid) -> Result<usize, RetractError>
where
    B: Backend + ?Sized,
    S: ObjectStore,
{
    let story = backend.story(story_id)?.ok_or(RetractError::NotFound)?;
    if story.user_id != owner {
        return Err(RetractError::NotFound);
    }

    let media = backend.media_for_story(story_id)?;
    backend.delete_story(story_id)?;

    let mut removed = 0;
    for m in media {
        match store.remove(&m.object_key).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Orphaned object {} of deleted story {}: {}", m.object_key, story_id, e),
        }
    }
    info!("Deleted story {} ({} object(s) removed)", story_id, removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryBackend, MemoryStore};

    fn draft(tags: &[&str]) -> StoryDraft {
        StoryDraft {
            title: "Grandpa's boat".into(),
            description: "Summer on the river".into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            visibility: vec![Relationship::Relative],
            ..Default::default()
        }
    }

    fn file(name: &str, content_type: &str) -> MediaUpload {
        MediaUpload {
            file_name: name.into(),
            content_type: content_type.into(),
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn validation_rules() {
        let mut d = draft(&["Travel"]);
        assert!(validate(&d, &[]).is_ok());

        d.title = "  ".into();
        assert_eq!(validate(&d, &[]), Err(ValidationError::MissingTitle));

        assert_eq!(validate(&draft(&[]), &[]), Err(ValidationError::TagCount(0)));
        assert_eq!(
            validate(&draft(&["a", "b", "c", "d"]), &[]),
            Err(ValidationError::TagCount(4))
        );

        let mut d = draft(&["Travel"]);
        d.visibility.clear();
        assert_eq!(validate(&d, &[]), Err(ValidationError::NoVisibility));

        let d = draft(&["Travel"]);
        let images: Vec<_> = (0..4).map(|i| file(&format!("{i}.png"), "image/png")).collect();
        assert_eq!(validate(&d, &images), Err(ValidationError::TooManyImages));

        let mixed = [file("a.mp4", "video/mp4"), file("b.mp3", "audio/mpeg")];
        assert_eq!(validate(&d, &mixed), Err(ValidationError::VideoWithAudio));

        let videos = [file("a.mp4", "video/mp4"), file("b.mp4", "video/mp4")];
        assert_eq!(validate(&d, &videos), Err(ValidationError::TooManyVideos));

        assert!(matches!(
            validate(&d, &[file("a.pdf", "application/pdf")]),
            Err(ValidationError::UnsupportedMedia { .. })
        ));

        let kinds = validate(&d, &[file("a.jpg", "image/jpeg"), file("b.mp3", "audio/mpeg")]).unwrap();
        assert_eq!(kinds, vec![MediaKind::Image, MediaKind::Audio]);
    }

    #[test]
    fn oversized_file_message_names_the_limit() {
        assert_eq!(
            ValidationError::FileTooLarge("reunion.mp4".into()).to_string(),
            "reunion.mp4 exceeds the 50 MB limit"
        );
    }

    #[test]
    fn object_keys_are_namespaced() {
        let id = Uuid::new_v4();
        let key = object_key(id, 0, MediaKind::Image, "Beach.JPG");
        assert!(key.starts_with(&format!("stories/images/{id}-0-")));
        assert!(key.ends_with(".jpg"));
        assert!(object_key(id, 1, MediaKind::Audio, "noext").ends_with(".bin"));
    }

    #[tokio::test]
    async fn publish_creates_new_tag_once() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();

        let published = publish(&backend, &store, owner, draft(&["Reunion"]), vec![]).await.unwrap();
        assert_eq!(published.created_tags.len(), 1);
        assert_eq!(backend.tag_count(), 1);
        assert_eq!(backend.story_tag_count(published.story.id), 1);
        assert_eq!(
            backend.visibility_for_story(published.story.id).unwrap(),
            vec![Relationship::Relative]
        );
    }

    #[tokio::test]
    async fn publish_backfills_media_keys() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        let uploads = vec![file("a.jpg", "image/jpeg"), file("b.jpg", "image/jpeg"), file("c.mp3", "audio/mpeg")];

        let published = publish(&backend, &store, Uuid::new_v4(), draft(&["Family"]), uploads)
            .await
            .unwrap();
        assert_eq!(published.media.len(), 3);
        assert_eq!(store.len(), 3);
        assert_eq!(published.story.thumbnail_key.as_deref(), Some(published.media[0].object_key.as_str()));
        assert_eq!(published.story.audio_key.as_deref(), Some(published.media[2].object_key.as_str()));
        assert!(published.story.video_key.is_none());
    }

    #[tokio::test]
    async fn failed_upload_rolls_back_everything() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        store.fail_key_containing("-1-");
        let uploads = vec![file("a.jpg", "image/jpeg"), file("b.jpg", "image/jpeg")];

        let err = publish(&backend, &store, Uuid::new_v4(), draft(&["Family"]), uploads)
            .await
            .unwrap_err();
        match err {
            PublishError::Uploads { failed, total } => {
                assert_eq!(failed, vec!["b.jpg".to_string()]);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.len(), 0);
        assert_eq!(backend.story_count(), 0);
        assert_eq!(backend.tag_count(), 0);
    }

    #[tokio::test]
    async fn failed_tag_association_removes_created_tags() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        backend.fail_associate_tags();

        let err = publish(&backend, &store, Uuid::new_v4(), draft(&["Reunion"]), vec![file("a.jpg", "image/jpeg")])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Step { step: "associate tags", .. }));
        assert_eq!(backend.tag_count(), 0);
        assert_eq!(backend.story_count(), 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn failure_after_tag_association_removes_created_tags() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        backend.fail_story_reads();

        let err = publish(&backend, &store, Uuid::new_v4(), draft(&["Reunion"]), vec![file("a.jpg", "image/jpeg")])
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Step { step: "reload story", .. }));
        assert_eq!(backend.story_count(), 0);
        assert_eq!(backend.tag_count(), 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn invalid_draft_writes_nothing() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        let err = publish(&backend, &store, Uuid::new_v4(), draft(&[]), vec![]).await.unwrap_err();
        assert!(matches!(err, PublishError::Invalid(ValidationError::TagCount(0))));
        assert_eq!(backend.story_count(), 0);
    }

    #[tokio::test]
    async fn retract_checks_owner_and_removes_media() {
        let backend = MemoryBackend::new();
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let published = publish(&backend, &store, owner, draft(&["Family"]), vec![file("a.jpg", "image/jpeg")])
            .await
            .unwrap();

        let err = retract(&backend, &store, Uuid::new_v4(), published.story.id).await.unwrap_err();
        assert!(matches!(err, RetractError::NotFound));
        assert_eq!(backend.story_count(), 1);

        let removed = retract(&backend, &store, owner, published.story.id).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len(), 0);
        assert_eq!(backend.story_count(), 0);
        assert!(matches!(
            retract(&backend, &store, owner, published.story.id).await,
            Err(RetractError::NotFound)
        ));
    }
}
