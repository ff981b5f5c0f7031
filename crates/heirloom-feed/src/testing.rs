//! In-memory stand-ins for the backend and object store.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use heirloom_types::models::{Comment, Profile, Relationship, Story, StoryMedia, Tag};

use crate::backend::{
    Backend, BackendError, BackendResult, NewStory, ObjectStore, PageWindow, PrimaryMedia, StoryFilter,
    StoryOrder,
};

#[derive(Default)]
struct State {
    clock: i64,
    profiles: HashMap<Uuid, Profile>,
    tags: Vec<Tag>,
    stories: Vec<Story>,
    story_tags: Vec<(Uuid, Uuid)>,
    visibility: Vec<(Uuid, Relationship)>,
    media: Vec<StoryMedia>,
    bookmarks: Vec<(Uuid, Uuid, DateTime<Utc>)>,
    comments: Vec<Comment>,
}

impl State {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(self.clock)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
    fail_queries: AtomicBool,
    fail_associate: AtomicBool,
    fail_story_reads: AtomicBool,
    tag_inserts_left: Mutex<Option<usize>>,
    list_calls: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn check(&self) -> BackendResult<()> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Query("backend offline".into()));
        }
        Ok(())
    }

    pub fn fail_queries(&self) {
        self.fail_queries.store(true, Ordering::SeqCst);
    }

    pub fn fail_associate_tags(&self) {
        self.fail_associate.store(true, Ordering::SeqCst);
    }

    pub fn fail_story_reads(&self) {
        self.fail_story_reads.store(true, Ordering::SeqCst);
    }

    /// Let `n` tag inserts succeed, then fail the rest.
    pub fn fail_tag_insert_after(&self, n: usize) {
        *self.tag_inserts_left.lock().unwrap() = Some(n);
    }

    pub fn seed_tag(&self, name: &str) -> Tag {
        self.insert_tag(name, "tag.svg").unwrap()
    }

    pub fn seed_story(&self, title: &str, description: &str, visibility: &[Relationship], tags: &[&str]) -> Story {
        let story = self
            .insert_story(&NewStory {
                user_id: Uuid::new_v4(),
                title: title.into(),
                description: description.into(),
                transcript_question: None,
                transcript_answer: None,
                duration_seconds: 0,
            })
            .unwrap();
        self.insert_visibility(story.id, visibility).unwrap();
        let names: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        let resolved = crate::tags::resolve(self, &names).unwrap();
        self.associate_tags(story.id, &resolved.ids()).unwrap();
        story
    }

    pub fn touch_story(&self, story_id: Uuid) {
        let mut state = self.state();
        state.clock += 1000;
        let at = state.tick();
        if let Some(s) = state.stories.iter_mut().find(|s| s.id == story_id) {
            s.updated_at = at;
        }
    }

    pub fn bookmark(&self, user_id: Uuid, story_id: Uuid) {
        let mut state = self.state();
        let at = state.tick();
        state.bookmarks.push((user_id, story_id, at));
    }

    pub fn tag_count(&self) -> usize {
        self.state().tags.len()
    }

    pub fn story_count(&self) -> usize {
        self.state().stories.len()
    }

    pub fn story_tag_count(&self, story_id: Uuid) -> usize {
        self.state().story_tags.iter().filter(|(s, _)| *s == story_id).count()
    }

    pub fn story_list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn matching(&self, filter: &StoryFilter) -> Vec<Story> {
        let state = self.state();
        let needle = filter.search.as_ref().map(|s| s.to_lowercase());
        let mut out: Vec<Story> = state
            .stories
            .iter()
            .filter(|s| {
                state
                    .visibility
                    .iter()
                    .any(|(id, v)| *id == s.id && filter.visibility.contains(v))
            })
            .filter(|s| !filter.published_only || s.is_published)
            .filter(|s| filter.story_ids.as_ref().is_none_or(|ids| ids.contains(&s.id)))
            .filter(|s| filter.created_after.is_none_or(|at| s.created_at > at))
            .filter(|s| {
                needle.as_ref().is_none_or(|n| {
                    s.title.to_lowercase().contains(n) || s.description.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();

        match filter.order {
            StoryOrder::CreatedDesc => out.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            StoryOrder::CreatedAsc => out.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
            StoryOrder::TitleAsc => out.sort_by_key(|s| s.title.to_lowercase()),
            StoryOrder::UpdatedDesc => out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
        }
        out
    }
}

impl Backend for MemoryBackend {
    fn profile(&self, user_id: Uuid) -> BackendResult<Option<Profile>> {
        self.check()?;
        Ok(self.state().profiles.get(&user_id).cloned())
    }

    fn tags_by_name(&self, names: &[String]) -> BackendResult<Vec<Tag>> {
        self.check()?;
        Ok(self
            .state()
            .tags
            .iter()
            .filter(|t| names.contains(&t.name))
            .cloned()
            .collect())
    }

    fn insert_tag(&self, name: &str, icon: &str) -> BackendResult<Tag> {
        self.check()?;
        if let Some(left) = self.tag_inserts_left.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(BackendError::Query("tag insert rejected".into()));
            }
            *left -= 1;
        }
        let mut state = self.state();
        if state.tags.iter().any(|t| t.name == name) {
            return Err(BackendError::Conflict(format!("tag '{name}' exists")));
        }
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.into(),
            icon: icon.into(),
            created_at: state.tick(),
        };
        state.tags.push(tag.clone());
        Ok(tag)
    }

    fn delete_tag_if_unused(&self, tag_id: Uuid) -> BackendResult<bool> {
        let mut state = self.state();
        if state.story_tags.iter().any(|(_, t)| *t == tag_id) {
            return Ok(false);
        }
        let before = state.tags.len();
        state.tags.retain(|t| t.id != tag_id);
        Ok(state.tags.len() < before)
    }

    fn story_ids_for_tags(&self, tag_ids: &[Uuid]) -> BackendResult<Vec<Uuid>> {
        self.check()?;
        let ids: HashSet<Uuid> = self
            .state()
            .story_tags
            .iter()
            .filter(|(_, t)| tag_ids.contains(t))
            .map(|(s, _)| *s)
            .collect();
        Ok(ids.into_iter().collect())
    }

    fn tags_for_stories(&self, story_ids: &[Uuid]) -> BackendResult<HashMap<Uuid, Vec<Tag>>> {
        self.check()?;
        let state = self.state();
        let mut out: HashMap<Uuid, Vec<Tag>> = HashMap::new();
        for (story_id, tag_id) in &state.story_tags {
            if story_ids.contains(story_id) {
                if let Some(tag) = state.tags.iter().find(|t| t.id == *tag_id) {
                    out.entry(*story_id).or_default().push(tag.clone());
                }
            }
        }
        Ok(out)
    }

    fn associate_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> BackendResult<()> {
        if self.fail_associate.load(Ordering::SeqCst) {
            return Err(BackendError::Query("story_tags insert rejected".into()));
        }
        let mut state = self.state();
        for tag_id in tag_ids {
            state.story_tags.push((story_id, *tag_id));
        }
        Ok(())
    }

    fn count_stories(&self, filter: &StoryFilter) -> BackendResult<u64> {
        self.check()?;
        Ok(self.matching(filter).len() as u64)
    }

    fn list_stories(&self, filter: &StoryFilter, window: PageWindow) -> BackendResult<Vec<Story>> {
        self.check()?;
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .matching(filter)
            .into_iter()
            .skip(window.offset as usize)
            .take(window.limit as usize)
            .collect())
    }

    fn story(&self, story_id: Uuid) -> BackendResult<Option<Story>> {
        self.check()?;
        if self.fail_story_reads.load(Ordering::SeqCst) {
            return Err(BackendError::Query("story read failed".into()));
        }
        Ok(self.state().stories.iter().find(|s| s.id == story_id).cloned())
    }

    fn visibility_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Relationship>> {
        self.check()?;
        Ok(self
            .state()
            .visibility
            .iter()
            .filter(|(id, _)| *id == story_id)
            .map(|(_, v)| *v)
            .collect())
    }

    fn insert_story(&self, story: &NewStory) -> BackendResult<Story> {
        self.check()?;
        let mut state = self.state();
        let at = state.tick();
        let row = Story {
            id: Uuid::new_v4(),
            user_id: story.user_id,
            title: story.title.clone(),
            description: story.description.clone(),
            thumbnail_key: None,
            audio_key: None,
            video_key: None,
            transcript_question: story.transcript_question.clone(),
            transcript_answer: story.transcript_answer.clone(),
            duration_seconds: story.duration_seconds,
            is_published: true,
            view_count: 0,
            created_at: at,
            updated_at: at,
        };
        state.stories.push(row.clone());
        Ok(row)
    }

    fn insert_visibility(&self, story_id: Uuid, categories: &[Relationship]) -> BackendResult<()> {
        self.check()?;
        let mut state = self.state();
        for c in categories {
            state.visibility.push((story_id, *c));
        }
        Ok(())
    }

    fn attach_media(&self, story_id: Uuid, media: &[StoryMedia]) -> BackendResult<()> {
        self.check()?;
        let mut state = self.state();
        state.media.extend(media.iter().cloned());
        let all: Vec<StoryMedia> = state.media.iter().filter(|m| m.story_id == story_id).cloned().collect();
        let primary = PrimaryMedia::pick(&all);
        let story = state
            .stories
            .iter_mut()
            .find(|s| s.id == story_id)
            .ok_or_else(|| BackendError::NotFound(format!("story {story_id}")))?;
        story.thumbnail_key = primary.thumbnail;
        story.audio_key = primary.audio;
        story.video_key = primary.video;
        Ok(())
    }

    fn media_for_story(&self, story_id: Uuid) -> BackendResult<Vec<StoryMedia>> {
        self.check()?;
        Ok(self.state().media.iter().filter(|m| m.story_id == story_id).cloned().collect())
    }

    fn delete_story(&self, story_id: Uuid) -> BackendResult<()> {
        let mut state = self.state();
        state.stories.retain(|s| s.id != story_id);
        state.visibility.retain(|(s, _)| *s != story_id);
        state.story_tags.retain(|(s, _)| *s != story_id);
        state.media.retain(|m| m.story_id != story_id);
        state.bookmarks.retain(|(_, s, _)| *s != story_id);
        state.comments.retain(|c| c.story_id != story_id);
        Ok(())
    }

    fn bookmarked_story_ids(&self, user_id: Uuid) -> BackendResult<Vec<Uuid>> {
        self.check()?;
        let mut rows: Vec<(Uuid, DateTime<Utc>)> = self
            .state()
            .bookmarks
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .map(|(_, s, at)| (*s, *at))
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(rows.into_iter().map(|(s, _)| s).collect())
    }

    fn comments_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Comment>> {
        self.check()?;
        Ok(self
            .state()
            .comments
            .iter()
            .filter(|c| c.story_id == story_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_pattern: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_key_containing(&self, pattern: &str) {
        *self.fail_pattern.lock().unwrap() = Some(pattern.to_string());
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, _content_type: &str, bytes: &[u8]) -> BackendResult<()> {
        let fail = self
            .fail_pattern
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|p| key.contains(p.as_str()));
        if fail {
            return Err(BackendError::Storage(format!("put {key} rejected")));
        }
        self.objects.lock().unwrap().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> BackendResult<()> {
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("memory://public/{key}")
    }

    fn signed_url(&self, key: &str, ttl: Duration) -> String {
        format!("memory://signed/{key}?ttl={}", ttl.as_secs())
    }
}
