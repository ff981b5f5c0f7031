//! Feed items to response payloads. Story media goes out as signed links,
//! avatars as public ones.

use chrono::{DateTime, Utc};

use heirloom_feed::ObjectStore;
use heirloom_feed::present::{self, FeedItem, FeedPage};
use heirloom_types::api::{FeedResponse, ProfileResponse, StoryCard, TagBadge};
use heirloom_types::models::{Profile, Tag};

use crate::auth::AppStateInner;

pub fn tag_badges(tags: &[Tag]) -> Vec<TagBadge> {
    tags.iter()
        .map(|t| TagBadge {
            name: t.name.clone(),
            icon: t.icon.clone(),
        })
        .collect()
}

pub fn signed(state: &AppStateInner, key: Option<&str>) -> Option<String> {
    key.map(|k| state.store.signed_url(k, state.signed_url_ttl))
}

pub fn story_card(state: &AppStateInner, item: &FeedItem, now: DateTime<Utc>) -> StoryCard {
    let story = &item.story;
    StoryCard {
        id: story.id,
        title: story.title.clone(),
        description: story.description.clone(),
        thumbnail_url: signed(state, story.thumbnail_key.as_deref()),
        audio_url: signed(state, story.audio_key.as_deref()),
        video_url: signed(state, story.video_key.as_deref()),
        duration: present::format_duration(story.duration_seconds),
        view_count: story.view_count,
        is_new: present::is_new(story.created_at, now),
        created_at: story.created_at,
        updated_at: story.updated_at,
        tags: tag_badges(&item.tags),
    }
}

pub fn story_cards(state: &AppStateInner, items: &[FeedItem]) -> Vec<StoryCard> {
    let now = Utc::now();
    items.iter().map(|i| story_card(state, i, now)).collect()
}

pub fn feed_response(state: &AppStateInner, page: FeedPage) -> FeedResponse {
    FeedResponse {
        stories: story_cards(state, &page.items),
        total_count: page.total_count,
        total_pages: page.total_pages,
        page: page.page,
        page_size: page.page_size,
        notice: page.notice,
    }
}

pub fn profile_response(state: &AppStateInner, profile: Profile) -> ProfileResponse {
    ProfileResponse {
        id: profile.id,
        avatar_url: profile.avatar_key.as_deref().map(|k| state.store.public_url(k)),
        full_name: profile.full_name,
        email: profile.email,
        relationship: profile.relationship,
        bio: profile.bio,
        is_verified: profile.is_verified,
        updated_at: profile.updated_at,
    }
}
