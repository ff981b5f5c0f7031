//! Database row types. These map directly to SQLite rows and are converted
//! into `heirloom_types` models at the edge of this crate.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use heirloom_types::models::{Comment, MediaKind, Profile, Relationship, Story, StoryMedia, Tag, User};

/// Timestamps are stored as fixed-width RFC 3339 text so that ordering by the
/// column orders by time.
pub fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn now_ts() -> String {
    format_ts(Utc::now())
}

/// Also accepts SQLite's `datetime('now')` form for rows written by hand.
pub fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .with_context(|| format!("bad timestamp '{raw}'"))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("bad id '{raw}'"))
}

fn parse_relationship(raw: &str) -> Result<Relationship> {
    raw.parse().map_err(|e| anyhow!("{e}"))
}

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            email: self.email,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct ProfileRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub relationship: Option<String>,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ProfileRow {
    pub const COLUMNS: &'static str =
        "id, full_name, email, relationship, bio, avatar_key, is_verified, created_at, updated_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            full_name: row.get(1)?,
            email: row.get(2)?,
            relationship: row.get(3)?,
            bio: row.get(4)?,
            avatar_key: row.get(5)?,
            is_verified: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    pub fn into_profile(self) -> Result<Profile> {
        Ok(Profile {
            id: parse_id(&self.id)?,
            full_name: self.full_name,
            email: self.email,
            relationship: self.relationship.as_deref().map(parse_relationship).transpose()?,
            bio: self.bio,
            avatar_key: self.avatar_key,
            is_verified: self.is_verified,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct StoryRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub thumbnail_key: Option<String>,
    pub audio_key: Option<String>,
    pub video_key: Option<String>,
    pub transcript_question: Option<String>,
    pub transcript_answer: Option<String>,
    pub duration_seconds: i64,
    pub is_published: bool,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl StoryRow {
    /// Column list for `SELECT ... FROM stories s`.
    pub const COLUMNS: &'static str = "s.id, s.user_id, s.title, s.description, s.thumbnail_key, s.audio_key, \
         s.video_key, s.transcript_question, s.transcript_answer, s.duration_seconds, s.is_published, \
         s.view_count, s.created_at, s.updated_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            thumbnail_key: row.get(4)?,
            audio_key: row.get(5)?,
            video_key: row.get(6)?,
            transcript_question: row.get(7)?,
            transcript_answer: row.get(8)?,
            duration_seconds: row.get(9)?,
            is_published: row.get(10)?,
            view_count: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    pub fn into_story(self) -> Result<Story> {
        Ok(Story {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            title: self.title,
            description: self.description,
            thumbnail_key: self.thumbnail_key,
            audio_key: self.audio_key,
            video_key: self.video_key,
            transcript_question: self.transcript_question,
            transcript_answer: self.transcript_answer,
            duration_seconds: u32::try_from(self.duration_seconds).unwrap_or(0),
            is_published: self.is_published,
            view_count: u64::try_from(self.view_count).unwrap_or(0),
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

pub struct TagRow {
    pub id: String,
    pub name: String,
    pub icon: String,
    pub created_at: String,
}

impl TagRow {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            icon: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn into_tag(self) -> Result<Tag> {
        Ok(Tag {
            id: parse_id(&self.id)?,
            name: self.name,
            icon: self.icon,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

pub struct MediaRow {
    pub story_id: String,
    pub position: i64,
    pub kind: String,
    pub object_key: String,
}

impl MediaRow {
    pub fn into_media(self) -> Result<StoryMedia> {
        Ok(StoryMedia {
            story_id: parse_id(&self.story_id)?,
            kind: self.kind.parse::<MediaKind>().map_err(|e| anyhow!(e))?,
            object_key: self.object_key,
            position: u32::try_from(self.position)?,
        })
    }
}

pub struct CommentRow {
    pub id: String,
    pub story_id: String,
    pub user_id: String,
    pub author_name: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

impl CommentRow {
    /// Column list for `comments c LEFT JOIN profiles p ON p.id = c.user_id`.
    pub const COLUMNS: &'static str = "c.id, c.story_id, c.user_id, COALESCE(p.full_name, 'Family member'), \
         c.parent_id, c.content, c.created_at, c.updated_at";

    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            story_id: row.get(1)?,
            user_id: row.get(2)?,
            author_name: row.get(3)?,
            parent_id: row.get(4)?,
            content: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    pub fn into_comment(self) -> Result<Comment> {
        Ok(Comment {
            id: parse_id(&self.id)?,
            story_id: parse_id(&self.story_id)?,
            user_id: parse_id(&self.user_id)?,
            author_name: self.author_name,
            parent_id: self.parent_id.as_deref().map(parse_id).transpose()?,
            content: self.content,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_sort_as_text() {
        let earlier = format_ts(Utc::now());
        let later = format_ts(Utc::now() + chrono::Duration::milliseconds(5));
        assert!(earlier < later);
        assert_eq!(format_ts(parse_ts(&earlier).unwrap()), earlier);
    }

    #[test]
    fn parses_sqlite_datetime() {
        let at = parse_ts("2024-05-01 12:30:00").unwrap();
        assert_eq!(format_ts(at), "2024-05-01T12:30:00.000000Z");
        assert!(parse_ts("yesterday").is_err());
    }
}
