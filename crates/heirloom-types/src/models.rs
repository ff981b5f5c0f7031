use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a family member relates to the family whose memories are shared.
/// Doubles as the visibility category a story can be published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relationship {
    SpouseOrChild,
    ParentOrSibling,
    Relative,
    Friend,
}

impl Relationship {
    pub const ALL: [Relationship; 4] = [
        Relationship::SpouseOrChild,
        Relationship::ParentOrSibling,
        Relationship::Relative,
        Relationship::Friend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpouseOrChild => "spouse_or_child",
            Self::ParentOrSibling => "parent_or_sibling",
            Self::Relative => "relative",
            Self::Friend => "friend",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRelationship(pub String);

impl fmt::Display for UnknownRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown relationship '{}'", self.0)
    }
}

impl std::error::Error for UnknownRelationship {}

impl FromStr for Relationship {
    type Err = UnknownRelationship;

    /// Accepts the stored snake_case form as well as the form labels
    /// ("Spouse or Child") that the sign-up form submits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join("_");
        match normalized.as_str() {
            "spouse_or_child" => Ok(Self::SpouseOrChild),
            "parent_or_sibling" => Ok(Self::ParentOrSibling),
            "relative" => Ok(Self::Relative),
            "friend" => Ok(Self::Friend),
            _ => Err(UnknownRelationship(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub relationship: Option<Relationship>,
    pub bio: Option<String>,
    pub avatar_key: Option<String>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A memory post. Media fields hold object-store keys, never URLs; URLs are
/// minted per response because story media is served through signed links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
    pub thumbnail_key: Option<String>,
    pub audio_key: Option<String>,
    pub video_key: Option<String>,
    pub transcript_question: Option<String>,
    pub transcript_answer: Option<String>,
    pub duration_seconds: u32,
    pub is_published: bool,
    pub view_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub name: String,
    pub icon: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
}

impl MediaKind {
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let top = content_type.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Object-store folder for this kind.
    pub fn folder(&self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Audio => "audio",
            Self::Video => "videos",
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown media kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryMedia {
    pub story_id: Uuid,
    pub kind: MediaKind,
    pub object_key: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub story_id: Uuid,
    pub user_id: Uuid,
    pub author_name: String,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A top-level comment and the replies of its thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first by creation time.
    #[default]
    Recent,
    Oldest,
    /// Title ascending.
    Az,
}
