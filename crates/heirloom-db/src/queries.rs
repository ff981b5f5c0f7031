use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use heirloom_types::models::{Comment, Profile, Relationship, Tag, User};

use crate::Database;
use crate::models::{CommentRow, ProfileRow, TagRow, UserRow, now_ts};

/// Profile fields written at sign-up (no relationship yet) and by the
/// profile setup form.
pub struct ProfileUpdate<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub relationship: Option<Relationship>,
    pub bio: Option<&'a str>,
}

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (&id, email, password_hash, now_ts()),
            )?;
            query_user(conn, "id", &id)?
                .ok_or_else(|| anyhow::anyhow!("user {id} vanished after insert"))?
                .into_user()
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    // -- Profiles --

    pub fn get_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        self.with_conn(|conn| query_profile(conn, &user_id.to_string()))
    }

    /// Creates or updates the caller's profile. The first profile ever
    /// created is verified on the spot so the family has someone to vouch
    /// for later members.
    pub fn upsert_profile(&self, user_id: Uuid, update: &ProfileUpdate<'_>) -> Result<Profile> {
        let id = user_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let first: bool = tx.query_row("SELECT NOT EXISTS (SELECT 1 FROM profiles)", [], |r| r.get(0))?;
            let now = now_ts();
            tx.execute(
                "INSERT INTO profiles (id, full_name, email, relationship, bio, is_verified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    full_name = excluded.full_name,
                    email = excluded.email,
                    relationship = excluded.relationship,
                    bio = excluded.bio,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    id,
                    update.full_name,
                    update.email,
                    update.relationship.map(|r| r.as_str()),
                    update.bio,
                    first,
                    now,
                ],
            )?;
            let profile = query_profile(&tx, &id)?.ok_or_else(|| anyhow::anyhow!("profile {id} vanished"))?;
            tx.commit()?;
            if first {
                info!("First profile {} verified automatically", id);
            }
            Ok(profile)
        })
    }

    /// Returns false when the user has no profile yet.
    pub fn set_avatar(&self, user_id: Uuid, avatar_key: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE profiles SET avatar_key = ?2, updated_at = ?3 WHERE id = ?1",
                (user_id.to_string(), avatar_key, now_ts()),
            )?;
            Ok(updated > 0)
        })
    }

    pub fn verify_profile(&self, profile_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE profiles SET is_verified = 1, updated_at = ?2 WHERE id = ?1",
                (profile_id.to_string(), now_ts()),
            )?;
            Ok(updated > 0)
        })
    }

    // -- Stories --

    pub fn increment_view_count(&self, story_id: Uuid) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE stories SET view_count = view_count + 1 WHERE id = ?1",
                [story_id.to_string()],
            )?;
            Ok(())
        })
    }

    // -- Likes / bookmarks --

    /// Toggle a like. Returns (now liked, like count).
    pub fn toggle_like(&self, user_id: Uuid, story_id: Uuid) -> Result<(bool, u64)> {
        self.with_conn_mut(|conn| toggle(conn, "likes", user_id, story_id))
    }

    /// Toggle a bookmark. Returns (now bookmarked, bookmark count).
    pub fn toggle_bookmark(&self, user_id: Uuid, story_id: Uuid) -> Result<(bool, u64)> {
        self.with_conn_mut(|conn| toggle(conn, "bookmarks", user_id, story_id))
    }

    pub fn like_count(&self, story_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| count_for_story(conn, "likes", &story_id.to_string()))
    }

    pub fn is_liked(&self, user_id: Uuid, story_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| exists_pair(conn, "likes", user_id, story_id))
    }

    pub fn is_bookmarked(&self, user_id: Uuid, story_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| exists_pair(conn, "bookmarks", user_id, story_id))
    }

    // -- Comments --

    pub fn insert_comment(
        &self,
        story_id: Uuid,
        user_id: Uuid,
        parent_id: Option<Uuid>,
        content: &str,
    ) -> Result<Comment> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            let now = now_ts();
            conn.execute(
                "INSERT INTO comments (id, story_id, user_id, parent_id, content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    id,
                    story_id.to_string(),
                    user_id.to_string(),
                    parent_id.map(|p| p.to_string()),
                    content,
                    now,
                ],
            )?;
            query_comment(conn, &id)?.ok_or_else(|| anyhow::anyhow!("comment {id} vanished after insert"))
        })
    }

    pub fn get_comment(&self, comment_id: Uuid) -> Result<Option<Comment>> {
        self.with_conn(|conn| query_comment(conn, &comment_id.to_string()))
    }

    /// Deletes a comment written by `author_id`. Direct replies lose their
    /// parent and become top-level. Returns whether a row was deleted.
    pub fn delete_comment(&self, comment_id: Uuid, author_id: Uuid) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM comments WHERE id = ?1 AND user_id = ?2",
                (comment_id.to_string(), author_id.to_string()),
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Tags --

    pub fn all_tags(&self) -> Result<Vec<Tag>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, icon, created_at FROM tags ORDER BY name")?;
            let rows = stmt
                .query_map([], TagRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(TagRow::into_tag).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT id, email, password, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profile(conn: &Connection, id: &str) -> Result<Option<Profile>> {
    let sql = format!("SELECT {} FROM profiles WHERE id = ?1", ProfileRow::COLUMNS);
    conn.query_row(&sql, [id], ProfileRow::from_row)
        .optional()?
        .map(ProfileRow::into_profile)
        .transpose()
}

fn query_comment(conn: &Connection, id: &str) -> Result<Option<Comment>> {
    let sql = format!(
        "SELECT {} FROM comments c LEFT JOIN profiles p ON p.id = c.user_id WHERE c.id = ?1",
        CommentRow::COLUMNS
    );
    conn.query_row(&sql, [id], CommentRow::from_row)
        .optional()?
        .map(CommentRow::into_comment)
        .transpose()
}

/// `table` is one of the (user_id, story_id, created_at) pair tables.
fn toggle(conn: &Connection, table: &str, user_id: Uuid, story_id: Uuid) -> Result<(bool, u64)> {
    let (user, story) = (user_id.to_string(), story_id.to_string());
    let removed = conn.execute(
        &format!("DELETE FROM {table} WHERE user_id = ?1 AND story_id = ?2"),
        (&user, &story),
    )?;
    if removed == 0 {
        conn.execute(
            &format!("INSERT INTO {table} (user_id, story_id, created_at) VALUES (?1, ?2, ?3)"),
            (&user, &story, now_ts()),
        )?;
    }
    Ok((removed == 0, count_for_story(conn, table, &story)?))
}

fn count_for_story(conn: &Connection, table: &str, story_id: &str) -> Result<u64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE story_id = ?1"),
        [story_id],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

fn exists_pair(conn: &Connection, table: &str, user_id: Uuid, story_id: Uuid) -> Result<bool> {
    let found: bool = conn.query_row(
        &format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE user_id = ?1 AND story_id = ?2)"),
        (user_id.to_string(), story_id.to_string()),
        |r| r.get(0),
    )?;
    Ok(found)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
