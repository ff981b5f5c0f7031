//! [`Backend`] over SQLite. Every call is its own statement or short
//! transaction, matching the hosted-backend contract the feed is written for.

use std::collections::HashMap;

use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use heirloom_feed::backend::{
    Backend, BackendError, BackendResult, NewStory, PageWindow, PrimaryMedia, StoryFilter, StoryOrder,
};
use heirloom_types::models::{Comment, Profile, Relationship, Story, StoryMedia, Tag};

use crate::{Database, is_unique_violation};
use crate::models::{CommentRow, MediaRow, ProfileRow, StoryRow, TagRow, format_ts, now_ts};
use crate::queries::OptionalExt;

fn query_err(e: anyhow::Error) -> BackendError {
    BackendError::Query(e.to_string())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn text_values<T: ToString>(items: &[T]) -> Vec<Value> {
    items.iter().map(|i| Value::Text(i.to_string())).collect()
}

/// Escapes LIKE wildcards so a search term matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// WHERE clause and bound values for `filter`, against `stories s`.
fn where_clause(filter: &StoryFilter) -> (String, Vec<Value>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    if filter.visibility.is_empty() {
        clauses.push("0".to_string());
    } else {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM story_visibility v WHERE v.story_id = s.id AND v.relationship IN ({}))",
            placeholders(filter.visibility.len())
        ));
        values.extend(filter.visibility.iter().map(|r| Value::Text(r.as_str().to_string())));
    }

    if filter.published_only {
        clauses.push("s.is_published = 1".to_string());
    }

    if let Some(ids) = &filter.story_ids {
        if ids.is_empty() {
            clauses.push("0".to_string());
        } else {
            clauses.push(format!("s.id IN ({})", placeholders(ids.len())));
            values.extend(text_values(ids));
        }
    }

    if let Some(after) = filter.created_after {
        clauses.push("s.created_at > ?".to_string());
        values.push(Value::Text(format_ts(after)));
    }

    if let Some(term) = &filter.search {
        clauses.push(
            "(fold_case(s.title) LIKE ? ESCAPE '\\' OR fold_case(s.description) LIKE ? ESCAPE '\\')".to_string(),
        );
        let pattern = like_pattern(&term.to_lowercase());
        values.push(Value::Text(pattern.clone()));
        values.push(Value::Text(pattern));
    }

    (clauses.join(" AND "), values)
}

fn order_by(order: StoryOrder) -> &'static str {
    match order {
        StoryOrder::CreatedDesc => "s.created_at DESC, s.rowid DESC",
        StoryOrder::CreatedAsc => "s.created_at ASC, s.rowid ASC",
        StoryOrder::TitleAsc => "s.title COLLATE NOCASE ASC, s.created_at DESC",
        StoryOrder::UpdatedDesc => "s.updated_at DESC, s.rowid DESC",
    }
}

pub(crate) fn query_story(conn: &Connection, story_id: &str) -> Result<Option<Story>> {
    let sql = format!("SELECT {} FROM stories s WHERE s.id = ?1", StoryRow::COLUMNS);
    conn.query_row(&sql, [story_id], StoryRow::from_row)
        .optional()?
        .map(StoryRow::into_story)
        .transpose()
}

fn query_tags_by_name(conn: &Connection, names: &[String]) -> Result<Vec<Tag>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, name, icon, created_at FROM tags WHERE name IN ({})",
        placeholders(names.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(names.iter()), TagRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(TagRow::into_tag).collect()
}

impl Backend for Database {
    fn profile(&self, user_id: Uuid) -> BackendResult<Option<Profile>> {
        self.get_profile(user_id).map_err(query_err)
    }

    fn tags_by_name(&self, names: &[String]) -> BackendResult<Vec<Tag>> {
        self.with_conn(|conn| query_tags_by_name(conn, names)).map_err(query_err)
    }

    fn insert_tag(&self, name: &str, icon: &str) -> BackendResult<Tag> {
        let tag = Tag {
            id: Uuid::new_v4(),
            name: name.to_string(),
            icon: icon.to_string(),
            created_at: chrono::Utc::now(),
        };
        let result = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO tags (id, name, icon, created_at) VALUES (?1, ?2, ?3, ?4)",
                (tag.id.to_string(), &tag.name, &tag.icon, format_ts(tag.created_at)),
            )?;
            Ok(())
        });
        match result {
            Ok(()) => Ok(tag),
            Err(e) if is_unique_violation(&e) => Err(BackendError::Conflict(format!("tag '{name}' exists"))),
            Err(e) => Err(query_err(e)),
        }
    }

    fn delete_tag_if_unused(&self, tag_id: Uuid) -> BackendResult<bool> {
        self.with_conn_mut(|conn| {
            let id = tag_id.to_string();
            let deleted = conn.execute(
                "DELETE FROM tags WHERE id = ?1
                 AND NOT EXISTS (SELECT 1 FROM story_tags WHERE tag_id = ?1)",
                [&id],
            )?;
            Ok(deleted > 0)
        })
        .map_err(query_err)
    }

    fn story_ids_for_tags(&self, tag_ids: &[Uuid]) -> BackendResult<Vec<Uuid>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT DISTINCT story_id FROM story_tags WHERE tag_id IN ({})",
                placeholders(tag_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let ids = stmt
                .query_map(params_from_iter(text_values(tag_ids)), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.iter().map(|id| Ok(Uuid::parse_str(id)?)).collect()
        })
        .map_err(query_err)
    }

    fn tags_for_stories(&self, story_ids: &[Uuid]) -> BackendResult<HashMap<Uuid, Vec<Tag>>> {
        if story_ids.is_empty() {
            return Ok(HashMap::new());
        }
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT st.story_id, t.id, t.name, t.icon, t.created_at
                 FROM story_tags st JOIN tags t ON t.id = st.tag_id
                 WHERE st.story_id IN ({})",
                placeholders(story_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(text_values(story_ids)), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        TagRow {
                            id: row.get(1)?,
                            name: row.get(2)?,
                            icon: row.get(3)?,
                            created_at: row.get(4)?,
                        },
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut out: HashMap<Uuid, Vec<Tag>> = HashMap::new();
            for (story_id, tag) in rows {
                out.entry(Uuid::parse_str(&story_id)?).or_default().push(tag.into_tag()?);
            }
            Ok(out)
        })
        .map_err(query_err)
    }

    fn associate_tags(&self, story_id: Uuid, tag_ids: &[Uuid]) -> BackendResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare("INSERT OR IGNORE INTO story_tags (story_id, tag_id) VALUES (?1, ?2)")?;
                for tag_id in tag_ids {
                    stmt.execute((story_id.to_string(), tag_id.to_string()))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(query_err)
    }

    fn count_stories(&self, filter: &StoryFilter) -> BackendResult<u64> {
        let (clause, values) = where_clause(filter);
        self.with_conn(|conn| {
            let sql = format!("SELECT COUNT(*) FROM stories s WHERE {clause}");
            let count: i64 = conn.query_row(&sql, params_from_iter(values), |r| r.get(0))?;
            Ok(count as u64)
        })
        .map_err(query_err)
    }

    fn list_stories(&self, filter: &StoryFilter, window: PageWindow) -> BackendResult<Vec<Story>> {
        let (clause, mut values) = where_clause(filter);
        values.push(Value::Integer(i64::from(window.limit)));
        values.push(Value::Integer(window.offset as i64));
        debug!("Listing stories where {} ({:?})", clause, filter.order);

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM stories s WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
                StoryRow::COLUMNS,
                clause,
                order_by(filter.order)
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values), StoryRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(StoryRow::into_story).collect()
        })
        .map_err(query_err)
    }

    fn story(&self, story_id: Uuid) -> BackendResult<Option<Story>> {
        self.with_conn(|conn| query_story(conn, &story_id.to_string()))
            .map_err(query_err)
    }

    fn visibility_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Relationship>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT relationship FROM story_visibility WHERE story_id = ?1 ORDER BY relationship")?;
            let raw = stmt
                .query_map([story_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            raw.iter()
                .map(|r| r.parse::<Relationship>().map_err(anyhow::Error::from))
                .collect()
        })
        .map_err(query_err)
    }

    fn insert_story(&self, story: &NewStory) -> BackendResult<Story> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            let now = now_ts();
            conn.execute(
                "INSERT INTO stories (id, user_id, title, description, transcript_question, transcript_answer,
                                      duration_seconds, is_published, view_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8, ?8)",
                rusqlite::params![
                    id,
                    story.user_id.to_string(),
                    story.title,
                    story.description,
                    story.transcript_question,
                    story.transcript_answer,
                    story.duration_seconds,
                    now,
                ],
            )?;
            query_story(conn, &id)?.ok_or_else(|| anyhow::anyhow!("story {id} vanished after insert"))
        })
        .map_err(query_err)
    }

    fn insert_visibility(&self, story_id: Uuid, categories: &[Relationship]) -> BackendResult<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt =
                    tx.prepare("INSERT OR IGNORE INTO story_visibility (story_id, relationship) VALUES (?1, ?2)")?;
                for category in categories {
                    stmt.execute((story_id.to_string(), category.as_str()))?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(query_err)
    }

    fn attach_media(&self, story_id: Uuid, media: &[StoryMedia]) -> BackendResult<()> {
        let primary = PrimaryMedia::pick(media);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let id = story_id.to_string();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO story_media (story_id, position, kind, object_key) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for m in media {
                    stmt.execute((&id, m.position, m.kind.as_str(), &m.object_key))?;
                }
            }
            let updated = tx.execute(
                "UPDATE stories SET
                    thumbnail_key = COALESCE(?2, thumbnail_key),
                    audio_key = COALESCE(?3, audio_key),
                    video_key = COALESCE(?4, video_key),
                    updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, primary.thumbnail, primary.audio, primary.video, now_ts()],
            )?;
            if updated == 0 {
                anyhow::bail!("story {id} not found");
            }
            tx.commit()?;
            Ok(())
        })
        .map_err(query_err)
    }

    fn media_for_story(&self, story_id: Uuid) -> BackendResult<Vec<StoryMedia>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT story_id, position, kind, object_key FROM story_media WHERE story_id = ?1 ORDER BY position",
            )?;
            let rows = stmt
                .query_map([story_id.to_string()], |row| {
                    Ok(MediaRow {
                        story_id: row.get(0)?,
                        position: row.get(1)?,
                        kind: row.get(2)?,
                        object_key: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(MediaRow::into_media).collect()
        })
        .map_err(query_err)
    }

    fn delete_story(&self, story_id: Uuid) -> BackendResult<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM stories WHERE id = ?1", [story_id.to_string()])?;
            Ok(())
        })
        .map_err(query_err)
    }

    fn bookmarked_story_ids(&self, user_id: Uuid) -> BackendResult<Vec<Uuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT story_id FROM bookmarks WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
            )?;
            let ids = stmt
                .query_map([user_id.to_string()], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            ids.iter().map(|id| Ok(Uuid::parse_str(id)?)).collect()
        })
        .map_err(query_err)
    }

    fn comments_for_story(&self, story_id: Uuid) -> BackendResult<Vec<Comment>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM comments c LEFT JOIN profiles p ON p.id = c.user_id
                 WHERE c.story_id = ?1 ORDER BY c.created_at DESC, c.rowid DESC",
                CommentRow::COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([story_id.to_string()], CommentRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(CommentRow::into_comment).collect()
        })
        .map_err(query_err)
    }
}
