use anyhow::Result;
use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use heirloom_feed::tags::TAG_CATALOGUE;

use crate::models::now_ts;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| {
        r.get(0)
    })?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password    TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE profiles (
                id           TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                full_name    TEXT NOT NULL,
                email        TEXT NOT NULL,
                relationship TEXT CHECK (relationship IN
                    ('spouse_or_child', 'parent_or_sibling', 'relative', 'friend')),
                bio          TEXT,
                avatar_key   TEXT,
                is_verified  INTEGER NOT NULL DEFAULT 0,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            );

            CREATE TABLE stories (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title               TEXT NOT NULL,
                description         TEXT NOT NULL DEFAULT '',
                thumbnail_key       TEXT,
                audio_key           TEXT,
                video_key           TEXT,
                transcript_question TEXT,
                transcript_answer   TEXT,
                duration_seconds    INTEGER NOT NULL DEFAULT 0,
                is_published        INTEGER NOT NULL DEFAULT 1,
                view_count          INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE INDEX idx_stories_created ON stories(created_at);
            CREATE INDEX idx_stories_updated ON stories(updated_at);

            CREATE TABLE story_media (
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                position    INTEGER NOT NULL,
                kind        TEXT NOT NULL CHECK (kind IN ('image', 'audio', 'video')),
                object_key  TEXT NOT NULL,
                PRIMARY KEY (story_id, position)
            );

            CREATE TABLE story_visibility (
                story_id     TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                relationship TEXT NOT NULL CHECK (relationship IN
                    ('spouse_or_child', 'parent_or_sibling', 'relative', 'friend')),
                PRIMARY KEY (story_id, relationship)
            );

            CREATE TABLE tags (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                icon        TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE story_tags (
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                tag_id      TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (story_id, tag_id)
            );

            CREATE INDEX idx_story_tags_tag ON story_tags(tag_id);

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                parent_id   TEXT REFERENCES comments(id) ON DELETE SET NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_story ON comments(story_id, created_at);

            CREATE TABLE likes (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, story_id)
            );

            CREATE TABLE bookmarks (
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                story_id    TEXT NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (user_id, story_id)
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;

        let now = now_ts();
        for (name, icon) in TAG_CATALOGUE {
            conn.execute(
                "INSERT OR IGNORE INTO tags (id, name, icon, created_at) VALUES (?1, ?2, ?3, ?4)",
                (Uuid::new_v4().to_string(), name, icon, &now),
            )?;
        }
        info!("Seeded {} catalogue tags", TAG_CATALOGUE.len());
    }

    info!("Database migrations complete");
    Ok(())
}
