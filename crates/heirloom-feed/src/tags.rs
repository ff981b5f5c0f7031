use uuid::Uuid;

use heirloom_types::models::Tag;
use tracing::{debug, info};

use crate::backend::{Backend, BackendError, BackendResult};

pub const MAX_TAGS_PER_STORY: usize = 3;
pub const DEFAULT_TAG_ICON: &str = "tag.svg";

/// Built-in tag names and their icons. Seeded by the database migrations and
/// reused when one of these names is created lazily.
pub const TAG_CATALOGUE: &[(&str, &str)] = &[
    ("Childhood", "baby.svg"),
    ("Sports", "trophy.svg"),
    ("Hobbies & Interests", "palette.svg"),
    ("Liberation war", "flag.svg"),
    ("Proud moments", "star.svg"),
    ("Travel", "plane.svg"),
    ("Grief", "heart.svg"),
    ("Family", "users.svg"),
    ("Health", "activity.svg"),
];

pub fn icon_for(name: &str) -> &'static str {
    TAG_CATALOGUE
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_TAG_ICON)
}

/// Trims names, drops blanks and collapses duplicates, keeping first-seen
/// order. Matching stays case-sensitive: "travel" and "Travel" are two tags.
pub fn normalize_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let trimmed = name.as_ref().trim();
        if !trimmed.is_empty() && !out.iter().any(|n| n == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTags {
    /// One tag per selected name, in selection order.
    pub tags: Vec<Tag>,
    /// The subset this call inserted.
    pub created: Vec<Tag>,
}

impl ResolvedTags {
    pub fn ids(&self) -> Vec<Uuid> {
        self.tags.iter().map(|t| t.id).collect()
    }
}

/// Tag resolution stopped part way; `created` lists the rows already inserted.
#[derive(Debug, thiserror::Error)]
#[error("tag resolution failed after creating {} tag(s): {source}", created.len())]
pub struct TagResolveError {
    pub created: Vec<Tag>,
    #[source]
    pub source: BackendError,
}

/// Maps each name to exactly one tag, inserting the names that do not exist.
pub fn resolve<B: Backend + ?Sized>(
    backend: &B,
    names: &[String],
) -> Result<ResolvedTags, TagResolveError> {
    let names = normalize_names(names);
    let mut created = Vec::new();

    let existing = backend.tags_by_name(&names).map_err(|source| TagResolveError {
        created: Vec::new(),
        source,
    })?;

    let mut tags = Vec::with_capacity(names.len());
    for name in &names {
        if let Some(tag) = existing.iter().find(|t| &t.name == name) {
            tags.push(tag.clone());
            continue;
        }

        match create_or_fetch(backend, name) {
            Ok((tag, inserted)) => {
                if inserted {
                    info!("Created tag '{}' ({})", tag.name, tag.id);
                    created.push(tag.clone());
                }
                tags.push(tag);
            }
            Err(source) => return Err(TagResolveError { created, source }),
        }
    }

    Ok(ResolvedTags { tags, created })
}

/// Another writer may create the same name between lookup and insert; a
/// conflict falls back to reading the winner's row.
fn create_or_fetch<B: Backend + ?Sized>(backend: &B, name: &str) -> BackendResult<(Tag, bool)> {
    match backend.insert_tag(name, icon_for(name)) {
        Ok(tag) => Ok((tag, true)),
        Err(BackendError::Conflict(_)) => {
            debug!("Tag '{}' created concurrently, re-reading", name);
            backend
                .tags_by_name(&[name.to_string()])?
                .into_iter()
                .find(|t| t.name == name)
                .map(|t| (t, false))
                .ok_or_else(|| BackendError::NotFound(format!("tag '{name}'")))
        }
        Err(e) => Err(e),
    }
}

/// Identifiers of the named tags that exist. Unknown names are skipped.
pub fn lookup_ids<B: Backend + ?Sized>(backend: &B, names: &[String]) -> BackendResult<Vec<Uuid>> {
    let names = normalize_names(names);
    if names.is_empty() {
        return Ok(Vec::new());
    }
    Ok(backend.tags_by_name(&names)?.into_iter().map(|t| t.id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryBackend;

    #[test]
    fn normalize_trims_and_dedups() {
        let names = normalize_names(&[" Travel", "Travel ", "", "travel", "Family"]);
        assert_eq!(names, vec!["Travel", "travel", "Family"]);
    }

    #[test]
    fn catalogue_icons() {
        assert_eq!(icon_for("Travel"), "plane.svg");
        assert_eq!(icon_for("Reunion"), DEFAULT_TAG_ICON);
    }

    #[test]
    fn missing_tag_is_created_once() {
        let backend = MemoryBackend::new();
        let travel = backend.seed_tag("Travel");

        let resolved = resolve(&backend, &["Travel".into(), "Reunion".into()]).unwrap();
        assert_eq!(resolved.tags.len(), 2);
        assert_eq!(resolved.tags[0].id, travel.id);
        assert_eq!(resolved.tags[1].name, "Reunion");
        assert_eq!(resolved.created.len(), 1);
        assert_eq!(backend.tag_count(), 2);

        let again = resolve(&backend, &["Reunion".into()]).unwrap();
        assert!(again.created.is_empty());
        assert_eq!(again.tags[0].id, resolved.tags[1].id);
        assert_eq!(backend.tag_count(), 2);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let backend = MemoryBackend::new();
        backend.seed_tag("Travel");
        let resolved = resolve(&backend, &["travel".into()]).unwrap();
        assert_eq!(resolved.created.len(), 1);
        assert_eq!(backend.tag_count(), 2);
    }

    #[test]
    fn partial_failure_reports_created_tags() {
        let backend = MemoryBackend::new();
        backend.fail_tag_insert_after(1);
        let err = resolve(&backend, &["One".into(), "Two".into()]).unwrap_err();
        assert_eq!(err.created.len(), 1);
        assert_eq!(err.created[0].name, "One");
    }

    #[test]
    fn lookup_skips_unknown_names() {
        let backend = MemoryBackend::new();
        let family = backend.seed_tag("Family");
        let ids = lookup_ids(&backend, &["Family".into(), "Nope".into()]).unwrap();
        assert_eq!(ids, vec![family.id]);
    }
}
