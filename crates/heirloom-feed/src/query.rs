use std::collections::HashMap;

use tracing::{debug, error};
use uuid::Uuid;

use heirloom_types::models::{SortOrder, Story, Tag};

use crate::backend::{Backend, BackendResult, PageWindow, StoryFilter, StoryOrder};
use crate::context::ViewerContext;
use crate::present::{self, FeedItem, FeedPage};
use crate::tags;

/// Everything a reader can vary on the stories feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub search: String,
    pub tags: Vec<String>,
    pub sort: SortOrder,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

impl FeedQuery {
    pub fn new(page_size: u32) -> Self {
        Self {
            search: String::new(),
            tags: Vec::new(),
            sort: SortOrder::default(),
            page: 1,
            page_size,
        }
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = tags.iter().map(|t| t.as_ref().to_string()).collect();
        self
    }

    pub fn sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

/// Builds the retrieval filter for `query`. Returns `None` when the tag
/// filter already rules out every story, so no main query is needed.
pub fn compose<B: Backend + ?Sized>(
    backend: &B,
    viewer: &ViewerContext,
    query: &FeedQuery,
) -> BackendResult<Option<StoryFilter>> {
    let mut filter = StoryFilter::visible_to(viewer.allowed_categories());
    filter.order = StoryOrder::from(query.sort);

    let search = query.search.trim();
    if !search.is_empty() {
        filter.search = Some(search.to_string());
    }

    let selected = tags::normalize_names(&query.tags);
    if !selected.is_empty() {
        let tag_ids = tags::lookup_ids(backend, &selected)?;
        if tag_ids.is_empty() {
            debug!("No tags match {:?}; feed is empty", selected);
            return Ok(None);
        }
        let story_ids = backend.story_ids_for_tags(&tag_ids)?;
        if story_ids.is_empty() {
            return Ok(None);
        }
        filter.story_ids = Some(story_ids);
    }

    Ok(Some(filter))
}

/// Runs `query` for `viewer`, propagating backend failures.
pub fn fetch<B: Backend + ?Sized>(
    backend: &B,
    viewer: &ViewerContext,
    query: &FeedQuery,
) -> BackendResult<FeedPage> {
    let page = query.page.max(1);
    let Some(filter) = compose(backend, viewer, query)? else {
        return Ok(FeedPage::empty(page, query.page_size));
    };

    let total_count = backend.count_stories(&filter)?;
    let total_pages = present::total_pages(total_count, query.page_size);
    let window = present::page_window(page, query.page_size);

    let stories = if window.offset >= total_count {
        Vec::new()
    } else {
        backend.list_stories(&filter, window)?
    };

    Ok(FeedPage {
        items: annotate(backend, stories)?,
        total_count,
        total_pages,
        page,
        page_size: query.page_size,
        notice: None,
    })
}

/// Like [`fetch`], but a failed lookup yields an empty page with a notice.
pub fn load<B: Backend + ?Sized>(backend: &B, viewer: &ViewerContext, query: &FeedQuery) -> FeedPage {
    fetch(backend, viewer, query).unwrap_or_else(|e| {
        error!("Feed query failed for viewer {}: {}", viewer.user_id, e);
        FeedPage::unavailable(query.page, query.page_size)
    })
}

/// Pairs each story with its tags (sorted by name).
pub fn annotate<B: Backend + ?Sized>(backend: &B, stories: Vec<Story>) -> BackendResult<Vec<FeedItem>> {
    if stories.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = stories.iter().map(|s| s.id).collect();
    let mut by_story: HashMap<Uuid, Vec<Tag>> = backend.tags_for_stories(&ids)?;

    Ok(stories
        .into_iter()
        .map(|story| {
            let mut tags = by_story.remove(&story.id).unwrap_or_default();
            tags.sort_by(|a, b| a.name.cmp(&b.name));
            FeedItem { story, tags }
        })
        .collect())
}

/// The next story the viewer may read, by creation time.
pub fn next_story<B: Backend + ?Sized>(
    backend: &B,
    viewer: &ViewerContext,
    current: &Story,
) -> BackendResult<Option<FeedItem>> {
    let mut filter = StoryFilter::visible_to(viewer.allowed_categories());
    filter.created_after = Some(current.created_at);
    filter.order = StoryOrder::CreatedAsc;

    let stories = backend.list_stories(&filter, PageWindow { offset: 0, limit: 1 })?;
    Ok(annotate(backend, stories)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::present::STORIES_PAGE_SIZE;
    use crate::testing::MemoryBackend;
    use heirloom_types::models::Relationship;

    fn viewer(rel: Relationship) -> ViewerContext {
        ViewerContext::new(Uuid::new_v4(), rel)
    }

    #[test]
    fn parent_or_sibling_viewer_also_sees_relative_stories() {
        let backend = MemoryBackend::new();
        let closer = backend.seed_story("A", "", &[Relationship::SpouseOrChild], &[]);
        let own = backend.seed_story("B", "", &[Relationship::ParentOrSibling], &[]);
        let wider = backend.seed_story("C", "", &[Relationship::Relative], &[]);

        let v = viewer(Relationship::ParentOrSibling);
        let page = fetch(&backend, &v, &FeedQuery::new(STORIES_PAGE_SIZE)).unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|i| i.story.id).collect();
        assert!(ids.contains(&own.id));
        assert!(ids.contains(&wider.id));
        assert!(!ids.contains(&closer.id));
    }

    #[test]
    fn relative_viewer_excludes_parent_or_sibling_story() {
        let backend = MemoryBackend::new();
        let a = backend.seed_story("A", "", &[Relationship::Relative], &[]);
        let b = backend.seed_story("B", "", &[Relationship::ParentOrSibling], &[]);

        let page = fetch(&backend, &viewer(Relationship::Relative), &FeedQuery::new(6)).unwrap();
        let ids: Vec<Uuid> = page.items.iter().map(|i| i.story.id).collect();
        assert_eq!(ids, vec![a.id]);
        assert!(!ids.contains(&b.id));
    }

    #[test]
    fn story_without_visibility_is_hidden_from_everyone() {
        let backend = MemoryBackend::new();
        backend.seed_story("Draft", "", &[], &[]);
        for rel in Relationship::ALL {
            let page = fetch(&backend, &viewer(rel), &FeedQuery::new(6)).unwrap();
            assert_eq!(page.total_count, 0);
            assert!(page.items.is_empty());
        }
    }

    #[test]
    fn search_matches_title_or_description_case_insensitively() {
        let backend = MemoryBackend::new();
        let vis = [Relationship::Relative];
        backend.seed_story("Summer TRIP", "", &vis, &[]);
        backend.seed_story("Wedding", "the road trip home", &vis, &[]);
        backend.seed_story("Eid", "lanterns", &vis, &[]);

        let v = viewer(Relationship::Relative);
        let page = fetch(&backend, &v, &FeedQuery::new(6).search("trip")).unwrap();
        assert_eq!(page.total_count, 2);

        let page = fetch(&backend, &v, &FeedQuery::new(6).search("   ")).unwrap();
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn tag_filter_is_or_across_tags() {
        let backend = MemoryBackend::new();
        let vis = [Relationship::Relative];
        let s1 = backend.seed_story("One", "", &vis, &["Travel"]);
        let s2 = backend.seed_story("Two", "", &vis, &["Family"]);
        backend.seed_story("Three", "", &vis, &["Health"]);

        let v = viewer(Relationship::Relative);
        let page = fetch(&backend, &v, &FeedQuery::new(6).tags(&["Travel", "Family"])).unwrap();
        let mut ids: Vec<Uuid> = page.items.iter().map(|i| i.story.id).collect();
        ids.sort();
        let mut expected = vec![s1.id, s2.id];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn unknown_tag_short_circuits() {
        let backend = MemoryBackend::new();
        backend.seed_story("One", "", &[Relationship::Relative], &["Travel"]);
        let v = viewer(Relationship::Relative);
        let page = fetch(&backend, &v, &FeedQuery::new(6).tags(&["Nope"])).unwrap();
        assert_eq!(page.total_count, 0);
        assert_eq!(backend.story_list_calls(), 0);
    }

    #[test]
    fn search_tags_sort_and_pages_combine() {
        let backend = MemoryBackend::new();
        let vis = [Relationship::Relative];
        let titles = ["H trip", "C trip", "A trip", "F trip", "B trip", "G trip", "E trip", "D trip"];
        for title in titles {
            backend.seed_story(title, "", &vis, &["Travel"]);
        }
        backend.seed_story("A trip without tag", "", &vis, &[]);
        backend.seed_story("A travel story", "no match", &vis, &["Travel"]);

        let v = viewer(Relationship::Relative);
        let query = FeedQuery::new(6).search("trip").tags(&["Travel"]).sort(SortOrder::Az);

        let first = fetch(&backend, &v, &query).unwrap();
        assert_eq!(first.total_count, 8);
        assert_eq!(first.total_pages, 2);
        let names: Vec<&str> = first.items.iter().map(|i| i.story.title.as_str()).collect();
        assert_eq!(names, vec!["A trip", "B trip", "C trip", "D trip", "E trip", "F trip"]);
        assert!(first.items.iter().all(|i| i.tags.iter().any(|t| t.name == "Travel")));

        let second = fetch(&backend, &v, &query.clone().page(2)).unwrap();
        let names: Vec<&str> = second.items.iter().map(|i| i.story.title.as_str()).collect();
        assert_eq!(names, vec!["G trip", "H trip"]);

        let beyond = fetch(&backend, &v, &query.page(3)).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_count, 8);
    }

    #[test]
    fn recent_and_oldest_orders() {
        let backend = MemoryBackend::new();
        let vis = [Relationship::Relative];
        let first = backend.seed_story("first", "", &vis, &[]);
        let second = backend.seed_story("second", "", &vis, &[]);
        let v = viewer(Relationship::Relative);

        let recent = fetch(&backend, &v, &FeedQuery::new(6)).unwrap();
        assert_eq!(recent.items[0].story.id, second.id);

        let oldest = fetch(&backend, &v, &FeedQuery::new(6).sort(SortOrder::Oldest)).unwrap();
        assert_eq!(oldest.items[0].story.id, first.id);
    }

    #[test]
    fn failure_yields_empty_page_with_notice() {
        let backend = MemoryBackend::new();
        backend.seed_story("One", "", &[Relationship::Relative], &[]);
        backend.fail_queries();
        let page = load(&backend, &viewer(Relationship::Relative), &FeedQuery::new(6));
        assert!(page.items.is_empty());
        assert!(page.notice.is_some());
    }

    #[test]
    fn next_story_skips_hidden() {
        let backend = MemoryBackend::new();
        let first = backend.seed_story("first", "", &[Relationship::Relative], &[]);
        backend.seed_story("hidden", "", &[Relationship::SpouseOrChild], &[]);
        let third = backend.seed_story("third", "", &[Relationship::Relative], &[]);

        let v = viewer(Relationship::Relative);
        let next = next_story(&backend, &v, &first).unwrap().unwrap();
        assert_eq!(next.story.id, third.id);
        assert!(next_story(&backend, &v, &third).unwrap().is_none());
    }
}
