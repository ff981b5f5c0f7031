use std::collections::HashMap;

use uuid::Uuid;

use crate::backend::{Backend, BackendResult, PageWindow, StoryFilter, StoryOrder};
use crate::context::ViewerContext;
use crate::present::{DASHBOARD_PAGE_SIZE, FeedItem, FeedPage};
use crate::query::{self, FeedQuery};

const RECENT_STRIP_LEN: u32 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    /// Newest story the viewer may read.
    pub featured: Option<FeedItem>,
    /// Most recently updated stories.
    pub recent: Vec<FeedItem>,
    /// The viewer's bookmarks, newest bookmark first. Bookmarked stories the
    /// viewer can no longer see are left out.
    pub bookmarks: Vec<FeedItem>,
    pub latest: FeedPage,
}

pub fn load<B: Backend + ?Sized>(backend: &B, viewer: &ViewerContext, page: u32) -> BackendResult<Dashboard> {
    let visible = StoryFilter::visible_to(viewer.allowed_categories());

    let featured = backend.list_stories(&visible, PageWindow { offset: 0, limit: 1 })?;
    let featured = query::annotate(backend, featured)?.into_iter().next();

    let recent_filter = StoryFilter {
        order: StoryOrder::UpdatedDesc,
        ..visible.clone()
    };
    let recent = backend.list_stories(&recent_filter, PageWindow { offset: 0, limit: RECENT_STRIP_LEN })?;
    let recent = query::annotate(backend, recent)?;

    let bookmarks = bookmarks(backend, viewer, visible)?;

    let latest = query::load(backend, viewer, &FeedQuery::new(DASHBOARD_PAGE_SIZE).page(page));

    Ok(Dashboard {
        featured,
        recent,
        bookmarks,
        latest,
    })
}

fn bookmarks<B: Backend + ?Sized>(
    backend: &B,
    viewer: &ViewerContext,
    visible: StoryFilter,
) -> BackendResult<Vec<FeedItem>> {
    let ids = backend.bookmarked_story_ids(viewer.user_id)?;
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let rank: HashMap<Uuid, usize> = ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let filter = StoryFilter {
        story_ids: Some(ids.clone()),
        ..visible
    };
    let mut stories = backend.list_stories(&filter, PageWindow { offset: 0, limit: ids.len() as u32 })?;
    stories.sort_by_key(|s| rank.get(&s.id).copied().unwrap_or(usize::MAX));
    query::annotate(backend, stories)
}
