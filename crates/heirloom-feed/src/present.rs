use chrono::{DateTime, Duration, Utc};

use heirloom_types::models::{Story, Tag};

use crate::backend::PageWindow;

/// Page size of the searchable stories feed.
pub const STORIES_PAGE_SIZE: u32 = 6;
/// Page size of the dashboard's "latest" grid.
pub const DASHBOARD_PAGE_SIZE: u32 = 9;

/// Stories younger than this carry the "new" badge.
const NEW_STORY_WINDOW_DAYS: i64 = 7;

/// Notice shown when a feed could not be loaded.
pub const FEED_UNAVAILABLE: &str = "We couldn't load stories right now. Please try again.";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub story: Story,
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub items: Vec<FeedItem>,
    pub total_count: u64,
    pub total_pages: u32,
    pub page: u32,
    pub page_size: u32,
    pub notice: Option<String>,
}

impl FeedPage {
    pub fn empty(page: u32, page_size: u32) -> Self {
        Self {
            items: Vec::new(),
            total_count: 0,
            total_pages: 0,
            page: page.max(1),
            page_size,
            notice: None,
        }
    }

    pub fn unavailable(page: u32, page_size: u32) -> Self {
        Self {
            notice: Some(FEED_UNAVAILABLE.to_string()),
            ..Self::empty(page, page_size)
        }
    }
}

/// ceil(total / page_size).
pub fn total_pages(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(u64::from(page_size)) as u32
}

/// Window for a 1-based page number; page 0 is read as page 1.
pub fn page_window(page: u32, page_size: u32) -> PageWindow {
    let page = page.max(1);
    PageWindow {
        offset: u64::from(page - 1) * u64::from(page_size),
        limit: page_size,
    }
}

/// `M:SS`, e.g. 75 seconds -> `1:15`.
pub fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn is_new(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    created_at > now - Duration::days(NEW_STORY_WINDOW_DAYS)
}
