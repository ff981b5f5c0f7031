use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::error;

use heirloom_feed::dashboard;
use heirloom_feed::present::{DASHBOARD_PAGE_SIZE, FeedPage};
use heirloom_types::api::{Claims, DashboardParams, DashboardResponse};

use crate::auth::{AppState, blocking, viewer};
use crate::error::ApiError;
use crate::views;

/// GET /dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(params): Query<DashboardParams>,
) -> Result<impl IntoResponse, ApiError> {
    let viewer = viewer(&state, &claims).await?;
    let page = params.page;

    let loaded = blocking(&state, move |s| Ok(dashboard::load(&s.db, &viewer, page))).await?;

    let response = match loaded {
        Ok(dash) => DashboardResponse {
            featured: dash.featured.map(|item| views::story_card(&state, &item, chrono::Utc::now())),
            recent: views::story_cards(&state, &dash.recent),
            bookmarks: views::story_cards(&state, &dash.bookmarks),
            latest: views::feed_response(&state, dash.latest),
        },
        Err(e) => {
            error!("Dashboard failed for {}: {}", claims.sub, e);
            DashboardResponse {
                featured: None,
                recent: Vec::new(),
                bookmarks: Vec::new(),
                latest: views::feed_response(&state, FeedPage::unavailable(page, DASHBOARD_PAGE_SIZE)),
            }
        }
    };

    Ok(Json(response))
}
