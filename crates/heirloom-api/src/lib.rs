pub mod auth;
pub mod comments;
pub mod dashboard;
pub mod error;
pub mod media;
pub mod middleware;
pub mod profiles;
pub mod reactions;
pub mod stories;
pub mod tags;
pub mod views;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// Every route of the service. Callers add CORS and tracing layers.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/media/public/{*key}", get(media::public_object))
        .route("/media/signed/{*key}", get(media::signed_object))
        .route("/health", get(health))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/profile", get(profiles::get_profile).put(profiles::update_profile))
        .route(
            "/profile/avatar",
            post(profiles::upload_avatar).layer(DefaultBodyLimit::max(profiles::MAX_AVATAR_BYTES + 1024)),
        )
        .route("/profiles/{id}/verify", post(profiles::verify_profile))
        .route(
            "/stories",
            get(stories::list_stories)
                .post(stories::create_story)
                .layer(DefaultBodyLimit::max(stories::MAX_SUBMISSION_BYTES)),
        )
        .route("/stories/{id}", get(stories::get_story).delete(stories::delete_story))
        .route("/stories/{id}/comments", post(comments::create_comment))
        .route("/stories/{id}/like", post(reactions::toggle_like))
        .route("/stories/{id}/bookmark", post(reactions::toggle_bookmark))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/dashboard", get(dashboard::get_dashboard))
        .route("/tags", get(tags::list_tags))
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
