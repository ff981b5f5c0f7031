use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use heirloom_db::queries::ProfileUpdate;
use heirloom_feed::ObjectStore;
use heirloom_types::api::{Claims, ProfileSetupRequest};
use heirloom_types::models::Relationship;

use crate::auth::{AppState, blocking, viewer};
use crate::error::ApiError;
use crate::views;

/// 5 MB avatar limit
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub async fn get_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = claims.sub;
    let profile = blocking(&state, move |s| Ok(s.db.get_profile(user_id)?))
        .await?
        .ok_or_else(|| ApiError::ProfileIncomplete("profile setup required".into()))?;
    Ok(Json(views::profile_response(&state, profile)))
}

/// PUT /profile: the profile setup form. Creates the profile on first use.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ProfileSetupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_string();
    if full_name.is_empty() || email.is_empty() {
        return Err(ApiError::BadRequest("please fill in all required fields".into()));
    }
    let relationship: Relationship = req
        .relationship
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;
    let bio = req.bio.map(|b| b.trim().to_string()).filter(|b| !b.is_empty());

    let user_id = claims.sub;
    let profile = blocking(&state, move |s| {
        Ok(s.db.upsert_profile(
            user_id,
            &ProfileUpdate {
                full_name: &full_name,
                email: &email,
                relationship: Some(relationship),
                bio: bio.as_deref(),
            },
        )?)
    })
    .await?;

    info!("Profile {} saved ({})", profile.id, relationship);
    Ok(Json(views::profile_response(&state, profile)))
}

/// POST /profile/avatar: raw image bytes with an `image/*` content type.
pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest("avatar must be an image".into()));
    }
    if bytes.is_empty() {
        return Err(ApiError::BadRequest("avatar is empty".into()));
    }
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::PayloadTooLarge);
    }

    let user_id = claims.sub;
    let previous = blocking(&state, move |s| Ok(s.db.get_profile(user_id)?))
        .await?
        .ok_or_else(|| ApiError::ProfileIncomplete("profile setup required".into()))?
        .avatar_key;

    let ext = mime_guess::get_mime_extensions_str(&content_type)
        .and_then(|exts| exts.first())
        .copied()
        .unwrap_or("img");
    let key = format!("avatars/{}-{}.{}", user_id, Uuid::new_v4().simple(), ext);

    state.store.put(&key, &content_type, &bytes).await?;

    let stored = key.clone();
    let saved = blocking(&state, move |s| Ok(s.db.set_avatar(user_id, &stored)?)).await;
    keep_avatar(&state.store, &key, saved).await?;

    if let Some(old) = previous {
        if let Err(e) = state.store.remove(&old).await {
            warn!("Failed to remove old avatar {}: {}", old, e);
        }
    }

    info!("Avatar updated for {}", user_id);
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "avatar_url": state.store.public_url(&key) })),
    ))
}

/// Removes a freshly stored avatar again unless the profile now points at it.
async fn keep_avatar<S: ObjectStore>(store: &S, key: &str, saved: Result<bool, ApiError>) -> Result<(), ApiError> {
    match saved {
        Ok(true) => Ok(()),
        other => {
            if let Err(e) = store.remove(key).await {
                warn!("Failed to remove unused avatar {}: {}", key, e);
            }
            match other {
                Err(e) => Err(e),
                _ => Err(ApiError::ProfileIncomplete("profile setup required".into())),
            }
        }
    }
}

/// POST /profiles/{id}/verify: a verified member vouches for another profile.
pub async fn verify_profile(
    State(state): State<AppState>,
    Path(profile_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let voucher = viewer(&state, &claims).await?;

    let found = blocking(&state, move |s| Ok(s.db.verify_profile(profile_id)?)).await?;
    if !found {
        return Err(ApiError::NotFound);
    }

    info!("Profile {} verified by {}", profile_id, voucher.user_id);
    Ok(StatusCode::NO_CONTENT)
}
