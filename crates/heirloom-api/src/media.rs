use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::debug;

use heirloom_storage::{LocalStore, SignatureError};

use crate::auth::AppState;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: u64,
    pub sig: String,
}

async fn serve(state: &AppState, key: &str) -> Result<Response, ApiError> {
    let bytes = state
        .store
        .read(key)
        .await
        .map_err(|_| ApiError::NotFound)?
        .ok_or(ApiError::NotFound)?;
    let mime = mime_guess::from_path(key).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

/// GET /media/public/{*key}: avatars only.
pub async fn public_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    if !LocalStore::is_public(&key) {
        return Err(ApiError::NotFound);
    }
    serve(&state, &key).await
}

/// GET /media/signed/{*key}?expires&sig
pub async fn signed_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SignedParams>,
) -> Result<Response, ApiError> {
    state
        .store
        .verify(&key, params.expires, &params.sig)
        .map_err(|e| {
            debug!("Rejected media link for {}: {}", key, e);
            match e {
                SignatureError::Expired => ApiError::Forbidden("this link has expired".into()),
                SignatureError::Invalid => ApiError::Forbidden("invalid link".into()),
            }
        })?;
    serve(&state, &key).await
}
