use std::sync::Arc;
use std::time::Duration;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::{SaltString, rand_core::OsRng}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{error, info};
use uuid::Uuid;

use heirloom_db::Database;
use heirloom_db::queries::ProfileUpdate;
use heirloom_feed::ViewerContext;
use heirloom_storage::LocalStore;
use heirloom_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;

const TOKEN_LIFETIME_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 8;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub store: LocalStore,
    pub jwt_secret: String,
    /// Lifetime of signed story media links.
    pub signed_url_ttl: Duration,
}

/// Runs blocking database work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal(e)
        })?
}

/// Loads the caller's profile and checks it may browse stories.
pub(crate) async fn viewer(state: &AppState, claims: &Claims) -> Result<ViewerContext, ApiError> {
    let user_id = claims.sub;
    blocking(state, move |s| Ok(ViewerContext::resolve(&s.db, user_id)?)).await
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let full_name = req.full_name.trim().to_string();
    if !email.contains('@') || email.len() > 254 {
        return Err(ApiError::BadRequest("enter a valid email address".into()));
    }
    if full_name.is_empty() {
        return Err(ApiError::BadRequest("full name is required".into()));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(ApiError::internal)?
        .to_string();

    let user = blocking(&state, move |s| {
        // The unique email index settles concurrent sign-ups.
        let user = s.db.create_user(&email, &password_hash).map_err(|e| {
            if heirloom_db::is_unique_violation(&e) {
                ApiError::Conflict("an account with this email already exists".into())
            } else {
                e.into()
            }
        })?;
        s.db.upsert_profile(
            user.id,
            &ProfileUpdate {
                full_name: &full_name,
                email: &email,
                relationship: None,
                bio: None,
            },
        )?;
        Ok(user)
    })
    .await?;

    info!("Registered user {}", user.id);
    let token = create_token(&state.jwt_secret, user.id, &user.email).map_err(ApiError::internal)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id: user.id,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    let user = blocking(&state, move |s| Ok(s.db.get_user_by_email(&email)?))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    // Verify password
    let parsed_hash = PasswordHash::new(&user.password).map_err(ApiError::internal)?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user.id.parse().map_err(ApiError::internal)?;

    let token = create_token(&state.jwt_secret, user_id, &user.email).map_err(ApiError::internal)?;

    Ok(Json(LoginResponse {
        user_id,
        email: user.email,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, email: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_LIFETIME_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> anyhow::Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_with_the_same_secret() {
        let id = Uuid::new_v4();
        let token = create_token("s3cret", id, "ana@example.com").unwrap();
        let claims = decode_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.email, "ana@example.com");
        assert!(decode_token("other", &token).is_err());
    }
}
