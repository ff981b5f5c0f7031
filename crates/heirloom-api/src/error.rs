use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use heirloom_feed::AccessError;
use heirloom_feed::backend::BackendError;
use heirloom_feed::publish::{PublishError, RetractError, ValidationError};
use heirloom_types::api::ErrorBody;

pub const SIGNIN_PATH: &str = "/signin";
pub const PROFILE_SETUP_PATH: &str = "/profile/setup";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("sign in required")]
    Unauthorized,

    #[error("{0}")]
    ProfileIncomplete(String),

    #[error("profile awaiting family verification")]
    Unverified,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("file is too large")]
    PayloadTooLarge,

    #[error("Something went wrong. Please try again.")]
    Internal(String),
}

impl ApiError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        Self::Internal(e.to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::ProfileIncomplete(_) | Self::Unverified | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn redirect(&self) -> Option<&'static str> {
        match self {
            Self::Unauthorized => Some(SIGNIN_PATH),
            Self::ProfileIncomplete(_) => Some(PROFILE_SETUP_PATH),
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(detail) = &self {
            error!("Request failed: {}", detail);
        }
        let body = ErrorBody {
            error: self.to_string(),
            redirect: self.redirect().map(str::to_string),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<AccessError> for ApiError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::ProfileMissing | AccessError::RelationshipUnset => Self::ProfileIncomplete(e.to_string()),
            AccessError::Unverified => Self::Unverified,
            AccessError::Backend(e) => e.into(),
        }
    }
}

impl From<BackendError> for ApiError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::NotFound(_) => Self::NotFound,
            other => Self::internal(other),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

impl From<PublishError> for ApiError {
    fn from(e: PublishError) -> Self {
        match e {
            PublishError::Invalid(v) => v.into(),
            PublishError::Uploads { .. } => Self::Internal(format!("{e}; nothing was saved")),
            PublishError::Step { .. } => Self::internal(e),
        }
    }
}

impl From<RetractError> for ApiError {
    fn from(e: RetractError) -> Self {
        match e {
            RetractError::NotFound => Self::NotFound,
            RetractError::Backend(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(format!("{e:#}"))
    }
}
