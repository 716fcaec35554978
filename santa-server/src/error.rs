use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use santa_common::UserId;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

pub type SantaResult<T> = std::result::Result<T, SantaError>;

/// Every way a user action can be refused or fail.
#[derive(Error, Debug)]
pub enum SantaError {
    #[error("Not signed in")]
    Unauthenticated,

    #[error("{0}")]
    Validation(String),

    #[error("You can't send a friend request to yourself")]
    SelfRequest,

    #[error("Friend request already sent or you're already friends")]
    DuplicateRequest,

    #[error("User hasn't used the app yet")]
    UnknownUser(UserId),

    #[error("Friend data not found")]
    MissingProfile(UserId),

    #[error("No pending friend request from {0}")]
    NoPendingRequest(UserId),

    #[error("{0} is not in your friends list")]
    NotFriends(UserId),

    #[error("Only the owner can do that")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SantaError {
    pub fn status(&self) -> StatusCode {
        match self {
            SantaError::Unauthenticated => StatusCode::UNAUTHORIZED,
            SantaError::Validation(_) | SantaError::SelfRequest | SantaError::NotFriends(_) => StatusCode::BAD_REQUEST,
            SantaError::DuplicateRequest | SantaError::NoPendingRequest(_) => StatusCode::CONFLICT,
            SantaError::UnknownUser(_) | SantaError::MissingProfile(_) | SantaError::NotFound(_) => StatusCode::NOT_FOUND,
            SantaError::Forbidden => StatusCode::FORBIDDEN,
            SantaError::Store(StoreError::InvalidSegment(_)) => StatusCode::BAD_REQUEST,
            SantaError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError(anyhow::Error);

// Tell axum how to convert `AppError` into a response.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<SantaError>()
            .map(SantaError::status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = if status.is_server_error() {
            error!(error = %self.0, "request failed");
            format!("Something went wrong: {}", self.0)
        } else {
            warn!(%status, error = %self.0, "request refused");
            self.0.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`. That way you don't need to do that manually.
impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
