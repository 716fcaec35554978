//! The caller, as vouched for by the identity proxy in front of the service.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use santa_common::keys::is_valid_segment;
use santa_common::{headers, Identity, UserId};

use crate::error::{AppError, SantaError};

pub struct CurrentUser(pub Identity);

fn header(parts: &Parts, name: &str) -> String {
    parts
        .headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let uid = header(parts, headers::UID);
        if uid.is_empty() {
            return Err(SantaError::Unauthenticated.into());
        }
        if !is_valid_segment(&uid) {
            return Err(SantaError::Validation(format!("invalid user id {uid:?}")).into());
        }
        Ok(CurrentUser(Identity {
            uid: UserId(uid),
            display_name: header(parts, headers::NAME),
            email: header(parts, headers::EMAIL),
            photo_url: header(parts, headers::PHOTO),
        }))
    }
}
