//! Caller identity as asserted by the upstream identity service.
//!
//! The gateway in front of this API authenticates callers and forwards
//! either `x-user-id` (registered) or `x-guest-token` (guest). When both are
//! present the registered identity wins.

use crate::{errors::ApiError, models::Identity};
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

pub const USER_ID_HEADER: &str = "x-user-id";
pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

/// Optional caller identity; anonymous callers yield `CallerIdentity(None)`.
#[derive(Debug, Clone)]
pub struct CallerIdentity(pub Option<Identity>);

/// Caller identity that must be present.
#[derive(Debug, Clone)]
pub struct RequireIdentity(pub Identity);

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn identity_from_parts(parts: &Parts) -> Result<Option<Identity>, ApiError> {
    let identity = if let Some(raw) = header_str(parts, USER_ID_HEADER) {
        let user_id = raw.parse::<i32>().map_err(|_| {
            ApiError::Unauthorized(format!("{} must be a positive integer", USER_ID_HEADER))
        })?;
        Identity::registered(user_id)
    } else if let Some(token) = header_str(parts, GUEST_TOKEN_HEADER) {
        Identity::guest(token)
    } else {
        return Ok(None);
    };

    identity.validate().map_err(ApiError::Unauthorized)?;
    Ok(Some(identity))
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts).map(CallerIdentity)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_parts(parts)?
            .map(RequireIdentity)
            .ok_or_else(|| ApiError::Unauthorized("caller identity is required".to_string()))
    }
}
