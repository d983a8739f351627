use crate::error::{ApiError, ApiResult};
use axum::Extension;
use wanderlust_common::upstream_auth::UpstreamUser;

/// Caller id placed by `UpstreamAuthLayer`; absent means the request was anonymous.
pub fn require_user(user: Option<Extension<UpstreamUser>>) -> ApiResult<String> {
    match user {
        Some(Extension(u)) => Ok(u.id().to_string()),
        None => Err(ApiError::unauthorized("authentication required")),
    }
}
