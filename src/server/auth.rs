//! Static shared-secret bearer authentication.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use super::AppState;

/// Proof that the request carried the configured bearer token
#[derive(Debug, Clone, Copy)]
pub struct Authorized;

/// Check an `Authorization` header value against `secret`
pub fn check_bearer(header: Option<&str>, secret: &str) -> Result<(), ApiError> {
    let token = header
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Missing Bearer token".to_string()))?;

    if token.trim() != secret {
        return Err(ApiError::Forbidden("Invalid token".to_string()));
    }
    Ok(())
}

impl FromRequestParts<AppState> for Authorized {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        check_bearer(header, &state.api_key)?;
        Ok(Authorized)
    }
}
