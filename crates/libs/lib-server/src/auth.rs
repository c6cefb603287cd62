//! Shared-token gate for the compile endpoints.
//!
//! The token is a single fixed opaque string sent as the literal
//! `authorization` header value. This keeps random bots out; it is not an
//! authentication system.

use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::{Result, ServerError};

/// Check the `authorization` header against the shared token.
pub fn require_auth(headers: &HeaderMap) -> Result<()> {
    match headers.get(AUTHORIZATION) {
        Some(value) if value.as_bytes() == lib_common::AUTH_TOKEN.as_bytes() => Ok(()),
        _ => Err(ServerError::Unauthorized),
    }
}

/// Middleware form of [`require_auth`] for the protected sub-router.
pub async fn auth_middleware(request: Request, next: Next) -> Result<Response> {
    require_auth(request.headers())?;
    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_valid_token_passes() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(lib_common::AUTH_TOKEN));
        assert!(require_auth(&headers).is_ok());
    }

    #[test]
    fn test_missing_or_wrong_token_fails() {
        let headers = HeaderMap::new();
        assert!(matches!(
            require_auth(&headers),
            Err(ServerError::Unauthorized)
        ));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("wrong"));
        assert!(matches!(
            require_auth(&headers),
            Err(ServerError::Unauthorized)
        ));
    }
}
