//! Authenticated principal extraction.
//!
//! Flow Overview: read the `Authorization: Bearer` header, verify the token
//! signature and expiry, then re-check the user row. Token validity and
//! account validity are independent gates: a suspended or deleted user is
//! rejected even with a valid unexpired token.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::Utc;
use sqlx::PgPool;

use super::error::{AuthError, AuthResult};
use super::state::AuthState;
use super::storage::{UserRecord, find_user_by_id};
use super::token::verify_bearer;

/// Authenticated user context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user: UserRecord,
}

/// Resolve the bearer header into a principal.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> AuthResult<Principal> {
    let token = extract_bearer(headers).ok_or(AuthError::Unauthenticated)?;
    let claims = verify_bearer(
        state.config().token_secret(),
        token,
        Utc::now().timestamp(),
    )?;

    let user = find_user_by_id(pool, claims.sub)
        .await?
        .ok_or(AuthError::Unauthenticated)?;
    if !user.is_active() {
        return Err(AuthError::Unauthenticated);
    }
    Ok(Principal { user })
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = headers_with("Bearer abc.def");
        assert_eq!(extract_bearer(&headers), Some("abc.def"));
    }

    #[test]
    fn rejects_missing_and_malformed_headers() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
        assert_eq!(extract_bearer(&headers_with("Basic abc")), None);
        assert_eq!(extract_bearer(&headers_with("Bearer ")), None);
    }
}
