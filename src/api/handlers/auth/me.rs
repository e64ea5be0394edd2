//! Authenticated self-service endpoints.

use axum::{Json, extract::Extension, http::HeaderMap};
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{AuthError, AuthResult};
use super::principal::require_auth;
use super::state::AuthState;
use super::storage::update_profile;
use super::types::{UpdateProfileRequest, UserView};

const MAX_NAME_LENGTH: usize = 100;
const MAX_AVATAR_URL_LENGTH: usize = 500;

#[utoipa::path(
    get,
    path = "/auth/user/me",
    responses(
        (status = 200, description = "The authenticated user, sanitized", body = UserView),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    tag = "auth"
)]
pub async fn get_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
) -> AuthResult<Json<UserView>> {
    let principal = require_auth(&headers, &pool, &state).await?;
    Ok(Json(UserView::from(principal.user)))
}

#[utoipa::path(
    patch,
    path = "/auth/user/me",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user, sanitized", body = UserView),
        (status = 400, description = "Field too long or malformed avatar URL"),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    tag = "auth"
)]
pub async fn update_me(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<UpdateProfileRequest>,
) -> AuthResult<Json<UserView>> {
    let principal = require_auth(&headers, &pool, &state).await?;
    validate_profile(&request)?;

    let user = update_profile(
        &pool,
        principal.user.id,
        request.first_name.as_deref(),
        request.last_name.as_deref(),
        request.avatar_url.as_deref(),
    )
    .await?
    .ok_or(AuthError::Unauthenticated)?;

    Ok(Json(UserView::from(user)))
}

fn validate_profile(request: &UpdateProfileRequest) -> AuthResult<()> {
    for (field, value) in [
        ("first_name", request.first_name.as_deref()),
        ("last_name", request.last_name.as_deref()),
    ] {
        if let Some(value) = value
            && value.chars().count() > MAX_NAME_LENGTH
        {
            return Err(AuthError::InvalidArgument(format!("{field} is too long")));
        }
    }
    if let Some(avatar_url) = request.avatar_url.as_deref() {
        if avatar_url.len() > MAX_AVATAR_URL_LENGTH {
            return Err(AuthError::InvalidArgument("avatar_url is too long".to_string()));
        }
        if url::Url::parse(avatar_url).is_err() {
            return Err(AuthError::InvalidArgument(
                "avatar_url must be a valid URL".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(
        first_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> UpdateProfileRequest {
        UpdateProfileRequest {
            first_name: first_name.map(str::to_string),
            last_name: None,
            avatar_url: avatar_url.map(str::to_string),
        }
    }

    #[test]
    fn accepts_reasonable_profile_updates() {
        assert!(validate_profile(&request(Some("Ada"), Some("https://cdn.example.com/a.png"))).is_ok());
        assert!(validate_profile(&request(None, None)).is_ok());
    }

    #[test]
    fn rejects_oversized_and_malformed_fields() {
        let long_name = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_profile(&request(Some(&long_name), None)).is_err());
        assert!(validate_profile(&request(None, Some("not a url"))).is_err());
    }
}
