//! Social login via OAuth2 identity providers.

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{AuthError, AuthResult};
use super::identity::{ExternalIdentity, Provider};
use super::session::{issue_session, touch_last_login};
use super::state::AuthState;
use super::storage::{
    InsertUserOutcome, UserRecord, ensure_social_link, find_user_by_email,
    find_user_by_provider_link, insert_user,
};
use super::types::{AuthResponse, SocialLoginRequest, UserView};
use super::utils::normalize_email;

#[utoipa::path(
    post,
    path = "/auth/social",
    request_body = SocialLoginRequest,
    responses(
        (status = 200, description = "Logged in; account and provider link created on first use", body = AuthResponse),
        (status = 400, description = "Unknown provider name"),
        (status = 401, description = "Account exists but is suspended or deleted"),
        (status = 503, description = "Identity provider unreachable or rejected the code"),
    ),
    tag = "auth"
)]
pub async fn social_login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<SocialLoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let provider = Provider::parse(&request.provider).ok_or_else(|| {
        AuthError::InvalidArgument(format!("Unknown provider: {}", request.provider))
    })?;

    let identity = state
        .identity()
        .exchange_code(provider, &request.code, &request.redirect_uri)
        .await?;

    let user = find_or_create_user(&pool, provider, &identity).await?;
    if !user.is_active() {
        return Err(AuthError::Unauthenticated);
    }

    // Idempotent: a repeat login with the same provider keeps the existing
    // link row.
    ensure_social_link(
        &pool,
        user.id,
        provider,
        &identity.provider_user_id,
        Some(&identity.email),
        &json!({
            "first_name": identity.first_name,
            "last_name": identity.last_name,
            "avatar_url": identity.avatar_url,
        }),
    )
    .await?;

    let session = issue_session(&pool, state.config(), user.id, &headers, false).await?;
    touch_last_login(&pool, user.id).await;

    Ok(Json(AuthResponse {
        user: UserView::from(user),
        token: session.token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }))
}

/// Resolve the account for an external identity: existing provider link
/// first, then email, then a fresh insert.
async fn find_or_create_user(
    pool: &PgPool,
    provider: Provider,
    identity: &ExternalIdentity,
) -> AuthResult<UserRecord> {
    if let Some(user) = find_user_by_provider_link(pool, provider, &identity.provider_user_id)
        .await?
    {
        return Ok(user);
    }
    find_or_create_by_email(pool, identity).await
}

/// Email-keyed find-or-create shared with SSO login. The unique email
/// constraint is the backstop when two first logins race; the loser re-reads
/// by email.
pub(super) async fn find_or_create_by_email(
    pool: &PgPool,
    identity: &ExternalIdentity,
) -> AuthResult<UserRecord> {
    let email = normalize_email(&identity.email);
    if let Some(user) = find_user_by_email(pool, &email).await? {
        return Ok(user);
    }

    let mut tx = pool
        .begin()
        .await
        .context("begin social user insert")
        .map_err(AuthError::Internal)?;
    let outcome = insert_user(
        &mut tx,
        &email,
        None,
        None,
        identity.first_name.as_deref(),
        identity.last_name.as_deref(),
        identity.avatar_url.as_deref(),
    )
    .await?;
    match outcome {
        InsertUserOutcome::Created(user) => {
            tx.commit()
                .await
                .context("commit social user insert")
                .map_err(AuthError::Internal)?;
            Ok(user)
        }
        InsertUserOutcome::Conflict => {
            let _ = tx.rollback().await;
            find_user_by_email(pool, &email)
                .await?
                .ok_or(AuthError::Unauthenticated)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::test_support::{auth_state, auth_state_with};
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/parlato_test")
            .unwrap()
    }

    fn request(provider: &str) -> SocialLoginRequest {
        SocialLoginRequest {
            provider: provider.to_string(),
            code: "auth-code".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
        }
    }

    #[tokio::test]
    async fn rejects_unknown_provider_before_any_exchange() {
        let result = social_login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Json(request("myspace")),
        )
        .await;
        assert!(matches!(result, Err(AuthError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn surfaces_upstream_failure_from_exchanger() {
        // A fake exchanger configured with no identity fails the exchange.
        let result = social_login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state_with(None)),
            Json(request("google")),
        )
        .await;
        assert!(matches!(result, Err(AuthError::Unavailable(_))));
    }
}
