//! Email + password login with optional TOTP second factor.

use axum::{Json, extract::Extension, http::HeaderMap};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::totp;

use super::error::{AuthError, AuthResult};
use super::password::verify_password;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{issue_session, touch_last_login};
use super::state::AuthState;
use super::storage::{UserRecord, consume_backup_code, find_user_by_email, insert_audit_row};
use super::types::{AuthResponse, LoginRequest, UserView};
use super::utils::{extract_client_ip, hash_token, normalize_email};

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 401, description = "Invalid credentials or bad second factor"),
        (status = 428, description = "Two-factor code required"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<LoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let client_ip = extract_client_ip(&headers);
    let email = normalize_email(&request.email);

    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || state.rate_limiter().check_key(&email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    // Unknown email, inactive account, and wrong password all collapse into
    // the same Unauthenticated response.
    let user = match find_user_by_email(&pool, &email).await? {
        Some(user) if user.is_active() => user,
        _ => {
            audit_failure(&pool, None, &email, "unknown_or_inactive", client_ip.as_deref()).await;
            return Err(AuthError::Unauthenticated);
        }
    };

    let password_ok = user
        .password_hash
        .as_deref()
        .is_some_and(|stored| verify_password(&request.password, stored));
    if !password_ok {
        audit_failure(&pool, Some(&user), &email, "bad_password", client_ip.as_deref()).await;
        return Err(AuthError::Unauthenticated);
    }

    if user.two_factor_enabled {
        let Some(code) = second_factor_input(request.two_factor_code.as_deref()) else {
            return Err(AuthError::FailedPrecondition(
                "Two-factor code required".to_string(),
            ));
        };
        if !verify_second_factor(&pool, &user, code).await? {
            audit_failure(&pool, Some(&user), &email, "bad_two_factor", client_ip.as_deref())
                .await;
            return Err(AuthError::Unauthenticated);
        }
    }

    let session =
        issue_session(&pool, state.config(), user.id, &headers, request.remember_me).await?;
    touch_last_login(&pool, user.id).await;

    Ok(Json(AuthResponse {
        user: UserView::from(user),
        token: session.token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }))
}

/// Whitespace-only input counts as absent: the client should be told a second
/// factor is expected, not that its credentials were wrong.
fn second_factor_input(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|code| !code.is_empty())
}

/// TOTP first, single-use backup code as the fallback.
async fn verify_second_factor(pool: &PgPool, user: &UserRecord, code: &str) -> AuthResult<bool> {
    let Some(secret) = user.two_factor_secret.as_deref() else {
        // Enabled flag without a secret is inconsistent state; fail closed.
        return Ok(false);
    };
    if totp::verify(secret, code) {
        return Ok(true);
    }
    Ok(consume_backup_code(pool, user.id, &hash_token(code)).await?)
}

async fn audit_failure(
    pool: &PgPool,
    user: Option<&UserRecord>,
    email: &str,
    outcome: &str,
    ip: Option<&str>,
) {
    // Append-only audit trail; never blocks the auth response.
    if let Err(err) = insert_audit_row(
        pool,
        user.map(|user| user.id),
        Some(email),
        "login",
        outcome,
        ip,
    )
    .await
    {
        error!("failed to record login audit row: {err:#}");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::test_support::auth_state;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/parlato_test")
            .unwrap()
    }

    #[tokio::test]
    async fn login_without_database_never_succeeds() {
        let result = login(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Json(LoginRequest {
                email: "user@example.com".to_string(),
                password: "Aa1!aaaa".to_string(),
                two_factor_code: None,
                remember_me: false,
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn blank_second_factor_counts_as_missing() {
        assert_eq!(second_factor_input(None), None);
        assert_eq!(second_factor_input(Some("")), None);
        assert_eq!(second_factor_input(Some("   ")), None);
        assert_eq!(second_factor_input(Some(" 123456 ")), Some("123456"));
    }
}
