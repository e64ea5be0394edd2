//! TOTP second-factor enrollment and teardown.
//!
//! Enrollment is two steps: `enable` stores the secret unconfirmed and hands
//! back the provisioning URI plus one-time backup codes; `confirm` flips the
//! enabled flag only after the caller proves their authenticator produces
//! matching codes. Disable demands both the password and a live code.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::totp;

use super::error::{AuthError, AuthResult};
use super::password::verify_password;
use super::principal::require_auth;
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{
    UserRecord, confirm_two_factor, disable_two_factor, replace_backup_codes,
    store_two_factor_secret,
};
use super::token::generate_numeric_code;
use super::types::{
    ConfirmTwoFactorRequest, DisableTwoFactorRequest, EnableTwoFactorRequest,
    EnableTwoFactorResponse,
};
use super::utils::{extract_client_ip, hash_token};

const BACKUP_CODES: usize = 10;
const BACKUP_CODE_DIGITS: usize = 8;

fn check_password(user: &UserRecord, password: &str) -> AuthResult<()> {
    let ok = user
        .password_hash
        .as_deref()
        .is_some_and(|stored| verify_password(password, stored));
    if ok { Ok(()) } else { Err(AuthError::Unauthenticated) }
}

#[utoipa::path(
    post,
    path = "/auth/2fa/enable",
    request_body = EnableTwoFactorRequest,
    responses(
        (status = 200, description = "Secret issued; submit a code to /auth/2fa/confirm", body = EnableTwoFactorResponse),
        (status = 401, description = "Missing bearer or wrong password"),
        (status = 409, description = "Two-factor already enabled"),
    ),
    tag = "auth"
)]
pub async fn enable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<EnableTwoFactorRequest>,
) -> AuthResult<Json<EnableTwoFactorResponse>> {
    let principal = require_auth(&headers, &pool, &state).await?;
    check_password(&principal.user, &request.password)?;
    if principal.user.two_factor_enabled {
        return Err(AuthError::AlreadyExists(
            "Two-factor already enabled".to_string(),
        ));
    }

    let secret = totp::generate_secret();
    let otpauth_url = totp::provisioning_uri(
        &secret,
        state.config().totp_issuer(),
        &principal.user.email,
    );

    // Backup codes are returned raw exactly once; only their hashes persist.
    let mut backup_codes = Vec::with_capacity(BACKUP_CODES);
    for _ in 0..BACKUP_CODES {
        backup_codes.push(generate_numeric_code(BACKUP_CODE_DIGITS).map_err(AuthError::Internal)?);
    }
    let code_hashes: Vec<Vec<u8>> = backup_codes.iter().map(|code| hash_token(code)).collect();

    let mut tx = pool
        .begin()
        .await
        .context("begin two-factor enable transaction")
        .map_err(AuthError::Internal)?;
    store_two_factor_secret(&mut tx, principal.user.id, &secret).await?;
    replace_backup_codes(&mut tx, principal.user.id, &code_hashes).await?;
    tx.commit()
        .await
        .context("commit two-factor enable transaction")
        .map_err(AuthError::Internal)?;

    Ok(Json(EnableTwoFactorResponse {
        secret,
        otpauth_url,
        backup_codes,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/2fa/confirm",
    request_body = ConfirmTwoFactorRequest,
    responses(
        (status = 204, description = "Two-factor enabled"),
        (status = 401, description = "Missing bearer or code does not match"),
        (status = 428, description = "No pending secret to confirm"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn confirm(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<ConfirmTwoFactorRequest>,
) -> AuthResult<StatusCode> {
    let principal = require_auth(&headers, &pool, &state).await?;
    rate_limit_two_factor(&headers, &state, &principal.user)?;

    let Some(secret) = principal.user.two_factor_secret.as_deref() else {
        return Err(AuthError::FailedPrecondition(
            "Two-factor enrollment has not been started".to_string(),
        ));
    };
    if !totp::verify(secret, request.code.trim()) {
        return Err(AuthError::Unauthenticated);
    }

    confirm_two_factor(&pool, principal.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/2fa/disable",
    request_body = DisableTwoFactorRequest,
    responses(
        (status = 204, description = "Two-factor disabled; secret and backup codes cleared"),
        (status = 401, description = "Missing bearer, wrong password, or code does not match"),
        (status = 428, description = "Two-factor is not enabled"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn disable(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<DisableTwoFactorRequest>,
) -> AuthResult<StatusCode> {
    let principal = require_auth(&headers, &pool, &state).await?;
    rate_limit_two_factor(&headers, &state, &principal.user)?;

    // Both factors required: the password and a live code.
    check_password(&principal.user, &request.password)?;
    let Some(secret) = principal.user.two_factor_secret.as_deref() else {
        return Err(AuthError::FailedPrecondition(
            "Two-factor is not enabled".to_string(),
        ));
    };
    if !principal.user.two_factor_enabled {
        return Err(AuthError::FailedPrecondition(
            "Two-factor is not enabled".to_string(),
        ));
    }
    if !totp::verify(secret, request.code.trim()) {
        return Err(AuthError::Unauthenticated);
    }

    disable_two_factor(&pool, principal.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn rate_limit_two_factor(
    headers: &HeaderMap,
    state: &AuthState,
    user: &UserRecord,
) -> AuthResult<()> {
    let client_ip = extract_client_ip(headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::TwoFactor)
        == RateLimitDecision::Limited
        || state
            .rate_limiter()
            .check_key(&user.email, RateLimitAction::TwoFactor)
            == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::password::hash_password;
    use chrono::Utc;
    use uuid::Uuid;

    fn user_with_password(password: &str) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            phone: None,
            password_hash: Some(hash_password(password).unwrap()),
            first_name: None,
            last_name: None,
            avatar_url: None,
            email_verified: true,
            phone_verified: false,
            two_factor_enabled: false,
            two_factor_secret: None,
            status: "active".to_string(),
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn check_password_accepts_match_and_rejects_mismatch() {
        let user = user_with_password("Aa1!aaaa");
        assert!(check_password(&user, "Aa1!aaaa").is_ok());
        assert!(matches!(
            check_password(&user, "Bb2@bbbb"),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn check_password_rejects_accounts_without_password() {
        let mut user = user_with_password("Aa1!aaaa");
        user.password_hash = None;
        assert!(check_password(&user, "Aa1!aaaa").is_err());
    }
}
