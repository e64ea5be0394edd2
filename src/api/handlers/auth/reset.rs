//! Password reset: enumeration-safe request, single-use confirm.

use anyhow::Context;
use axum::{Json, extract::Extension, http::HeaderMap};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::outbox::{Channel, enqueue_notification};

use super::error::{AuthError, AuthResult};
use super::password::{hash_password, validate_password};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{
    CodeKind, consume_verification_code, delete_sessions_for_user, find_user_by_email,
    insert_verification_code, update_password,
};
use super::token::generate_secure_token;
use super::types::{ResetPasswordConfirmRequest, ResetPasswordRequest, ResetPasswordResponse};
use super::utils::{extract_client_ip, hash_token, normalize_email, valid_email};
use super::verification::code_miss_error;

/// The reset token is stored only as the hex of its SHA-256 hash; a database
/// leak never exposes a usable token.
fn reset_code(raw_token: &str) -> String {
    hex::encode(hash_token(raw_token))
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Always succeeds, regardless of account existence", body = ResetPasswordResponse),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn reset_password(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<ResetPasswordRequest>,
) -> AuthResult<Json<ResetPasswordResponse>> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResetPassword)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    // Unknown and known emails take the same path shape and get the same
    // response; internal failures are swallowed too, since a 500 for one
    // email and a 200 for another would also be an oracle.
    let email = normalize_email(&request.email);
    if valid_email(&email)
        && let Err(err) = issue_reset_token(&pool, &state, &email).await
    {
        error!("failed to issue reset token: {err:#}");
    }

    Ok(Json(ResetPasswordResponse { success: true }))
}

async fn issue_reset_token(pool: &PgPool, state: &AuthState, email: &str) -> anyhow::Result<()> {
    let Some(user) = find_user_by_email(pool, email).await? else {
        return Ok(());
    };
    if !user.is_active() {
        return Ok(());
    }

    let raw_token = generate_secure_token()?;
    let mut tx = pool.begin().await.context("begin reset transaction")?;
    insert_verification_code(
        &mut tx,
        CodeKind::PasswordReset,
        &reset_code(&raw_token),
        Some(user.id),
        Some(email),
        None,
        state.config().reset_token_ttl_seconds(),
    )
    .await?;
    let reset_url = format!(
        "{}/reset-password?token={raw_token}",
        state.config().frontend_base_url().trim_end_matches('/')
    );
    let payload = serde_json::to_string(&json!({
        "email": email,
        "reset_url": reset_url,
        "first_name": user.first_name,
    }))
    .context("serialize reset email payload")?;
    enqueue_notification(&mut tx, Channel::Email, email, "reset_password", &payload).await?;
    tx.commit().await.context("commit reset transaction")?;
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/reset-password/confirm",
    request_body = ResetPasswordConfirmRequest,
    responses(
        (status = 200, description = "Password updated; every session revoked", body = ResetPasswordResponse),
        (status = 400, description = "Password policy violation or expired token"),
        (status = 404, description = "Unknown reset token"),
        (status = 409, description = "Token already used"),
    ),
    tag = "auth"
)]
pub async fn confirm_reset_password(
    pool: Extension<PgPool>,
    Json(request): Json<ResetPasswordConfirmRequest>,
) -> AuthResult<Json<ResetPasswordResponse>> {
    if let Err(missing) = validate_password(&request.new_password) {
        return Err(AuthError::InvalidArgument(format!(
            "Password must contain {}",
            missing.join(", ")
        )));
    }

    let mut tx = pool
        .begin()
        .await
        .context("begin reset-confirm transaction")
        .map_err(AuthError::Internal)?;

    let code = reset_code(request.token.trim());
    let consumed = match consume_verification_code(&mut tx, CodeKind::PasswordReset, &code).await? {
        Ok(consumed) => consumed,
        Err(miss) => {
            let _ = tx.rollback().await;
            return Err(code_miss_error(miss));
        }
    };
    let Some(user_id) = consumed.user_id else {
        let _ = tx.rollback().await;
        return Err(AuthError::NotFound("Invalid reset token".to_string()));
    };

    let password_hash = hash_password(&request.new_password).map_err(AuthError::Internal)?;
    update_password(&mut tx, user_id, &password_hash).await?;
    tx.commit()
        .await
        .context("commit reset-confirm transaction")
        .map_err(AuthError::Internal)?;

    // Forced re-login everywhere after a password change.
    delete_sessions_for_user(&pool, user_id).await?;

    Ok(Json(ResetPasswordResponse { success: true }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    fn lazy_pool() -> PgPool {
        PgPoolOptions::new()
            .connect_lazy("postgres://localhost/parlato_test")
            .unwrap()
    }

    #[test]
    fn reset_code_is_deterministic_and_not_the_token() {
        let code = reset_code("raw-token");
        assert_eq!(code, reset_code("raw-token"));
        assert_ne!(code, "raw-token");
        assert_eq!(code.len(), 64);
    }

    #[tokio::test]
    async fn confirm_rejects_weak_password_before_token_work() {
        let result = confirm_reset_password(
            Extension(lazy_pool()),
            Json(ResetPasswordConfirmRequest {
                token: "whatever".to_string(),
                new_password: "weak".to_string(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AuthError::InvalidArgument(_))));
    }
}
