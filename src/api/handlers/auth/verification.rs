//! Email verification endpoints.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::outbox::{Channel, enqueue_notification};

use super::error::{AuthError, AuthResult};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::state::AuthState;
use super::storage::{
    CodeKind, CodeMiss, consume_verification_code, find_user_by_email, insert_verification_code,
    mark_email_verified, recent_code_exists,
};
use super::token::generate_numeric_code;
use super::types::{ResendVerificationRequest, VerifyEmailRequest};
use super::utils::{extract_client_ip, normalize_email, valid_email};

/// Map a verification-code miss to its caller-facing error. Each outcome
/// stays distinguishable so the client can offer the right remedy.
pub(super) fn code_miss_error(miss: CodeMiss) -> AuthError {
    match miss {
        CodeMiss::NotFound => AuthError::NotFound("Invalid verification code".to_string()),
        CodeMiss::AlreadyUsed => AuthError::AlreadyExists("Code already used".to_string()),
        CodeMiss::Expired => AuthError::InvalidArgument("Code expired".to_string()),
    }
}

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Code expired"),
        (status = 404, description = "Unknown verification code"),
        (status = 409, description = "Code already used"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> AuthResult<StatusCode> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let code = request.code.trim();
    if code.is_empty() {
        return Err(AuthError::InvalidArgument("Missing code".to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .context("begin verify-email transaction")
        .map_err(AuthError::Internal)?;

    let consumed = match consume_verification_code(&mut tx, CodeKind::EmailVerification, code)
        .await?
    {
        Ok(consumed) => consumed,
        Err(miss) => {
            let _ = tx.rollback().await;
            return Err(code_miss_error(miss));
        }
    };

    let Some(user_id) = consumed.user_id else {
        let _ = tx.rollback().await;
        return Err(AuthError::NotFound("Invalid verification code".to_string()));
    };
    mark_email_verified(&mut tx, user_id).await?;

    tx.commit()
        .await
        .context("commit verify-email transaction")
        .map_err(AuthError::Internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/verify-email/resend",
    request_body = ResendVerificationRequest,
    responses(
        (status = 204, description = "Accepted; a new code is sent when the account qualifies"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<ResendVerificationRequest>,
) -> AuthResult<StatusCode> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Still 204: the response never reveals whether an account exists.
        return Ok(StatusCode::NO_CONTENT);
    }

    if let Err(err) = resend_if_eligible(&pool, &state, &email).await {
        error!("failed to resend verification code: {err:#}");
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn resend_if_eligible(pool: &PgPool, state: &AuthState, email: &str) -> anyhow::Result<()> {
    let Some(user) = find_user_by_email(pool, email).await? else {
        return Ok(());
    };
    if user.email_verified || !user.is_active() {
        return Ok(());
    }
    // Cooldown keeps repeated requests from flooding the outbox.
    if recent_code_exists(
        pool,
        CodeKind::EmailVerification,
        Some(email),
        None,
        state.config().resend_cooldown_seconds(),
    )
    .await?
    {
        return Ok(());
    }

    let code = generate_numeric_code(6)?;
    let mut tx = pool.begin().await.context("begin resend transaction")?;
    insert_verification_code(
        &mut tx,
        CodeKind::EmailVerification,
        &code,
        Some(user.id),
        Some(email),
        None,
        state.config().email_code_ttl_seconds(),
    )
    .await?;
    let payload = serde_json::to_string(&json!({
        "email": email,
        "code": code,
        "first_name": user.first_name,
    }))
    .context("serialize resend payload")?;
    enqueue_notification(&mut tx, Channel::Email, email, "verify_email", &payload).await?;
    tx.commit().await.context("commit resend transaction")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_mapping_is_distinguishable() {
        assert!(matches!(
            code_miss_error(CodeMiss::NotFound),
            AuthError::NotFound(_)
        ));
        assert!(matches!(
            code_miss_error(CodeMiss::AlreadyUsed),
            AuthError::AlreadyExists(_)
        ));
        assert!(matches!(
            code_miss_error(CodeMiss::Expired),
            AuthError::InvalidArgument(_)
        ));
    }
}
