//! Phone verification and phone-based login.
//!
//! Flow Overview:
//! 1) `send_phone_code` issues a short numeric code over the SMS outbox.
//! 2) `verify_phone` consumes the code and marks the number verified.
//! 3) `phone_login` consumes the code and finds or creates the account keyed
//!    by phone, synthesizing a placeholder email for brand-new users.

use anyhow::Context;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::api::outbox::{Channel, enqueue_notification};

use super::error::{AuthError, AuthResult};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::{issue_session, touch_last_login};
use super::state::AuthState;
use super::storage::{
    CodeKind, InsertUserOutcome, UserRecord, consume_verification_code, find_user_by_phone,
    insert_user, insert_verification_code, mark_phone_verified, recent_code_exists,
};
use super::token::generate_numeric_code;
use super::types::{
    AuthResponse, PhoneLoginRequest, SendPhoneCodeRequest, UserView, VerifyPhoneRequest,
};
use super::utils::{extract_client_ip, normalize_phone, valid_phone};
use super::verification::code_miss_error;

#[utoipa::path(
    post,
    path = "/auth/phone/send-code",
    request_body = SendPhoneCodeRequest,
    responses(
        (status = 204, description = "Code queued for delivery"),
        (status = 400, description = "Invalid phone number"),
        (status = 429, description = "Rate limited or within resend cooldown"),
    ),
    tag = "auth"
)]
pub async fn send_phone_code(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<SendPhoneCodeRequest>,
) -> AuthResult<StatusCode> {
    let client_ip = extract_client_ip(&headers);
    let phone = normalize_phone(&request.phone);
    if !valid_phone(&phone) {
        return Err(AuthError::InvalidArgument("Invalid phone number".to_string()));
    }

    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::PhoneCode)
        == RateLimitDecision::Limited
        || state
            .rate_limiter()
            .check_key(&phone, RateLimitAction::PhoneCode)
            == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    if recent_code_exists(
        &pool,
        CodeKind::PhoneVerification,
        None,
        Some(&phone),
        state.config().resend_cooldown_seconds(),
    )
    .await?
    {
        return Err(AuthError::RateLimited);
    }

    let code = generate_numeric_code(6).map_err(AuthError::Internal)?;
    let mut tx = pool
        .begin()
        .await
        .context("begin phone-code transaction")
        .map_err(AuthError::Internal)?;
    insert_verification_code(
        &mut tx,
        CodeKind::PhoneVerification,
        &code,
        None,
        None,
        Some(&phone),
        state.config().phone_code_ttl_seconds(),
    )
    .await?;
    let payload = serde_json::to_string(&json!({ "phone": phone, "code": code }))
        .context("serialize phone code payload")
        .map_err(AuthError::Internal)?;
    enqueue_notification(&mut tx, Channel::Sms, &phone, "phone_code", &payload).await?;
    tx.commit()
        .await
        .context("commit phone-code transaction")
        .map_err(AuthError::Internal)?;

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/auth/verify-phone",
    request_body = VerifyPhoneRequest,
    responses(
        (status = 204, description = "Phone verified"),
        (status = 400, description = "Invalid phone or expired code"),
        (status = 404, description = "Unknown code or no account for this phone"),
        (status = 409, description = "Code already used"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn verify_phone(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<VerifyPhoneRequest>,
) -> AuthResult<StatusCode> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyPhone)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    let phone = normalize_phone(&request.phone);
    if !valid_phone(&phone) {
        return Err(AuthError::InvalidArgument("Invalid phone number".to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .context("begin verify-phone transaction")
        .map_err(AuthError::Internal)?;
    match consume_phone_code(&mut tx, &phone, request.code.trim()).await? {
        Some(user) => {
            mark_phone_verified(&mut tx, user.id, &phone).await?;
            tx.commit()
                .await
                .context("commit verify-phone transaction")
                .map_err(AuthError::Internal)?;
            Ok(StatusCode::NO_CONTENT)
        }
        None => {
            let _ = tx.rollback().await;
            Err(AuthError::NotFound(
                "No account for this phone number".to_string(),
            ))
        }
    }
}

#[utoipa::path(
    post,
    path = "/auth/phone/login",
    request_body = PhoneLoginRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthResponse),
        (status = 400, description = "Invalid phone or expired code"),
        (status = 404, description = "Unknown code"),
        (status = 409, description = "Code already used"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn phone_login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<PhoneLoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }
    let phone = normalize_phone(&request.phone);
    if !valid_phone(&phone) {
        return Err(AuthError::InvalidArgument("Invalid phone number".to_string()));
    }

    let mut tx = pool
        .begin()
        .await
        .context("begin phone-login transaction")
        .map_err(AuthError::Internal)?;

    let user = match consume_phone_code(&mut tx, &phone, request.code.trim()).await? {
        Some(user) => {
            mark_phone_verified(&mut tx, user.id, &phone).await?;
            user
        }
        None => {
            // First login from this phone creates the account. The unique
            // constraint on phone is the backstop if two first logins race.
            let placeholder = placeholder_email(&phone);
            match insert_user(&mut tx, &placeholder, None, Some(&phone), None, None, None).await? {
                InsertUserOutcome::Created(user) => {
                    mark_phone_verified(&mut tx, user.id, &phone).await?;
                    user
                }
                InsertUserOutcome::Conflict => {
                    let _ = tx.rollback().await;
                    return Err(AuthError::Unauthenticated);
                }
            }
        }
    };
    tx.commit()
        .await
        .context("commit phone-login transaction")
        .map_err(AuthError::Internal)?;

    if !user.is_active() {
        return Err(AuthError::Unauthenticated);
    }

    let session = issue_session(&pool, state.config(), user.id, &headers, false).await?;
    touch_last_login(&pool, user.id).await;

    Ok(Json(AuthResponse {
        user: UserView::from(user),
        token: session.token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }))
}

/// Consume a phone code scoped to this number and resolve the bound account.
/// Returns `None` when the code is valid but no account exists yet.
async fn consume_phone_code(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    phone: &str,
    code: &str,
) -> AuthResult<Option<UserRecord>> {
    if code.is_empty() {
        return Err(AuthError::InvalidArgument("Missing code".to_string()));
    }
    let consumed = match consume_verification_code(tx, CodeKind::PhoneVerification, code).await? {
        Ok(consumed) => consumed,
        Err(miss) => return Err(code_miss_error(miss)),
    };
    // The code must be bound to the same number it is redeemed for.
    if consumed.phone.as_deref() != Some(phone) {
        return Err(AuthError::NotFound("Invalid verification code".to_string()));
    }
    Ok(find_user_by_phone(tx, phone).await?)
}

fn placeholder_email(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    format!("{digits}@phone.parlato.app")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_email_strips_plus() {
        assert_eq!(
            placeholder_email("+15551234567"),
            "15551234567@phone.parlato.app"
        );
    }
}
