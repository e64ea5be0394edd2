//! Account registration.
//!
//! Flow Overview:
//! 1) Validate email format and password policy.
//! 2) Insert the user, the email verification code, and the outbox row in one
//!    transaction. A duplicate email rolls everything back.
//! 3) Issue a session so the caller is logged in immediately.
//!
//! The verification email rides the outbox: registration never fails because
//! the email provider is down.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use anyhow::Context;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::api::outbox::{Channel, enqueue_notification};

use super::error::{AuthError, AuthResult};
use super::password::{hash_password, validate_password};
use super::rate_limit::{RateLimitAction, RateLimitDecision};
use super::session::issue_session;
use super::state::AuthState;
use super::storage::{CodeKind, InsertUserOutcome, insert_audit_row, insert_user,
    insert_verification_code};
use super::token::generate_numeric_code;
use super::types::{AuthResponse, RegisterRequest, UserView};
use super::utils::{extract_client_ip, normalize_email, valid_email};

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = AuthResponse),
        (status = 400, description = "Invalid email or password policy violation"),
        (status = 409, description = "Email already registered"),
        (status = 429, description = "Rate limited"),
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<RegisterRequest>,
) -> AuthResult<impl IntoResponse> {
    let client_ip = extract_client_ip(&headers);
    if state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(AuthError::InvalidArgument("Invalid email address".to_string()));
    }
    if let Err(missing) = validate_password(&request.password) {
        return Err(AuthError::InvalidArgument(format!(
            "Password must contain {}",
            missing.join(", ")
        )));
    }

    let password_hash = hash_password(&request.password).map_err(AuthError::Internal)?;

    let mut tx = pool
        .begin()
        .await
        .context("begin registration transaction")
        .map_err(AuthError::Internal)?;

    let user = match insert_user(
        &mut tx,
        &email,
        Some(&password_hash),
        None,
        request.first_name.as_deref(),
        request.last_name.as_deref(),
        None,
    )
    .await?
    {
        InsertUserOutcome::Created(user) => user,
        InsertUserOutcome::Conflict => {
            let _ = tx.rollback().await;
            return Err(AuthError::AlreadyExists(
                "Email already registered".to_string(),
            ));
        }
    };

    let code = generate_numeric_code(6).map_err(AuthError::Internal)?;
    insert_verification_code(
        &mut tx,
        CodeKind::EmailVerification,
        &code,
        Some(user.id),
        Some(&email),
        None,
        state.config().email_code_ttl_seconds(),
    )
    .await?;

    let payload = serde_json::to_string(&json!({
        "email": email,
        "code": code,
        "first_name": user.first_name,
    }))
    .context("serialize verification email payload")
    .map_err(AuthError::Internal)?;
    enqueue_notification(&mut tx, Channel::Email, &email, "verify_email", &payload).await?;

    tx.commit()
        .await
        .context("commit registration transaction")
        .map_err(AuthError::Internal)?;

    if let Err(err) = insert_audit_row(
        &pool,
        Some(user.id),
        Some(&email),
        "register",
        "success",
        client_ip.as_deref(),
    )
    .await
    {
        error!("failed to record registration audit row: {err:#}");
    }

    let session = issue_session(&pool, state.config(), user.id, &headers, false).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserView::from(user),
            token: session.token,
            refresh_token: session.refresh_token,
            expires_at: session.expires_at,
        }),
    ))
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

    fn request(email: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: password.to_string(),
            first_name: None,
            last_name: None,
        }
    }

    #[tokio::test]
    async fn rejects_invalid_email_before_touching_storage() {
        let result = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Json(request("not-an-email", "Aa1!aaaa")),
        )
        .await;
        assert!(matches!(result, Err(AuthError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn rejects_weak_password_with_all_missing_criteria() {
        let result = register(
            HeaderMap::new(),
            Extension(lazy_pool()),
            Extension(auth_state()),
            Json(request("user@example.com", "short")),
        )
        .await;
        match result {
            Err(AuthError::InvalidArgument(message)) => {
                assert!(message.contains("uppercase"));
                assert!(message.contains("digit"));
                assert!(message.contains("special"));
            }
            Err(other) => panic!("expected InvalidArgument, got {other:?}"),
            Ok(_) => panic!("expected InvalidArgument, got success"),
        }
    }
}
