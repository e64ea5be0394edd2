//! Domain error taxonomy for auth flows.
//!
//! Handlers return `AuthError` and the single `IntoResponse` impl below is the
//! only place domain errors are translated to HTTP. Unexpected failures are
//! logged with full detail server-side and collapsed into a generic internal
//! error so no implementation detail leaks to callers.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input: bad email/phone format, password policy violation,
    /// missing required field.
    #[error("{0}")]
    InvalidArgument(String),

    /// Bad credentials, bad 2FA code, invalid or expired token. Deliberately
    /// carries no detail: wrong-password and unknown-email must be
    /// indistinguishable to the caller.
    #[error("Invalid credentials")]
    Unauthenticated,

    /// The operation needs something the caller has not supplied yet,
    /// e.g. a 2FA code for an account with 2FA enabled.
    #[error("{0}")]
    FailedPrecondition(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    /// An upstream identity/email/SMS provider was unreachable or rejected us.
    #[error("{0}")]
    Unavailable(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

/// Error body shared by every auth endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::FailedPrecondition(_) => StatusCode::PRECONDITION_REQUIRED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            // Full detail stays server-side.
            error!("internal auth error: {err:#}");
        }
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub(crate) type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn statuses_map_per_kind() {
        assert_eq!(
            AuthError::InvalidArgument("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::FailedPrecondition("2fa".into()).status(),
            StatusCode::PRECONDITION_REQUIRED
        );
        assert_eq!(
            AuthError::NotFound("code".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AuthError::AlreadyExists("email".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AuthError::Unavailable("idp".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::RateLimited.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            AuthError::Internal(anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_message_is_generic() {
        let err = AuthError::Internal(anyhow!("connection refused to 10.0.0.3"));
        assert_eq!(err.to_string(), "Internal error");
    }

    #[test]
    fn unauthenticated_hides_reason() {
        assert_eq!(AuthError::Unauthenticated.to_string(), "Invalid credentials");
    }
}
