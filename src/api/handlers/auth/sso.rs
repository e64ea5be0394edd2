//! Organization SSO login via SAML or OIDC.

use axum::{Json, extract::Extension, http::HeaderMap};
use sqlx::PgPool;
use std::sync::Arc;

use super::error::{AuthError, AuthResult};
use super::identity::{ExternalIdentity, SsoProviderConfig, parse_saml_response};
use super::session::{issue_session, touch_last_login};
use super::social::find_or_create_by_email;
use super::state::AuthState;
use super::storage::{ensure_org_member, find_org_by_domain};
use super::types::{AuthResponse, SsoLoginRequest, UserView};

#[utoipa::path(
    post,
    path = "/auth/sso",
    request_body = SsoLoginRequest,
    responses(
        (status = 200, description = "Logged in; membership ensured", body = AuthResponse),
        (status = 400, description = "Missing credential or malformed SAML response"),
        (status = 404, description = "Unknown SSO domain"),
        (status = 428, description = "SSO is not enabled for this organization"),
        (status = 503, description = "Identity provider unreachable"),
    ),
    tag = "auth"
)]
pub async fn sso_login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    state: Extension<Arc<AuthState>>,
    Json(request): Json<SsoLoginRequest>,
) -> AuthResult<Json<AuthResponse>> {
    let domain = request.domain.trim().to_lowercase();
    let org = find_org_by_domain(&pool, &domain)
        .await?
        .ok_or_else(|| AuthError::NotFound("Unknown SSO domain".to_string()))?;
    if !org.sso_enabled {
        return Err(AuthError::FailedPrecondition(
            "SSO is not enabled for this organization".to_string(),
        ));
    }
    let config = org.sso_config.as_ref().ok_or_else(|| {
        AuthError::FailedPrecondition("Organization has no SSO configuration".to_string())
    })?;

    let identity = resolve_identity(&state, &request, config).await?;

    // Identity exchange keys the account on email, same as social login. No
    // provider link is recorded for SSO; the org membership row is the
    // durable association.
    let user = find_or_create_by_email(&pool, &identity).await?;
    if !user.is_active() {
        return Err(AuthError::Unauthenticated);
    }
    ensure_org_member(&pool, org.id, user.id).await?;

    let session = issue_session(&pool, state.config(), user.id, &headers, false).await?;
    touch_last_login(&pool, user.id).await;

    Ok(Json(AuthResponse {
        user: UserView::from(user),
        token: session.token,
        refresh_token: session.refresh_token,
        expires_at: session.expires_at,
    }))
}

async fn resolve_identity(
    state: &AuthState,
    request: &SsoLoginRequest,
    config: &SsoProviderConfig,
) -> AuthResult<ExternalIdentity> {
    if let Some(saml_response) = request.saml_response.as_deref() {
        return parse_saml_response(saml_response, config);
    }
    if let Some(code) = request.code.as_deref() {
        let redirect_uri = request.redirect_uri.as_deref().unwrap_or_default();
        return state.identity().exchange_oidc(config, code, redirect_uri).await;
    }
    Err(AuthError::InvalidArgument(
        "Either code or saml_response is required".to_string(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::state::test_support::auth_state;

    #[tokio::test]
    async fn requires_a_credential() {
        let request = SsoLoginRequest {
            domain: "corp.example".to_string(),
            code: None,
            redirect_uri: None,
            saml_response: None,
        };
        let config = SsoProviderConfig {
            token_endpoint: None,
            userinfo_endpoint: None,
            client_id: None,
            client_secret: None,
            issuer: None,
            audience: None,
        };
        let result = resolve_identity(&auth_state(), &request, &config).await;
        assert!(matches!(result, Err(AuthError::InvalidArgument(_))));
    }
}
