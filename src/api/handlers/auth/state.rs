//! Auth configuration and shared handler state.
//!
//! Secrets and TTLs are injected here at construction time; handlers never
//! read ambient globals, so tests can run against fake secrets and fake
//! identity exchangers.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::Arc;

use super::identity::{IdentityExchanger, Provider};
use super::rate_limit::RateLimiter;

const DEFAULT_BEARER_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_REMEMBER_ME_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;
const DEFAULT_EMAIL_CODE_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_PHONE_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_RESEND_COOLDOWN_SECONDS: i64 = 60;
const DEFAULT_TOTP_ISSUER: &str = "Parlato";

/// OAuth client credentials for one social provider.
#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    token_secret: SecretString,
    bearer_ttl_seconds: i64,
    session_ttl_seconds: i64,
    remember_me_ttl_seconds: i64,
    email_code_ttl_seconds: i64,
    phone_code_ttl_seconds: i64,
    reset_token_ttl_seconds: i64,
    resend_cooldown_seconds: i64,
    totp_issuer: String,
    oauth_clients: HashMap<Provider, OAuthClient>,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, token_secret: SecretString) -> Self {
        Self {
            frontend_base_url,
            token_secret,
            bearer_ttl_seconds: DEFAULT_BEARER_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            remember_me_ttl_seconds: DEFAULT_REMEMBER_ME_TTL_SECONDS,
            email_code_ttl_seconds: DEFAULT_EMAIL_CODE_TTL_SECONDS,
            phone_code_ttl_seconds: DEFAULT_PHONE_CODE_TTL_SECONDS,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            resend_cooldown_seconds: DEFAULT_RESEND_COOLDOWN_SECONDS,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            oauth_clients: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_bearer_ttl_seconds(mut self, seconds: i64) -> Self {
        self.bearer_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_remember_me_ttl_seconds(mut self, seconds: i64) -> Self {
        self.remember_me_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_email_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_phone_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.phone_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_resend_cooldown_seconds(mut self, seconds: i64) -> Self {
        self.resend_cooldown_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_oauth_client(mut self, provider: Provider, client: OAuthClient) -> Self {
        self.oauth_clients.insert(provider, client);
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn token_secret(&self) -> &[u8] {
        self.token_secret.expose_secret().as_bytes()
    }

    pub(super) fn bearer_ttl_seconds(&self) -> i64 {
        self.bearer_ttl_seconds
    }

    pub(super) fn session_ttl_seconds(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.remember_me_ttl_seconds
        } else {
            self.session_ttl_seconds
        }
    }

    pub(super) fn email_code_ttl_seconds(&self) -> i64 {
        self.email_code_ttl_seconds
    }

    pub(super) fn phone_code_ttl_seconds(&self) -> i64 {
        self.phone_code_ttl_seconds
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn resend_cooldown_seconds(&self) -> i64 {
        self.resend_cooldown_seconds
    }

    pub(super) fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    pub(crate) fn oauth_client(&self, provider: Provider) -> Option<&OAuthClient> {
        self.oauth_clients.get(&provider)
    }
}

pub struct AuthState {
    config: AuthConfig,
    rate_limiter: Arc<dyn RateLimiter>,
    identity: Arc<dyn IdentityExchanger>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        rate_limiter: Arc<dyn RateLimiter>,
        identity: Arc<dyn IdentityExchanger>,
    ) -> Self {
        Self {
            config,
            rate_limiter,
            identity,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(super) fn identity(&self) -> &dyn IdentityExchanger {
        self.identity.as_ref()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::api::handlers::auth::error::{AuthError, AuthResult};
    use crate::api::handlers::auth::identity::{ExternalIdentity, SsoProviderConfig};
    use crate::api::handlers::auth::rate_limit::NoopRateLimiter;

    /// Identity exchanger that returns a canned identity, for orchestration
    /// tests that never reach the network.
    pub(crate) struct FakeIdentityExchanger {
        pub(crate) identity: Option<ExternalIdentity>,
    }

    #[async_trait::async_trait]
    impl IdentityExchanger for FakeIdentityExchanger {
        async fn exchange_code(
            &self,
            _provider: Provider,
            _code: &str,
            _redirect_uri: &str,
        ) -> AuthResult<ExternalIdentity> {
            self.identity
                .clone()
                .ok_or_else(|| AuthError::Unavailable("identity provider unavailable".to_string()))
        }

        async fn exchange_oidc(
            &self,
            _config: &SsoProviderConfig,
            _code: &str,
            _redirect_uri: &str,
        ) -> AuthResult<ExternalIdentity> {
            self.identity
                .clone()
                .ok_or_else(|| AuthError::Unavailable("identity provider unavailable".to_string()))
        }
    }

    pub(crate) fn auth_state_with(identity: Option<ExternalIdentity>) -> Arc<AuthState> {
        let config = AuthConfig::new(
            "https://app.parlato.test".to_string(),
            SecretString::from("test-token-secret"),
        );
        Arc::new(AuthState::new(
            config,
            Arc::new(NoopRateLimiter),
            Arc::new(FakeIdentityExchanger { identity }),
        ))
    }

    pub(crate) fn auth_state() -> Arc<AuthState> {
        auth_state_with(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_and_overrides() {
        let config = AuthConfig::new(
            "https://app.parlato.test".to_string(),
            SecretString::from("secret"),
        );
        assert_eq!(config.bearer_ttl_seconds(), DEFAULT_BEARER_TTL_SECONDS);
        assert_eq!(
            config.session_ttl_seconds(false),
            DEFAULT_SESSION_TTL_SECONDS
        );
        assert_eq!(
            config.session_ttl_seconds(true),
            DEFAULT_REMEMBER_ME_TTL_SECONDS
        );
        assert_eq!(config.totp_issuer(), DEFAULT_TOTP_ISSUER);

        let config = config
            .with_bearer_ttl_seconds(60)
            .with_session_ttl_seconds(120)
            .with_remember_me_ttl_seconds(240)
            .with_phone_code_ttl_seconds(30)
            .with_totp_issuer("Test".to_string());
        assert_eq!(config.bearer_ttl_seconds(), 60);
        assert_eq!(config.session_ttl_seconds(false), 120);
        assert_eq!(config.session_ttl_seconds(true), 240);
        assert_eq!(config.phone_code_ttl_seconds(), 30);
        assert_eq!(config.totp_issuer(), "Test");
    }

    #[test]
    fn oauth_clients_keyed_by_provider() {
        let config = AuthConfig::new(
            "https://app.parlato.test".to_string(),
            SecretString::from("secret"),
        )
        .with_oauth_client(
            Provider::Google,
            OAuthClient {
                client_id: "id".to_string(),
                client_secret: SecretString::from("cs"),
            },
        );
        assert!(config.oauth_client(Provider::Google).is_some());
        assert!(config.oauth_client(Provider::Github).is_none());
    }
}
