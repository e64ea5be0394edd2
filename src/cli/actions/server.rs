use crate::api::{self, handlers::auth, outbox};
use anyhow::Result;
use secrecy::SecretString;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub token_secret: SecretString,
    pub frontend_base_url: String,
    pub totp_issuer: String,
    pub bearer_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub remember_me_ttl_seconds: i64,
    pub email_code_ttl_seconds: i64,
    pub phone_code_ttl_seconds: i64,
    pub reset_token_ttl_seconds: i64,
    pub resend_cooldown_seconds: i64,
    pub outbox_poll_seconds: u64,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: u32,
    pub outbox_backoff_base_seconds: u64,
    pub outbox_backoff_max_seconds: u64,
    pub oauth_clients: Vec<(auth::Provider, auth::OAuthClient)>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mut auth_config = auth::AuthConfig::new(args.frontend_base_url, args.token_secret)
        .with_bearer_ttl_seconds(args.bearer_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_remember_me_ttl_seconds(args.remember_me_ttl_seconds)
        .with_email_code_ttl_seconds(args.email_code_ttl_seconds)
        .with_phone_code_ttl_seconds(args.phone_code_ttl_seconds)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_resend_cooldown_seconds(args.resend_cooldown_seconds)
        .with_totp_issuer(args.totp_issuer);

    for (provider, client) in args.oauth_clients {
        auth_config = auth_config.with_oauth_client(provider, client);
    }

    let outbox_config = outbox::OutboxWorkerConfig::new()
        .with_poll_interval_seconds(args.outbox_poll_seconds)
        .with_batch_size(args.outbox_batch_size)
        .with_max_attempts(args.outbox_max_attempts)
        .with_backoff_base_seconds(args.outbox_backoff_base_seconds)
        .with_backoff_max_seconds(args.outbox_backoff_max_seconds);

    api::new(args.port, args.dsn, auth_config, outbox_config).await
}
