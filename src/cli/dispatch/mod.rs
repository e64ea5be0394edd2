//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, oauth};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let oauth_clients = oauth::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        token_secret: auth_opts.token_secret,
        frontend_base_url: auth_opts.frontend_base_url,
        totp_issuer: auth_opts.totp_issuer,
        bearer_ttl_seconds: auth_opts.bearer_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        remember_me_ttl_seconds: auth_opts.remember_me_ttl_seconds,
        email_code_ttl_seconds: auth_opts.email_code_ttl_seconds,
        phone_code_ttl_seconds: auth_opts.phone_code_ttl_seconds,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        resend_cooldown_seconds: auth_opts.resend_cooldown_seconds,
        outbox_poll_seconds: auth_opts.outbox.poll_seconds,
        outbox_batch_size: auth_opts.outbox.batch_size,
        outbox_max_attempts: auth_opts.outbox.max_attempts,
        outbox_backoff_base_seconds: auth_opts.outbox.backoff_base_seconds,
        outbox_backoff_max_seconds: auth_opts.outbox.backoff_max_seconds,
        oauth_clients,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_secret_required() {
        temp_env::with_vars(
            [
                ("PARLATO_TOKEN_SECRET", None::<&str>),
                (
                    "PARLATO_DSN",
                    Some("postgres://user@localhost:5432/parlato"),
                ),
            ],
            || {
                let command = crate::cli::commands::new();
                let result = command.try_get_matches_from(vec!["parlato"]);
                assert_eq!(
                    result.map_err(|e| e.kind()),
                    Err(clap::error::ErrorKind::MissingRequiredArgument)
                );
            },
        );
    }

    #[test]
    fn server_action_from_matches() {
        temp_env::with_vars(
            [
                ("PARLATO_TOKEN_SECRET", Some("s3cr3t")),
                (
                    "PARLATO_DSN",
                    Some("postgres://user@localhost:5432/parlato"),
                ),
                ("PARLATO_PORT", Some("9000")),
                ("PARLATO_SESSION_TTL_SECONDS", Some("1200")),
            ],
            || {
                let command = crate::cli::commands::new();
                let matches = command.get_matches_from(vec!["parlato"]);
                let action = handler(&matches);
                assert!(action.is_ok());
                if let Ok(Action::Server(args)) = action {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.session_ttl_seconds, 1200);
                    assert_eq!(args.remember_me_ttl_seconds, 604_800);
                    assert!(args.oauth_clients.is_empty());
                }
            },
        );
    }
}
