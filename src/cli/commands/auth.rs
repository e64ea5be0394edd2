use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_ttl_args(command);
    with_outbox_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("Secret used to sign bearer tokens (HMAC-SHA256)")
                .env("PARLATO_TOKEN_SECRET")
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset links and CORS")
                .env("PARLATO_FRONTEND_BASE_URL")
                .default_value("https://app.parlato.app"),
        )
        .arg(
            Arg::new("totp-issuer")
                .long("totp-issuer")
                .help("Issuer label embedded in TOTP provisioning URIs")
                .env("PARLATO_TOTP_ISSUER")
                .default_value("Parlato"),
        )
}

fn with_ttl_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("bearer-ttl-seconds")
                .long("bearer-ttl-seconds")
                .help("Bearer token TTL in seconds")
                .env("PARLATO_BEARER_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("session-ttl-seconds")
                .long("session-ttl-seconds")
                .help("Refresh session TTL in seconds")
                .env("PARLATO_SESSION_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("remember-me-ttl-seconds")
                .long("remember-me-ttl-seconds")
                .help("Refresh session TTL in seconds when remember-me is set")
                .env("PARLATO_REMEMBER_ME_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("email-code-ttl-seconds")
                .long("email-code-ttl-seconds")
                .help("Email verification code TTL in seconds")
                .env("PARLATO_EMAIL_CODE_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("phone-code-ttl-seconds")
                .long("phone-code-ttl-seconds")
                .help("Phone verification code TTL in seconds")
                .env("PARLATO_PHONE_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("reset-token-ttl-seconds")
                .long("reset-token-ttl-seconds")
                .help("Password reset token TTL in seconds")
                .env("PARLATO_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("resend-cooldown-seconds")
                .long("resend-cooldown-seconds")
                .help("Cooldown before re-issuing verification codes")
                .env("PARLATO_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_outbox_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("outbox-poll-seconds")
                .long("outbox-poll-seconds")
                .help("Notification outbox poll interval in seconds")
                .env("PARLATO_OUTBOX_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("outbox-batch-size")
                .long("outbox-batch-size")
                .help("Notification outbox batch size per poll")
                .env("PARLATO_OUTBOX_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("outbox-max-attempts")
                .long("outbox-max-attempts")
                .help("Max attempts before marking a notification as failed")
                .env("PARLATO_OUTBOX_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("outbox-backoff-base-seconds")
                .long("outbox-backoff-base-seconds")
                .help("Base delay for notification outbox retry backoff")
                .env("PARLATO_OUTBOX_BACKOFF_BASE_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("outbox-backoff-max-seconds")
                .long("outbox-backoff-max-seconds")
                .help("Max delay for notification outbox retry backoff")
                .env("PARLATO_OUTBOX_BACKOFF_MAX_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug, Clone, Copy)]
pub struct OutboxOptions {
    pub poll_seconds: u64,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base_seconds: u64,
    pub backoff_max_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct Options {
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
    pub outbox: OutboxOptions,
}

impl Options {
    /// Extract validated auth options from parsed CLI matches.
    ///
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let token_secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_TOKEN_SECRET}"))?;

        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .with_context(|| format!("missing required argument: --{ARG_FRONTEND_BASE_URL}"))?;

        let totp_issuer = matches
            .get_one::<String>("totp-issuer")
            .cloned()
            .unwrap_or_else(|| "Parlato".to_string());

        let get_i64 = |name: &str, default: i64| {
            matches.get_one::<i64>(name).copied().unwrap_or(default)
        };

        Ok(Self {
            token_secret: SecretString::from(token_secret),
            frontend_base_url,
            totp_issuer,
            bearer_ttl_seconds: get_i64("bearer-ttl-seconds", 86_400),
            session_ttl_seconds: get_i64("session-ttl-seconds", 86_400),
            remember_me_ttl_seconds: get_i64("remember-me-ttl-seconds", 604_800),
            email_code_ttl_seconds: get_i64("email-code-ttl-seconds", 86_400),
            phone_code_ttl_seconds: get_i64("phone-code-ttl-seconds", 600),
            reset_token_ttl_seconds: get_i64("reset-token-ttl-seconds", 3600),
            resend_cooldown_seconds: get_i64("resend-cooldown-seconds", 60),
            outbox: OutboxOptions {
                poll_seconds: matches
                    .get_one::<u64>("outbox-poll-seconds")
                    .copied()
                    .unwrap_or(5),
                batch_size: matches
                    .get_one::<usize>("outbox-batch-size")
                    .copied()
                    .unwrap_or(10),
                max_attempts: matches
                    .get_one::<u32>("outbox-max-attempts")
                    .copied()
                    .unwrap_or(5),
                backoff_base_seconds: matches
                    .get_one::<u64>("outbox-backoff-base-seconds")
                    .copied()
                    .unwrap_or(5),
                backoff_max_seconds: matches
                    .get_one::<u64>("outbox-backoff-max-seconds")
                    .copied()
                    .unwrap_or(300),
            },
        })
    }
}
