//! # Parlato (Authentication & Session Authority)
//!
//! `parlato` is the authentication backend for the Parlato voice-notes
//! platform. It owns credential verification, TOTP two-factor auth, session
//! issuance and rotation, verification-code lifecycle, and social/SSO identity
//! exchange.
//!
//! ## Sessions
//!
//! Login-equivalent flows return a short-lived HMAC-signed bearer token plus an
//! opaque refresh token. Only a SHA-256 hash of the refresh token is stored;
//! refresh is single-use rotation (the old session row is deleted before a new
//! one is created), so a replayed refresh token always fails.
//!
//! ## Verification codes
//!
//! Email, phone, and password-reset secrets are single-use and expiring.
//! Consumption is one conditional `UPDATE` so concurrent attempts cannot both
//! succeed.
//!
//! ## Information hiding
//!
//! Password-reset requests always report success, logins never reveal whether
//! the email or the password was wrong, and logout never fails from the
//! caller's point of view. Failed attempts land in an append-only audit log
//! instead.

pub mod api;
pub mod cli;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
