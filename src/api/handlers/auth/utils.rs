//! Small helpers shared across auth handlers.

use axum::http::HeaderMap;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

#[allow(clippy::unwrap_used)]
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[allow(clippy::unwrap_used)]
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[0-9]{7,15}$").unwrap());

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE.is_match(email_normalized)
}

/// Normalize a phone number: strip spaces, dots, dashes, and parentheses.
pub(super) fn normalize_phone(phone: &str) -> String {
    phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect()
}

/// E.164-ish check on already-normalized input.
pub(super) fn valid_phone(phone_normalized: &str) -> bool {
    PHONE_RE.is_match(phone_normalized)
}

/// Hash a long-lived secret (refresh token, reset token) for storage.
/// Raw values never touch the database.
pub(crate) fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

pub(super) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Extract a client IP for audit/rate limiting from common proxy headers.
pub(super) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

const USER_AGENT_MAX: usize = 120;

/// Coarse device classification plus a truncated user agent, stored with each
/// session for the "active devices" view.
pub(super) fn device_info(headers: &HeaderMap) -> Option<String> {
    let agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())?;
    let class = if ["Mobile", "Android", "iPhone", "iPad"]
        .iter()
        .any(|needle| agent.contains(needle))
    {
        "mobile"
    } else {
        "desktop"
    };
    let truncated: String = agent.chars().take(USER_AGENT_MAX).collect();
    Some(format!("{class}; {truncated}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn normalize_phone_strips_formatting() {
        assert_eq!(normalize_phone("+1 (555) 010-2345"), "+15550102345");
    }

    #[test]
    fn valid_phone_bounds_length() {
        assert!(valid_phone("+15550102345"));
        assert!(valid_phone("5550102345"));
        assert!(!valid_phone("12345"));
        assert!(!valid_phone("+123456789012345678"));
        assert!(!valid_phone("call-me"));
    }

    #[test]
    fn hash_token_stable() {
        let first = hash_token("token");
        let second = hash_token("token");
        let different = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_none_when_missing() {
        assert_eq!(extract_client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn device_info_classifies_and_truncates() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X)"),
        );
        let info = device_info(&headers).expect("device info");
        assert!(info.starts_with("mobile; "));

        let long_agent = "x".repeat(500);
        headers.insert(
            axum::http::header::USER_AGENT,
            HeaderValue::from_str(&long_agent).expect("header"),
        );
        let info = device_info(&headers).expect("device info");
        assert!(info.len() <= "desktop; ".len() + USER_AGENT_MAX);
    }
}
