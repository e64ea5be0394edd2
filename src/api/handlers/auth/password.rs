//! Password hashing, verification, and policy checks.

use anyhow::{Context, Result, anyhow};
use rand::RngCore;
use scrypt::{Params, scrypt};
use subtle::ConstantTimeEq;

// Interactive-login scrypt parameters: N = 2^15, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 15;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 64;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash a password with a fresh random salt. The stored form is
/// `saltHex:derivedKeyHex`.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::rngs::OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate password salt")?;
    let key = derive_key(password, &salt)?;
    Ok(format!("{}:{}", hex::encode(salt), hex::encode(key)))
}

/// Verify a password against a stored hash.
///
/// Malformed stored hashes verify false rather than surfacing a parse error;
/// the caller must not be able to distinguish "bad hash" from "bad password".
/// The derived-key comparison is constant time.
#[must_use]
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, key_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(key_hex) else {
        return false;
    };
    if expected.len() != KEY_LEN {
        return false;
    }
    let Ok(derived) = derive_key(password, &salt) else {
        return false;
    };
    derived.ct_eq(expected.as_slice()).into()
}

fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|err| anyhow!("invalid scrypt parameters: {err}"))?;
    let mut key = [0u8; KEY_LEN];
    scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|err| anyhow!("scrypt derivation failed: {err}"))?;
    Ok(key)
}

/// Check the password policy, reporting every missing criterion.
pub fn validate_password(password: &str) -> Result<(), Vec<String>> {
    let mut missing = Vec::new();
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        missing.push(format!("at least {MIN_PASSWORD_LENGTH} characters"));
    }
    if !password.chars().any(char::is_uppercase) {
        missing.push("an uppercase letter".to_string());
    }
    if !password.chars().any(char::is_lowercase) {
        missing.push("a lowercase letter".to_string());
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("a digit".to_string());
    }
    if !password.chars().any(|c| !c.is_alphanumeric()) {
        missing.push("a special character".to_string());
    }
    if missing.is_empty() { Ok(()) } else { Err(missing) }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Aa1!aaaa").unwrap();
        assert!(verify_password("Aa1!aaaa", &hash));
        assert!(!verify_password("Aa1!aaab", &hash));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("Aa1!aaaa").unwrap();
        let second = hash_password("Aa1!aaaa").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn stored_form_is_salt_colon_key() {
        let hash = hash_password("Aa1!aaaa").unwrap();
        let (salt_hex, key_hex) = hash.split_once(':').unwrap();
        assert_eq!(salt_hex.len(), SALT_LEN * 2);
        assert_eq!(key_hex.len(), KEY_LEN * 2);
    }

    #[test]
    fn malformed_hashes_verify_false() {
        assert!(!verify_password("Aa1!aaaa", ""));
        assert!(!verify_password("Aa1!aaaa", "no-colon"));
        assert!(!verify_password("Aa1!aaaa", "zz:zz"));
        assert!(!verify_password("Aa1!aaaa", "00ff:00ff"));
    }

    #[test]
    fn policy_reports_all_missing_criteria() {
        let missing = validate_password("short").unwrap_err();
        assert_eq!(missing.len(), 4);
        assert!(missing.iter().any(|m| m.contains("8 characters")));
        assert!(missing.iter().any(|m| m.contains("uppercase")));
        assert!(missing.iter().any(|m| m.contains("digit")));
        assert!(missing.iter().any(|m| m.contains("special")));
    }

    #[test]
    fn policy_accepts_minimal_valid_password() {
        assert!(validate_password("Aa1!aaaa").is_ok());
    }

    #[test]
    fn policy_rejects_single_missing_class() {
        let missing = validate_password("Aa1aaaaa").unwrap_err();
        assert_eq!(missing, vec!["a special character".to_string()]);
    }
}
