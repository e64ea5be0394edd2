//! Bearer token minting/verification and secure random generators.
//!
//! The bearer token is a compact signed construction:
//! `base64url(claims_json) . base64url(hmac_sha256(claims_part))`.
//! Verification recomputes the signature first (constant time) and only then
//! trusts the payload enough to check expiry; an expired but correctly signed
//! token is rejected, not silently accepted.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use super::error::{AuthError, AuthResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct BearerClaims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

fn sign(secret: &[u8], payload: &[u8]) -> AuthResult<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret)
        .map_err(|_| AuthError::Internal(anyhow::anyhow!("invalid signing secret length")))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Mint a signed bearer token for a user.
pub fn mint_bearer(
    secret: &[u8],
    user_id: Uuid,
    ttl_seconds: i64,
    now_unix: i64,
) -> AuthResult<String> {
    let claims = BearerClaims {
        sub: user_id,
        iat: now_unix,
        exp: now_unix + ttl_seconds,
    };
    let payload = serde_json::to_vec(&claims)
        .context("failed to serialize bearer claims")
        .map_err(AuthError::Internal)?;
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let signature = sign(secret, encoded.as_bytes())?;
    Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(signature)))
}

/// Verify a bearer token: signature before payload trust, then expiry.
///
/// All failure modes collapse into `Unauthenticated` to avoid an oracle that
/// distinguishes malformed, tampered, and expired tokens.
pub fn verify_bearer(secret: &[u8], token: &str, now_unix: i64) -> AuthResult<BearerClaims> {
    let (payload_part, signature_part) = token.split_once('.').ok_or(AuthError::Unauthenticated)?;
    let presented = URL_SAFE_NO_PAD
        .decode(signature_part)
        .map_err(|_| AuthError::Unauthenticated)?;
    let expected = sign(secret, payload_part.as_bytes())?;
    if !bool::from(expected.as_slice().ct_eq(presented.as_slice())) {
        return Err(AuthError::Unauthenticated);
    }

    let payload = URL_SAFE_NO_PAD
        .decode(payload_part)
        .map_err(|_| AuthError::Unauthenticated)?;
    let claims: BearerClaims =
        serde_json::from_slice(&payload).map_err(|_| AuthError::Unauthenticated)?;
    if claims.exp <= now_unix {
        return Err(AuthError::Unauthenticated);
    }
    Ok(claims)
}

/// Generate an opaque token with 256 bits of entropy, hex-encoded.
/// Used for refresh tokens and password-reset tokens.
pub fn generate_secure_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate secure token")?;
    Ok(hex::encode(bytes))
}

/// Generate a short numeric code for SMS/email verification.
///
/// Not suitable for anything beyond short-lived, rate-limited verification.
pub fn generate_numeric_code(length: usize) -> Result<String> {
    let mut code = String::with_capacity(length);
    let mut buf = [0u8; 16];
    while code.len() < length {
        rand::rngs::OsRng
            .try_fill_bytes(&mut buf)
            .context("failed to generate numeric code")?;
        for byte in buf {
            // Rejection sampling: 250..=255 would skew `% 10` toward 0-5.
            if byte < 250 && code.len() < length {
                code.push(char::from(b'0' + byte % 10));
            }
        }
    }
    Ok(code)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-signing-secret";

    #[test]
    fn mint_and_verify_round_trip() {
        let user_id = Uuid::new_v4();
        let token = mint_bearer(SECRET, user_id, 3600, 1_700_000_000).unwrap();
        let claims = verify_bearer(SECRET, &token, 1_700_000_100).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp, 1_700_000_000 + 3600);
    }

    #[test]
    fn expired_but_valid_signature_is_rejected() {
        let token = mint_bearer(SECRET, Uuid::new_v4(), 60, 1_700_000_000).unwrap();
        assert!(matches!(
            verify_bearer(SECRET, &token, 1_700_000_061),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = mint_bearer(SECRET, Uuid::new_v4(), 3600, 1_700_000_000).unwrap();
        assert!(verify_bearer(b"other-secret", &token, 1_700_000_001).is_err());
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = mint_bearer(SECRET, Uuid::new_v4(), 3600, 1_700_000_000).unwrap();
        let (payload, signature) = token.split_once('.').unwrap();
        let other = mint_bearer(SECRET, Uuid::new_v4(), 7200, 1_700_000_000).unwrap();
        let (other_payload, _) = other.split_once('.').unwrap();
        assert_ne!(payload, other_payload);
        let forged = format!("{other_payload}.{signature}");
        assert!(verify_bearer(SECRET, &forged, 1_700_000_001).is_err());
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for token in ["", "no-dot", "a.b.c", "!!!.???"] {
            assert!(verify_bearer(SECRET, token, 0).is_err(), "token {token:?}");
        }
    }

    #[test]
    fn secure_token_has_expected_entropy() {
        let token = generate_secure_token().unwrap();
        assert_eq!(token.len(), 64);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(token, generate_secure_token().unwrap());
    }

    #[test]
    fn numeric_code_is_digits_of_requested_length() {
        let code = generate_numeric_code(6).unwrap();
        assert_eq!(code.len(), 6);
        assert!(code.bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn numeric_code_uses_the_full_digit_range() {
        // Over 600 digits every value 0-9 appears with overwhelming
        // probability; a sampler clamped to 0-5 fails deterministically.
        let mut seen = [false; 10];
        for _ in 0..100 {
            for b in generate_numeric_code(6).unwrap().bytes() {
                seen[usize::from(b - b'0')] = true;
            }
        }
        assert!(seen.iter().all(|digit| *digit), "digits seen: {seen:?}");
    }
}
