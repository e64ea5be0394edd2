//! RFC 6238 time-based one-time passwords.
//!
//! Codes are 6 decimal digits over a 30 second time step, derived with
//! HMAC-SHA1 and the RFC 4226 dynamic truncation. Verification accepts the
//! previous and next step to tolerate client clock drift. Interoperability
//! with standard authenticator apps depends on reproducing the truncation
//! and the RFC 4648 base32 secret encoding exactly; both are pinned by the
//! RFC test vectors below.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::time::{SystemTime, UNIX_EPOCH};

const STEP_SECONDS: u64 = 30;
const DIGITS: u32 = 6;
const SECRET_BYTES: usize = 20;
const SKEW_STEPS: i64 = 1;

/// Generate a fresh TOTP secret, base32-encoded without padding.
pub fn generate_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &bytes)
}

/// Decode a base32 secret as handed out by [`generate_secret`].
///
/// Accepts padded input and lowercase for compatibility with authenticator
/// apps that normalize the secret on entry.
#[must_use]
pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let normalized: String = secret
        .trim()
        .chars()
        .filter(|c| *c != ' ' && *c != '=')
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if normalized.is_empty() {
        return None;
    }
    base32::decode(base32::Alphabet::Rfc4648 { padding: false }, &normalized)
}

/// RFC 4226 HOTP value for one counter, before zero-padding.
fn hotp(key: &[u8], counter: u64) -> Option<u32> {
    let mut mac = Hmac::<Sha1>::new_from_slice(key).ok()?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    // Dynamic truncation: low nibble of the last byte picks a 4-byte window,
    // the top bit of that window is masked off.
    let offset = usize::from(*hash.last()? & 0xf);
    let window = hash.get(offset..offset + 4)?;
    let bin = (u32::from(window[0]) & 0x7f) << 24
        | u32::from(window[1]) << 16
        | u32::from(window[2]) << 8
        | u32::from(window[3]);
    Some(bin % 10u32.pow(DIGITS))
}

/// The 6-digit code for a given time step.
#[must_use]
pub fn code_at_step(key: &[u8], step: u64) -> Option<String> {
    hotp(key, step).map(|value| format!("{value:06}"))
}

fn step_for(unix_seconds: u64) -> u64 {
    unix_seconds / STEP_SECONDS
}

/// Verify a submitted code against the secret at a given unix time,
/// accepting one step of skew on either side.
#[must_use]
pub fn verify_at(secret: &str, submitted: &str, unix_seconds: u64) -> bool {
    let submitted = submitted.trim();
    if submitted.len() != DIGITS as usize || !submitted.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some(key) = decode_secret(secret) else {
        return false;
    };

    let current = step_for(unix_seconds) as i64;
    (-SKEW_STEPS..=SKEW_STEPS).any(|skew| {
        current
            .checked_add(skew)
            .filter(|step| *step >= 0)
            .and_then(|step| code_at_step(&key, step as u64))
            .is_some_and(|expected| expected == submitted)
    })
}

/// Verify a submitted code against the secret right now.
#[must_use]
pub fn verify(secret: &str, submitted: &str) -> bool {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    verify_at(secret, submitted, now)
}

/// Build the `otpauth://` provisioning URI encoded into enrollment QR codes.
#[must_use]
pub fn provisioning_uri(secret: &str, issuer: &str, account: &str) -> String {
    format!(
        "otpauth://totp/{issuer}:{account}?secret={secret}&issuer={issuer}&algorithm=SHA1&digits=6&period=30"
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RFC_KEY: &[u8] = b"12345678901234567890";

    #[test]
    fn hotp_matches_rfc4226_vectors() {
        // Appendix D of RFC 4226.
        let expected = [
            755_224, 287_082, 359_152, 969_429, 338_314, 254_676, 287_922, 162_583, 399_871,
            520_489,
        ];
        for (counter, want) in expected.iter().enumerate() {
            assert_eq!(hotp(RFC_KEY, counter as u64), Some(*want));
        }
    }

    #[test]
    fn totp_matches_rfc6238_times() {
        // RFC 6238 SHA1 vectors, truncated to 6 digits.
        let secret = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, RFC_KEY);
        for (time, code) in [
            (59u64, "287082"),
            (1_111_111_109, "081804"),
            (1_111_111_111, "050471"),
            (1_234_567_890, "005924"),
            (2_000_000_000, "279037"),
        ] {
            assert!(verify_at(&secret, code, time), "time {time}");
        }
    }

    #[test]
    fn verify_accepts_one_step_of_skew_only() {
        let secret = generate_secret();
        let key = decode_secret(&secret).unwrap();
        let now = 1_700_000_000u64;
        let step = now / 30;
        let code = code_at_step(&key, step).unwrap();

        assert!(verify_at(&secret, &code, now.saturating_sub(30)));
        assert!(verify_at(&secret, &code, now));
        assert!(verify_at(&secret, &code, now + 30));
        // Two steps away in either direction must fail.
        assert!(!verify_at(&secret, &code, now.saturating_sub(60)));
        assert!(!verify_at(&secret, &code, now + 60));
    }

    #[test]
    fn verify_rejects_malformed_codes() {
        let secret = generate_secret();
        assert!(!verify_at(&secret, "", 0));
        assert!(!verify_at(&secret, "12345", 0));
        assert!(!verify_at(&secret, "12345a", 0));
        assert!(!verify_at("not base32!!", "123456", 0));
    }

    #[test]
    fn secret_round_trips_through_base32() {
        let secret = generate_secret();
        let decoded = decode_secret(&secret).unwrap();
        assert_eq!(decoded.len(), SECRET_BYTES);
        let reencoded = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &decoded);
        assert_eq!(reencoded, secret);
    }

    #[test]
    fn decode_secret_tolerates_padding_and_case() {
        let secret = generate_secret();
        let key = decode_secret(&secret).unwrap();
        assert_eq!(decode_secret(&secret.to_lowercase()), Some(key.clone()));
        assert_eq!(decode_secret(&format!("{secret}==")), Some(key));
    }

    #[test]
    fn provisioning_uri_carries_parameters() {
        let uri = provisioning_uri("JBSWY3DPEHPK3PXP", "Parlato", "alice@example.com");
        assert!(uri.starts_with("otpauth://totp/"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=Parlato"));
        assert!(uri.contains("period=30"));
    }
}
