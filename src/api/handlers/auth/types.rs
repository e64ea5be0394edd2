//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRecord;

/// Public view of a user. Never carries the password hash, the TOTP secret,
/// or backup codes; every path that returns a user goes through this type.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub two_factor_enabled: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for UserView {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            email: record.email,
            phone: record.phone,
            first_name: record.first_name,
            last_name: record.last_name,
            avatar_url: record.avatar_url,
            email_verified: record.email_verified,
            phone_verified: record.phone_verified,
            two_factor_enabled: record.two_factor_enabled,
            status: record.status,
            last_login_at: record.last_login_at,
            created_at: record.created_at,
        }
    }
}

/// Common response shape for every login-equivalent flow.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthResponse {
    pub user: UserView,
    pub token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub two_factor_code: Option<String>,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SendPhoneCodeRequest {
    pub phone: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyPhoneRequest {
    pub phone: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PhoneLoginRequest {
    pub phone: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SocialLoginRequest {
    pub provider: String,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SsoLoginRequest {
    pub domain: String,
    /// OIDC authorization code, for organizations configured with OIDC.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    /// Base64 SAML response, for organizations configured with SAML.
    #[serde(default)]
    pub saml_response: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub email: String,
}

/// Always `{"success": true}`: reset requests are enumeration-safe.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordResponse {
    pub success: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Revoke every session for the user instead of just this one.
    #[serde(default)]
    pub all_devices: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub success: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnableTwoFactorRequest {
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct EnableTwoFactorResponse {
    pub secret: String,
    pub otpauth_url: String,
    /// Returned exactly once; only hashes are stored.
    pub backup_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ConfirmTwoFactorRequest {
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DisableTwoFactorRequest {
    pub password: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use chrono::Utc;

    fn sample_record() -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "alice@example.com".to_string(),
            phone: None,
            password_hash: Some("aa:bb".to_string()),
            first_name: Some("Alice".to_string()),
            last_name: None,
            avatar_url: None,
            email_verified: false,
            phone_verified: false,
            two_factor_enabled: true,
            two_factor_secret: Some("JBSWY3DPEHPK3PXP".to_string()),
            status: "active".to_string(),
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_view_drops_sensitive_fields() -> Result<()> {
        let view = UserView::from(sample_record());
        let value = serde_json::to_value(&view)?;
        let as_text = value.to_string();
        assert!(!as_text.contains("password"));
        assert!(!as_text.contains("secret"));
        assert!(!as_text.contains("JBSWY3DPEHPK3PXP"));
        assert_eq!(value["two_factor_enabled"], true);
        Ok(())
    }

    #[test]
    fn login_request_defaults_optional_fields() -> Result<()> {
        let request: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.com","password":"pw"}"#)?;
        assert_eq!(request.two_factor_code, None);
        assert!(!request.remember_me);
        Ok(())
    }

    #[test]
    fn logout_request_defaults_to_single_session() -> Result<()> {
        let request: LogoutRequest = serde_json::from_str("{}")?;
        assert!(!request.all_devices);
        assert_eq!(request.refresh_token, None);
        Ok(())
    }
}
