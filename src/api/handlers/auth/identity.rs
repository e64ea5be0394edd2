//! Identity exchange adapters for social and SSO login.
//!
//! Each adapter turns a provider-specific credential (OAuth2 authorization
//! code, OIDC code, SAML response) into a normalized [`ExternalIdentity`].
//! OAuth2 flows are two sequential calls, token exchange then userinfo; both
//! must succeed or the whole exchange fails. A provider that does not hand us
//! an email fails hard: email is the join key into the user table.

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

use super::error::{AuthError, AuthResult};
use super::state::AuthConfig;

const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(10);

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_USER_URL: &str = "https://api.github.com/user";
const GITHUB_EMAILS_URL: &str = "https://api.github.com/user/emails";
const MICROSOFT_TOKEN_URL: &str = "https://login.microsoftonline.com/common/oauth2/v2.0/token";
const MICROSOFT_USERINFO_URL: &str = "https://graph.microsoft.com/oidc/userinfo";

/// External identity providers a user account can be linked to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Github,
    Microsoft,
    Apple,
    Facebook,
    Twitter,
}

impl Provider {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Microsoft => "microsoft",
            Self::Apple => "apple",
            Self::Facebook => "facebook",
            Self::Twitter => "twitter",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            "microsoft" => Some(Self::Microsoft),
            "apple" => Some(Self::Apple),
            "facebook" => Some(Self::Facebook),
            "twitter" => Some(Self::Twitter),
            _ => None,
        }
    }
}

/// Normalized identity returned by every adapter.
#[derive(Clone, Debug)]
pub struct ExternalIdentity {
    pub provider_user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
}

/// Per-organization SSO endpoints and credentials, stored as the opaque
/// `sso_config` blob on the organization row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SsoProviderConfig {
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Expected SAML issuer (IdP entity id).
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected SAML audience (our SP entity id).
    #[serde(default)]
    pub audience: Option<String>,
}

/// Adapter seam: orchestrators depend on this trait so tests can swap in a
/// canned exchanger and never touch the network.
#[async_trait]
pub trait IdentityExchanger: Send + Sync {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ExternalIdentity>;

    async fn exchange_oidc(
        &self,
        config: &SsoProviderConfig,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ExternalIdentity>;
}

/// Production exchanger backed by reqwest.
pub struct HttpIdentityExchanger {
    http: Client,
    config: AuthConfig,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct OidcUserinfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl HttpIdentityExchanger {
    /// Build the exchanger with a bounded timeout for all upstream calls.
    pub fn new(config: AuthConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(UPSTREAM_TIMEOUT)
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build identity HTTP client")?;
        Ok(Self { http, config })
    }

    async fn fetch_token(
        &self,
        token_url: &str,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenResponse> {
        let response = self
            .http
            .post(token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await
            .map_err(upstream_error)?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url = token_url, "token exchange rejected");
            return Err(AuthError::Unavailable(
                "identity provider rejected the authorization code".to_string(),
            ));
        }
        response.json::<TokenResponse>().await.map_err(upstream_error)
    }

    async fn fetch_oidc_userinfo(
        &self,
        userinfo_url: &str,
        access_token: &str,
    ) -> AuthResult<ExternalIdentity> {
        let response = self
            .http
            .get(userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(upstream_error)?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url = userinfo_url, "userinfo fetch rejected");
            return Err(AuthError::Unavailable(
                "identity provider userinfo fetch failed".to_string(),
            ));
        }
        let info = response.json::<OidcUserinfo>().await.map_err(upstream_error)?;
        let email = info.email.ok_or_else(missing_email)?;
        Ok(ExternalIdentity {
            provider_user_id: info.sub,
            email,
            first_name: info.given_name,
            last_name: info.family_name,
            avatar_url: info.picture,
        })
    }

    async fn exchange_github(&self, code: &str, redirect_uri: &str) -> AuthResult<ExternalIdentity> {
        let client = self.client_for(Provider::Github)?;
        let token = self
            .fetch_token(
                GITHUB_TOKEN_URL,
                &[
                    ("client_id", client.client_id.as_str()),
                    ("client_secret", client.client_secret.expose_secret()),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await?;

        let response = self
            .http
            .get(GITHUB_USER_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .map_err(upstream_error)?;
        if !response.status().is_success() {
            return Err(AuthError::Unavailable(
                "identity provider userinfo fetch failed".to_string(),
            ));
        }
        let user = response.json::<GithubUser>().await.map_err(upstream_error)?;

        // GitHub profiles can hide the email; fall back to the primary
        // verified address from the emails endpoint.
        let email = match user.email {
            Some(email) => email,
            None => self.fetch_github_primary_email(&token.access_token).await?,
        };

        let (first_name, last_name) = split_display_name(user.name.as_deref());
        Ok(ExternalIdentity {
            provider_user_id: user.id.to_string(),
            email,
            first_name,
            last_name,
            avatar_url: user.avatar_url,
        })
    }

    async fn fetch_github_primary_email(&self, access_token: &str) -> AuthResult<String> {
        let response = self
            .http
            .get(GITHUB_EMAILS_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(upstream_error)?;
        if !response.status().is_success() {
            return Err(missing_email());
        }
        let emails = response.json::<Vec<GithubEmail>>().await.map_err(upstream_error)?;
        emails
            .into_iter()
            .find(|entry| entry.primary && entry.verified)
            .map(|entry| entry.email)
            .ok_or_else(missing_email)
    }

    fn client_for(&self, provider: Provider) -> AuthResult<&super::state::OAuthClient> {
        self.config.oauth_client(provider).ok_or_else(|| {
            AuthError::Unavailable(format!(
                "provider {} is not configured",
                provider.as_str()
            ))
        })
    }
}

#[async_trait]
impl IdentityExchanger for HttpIdentityExchanger {
    async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ExternalIdentity> {
        match provider {
            Provider::Google => {
                let client = self.client_for(provider)?;
                let token = self
                    .fetch_token(
                        GOOGLE_TOKEN_URL,
                        &[
                            ("client_id", client.client_id.as_str()),
                            ("client_secret", client.client_secret.expose_secret()),
                            ("code", code),
                            ("redirect_uri", redirect_uri),
                            ("grant_type", "authorization_code"),
                        ],
                    )
                    .await?;
                self.fetch_oidc_userinfo(GOOGLE_USERINFO_URL, &token.access_token)
                    .await
            }
            Provider::Github => self.exchange_github(code, redirect_uri).await,
            Provider::Microsoft => {
                let client = self.client_for(provider)?;
                let token = self
                    .fetch_token(
                        MICROSOFT_TOKEN_URL,
                        &[
                            ("client_id", client.client_id.as_str()),
                            ("client_secret", client.client_secret.expose_secret()),
                            ("code", code),
                            ("redirect_uri", redirect_uri),
                            ("grant_type", "authorization_code"),
                        ],
                    )
                    .await?;
                self.fetch_oidc_userinfo(MICROSOFT_USERINFO_URL, &token.access_token)
                    .await
            }
            Provider::Apple | Provider::Facebook | Provider::Twitter => {
                Err(AuthError::Unavailable(format!(
                    "provider {} is not configured",
                    provider.as_str()
                )))
            }
        }
    }

    async fn exchange_oidc(
        &self,
        config: &SsoProviderConfig,
        code: &str,
        redirect_uri: &str,
    ) -> AuthResult<ExternalIdentity> {
        let token_endpoint = config
            .token_endpoint
            .as_deref()
            .ok_or_else(|| AuthError::Unavailable("SSO token endpoint missing".to_string()))?;
        let userinfo_endpoint = config
            .userinfo_endpoint
            .as_deref()
            .ok_or_else(|| AuthError::Unavailable("SSO userinfo endpoint missing".to_string()))?;
        let client_id = config.client_id.as_deref().unwrap_or_default();
        let client_secret = config.client_secret.as_deref().unwrap_or_default();

        let token = self
            .fetch_token(
                token_endpoint,
                &[
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("grant_type", "authorization_code"),
                ],
            )
            .await?;
        self.fetch_oidc_userinfo(userinfo_endpoint, &token.access_token)
            .await
    }
}

fn upstream_error(err: reqwest::Error) -> AuthError {
    warn!("upstream identity call failed: {err}");
    AuthError::Unavailable("identity provider unreachable".to_string())
}

fn missing_email() -> AuthError {
    AuthError::Unavailable("identity provider returned no email".to_string())
}

pub(super) fn split_display_name(name: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return (None, None);
    };
    match name.split_once(' ') {
        Some((first, last)) => (Some(first.to_string()), Some(last.trim().to_string())),
        None => (Some(name.to_string()), None),
    }
}

/// Extract a normalized identity from a base64 SAML response.
///
/// Issuer and audience must match the organization's stored SSO config.
/// TODO: verify the enveloped XML signature against the IdP certificate
/// instead of relying on issuer/audience matching alone.
pub(super) fn parse_saml_response(
    saml_b64: &str,
    config: &SsoProviderConfig,
) -> AuthResult<ExternalIdentity> {
    let decoded = STANDARD
        .decode(saml_b64.trim())
        .map_err(|_| AuthError::InvalidArgument("malformed SAML response".to_string()))?;
    let xml = String::from_utf8(decoded)
        .map_err(|_| AuthError::InvalidArgument("malformed SAML response".to_string()))?;

    // Without an XML signature check, issuer + audience matching is the only
    // gate. An org config missing either must fail closed, not skip the check.
    let (Some(expected_issuer), Some(expected_audience)) =
        (config.issuer.as_deref(), config.audience.as_deref())
    else {
        return Err(AuthError::FailedPrecondition(
            "Organization SSO config is missing issuer or audience".to_string(),
        ));
    };
    if element_text(&xml, "Issuer").unwrap_or_default() != expected_issuer {
        return Err(AuthError::Unauthenticated);
    }
    if element_text(&xml, "Audience").unwrap_or_default() != expected_audience {
        return Err(AuthError::Unauthenticated);
    }

    let email = element_text(&xml, "NameID")
        .filter(|value| value.contains('@'))
        .or_else(|| attribute_value(&xml, "email"))
        .ok_or_else(missing_email)?;

    let first_name = attribute_value(&xml, "firstName");
    let last_name = attribute_value(&xml, "lastName");

    Ok(ExternalIdentity {
        provider_user_id: email.clone(),
        email,
        first_name,
        last_name,
        avatar_url: None,
    })
}

/// Text content of the first element with the given local name, ignoring the
/// namespace prefix.
fn element_text(xml: &str, local_name: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = xml[search_from..].find(local_name) {
        let start = search_from + offset;
        // Must be a start tag: preceded by '<' or '<prefix:'.
        let tag_open = xml[..start].rfind('<')?;
        let prefix = &xml[tag_open + 1..start];
        let is_start_tag = prefix.is_empty() || (prefix.ends_with(':') && !prefix.starts_with('/'));
        if is_start_tag {
            let after = &xml[start + local_name.len()..];
            if let Some(gt) = after.find('>') {
                let rest = &after[gt + 1..];
                if !after[..gt].ends_with('/')
                    && let Some(close) = rest.find('<')
                {
                    let text = rest[..close].trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
        }
        search_from = start + local_name.len();
    }
    None
}

/// Value of a SAML `<Attribute Name="...">` by attribute name.
fn attribute_value(xml: &str, name: &str) -> Option<String> {
    let needle = format!("Name=\"{name}\"");
    let at = xml.find(&needle)?;
    let rest = &xml[at..];
    let value_start = rest.find("AttributeValue")?;
    let after = &rest[value_start..];
    let gt = after.find('>')?;
    let text_and_rest = &after[gt + 1..];
    let close = text_and_rest.find('<')?;
    let text = text_and_rest[..close].trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SAMPLE_ASSERTION: &str = r#"
        <samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol">
          <saml:Issuer xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">https://idp.example.com</saml:Issuer>
          <saml:Assertion xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion">
            <saml:Subject>
              <saml:NameID Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress">carol@corp.example</saml:NameID>
            </saml:Subject>
            <saml:Conditions>
              <saml:AudienceRestriction>
                <saml:Audience>https://api.parlato.app/auth/sso</saml:Audience>
              </saml:AudienceRestriction>
            </saml:Conditions>
            <saml:AttributeStatement>
              <saml:Attribute Name="firstName"><saml:AttributeValue>Carol</saml:AttributeValue></saml:Attribute>
              <saml:Attribute Name="lastName"><saml:AttributeValue>Danvers</saml:AttributeValue></saml:Attribute>
            </saml:AttributeStatement>
          </saml:Assertion>
        </samlp:Response>
    "#;

    fn config() -> SsoProviderConfig {
        SsoProviderConfig {
            token_endpoint: None,
            userinfo_endpoint: None,
            client_id: None,
            client_secret: None,
            issuer: Some("https://idp.example.com".to_string()),
            audience: Some("https://api.parlato.app/auth/sso".to_string()),
        }
    }

    fn encoded_assertion() -> String {
        STANDARD.encode(SAMPLE_ASSERTION)
    }

    #[test]
    fn provider_round_trips() {
        for provider in [
            Provider::Google,
            Provider::Github,
            Provider::Microsoft,
            Provider::Apple,
            Provider::Facebook,
            Provider::Twitter,
        ] {
            assert_eq!(Provider::parse(provider.as_str()), Some(provider));
        }
        assert_eq!(Provider::parse("myspace"), None);
    }

    #[test]
    fn split_display_name_handles_shapes() {
        assert_eq!(split_display_name(None), (None, None));
        assert_eq!(split_display_name(Some("  ")), (None, None));
        assert_eq!(
            split_display_name(Some("Ada")),
            (Some("Ada".to_string()), None)
        );
        assert_eq!(
            split_display_name(Some("Ada Lovelace")),
            (Some("Ada".to_string()), Some("Lovelace".to_string()))
        );
    }

    #[test]
    fn saml_response_extracts_identity() {
        let identity = parse_saml_response(&encoded_assertion(), &config()).unwrap();
        assert_eq!(identity.email, "carol@corp.example");
        assert_eq!(identity.first_name.as_deref(), Some("Carol"));
        assert_eq!(identity.last_name.as_deref(), Some("Danvers"));
    }

    #[test]
    fn saml_response_rejects_wrong_issuer() {
        let mut config = config();
        config.issuer = Some("https://other-idp.example.com".to_string());
        assert!(matches!(
            parse_saml_response(&encoded_assertion(), &config),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn saml_response_rejects_wrong_audience() {
        let mut config = config();
        config.audience = Some("https://someone-else.example".to_string());
        assert!(matches!(
            parse_saml_response(&encoded_assertion(), &config),
            Err(AuthError::Unauthenticated)
        ));
    }

    #[test]
    fn saml_response_requires_configured_issuer_and_audience() {
        let forged = STANDARD.encode(
            "<Response><Issuer>https://attacker.example</Issuer>\
             <NameID>victim@corp.example</NameID></Response>",
        );
        for (issuer, audience) in [
            (None, None),
            (Some("https://idp.example.com".to_string()), None),
            (None, Some("https://api.parlato.app/auth/sso".to_string())),
        ] {
            let mut config = config();
            config.issuer = issuer;
            config.audience = audience;
            assert!(matches!(
                parse_saml_response(&forged, &config),
                Err(AuthError::FailedPrecondition(_))
            ));
        }
    }

    #[test]
    fn saml_response_rejects_garbage() {
        assert!(parse_saml_response("not base64!!!", &config()).is_err());
        let empty = STANDARD.encode("<Response></Response>");
        assert!(parse_saml_response(&empty, &config()).is_err());
    }
}
