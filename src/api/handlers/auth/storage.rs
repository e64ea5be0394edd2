//! Database helpers for users, sessions, verification codes, and linked
//! identities. All queries are parameterized and run inside `db.query` spans.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::identity::{Provider, SsoProviderConfig};
use super::utils::is_unique_violation;

const USER_COLUMNS: &str = r"
    id, email, phone, password_hash, first_name, last_name, avatar_url,
    email_verified, phone_verified, two_factor_enabled, two_factor_secret,
    status::text AS status, last_login_at, created_at
";

/// Full user row as the orchestrators see it. Sanitization into the public
/// view happens in `types.rs`, never here.
#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub two_factor_enabled: bool,
    pub two_factor_secret: Option<String>,
    pub status: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

fn map_user(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        phone: row.get("phone"),
        password_hash: row.get("password_hash"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        avatar_url: row.get("avatar_url"),
        email_verified: row.get("email_verified"),
        phone_verified: row.get("phone_verified"),
        two_factor_enabled: row.get("two_factor_enabled"),
        two_factor_secret: row.get("two_factor_secret"),
        status: row.get("status"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
    }
}

/// Outcome when inserting a new user; conflicts are expected, not errors.
#[derive(Debug)]
pub(super) enum InsertUserOutcome {
    Created(UserRecord),
    Conflict,
}

/// Kinds of single-use verification codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum CodeKind {
    EmailVerification,
    PhoneVerification,
    PasswordReset,
}

impl CodeKind {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::EmailVerification => "email_verification",
            Self::PhoneVerification => "phone_verification",
            Self::PasswordReset => "password_reset",
        }
    }
}

/// Subject a consumed verification code was bound to.
#[derive(Debug)]
pub(super) struct ConsumedCode {
    pub(super) user_id: Option<Uuid>,
    pub(super) email: Option<String>,
    pub(super) phone: Option<String>,
}

/// Why a consume attempt missed. `NotFound` covers codes that never existed;
/// the other two classify a real row that is no longer usable.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum CodeMiss {
    NotFound,
    AlreadyUsed,
    Expired,
}

/// Session row created on every login-equivalent flow.
#[derive(Debug)]
pub(super) struct NewSession<'a> {
    pub(super) user_id: Uuid,
    pub(super) token_hash: &'a [u8],
    pub(super) device_info: Option<&'a str>,
    pub(super) ip_address: Option<&'a str>,
    pub(super) ttl_seconds: i64,
}

/// Organization row resolved for SSO login.
#[derive(Debug)]
pub(super) struct OrgRecord {
    pub(super) id: Uuid,
    pub(super) sso_enabled: bool,
    pub(super) sso_provider: Option<String>,
    pub(super) sso_config: Option<SsoProviderConfig>,
}

// --- users -----------------------------------------------------------------

pub(super) async fn insert_user(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    email: &str,
    password_hash: Option<&str>,
    phone: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<InsertUserOutcome> {
    let query = format!(
        r"
        INSERT INTO users (email, password_hash, phone, first_name, last_name, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .bind(password_hash)
        .bind(phone)
        .bind(first_name)
        .bind(last_name)
        .bind(avatar_url)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(InsertUserOutcome::Created(map_user(&row))),
        Err(err) if is_unique_violation(&err) => Ok(InsertUserOutcome::Conflict),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(super) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by email")?;
    Ok(row.map(|row| map_user(&row)))
}

pub(super) async fn find_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by id")?;
    Ok(row.map(|row| map_user(&row)))
}

pub(super) async fn find_user_by_phone(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    phone: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE phone = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(phone)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to find user by phone")?;
    Ok(row.map(|row| map_user(&row)))
}

pub(super) async fn find_user_by_provider_link(
    pool: &PgPool,
    provider: Provider,
    provider_user_id: &str,
) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        SELECT {USER_COLUMNS}
        FROM users
        JOIN social_accounts ON social_accounts.user_id = users.id
        WHERE social_accounts.provider = $1
          AND social_accounts.provider_user_id = $2
        LIMIT 1
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(provider.as_str())
        .bind(provider_user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find user by provider link")?;
    Ok(row.map(|row| map_user(&row)))
}

pub(super) async fn update_last_login(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update last login")?;
    Ok(())
}

pub(super) async fn mark_email_verified(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
) -> Result<()> {
    let query = "UPDATE users SET email_verified = TRUE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark email verified")?;
    Ok(())
}

pub(super) async fn mark_phone_verified(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    phone: &str,
) -> Result<()> {
    let query = r"
        UPDATE users
        SET phone = $2, phone_verified = TRUE, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(phone)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to mark phone verified")?;
    Ok(())
}

pub(super) async fn update_password(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    password_hash: &str,
) -> Result<()> {
    let query = "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(password_hash)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update password")?;
    Ok(())
}

pub(super) async fn update_profile(
    pool: &PgPool,
    user_id: Uuid,
    first_name: Option<&str>,
    last_name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<Option<UserRecord>> {
    // COALESCE keeps untouched fields; callers pass None for "no change".
    let query = format!(
        r"
        UPDATE users
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            avatar_url = COALESCE($4, avatar_url),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .bind(first_name)
        .bind(last_name)
        .bind(avatar_url)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update profile")?;
    Ok(row.map(|row| map_user(&row)))
}

// --- two-factor state ------------------------------------------------------

pub(super) async fn store_two_factor_secret(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    secret: &str,
) -> Result<()> {
    // Secret lands unconfirmed; the enabled flag flips only after a valid
    // code is submitted to the confirm endpoint.
    let query = r"
        UPDATE users
        SET two_factor_secret = $2, two_factor_enabled = FALSE, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(secret)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to store two-factor secret")?;
    Ok(())
}

pub(super) async fn confirm_two_factor(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET two_factor_enabled = TRUE, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to confirm two-factor")?;
    Ok(())
}

pub(super) async fn disable_two_factor(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("begin two-factor disable")?;

    let query = r"
        UPDATE users
        SET two_factor_enabled = FALSE, two_factor_secret = NULL, updated_at = NOW()
        WHERE id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear two-factor state")?;

    let query = "DELETE FROM two_factor_backup_codes WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to delete backup codes")?;

    tx.commit().await.context("commit two-factor disable")?;
    Ok(())
}

pub(super) async fn replace_backup_codes(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: Uuid,
    code_hashes: &[Vec<u8>],
) -> Result<()> {
    let query = "DELETE FROM two_factor_backup_codes WHERE user_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to delete previous backup codes")?;

    let query = "INSERT INTO two_factor_backup_codes (user_id, code_hash) VALUES ($1, $2)";
    for hash in code_hashes {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(hash.as_slice())
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to insert backup code")?;
    }
    Ok(())
}

/// Burn a backup code. Single-use: the conditional update lets exactly one
/// concurrent caller win.
pub(super) async fn consume_backup_code(
    pool: &PgPool,
    user_id: Uuid,
    code_hash: &[u8],
) -> Result<bool> {
    let query = r"
        UPDATE two_factor_backup_codes
        SET used_at = NOW()
        WHERE user_id = $1
          AND code_hash = $2
          AND used_at IS NULL
        RETURNING id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .bind(code_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume backup code")?;
    Ok(row.is_some())
}

// --- verification codes ----------------------------------------------------

pub(super) async fn insert_verification_code(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    kind: CodeKind,
    code: &str,
    user_id: Option<Uuid>,
    email: Option<&str>,
    phone: Option<&str>,
    ttl_seconds: i64,
) -> Result<()> {
    let query = r"
        INSERT INTO verification_codes (user_id, email, phone, code, kind, expires_at)
        VALUES ($1, $2, $3, $4, $5, NOW() + ($6 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .bind(phone)
        .bind(code)
        .bind(kind.as_str())
        .bind(ttl_seconds)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to insert verification code")?;
    Ok(())
}

/// Atomically consume a verification code. The conditional update is the
/// race guard: two concurrent consumers of the same code see exactly one
/// success. On a miss, a follow-up read classifies the failure.
pub(super) async fn consume_verification_code(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    kind: CodeKind,
    code: &str,
) -> Result<std::result::Result<ConsumedCode, CodeMiss>> {
    let query = r"
        UPDATE verification_codes
        SET used_at = NOW()
        WHERE code = $1
          AND kind = $2
          AND used_at IS NULL
          AND expires_at > NOW()
        RETURNING user_id, email, phone
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to consume verification code")?;

    if let Some(row) = row {
        return Ok(Ok(ConsumedCode {
            user_id: row.get("user_id"),
            email: row.get("email"),
            phone: row.get("phone"),
        }));
    }

    let query = r"
        SELECT used_at IS NOT NULL AS used, expires_at <= NOW() AS expired
        FROM verification_codes
        WHERE code = $1 AND kind = $2
        ORDER BY created_at DESC
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(code)
        .bind(kind.as_str())
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to classify verification code miss")?;

    let Some(row) = row else {
        return Ok(Err(CodeMiss::NotFound));
    };
    // A used row wins over an expired one: "already used" is the more
    // precise message when both apply.
    if row.get::<bool, _>("used") {
        Ok(Err(CodeMiss::AlreadyUsed))
    } else if row.get::<bool, _>("expired") {
        Ok(Err(CodeMiss::Expired))
    } else {
        Ok(Err(CodeMiss::NotFound))
    }
}

/// Cooldown check before re-issuing a code for the same subject.
pub(super) async fn recent_code_exists(
    pool: &PgPool,
    kind: CodeKind,
    email: Option<&str>,
    phone: Option<&str>,
    cooldown_seconds: i64,
) -> Result<bool> {
    let query = r"
        SELECT 1
        FROM verification_codes
        WHERE kind = $1
          AND (email = $2 OR phone = $3)
          AND created_at > NOW() - ($4 * INTERVAL '1 second')
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(kind.as_str())
        .bind(email)
        .bind(phone)
        .bind(cooldown_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to check code cooldown")?;
    Ok(row.is_some())
}

// --- sessions --------------------------------------------------------------

pub(super) async fn insert_session(pool: &PgPool, session: &NewSession<'_>) -> Result<()> {
    let query = r"
        INSERT INTO sessions (user_id, token_hash, device_info, ip_address, expires_at)
        VALUES ($1, $2, $3, $4, NOW() + ($5 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session.user_id)
        .bind(session.token_hash)
        .bind(session.device_info)
        .bind(session.ip_address)
        .bind(session.ttl_seconds)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert session")?;
    Ok(())
}

/// Single-use refresh rotation: delete the live row and hand back its owner.
/// A replayed or expired token deletes nothing and yields `None`.
pub(super) async fn take_session(pool: &PgPool, token_hash: &[u8]) -> Result<Option<Uuid>> {
    let query = r"
        DELETE FROM sessions
        WHERE token_hash = $1
          AND expires_at > NOW()
        RETURNING user_id
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to rotate session")?;
    Ok(row.map(|row| row.get("user_id")))
}

pub(super) async fn delete_session_by_hash(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    // Revocation is idempotent; zero rows affected is fine.
    let query = "DELETE FROM sessions WHERE token_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

pub(super) async fn delete_sessions_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64> {
    // Piggybacks expired-row cleanup on the bulk delete. Stale rows are a
    // hygiene concern, the expiry check on every lookup is the correctness
    // guard.
    let query = "DELETE FROM sessions WHERE user_id = $1 OR expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user sessions")?;
    Ok(result.rows_affected())
}

// --- social accounts -------------------------------------------------------

/// Idempotent link creation; a repeat social login keeps the existing row.
pub(super) async fn ensure_social_link(
    pool: &PgPool,
    user_id: Uuid,
    provider: Provider,
    provider_user_id: &str,
    provider_email: Option<&str>,
    provider_data: &Value,
) -> Result<()> {
    let query = r"
        INSERT INTO social_accounts
            (user_id, provider, provider_user_id, provider_email, provider_data)
        VALUES ($1, $2, $3, $4, $5::jsonb)
        ON CONFLICT (user_id, provider) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let payload =
        serde_json::to_string(provider_data).context("failed to serialize provider data")?;
    sqlx::query(query)
        .bind(user_id)
        .bind(provider.as_str())
        .bind(provider_user_id)
        .bind(provider_email)
        .bind(payload)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to ensure social link")?;
    Ok(())
}

// --- organizations ---------------------------------------------------------

pub(super) async fn find_org_by_domain(pool: &PgPool, domain: &str) -> Result<Option<OrgRecord>> {
    let query = r"
        SELECT id, sso_enabled, sso_provider, sso_config
        FROM organizations
        WHERE domain = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(domain)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to find organization by domain")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let sso_config = row
        .get::<Option<Value>, _>("sso_config")
        .map(serde_json::from_value)
        .transpose()
        .context("failed to parse organization SSO config")?;

    Ok(Some(OrgRecord {
        id: row.get("id"),
        sso_enabled: row.get("sso_enabled"),
        sso_provider: row.get("sso_provider"),
        sso_config,
    }))
}

/// A user appears at most once per organization; repeat SSO logins keep the
/// existing membership and role.
pub(super) async fn ensure_org_member(pool: &PgPool, org_id: Uuid, user_id: Uuid) -> Result<()> {
    let query = r"
        INSERT INTO organization_members (organization_id, user_id, role)
        VALUES ($1, $2, 'member')
        ON CONFLICT (organization_id, user_id) DO NOTHING
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(org_id)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to ensure organization member")?;
    Ok(())
}

// --- audit -----------------------------------------------------------------

/// Best-effort append-only audit row. Callers log and swallow the error so a
/// broken audit table never blocks an auth response.
pub(super) async fn insert_audit_row(
    pool: &PgPool,
    user_id: Option<Uuid>,
    email: Option<&str>,
    action: &str,
    outcome: &str,
    ip_address: Option<&str>,
) -> Result<()> {
    let query = r"
        INSERT INTO auth_audit_log (user_id, email, action, outcome, ip_address)
        VALUES ($1, $2, $3, $4, $5)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(email)
        .bind(action)
        .bind(outcome)
        .bind(ip_address)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert audit row")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_kind_strings() {
        assert_eq!(CodeKind::EmailVerification.as_str(), "email_verification");
        assert_eq!(CodeKind::PhoneVerification.as_str(), "phone_verification");
        assert_eq!(CodeKind::PasswordReset.as_str(), "password_reset");
    }

    #[test]
    fn code_miss_variants_distinguishable() {
        assert_ne!(CodeMiss::NotFound, CodeMiss::AlreadyUsed);
        assert_ne!(CodeMiss::AlreadyUsed, CodeMiss::Expired);
    }

    #[test]
    fn user_record_active_gate() {
        let mut user = UserRecord {
            id: Uuid::nil(),
            email: "a@b.c".to_string(),
            phone: None,
            password_hash: None,
            first_name: None,
            last_name: None,
            avatar_url: None,
            email_verified: false,
            phone_verified: false,
            two_factor_enabled: false,
            two_factor_secret: None,
            status: "active".to_string(),
            last_login_at: None,
            created_at: Utc::now(),
        };
        assert!(user.is_active());
        user.status = "suspended".to_string();
        assert!(!user.is_active());
        user.status = "deleted".to_string();
        assert!(!user.is_active());
    }
}
