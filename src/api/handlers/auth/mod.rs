//! Auth handlers and supporting modules.
//!
//! Flows share a small set of primitives: scrypt password hashing, an
//! HMAC-signed bearer token, single-use verification codes, and refresh-token
//! rotation. Every login-equivalent flow (password, phone, social, SSO) ends
//! in the same session issuance path.
//!
//! Long-lived secrets (refresh tokens, password-reset tokens, 2FA backup
//! codes) are persisted only as SHA-256 hashes. Short numeric codes are
//! stored raw: they are low-entropy by design and guarded by TTL plus rate
//! limiting instead.

mod error;
mod identity;
pub(crate) mod login;
pub(crate) mod me;
mod password;
pub(crate) mod phone;
pub(crate) mod principal;
mod rate_limit;
pub(crate) mod register;
pub(crate) mod reset;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod social;
pub(crate) mod sso;
pub(crate) mod token;
pub(crate) mod twofactor;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use error::{AuthError, ErrorBody};
pub use identity::{HttpIdentityExchanger, IdentityExchanger, Provider};
pub use rate_limit::{NoopRateLimiter, RateLimiter};
pub use state::{AuthConfig, AuthState, OAuthClient};
