//! Remote lookup capability for Telegram accounts
//!
//! Defines the `LookupClient` trait that decouples the pool/executor logic
//! from the wire protocol. `BridgeClient` implements it against a local
//! MTProto bridge sidecar over HTTP; tests swap in in-memory stubs.

pub mod bridge;
pub mod classify;
pub mod validate;

pub use bridge::BridgeClient;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A Telegram user as returned by a successful lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub bot: bool,
}

/// Errors from a remote lookup.
///
/// `NotFound` and `NotUser` are clean misses: the identifier simply has no
/// matching Telegram user. Everything else is an account-attributable
/// failure that the pool scheduler must hear about.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no user registered for the identifier")]
    NotFound,

    #[error("identifier resolves to a non-user entity")]
    NotUser,

    #[error("rate limited by Telegram (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("session not authorized")]
    Unauthorized,

    #[error("bridge error: {0}")]
    Bridge(String),
}

impl LookupError {
    /// True for outcomes that mean "no such user" rather than a failure.
    pub fn is_clean_miss(&self) -> bool {
        matches!(self, LookupError::NotFound | LookupError::NotUser)
    }
}

/// Result alias for lookup operations.
pub type Result<T> = std::result::Result<T, LookupError>;

/// Abstraction over the remote lookup capability.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn LookupClient>`). The `session` argument names the MTProto
/// session the call must run under; the caller picks it from the pool.
pub trait LookupClient: Send + Sync {
    /// Look up a user by normalized E.164 phone number.
    fn lookup_phone<'a>(
        &'a self,
        session: &'a str,
        phone: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserRecord>> + Send + 'a>>;

    /// Look up a user by normalized username (no `@`).
    fn lookup_username<'a>(
        &'a self,
        session: &'a str,
        username: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<UserRecord>> + Send + 'a>>;

    /// Check whether the session is connected and authorized.
    fn ping_session<'a>(
        &'a self,
        session: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>>;
}
