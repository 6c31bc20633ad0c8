//! Single-lookup execution against a leased credential
//!
//! The executor owns the outcome classification: a clean miss ("no such
//! user") is an answer, not a failure, and must never count against the
//! account that produced it. Everything else account-attributable goes back
//! to the pool through `report_failure`.

use std::sync::Arc;

use telegram_bridge::validate::{validate_phone, validate_username};
use telegram_bridge::{LookupClient, UserRecord};
use tracing::{debug, info, warn};

use crate::pool::{Lease, Pool};

/// What kind of identifier a lookup is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Phone,
    Username,
}

impl IdentifierKind {
    pub fn label(&self) -> &'static str {
        match self {
            IdentifierKind::Phone => "phone",
            IdentifierKind::Username => "username",
        }
    }
}

/// Runs one lookup per leased credential.
pub struct Executor {
    pool: Arc<Pool>,
    client: Arc<dyn LookupClient>,
}

impl Executor {
    pub fn new(pool: Arc<Pool>, client: Arc<dyn LookupClient>) -> Self {
        Self { pool, client }
    }

    /// Normalize an identifier, rejecting malformed input before any
    /// credential is spent on it.
    pub fn normalize(kind: IdentifierKind, raw: &str) -> Option<String> {
        match kind {
            IdentifierKind::Phone => validate_phone(raw),
            IdentifierKind::Username => validate_username(raw),
        }
    }

    /// Look up an already-normalized identifier under the leased credential.
    ///
    /// Returns `Some(user)` on a hit, `None` on a clean miss or a failure.
    /// Failures are reported to the pool; misses are not.
    pub async fn check_normalized(
        &self,
        kind: IdentifierKind,
        lease: &Lease,
        identifier: &str,
    ) -> Option<UserRecord> {
        let result = match kind {
            IdentifierKind::Phone => self.client.lookup_phone(lease.session(), identifier).await,
            IdentifierKind::Username => {
                self.client
                    .lookup_username(lease.session(), identifier)
                    .await
            }
        };

        match result {
            Ok(user) => {
                info!(
                    kind = kind.label(),
                    identifier,
                    account = lease.name(),
                    user_id = user.id,
                    "lookup hit"
                );
                record_lookup(kind, "found");
                Some(user)
            }
            Err(e) if e.is_clean_miss() => {
                debug!(
                    kind = kind.label(),
                    identifier,
                    account = lease.name(),
                    "lookup miss"
                );
                record_lookup(kind, "not_found");
                None
            }
            Err(e) => {
                warn!(
                    kind = kind.label(),
                    identifier,
                    account = lease.name(),
                    error = %e,
                    "lookup failed"
                );
                self.pool.report_failure(lease.name(), &e);
                record_lookup(kind, "error");
                None
            }
        }
    }

    /// Validate and look up a raw identifier.
    pub async fn check(
        &self,
        kind: IdentifierKind,
        lease: &Lease,
        raw: &str,
    ) -> Option<UserRecord> {
        let Some(normalized) = Self::normalize(kind, raw) else {
            debug!(kind = kind.label(), identifier = raw, "rejected malformed identifier");
            record_lookup(kind, "invalid");
            return None;
        };
        self.check_normalized(kind, lease, &normalized).await
    }
}

fn record_lookup(kind: IdentifierKind, outcome: &'static str) {
    metrics::counter!(
        "checker_lookups_total",
        "kind" => kind.label(),
        "outcome" => outcome
    )
    .increment(1);
}
