//! Pool state machine and credential selection
//!
//! The pool holds every account's scheduling state behind a single mutex.
//! Selection is one short synchronous critical section, which keeps the
//! scheduling decision atomic and lets the `Lease` guard release from `Drop`
//! on every exit path, including task cancellation.
//!
//! Hourly counter resets happen lazily while scanning for a credential; no
//! background timer touches the state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use telegram_bridge::LookupError;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use crate::credential::AccountConfig;
use crate::error::{Error, Result};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Scheduling tunables.
///
/// Tests shrink the windows instead of mocking clocks.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Quota window; `current_requests` and `errors_count` reset after this
    pub hour_window_secs: u64,
    /// Preferred minimum gap between two requests on the same account
    pub min_spacing_secs: u64,
    /// Errors beyond this disable the account
    pub error_threshold: u32,
    /// Safety margin added on top of a server-reported flood wait
    pub flood_wait_margin_secs: u64,
    /// Flood-wait window applied when the server gives no duration
    pub flood_wait_fallback_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            hour_window_secs: 3600,
            min_spacing_secs: 5,
            error_threshold: 20,
            flood_wait_margin_secs: 60,
            flood_wait_fallback_secs: 3600,
        }
    }
}

/// State changes the monitor task turns into operator alerts.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// A selection attempt found no usable credential
    Exhausted(PoolStatus),
    /// An account entered a flood-wait window
    FloodWait {
        account: String,
        wait_secs: u64,
        current_requests: u32,
        max_requests_per_hour: u32,
        errors_count: u32,
    },
    /// An account crossed the error threshold and was disabled
    Disabled { account: String, errors_count: u32 },
}

/// Per-account status row for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AccountStatus {
    pub name: String,
    pub enabled: bool,
    pub ready: bool,
    pub in_use: bool,
    pub current_requests: u32,
    pub max_requests_per_hour: u32,
    pub errors_count: u32,
    pub flood_wait_remaining_secs: u64,
}

/// Pool-wide status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub total: usize,
    pub enabled: usize,
    pub ready: usize,
    pub available: usize,
    pub flood_waited: usize,
    pub accounts: Vec<AccountStatus>,
}

struct Slot {
    config: AccountConfig,
    /// Session verified connected and authorized at startup/reload
    ready: bool,
}

/// Multi-account pool scheduler.
pub struct Pool {
    slots: Mutex<HashMap<String, Slot>>,
    config: PoolConfig,
    events: Option<UnboundedSender<PoolEvent>>,
}

impl Pool {
    /// Create a pool over the given account set.
    ///
    /// Accounts start not ready; the caller marks them ready after their
    /// sessions are verified.
    pub fn new(
        accounts: Vec<AccountConfig>,
        config: PoolConfig,
        events: Option<UnboundedSender<PoolEvent>>,
    ) -> Self {
        info!(accounts = accounts.len(), "pool initialized");
        let slots = accounts
            .into_iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Slot {
                        config,
                        ready: false,
                    },
                )
            })
            .collect();
        Self {
            slots: Mutex::new(slots),
            config,
            events,
        }
    }

    /// Lock the slot map, recovering from a poisoned lock.
    ///
    /// A panic while holding the lock can only come from a bug in this
    /// module; the scheduling state itself is plain counters, so continuing
    /// with the last written values is safe.
    fn locked(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: PoolEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    /// Select a credential for one request and mark it busy.
    ///
    /// Scans all accounts: disabled, not-ready, flood-waited, quota-full and
    /// busy accounts are skipped; accounts whose quota window has lapsed get
    /// their request and error counters reset in passing. Among the rest the
    /// least-used account wins, ties broken by longest idle. If the winner
    /// was used within the spacing window, the longest-idle rested account
    /// takes its place when one exists; otherwise the winner is granted
    /// anyway.
    pub fn select_credential(&self) -> Option<String> {
        let now = unix_now();
        let mut slots = self.locked();

        let mut ranked: Vec<(u32, u64, String)> = Vec::new();
        for slot in slots.values_mut() {
            let acct = &mut slot.config;
            if !acct.enabled || !slot.ready {
                continue;
            }
            if acct.flood_wait_until > now {
                continue;
            }
            if now.saturating_sub(acct.last_reset) >= self.config.hour_window_secs {
                debug!(account = %acct.name, "hourly counters reset");
                acct.current_requests = 0;
                acct.errors_count = 0;
                acct.last_reset = now;
            }
            if acct.current_requests >= acct.max_requests_per_hour {
                continue;
            }
            if acct.in_use {
                continue;
            }
            ranked.push((acct.current_requests, acct.last_used, acct.name.clone()));
        }

        if ranked.is_empty() {
            warn!("no credential available");
            metrics::counter!("pool_exhausted_total").increment(1);
            let status = status_from(&slots, now);
            drop(slots);
            self.emit(PoolEvent::Exhausted(status));
            return None;
        }

        ranked.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        let best = &ranked[0];
        let name = if now.saturating_sub(best.1) < self.config.min_spacing_secs {
            // spacing beats load-leveling here: the most rested account
            // wins regardless of its request count
            ranked
                .iter()
                .filter(|c| now.saturating_sub(c.1) >= self.config.min_spacing_secs)
                .min_by_key(|c| c.1)
                .unwrap_or(best)
                .2
                .clone()
        } else {
            best.2.clone()
        };

        // ranked entries came from the map under the same lock
        if let Some(slot) = slots.get_mut(&name) {
            slot.config.current_requests += 1;
            slot.config.last_used = now;
            slot.config.in_use = true;
        }
        debug!(account = %name, "credential selected");
        metrics::counter!("pool_selections_total", "account" => name.clone()).increment(1);
        Some(name)
    }

    /// Return a credential to the pool.
    pub fn release_credential(&self, name: &str) {
        let mut slots = self.locked();
        match slots.get_mut(name) {
            Some(slot) => {
                slot.config.in_use = false;
                debug!(account = name, "credential released");
            }
            None => warn!(account = name, "release for unknown account"),
        }
    }

    /// Record an account-attributable failure.
    ///
    /// Every failure bumps the error counter. Rate limits open (or extend,
    /// never shrink) the flood-wait window with a safety margin on top of
    /// the server-reported duration. Crossing the error threshold disables
    /// the account; only an operator re-enables it.
    pub fn report_failure(&self, name: &str, err: &LookupError) {
        let now = unix_now();
        let mut slots = self.locked();
        let Some(slot) = slots.get_mut(name) else {
            warn!(account = name, "failure report for unknown account");
            return;
        };
        let acct = &mut slot.config;
        acct.errors_count += 1;
        let mut events = Vec::new();

        if let LookupError::RateLimited { retry_after_secs } = err {
            let deadline = match retry_after_secs {
                Some(wait) => now + wait + self.config.flood_wait_margin_secs,
                None => now + self.config.flood_wait_fallback_secs,
            };
            acct.flood_wait_until = acct.flood_wait_until.max(deadline);
            let wait_secs = acct.flood_wait_until.saturating_sub(now);
            warn!(
                account = name,
                wait_secs,
                errors = acct.errors_count,
                "account entering flood wait"
            );
            metrics::counter!("pool_flood_waits_total", "account" => name.to_string())
                .increment(1);
            events.push(PoolEvent::FloodWait {
                account: name.to_string(),
                wait_secs,
                current_requests: acct.current_requests,
                max_requests_per_hour: acct.max_requests_per_hour,
                errors_count: acct.errors_count,
            });
        }

        if acct.errors_count > self.config.error_threshold && acct.enabled {
            acct.enabled = false;
            error!(
                account = name,
                errors = acct.errors_count,
                "account disabled after too many errors"
            );
            events.push(PoolEvent::Disabled {
                account: name.to_string(),
                errors_count: acct.errors_count,
            });
        }

        drop(slots);
        for event in events {
            self.emit(event);
        }
    }

    /// Status snapshot, accounts sorted by name.
    pub fn status(&self) -> PoolStatus {
        status_from(&self.locked(), unix_now())
    }

    /// Mark a session verified (or not) after a connectivity check.
    ///
    /// Returns false if the account is unknown.
    pub fn set_ready(&self, name: &str, ready: bool) -> bool {
        let mut slots = self.locked();
        match slots.get_mut(name) {
            Some(slot) => {
                slot.ready = ready;
                info!(account = name, ready, "session readiness updated");
                true
            }
            None => false,
        }
    }

    /// Operator re-enable (or disable) of an account.
    ///
    /// Enabling clears the error counter; the automatic disable never heals
    /// by itself.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut slots = self.locked();
        let slot = slots
            .get_mut(name)
            .ok_or_else(|| Error::UnknownAccount(name.to_string()))?;
        slot.config.enabled = enabled;
        if enabled {
            slot.config.errors_count = 0;
        }
        info!(account = name, enabled, "account toggled by operator");
        Ok(())
    }

    /// Session reference for an account.
    pub fn session_of(&self, name: &str) -> Option<String> {
        self.locked().get(name).map(|s| s.config.session.clone())
    }

    /// Names of all enabled accounts.
    pub fn enabled_accounts(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .locked()
            .values()
            .filter(|s| s.config.enabled)
            .map(|s| s.config.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Swap in a freshly loaded account set. All sessions become not-ready
    /// until re-verified.
    pub fn replace_accounts(&self, accounts: Vec<AccountConfig>) {
        let mut slots = self.locked();
        info!(accounts = accounts.len(), "account set replaced");
        *slots = accounts
            .into_iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Slot {
                        config,
                        ready: false,
                    },
                )
            })
            .collect();
    }

    /// Current account records for persisting, sorted by name.
    pub fn snapshot_for_save(&self) -> Vec<AccountConfig> {
        let slots = self.locked();
        let mut accounts: Vec<AccountConfig> =
            slots.values().map(|s| s.config.clone()).collect();
        accounts.sort_by(|a, b| a.name.cmp(&b.name));
        accounts
    }

    /// Select a credential and wrap it in a guard that releases on drop.
    pub fn acquire(self: &Arc<Self>) -> Option<Lease> {
        let name = self.select_credential()?;
        let Some(session) = self.session_of(&name) else {
            self.release_credential(&name);
            return None;
        };
        Some(Lease {
            pool: Arc::clone(self),
            name,
            session,
        })
    }
}

fn status_from(slots: &HashMap<String, Slot>, now: u64) -> PoolStatus {
    let mut accounts: Vec<AccountStatus> = slots
        .values()
        .map(|slot| {
            let acct = &slot.config;
            AccountStatus {
                name: acct.name.clone(),
                enabled: acct.enabled,
                ready: slot.ready,
                in_use: acct.in_use,
                current_requests: acct.current_requests,
                max_requests_per_hour: acct.max_requests_per_hour,
                errors_count: acct.errors_count,
                flood_wait_remaining_secs: acct.flood_wait_until.saturating_sub(now),
            }
        })
        .collect();
    accounts.sort_by(|a, b| a.name.cmp(&b.name));

    let enabled = accounts.iter().filter(|a| a.enabled).count();
    let ready = accounts.iter().filter(|a| a.enabled && a.ready).count();
    let flood_waited = accounts
        .iter()
        .filter(|a| a.enabled && a.flood_wait_remaining_secs > 0)
        .count();
    let available = accounts
        .iter()
        .filter(|a| {
            a.enabled
                && a.ready
                && !a.in_use
                && a.flood_wait_remaining_secs == 0
                && a.current_requests < a.max_requests_per_hour
        })
        .count();

    PoolStatus {
        total: accounts.len(),
        enabled,
        ready,
        available,
        flood_waited,
        accounts,
    }
}

/// A leased credential. Dropping the lease returns it to the pool, so every
/// exit path (success, error, panic, task abort) releases.
pub struct Lease {
    pool: Arc<Pool>,
    name: String,
    session: String,
}

impl Lease {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &str {
        &self.session
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.pool.release_credential(&self.name);
    }
}
