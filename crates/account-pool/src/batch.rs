//! Distributed batch processing
//!
//! Fans a batch of identifiers out over the pool, one task per identifier.
//! Randomized delays keep the request pattern irregular: a fixed cadence
//! across accounts is exactly what trips server-side abuse detection.

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngExt;
use serde_json::json;
use telegram_bridge::UserRecord;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::executor::{Executor, IdentifierKind};
use crate::pool::Pool;

/// Delay ranges (seconds) and the retry budget for batch work.
///
/// Tests zero the ranges; zeroed ranges skip the sleep entirely.
#[derive(Debug, Clone)]
pub struct Pacing {
    /// Attempts to obtain a credential before giving up on an identifier
    pub max_attempts: u32,
    /// Wait between credential-acquisition attempts
    pub poll_wait: Range<f64>,
    /// Wait after acquiring, before the request goes out
    pub pre_request: Range<f64>,
    /// Initial stagger so username tasks don't start in lockstep
    pub start_stagger: Range<f64>,
    /// Trailing pause after a whole batch completes
    pub post_batch: Range<f64>,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            max_attempts: 15,
            poll_wait: 1.0..2.0,
            pre_request: 4.0..8.0,
            start_stagger: 1.0..5.0,
            post_batch: 8.0..15.0,
        }
    }
}

impl Pacing {
    /// All delays zeroed, for tests.
    pub fn none() -> Self {
        Self {
            max_attempts: 15,
            poll_wait: 0.0..0.0,
            pre_request: 0.0..0.0,
            start_stagger: 0.0..0.0,
            post_batch: 0.0..0.0,
        }
    }
}

/// Sleep a random duration drawn from the range.
///
/// An empty range yields instead of sleeping, so zero-delay tasks still
/// give concurrent batch tasks a chance to run.
async fn sleep_jitter(range: &Range<f64>) {
    if range.start >= range.end {
        tokio::task::yield_now().await;
        return;
    }
    let secs = rand::rng().random_range(range.clone());
    tokio::time::sleep(Duration::from_secs_f64(secs)).await;
}

/// Terminal outcome for one identifier in a batch.
#[derive(Debug)]
pub enum LookupOutcome {
    Found(UserRecord),
    NotFound,
    NoAvailableAccounts,
    Failed(String),
}

impl LookupOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LookupOutcome::Found(_) => "found",
            LookupOutcome::NotFound => "not_found",
            LookupOutcome::NoAvailableAccounts => "no_accounts",
            LookupOutcome::Failed(_) => "failed",
        }
    }

    /// Wire shape for API responses.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            LookupOutcome::Found(user) => {
                serde_json::to_value(user).unwrap_or_else(|_| json!({"error": "internal error"}))
            }
            LookupOutcome::NotFound => json!({"error": "No Telegram account found"}),
            LookupOutcome::NoAvailableAccounts => {
                json!({"error": "No available accounts after retries"})
            }
            LookupOutcome::Failed(message) => json!({"error": message}),
        }
    }
}

/// Spreads batches over the pool with randomized pacing.
pub struct BatchProcessor {
    pool: Arc<Pool>,
    executor: Arc<Executor>,
    pacing: Pacing,
}

impl BatchProcessor {
    pub fn new(pool: Arc<Pool>, executor: Arc<Executor>, pacing: Pacing) -> Self {
        Self {
            pool,
            executor,
            pacing,
        }
    }

    /// Process a batch, one spawned task per identifier.
    ///
    /// A task that fails to join poisons only its own identifier's result.
    /// The post-batch pause runs before returning so back-to-back batches
    /// stay spaced out.
    pub async fn process(
        &self,
        kind: IdentifierKind,
        identifiers: Vec<String>,
    ) -> Vec<(String, LookupOutcome)> {
        let started = Instant::now();
        info!(kind = kind.label(), count = identifiers.len(), "batch started");

        let handles: Vec<(String, JoinHandle<LookupOutcome>)> = identifiers
            .into_iter()
            .map(|identifier| {
                let pool = self.pool.clone();
                let executor = self.executor.clone();
                let pacing = self.pacing.clone();
                let task_id = identifier.clone();
                (
                    identifier,
                    tokio::spawn(async move {
                        process_single(kind, pool, executor, pacing, task_id).await
                    }),
                )
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (identifier, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(identifier, error = %e, "batch task did not complete");
                    LookupOutcome::Failed(format!("lookup task failed: {e}"))
                }
            };
            results.push((identifier, outcome));
        }

        metrics::histogram!("checker_batch_duration_seconds", "kind" => kind.label())
            .record(started.elapsed().as_secs_f64());
        info!(
            kind = kind.label(),
            count = results.len(),
            elapsed_secs = started.elapsed().as_secs(),
            "batch finished"
        );

        sleep_jitter(&self.pacing.post_batch).await;
        results
    }
}

async fn process_single(
    kind: IdentifierKind,
    pool: Arc<Pool>,
    executor: Arc<Executor>,
    pacing: Pacing,
    identifier: String,
) -> LookupOutcome {
    if kind == IdentifierKind::Username {
        sleep_jitter(&pacing.start_stagger).await;
    }

    let Some(normalized) = Executor::normalize(kind, &identifier) else {
        debug!(kind = kind.label(), identifier, "malformed identifier in batch");
        return LookupOutcome::NotFound;
    };

    for attempt in 1..=pacing.max_attempts {
        let Some(lease) = pool.acquire() else {
            debug!(identifier, attempt, "no credential free, waiting");
            sleep_jitter(&pacing.poll_wait).await;
            continue;
        };

        sleep_jitter(&pacing.pre_request).await;
        let found = executor.check_normalized(kind, &lease, &normalized).await;
        drop(lease);

        return match found {
            Some(user) => LookupOutcome::Found(user),
            None => LookupOutcome::NotFound,
        };
    }

    warn!(identifier, attempts = pacing.max_attempts, "gave up waiting for a credential");
    LookupOutcome::NoAvailableAccounts
}
