//! Pool event monitor
//!
//! Background task translating pool events into operator alerts, plus a
//! periodic status sweep that catches degradation the event stream alone
//! would miss and announces recovery exactly once.

use std::sync::Arc;
use std::time::Duration;

use account_pool::{Pool, PoolEvent, PoolStatus};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::notifier::Notifier;

/// Spawn the monitor task. Exits when the event channel closes.
pub fn spawn_monitor_task(
    mut rx: UnboundedReceiver<PoolEvent>,
    notifier: Arc<Notifier>,
    pool: Arc<Pool>,
    check_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        // first tick after one full interval, not at startup
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + check_interval,
            check_interval,
        );
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut healthy = true;

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => healthy = handle_event(&notifier, event, healthy).await,
                    None => break,
                },
                _ = ticker.tick() => {
                    healthy = sweep(&notifier, &pool.status(), healthy).await;
                }
            }
        }
        debug!("pool event channel closed, monitor exiting");
    })
}

async fn handle_event(notifier: &Notifier, event: PoolEvent, healthy: bool) -> bool {
    match event {
        PoolEvent::Exhausted(status) => sweep(notifier, &status, healthy).await,
        PoolEvent::FloodWait {
            account,
            wait_secs,
            current_requests,
            max_requests_per_hour,
            errors_count,
        } => {
            notifier
                .send_warning(&format!(
                    "Account <b>{account}</b> hit a flood wait.\n\
                     Wait: {wait_secs}s\n\
                     Quota: {current_requests}/{max_requests_per_hour}\n\
                     Errors: {errors_count}"
                ))
                .await;
            healthy
        }
        PoolEvent::Disabled {
            account,
            errors_count,
        } => {
            notifier
                .send_critical(&format!(
                    "Account <b>{account}</b> disabled after {errors_count} errors.\n\
                     Manual re-enable required."
                ))
                .await;
            false
        }
    }
}

/// Evaluate a status snapshot, alerting on problems. Returns whether the
/// pool currently looks healthy; the transition back to healthy sends a
/// single recovery message.
async fn sweep(notifier: &Notifier, status: &PoolStatus, was_healthy: bool) -> bool {
    if status.enabled > 0 && status.available == 0 {
        let breakdown: Vec<String> = status
            .accounts
            .iter()
            .map(|a| {
                format!(
                    "{}: enabled={} ready={} busy={} quota={}/{} errors={} flood_wait={}s",
                    a.name,
                    a.enabled,
                    a.ready,
                    a.in_use,
                    a.current_requests,
                    a.max_requests_per_hour,
                    a.errors_count,
                    a.flood_wait_remaining_secs
                )
            })
            .collect();
        notifier
            .send_critical(&format!(
                "No available accounts.\n\n{}",
                breakdown.join("\n")
            ))
            .await;
        return false;
    }

    if status.flood_waited >= 2 {
        notifier
            .send_warning(&format!(
                "{} accounts are in flood wait, {} still available",
                status.flood_waited, status.available
            ))
            .await;
        return false;
    }

    let elevated = status
        .accounts
        .iter()
        .filter(|a| a.enabled && a.errors_count > 5)
        .count();
    if elevated > 0 {
        notifier
            .send_warning(&format!(
                "{elevated} account(s) have elevated error counts"
            ))
            .await;
        return false;
    }

    if !was_healthy && status.ready > 0 {
        notifier
            .send_success(&format!(
                "System recovered: {}/{} accounts available",
                status.available, status.enabled
            ))
            .await;
    }
    true
}
