//! Operator alerting over the Telegram Bot API
//!
//! `Notifier` sends severity-tagged messages with per-category cooldowns;
//! the monitor task turns pool events into those messages.

pub mod monitor;
pub mod notifier;

pub use monitor::spawn_monitor_task;
pub use notifier::{Category, Notifier};
