//! Multi-account pool scheduler for Telegram lookups
//!
//! Spreads lookups over a pool of independently authenticated accounts so no
//! single account exceeds its hourly quota or trips flood-wait limits.
//! `Pool` owns the scheduling state machine, `Executor` runs one lookup
//! against a leased credential, and `BatchProcessor` fans a batch out over
//! the pool with randomized pacing.

pub mod batch;
pub mod credential;
pub mod error;
pub mod executor;
pub mod pool;

pub use batch::{BatchProcessor, LookupOutcome, Pacing};
pub use credential::{AccountConfig, AccountsFile};
pub use error::{Error, Result};
pub use executor::{Executor, IdentifierKind};
pub use pool::{AccountStatus, Lease, Pool, PoolConfig, PoolEvent, PoolStatus};
