//! Common types for the Telegram checker workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
