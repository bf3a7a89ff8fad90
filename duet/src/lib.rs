use std::time::Duration;

pub mod chat;
pub mod error;
pub mod models;
pub mod presence;
pub mod session;
pub mod storage;

// Configuration manager (signed-in identity and store settings backed by storage)
pub mod config;

pub use duet_core::{ChatId, Identity, Recipient, Rejection};
pub use error::ClientError;

/// Bound for a single store write unless configured otherwise.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);
