//! The two atomic workflows over the ledger and registry, plus the
//! bounded retry policy they share.
//!
//! Each workflow operation is a single serializable unit against the
//! backing store: its preconditions are re-read inside the transaction
//! and its writes commit together or not at all.

use std::time::Duration;

use tracing::warn;

mod error;
pub use error::{FulfillmentError, ModerationError, RedemptionError};

mod escrow;
pub use escrow::EscrowWorkflow;

mod moderation;
pub use moderation::{ModerationVerdict, ModerationWorkflow};

/// Classifies which errors the retry policy may retry.
pub(crate) trait Transient {
    fn is_transient(&self) -> bool;
}

/// Bounded retry with exponential backoff around one atomic unit.
///
/// Only transient store failures are retried. Precondition and not-found
/// failures surface immediately: the caller must re-fetch state before
/// deciding to try again.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    pub(crate) async fn run<T, E>(&self, mut unit: impl FnMut() -> Result<T, E>) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match unit() {
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(attempt, error = %e, "transient store failure, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}
