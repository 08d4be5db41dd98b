//! Retry policy for transient hardware faults.
//!
//! Instrument links (GPIB, serial, USB DAQ boards) drop the occasional transfer.
//! Communication and timeout errors are re-issued according to a [`RetryPolicy`];
//! protocol errors are returned immediately since repeating a malformed exchange
//! does not fix it.

use crate::error::HardwareError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Defines a policy for retrying a hardware call.
///
/// # Example
///
/// ```rust
/// use yfactor_sweep::error_recovery::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy {
///     max_retries: 5,
///     backoff_delay: Duration::from_millis(200),
/// };
/// assert_eq!(policy.max_attempts(), 6);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries after the initial attempt. Set to 0 to disable retries.
    pub max_retries: u32,

    /// Constant delay between attempts.
    pub backoff_delay: Duration,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_delay: Duration::ZERO,
        }
    }

    /// Total number of attempts, including the first one.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    /// Two retries (three attempts in total) with 100ms between attempts.
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_delay: Duration::from_millis(100),
        }
    }
}

/// Run `op`, re-issuing it while it fails with a retryable [`HardwareError`].
///
/// `operation` names the call in the retry log lines.
///
/// # Errors
///
/// Returns the last error once retries are exhausted, or the first non-retryable error.
pub async fn retry_with_policy<T, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    mut op: F,
) -> Result<T, HardwareError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, HardwareError>>,
{
    let mut retries = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && retries < policy.max_retries => {
                retries += 1;
                warn!(
                    operation,
                    retry = retries,
                    max_retries = policy.max_retries,
                    error = %err,
                    "Transient hardware error, retrying"
                );
                sleep(policy.backoff_delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}
