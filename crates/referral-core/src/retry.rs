use std::{thread, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ReferralError;

/// Caller-side retry for operations that may hit a commit conflict.
///
/// Each attempt must be a complete re-run of the operation; nothing is
/// resumed. Non-retriable errors are returned on the first occurrence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Linear backoff step between attempts.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_ms: 5,
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(
        &self,
        mut op: impl FnMut() -> Result<T, ReferralError>,
    ) -> Result<T, ReferralError> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_retriable() && attempt < max_attempts => {
                    warn!(attempt, max_attempts, %err, "retrying after transient conflict");
                    let delay = self.backoff(attempt);
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Delay after the `attempt`-th failure; saturates instead of overflowing.
    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}
