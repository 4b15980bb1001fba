//! Retry and polling policies shared by both instrument sessions.
//!
//! The devices signal completion only by answering a poll (`*OPC?`) or by sending an
//! acknowledgement byte, and neither has a timeout of its own. [`PollPolicy`] bounds those
//! waits; [`RetryPolicy`] bounds how often a short write is continued before it is
//! reported as [`ChamberError::CommandSend`].
//!
//! Both default to the behaviour the instruments were originally driven with: an
//! unbounded busy wait, and up to five write attempts.

use crate::error::{ChamberError, ChamberResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Bounded retry for short writes, with linear backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Additional write attempts after the first one (0 = single attempt).
    pub max_retries: u32,
    /// Base delay; retry `n` waits `n * backoff`.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff: Duration::from_millis(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay to apply before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Polling cadence and overall limit for completion and acknowledgement waits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PollPolicy {
    /// Pause between polls. Zero polls back-to-back, only yielding to the runtime.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Give up after this long. `None` waits forever.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Poll back-to-back, but fail with [`ChamberError::Timeout`] after `limit`.
    pub fn with_timeout(limit: Duration) -> Self {
        Self {
            interval: Duration::ZERO,
            timeout: Some(limit),
        }
    }

    /// Run `fut` under this policy's timeout, if any.
    ///
    /// On expiry the future is dropped mid-flight, so any partially read reply is lost and
    /// the session should be closed by the caller.
    pub async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> ChamberResult<T>
    where
        F: Future<Output = ChamberResult<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| ChamberError::Timeout {
                    operation,
                    after: limit,
                })?,
            None => fut.await,
        }
    }

    /// Wait between two polls.
    pub async fn pause(&self) {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.interval).await;
        }
    }
}
