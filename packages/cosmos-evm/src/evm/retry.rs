//! Bounded polling for results that show up eventually, such as receipts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// How often and for how long to poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts made before giving up. Zero means a single attempt.
    pub max_attempts: u32,
    /// Sleep before each attempt.
    pub interval: Duration,
    /// Overall wall-clock budget, checked across sleeps and attempts.
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 10,
            interval: Duration::from_secs(1),
            deadline: None,
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("Gave up after {attempts} attempts{}", .last_error.as_ref().map(|e| format!(", last error: {e}")).unwrap_or_default())]
pub struct RetryExhausted {
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl RetryPolicy {
    /// Run `attempt` until it yields a value.
    ///
    /// Each attempt is preceded by one interval of sleep. An `Ok(None)` and
    /// an `Err` both use up one attempt. The attempt number passed in starts
    /// at 1.
    pub async fn poll<T, E, F, Fut>(&self, mut attempt: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
        E: std::fmt::Display,
    {
        let made = AtomicU32::new(0);
        let mut last_error = None;
        let max_attempts = self.max_attempts.max(1);

        let attempts = async {
            for n in 1..=max_attempts {
                tokio::time::sleep(self.interval).await;
                made.store(n, Ordering::SeqCst);
                match attempt(n).await {
                    Ok(Some(value)) => return Some(value),
                    Ok(None) => tracing::debug!("Attempt {n}/{max_attempts}: not available yet"),
                    Err(e) => {
                        tracing::warn!("Attempt {n}/{max_attempts} failed: {e}");
                        last_error = Some(e.to_string());
                    }
                }
            }
            None
        };

        let outcome = match self.deadline {
            None => attempts.await,
            Some(deadline) => match tokio::time::timeout(deadline, attempts).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Polling deadline of {deadline:?} passed");
                    None
                }
            },
        };

        outcome.ok_or_else(|| RetryExhausted {
            attempts: made.load(Ordering::SeqCst),
            last_error,
        })
    }
}
