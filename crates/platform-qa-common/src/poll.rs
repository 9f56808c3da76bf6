//! Bounded polling for conditions that settle asynchronously.
//!
//! Used where a write to one system has to become visible in another (an
//! authorization record propagating to the cluster, for instance). The poll is
//! attempt-bounded: `timeout / interval` attempts, spaced `interval` apart,
//! with no sleep after the final attempt.
//!
//! # Example
//!
//! ```ignore
//! use platform_qa_common::poll::{poll_until, PollConfig, PollOutcome};
//!
//! let outcome = poll_until(&PollConfig::default(), "secret_synced", || async {
//!     Ok(secret_has_password().await?)
//! })
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::Error;

/// Interval between polls of a slow-settling condition
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Upper bound on the total time spent polling
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Spacing and bound of a poll loop
#[derive(Clone, Debug)]
pub struct PollConfig {
    /// Time between two consecutive checks
    pub interval: Duration,
    /// Total time budget; together with `interval` fixes the attempt count
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PollConfig {
    /// Number of checks performed before giving up (at least one)
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let attempts = self.timeout.as_millis() / interval;
        u32::try_from(attempts).unwrap_or(u32::MAX).max(1)
    }
}

/// How a poll loop ended when the check itself never failed hard
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the given attempt
    Ready {
        /// 1-based attempt on which the condition was met
        attempt: u32,
    },
    /// Every attempt was used without the condition holding
    Exhausted {
        /// Number of attempts made
        attempts: u32,
    },
}

/// Poll `check` until it returns `Ok(true)` or the attempts run out.
///
/// `Ok(false)` and transient errors (see [`Error::is_transient`]) count as
/// "not yet". Any other error ends the loop immediately and is returned.
pub async fn poll_until<F, Fut>(
    config: &PollConfig,
    operation_name: &str,
    mut check: F,
) -> Result<PollOutcome, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, Error>>,
{
    let max_attempts = config.max_attempts();

    for attempt in 1..=max_attempts {
        match check().await {
            Ok(true) => {
                debug!(operation = %operation_name, attempt, "Condition met");
                return Ok(PollOutcome::Ready { attempt });
            }
            Ok(false) => {
                trace!(operation = %operation_name, attempt, "Condition not yet met");
            }
            Err(e) if e.is_transient() => {
                debug!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Check failed transiently, polling again"
                );
            }
            Err(e) => return Err(e),
        }

        if attempt < max_attempts {
            tokio::time::sleep(config.interval).await;
        }
    }

    warn!(
        operation = %operation_name,
        attempts = max_attempts,
        "Condition not met within poll bound"
    );
    Ok(PollOutcome::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_bound_is_ten_attempts() {
        assert_eq!(PollConfig::default().max_attempts(), 10);
    }

    #[test]
    fn at_least_one_attempt_is_made() {
        let config = PollConfig {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(config.max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exactly_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let start = tokio::time::Instant::now();

        let outcome = poll_until(&PollConfig::default(), "never", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 10 });
        assert_eq!(count.load(Ordering::SeqCst), 10);
        // nine gaps between ten attempts, no trailing sleep
        assert_eq!(start.elapsed(), Duration::from_secs(270));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_as_soon_as_condition_holds() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll_until(&PollConfig::default(), "third_time", || {
            let c = c.clone();
            async move { Ok(c.fetch_add(1, Ordering::SeqCst) + 1 >= 3) }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempt: 3 });
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_keep_polling() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let outcome = poll_until(&PollConfig::default(), "flaky", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(Error::tunnel("ns/pod:80", "reset"))
                } else {
                    Ok(true)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempt: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn hard_errors_abort_immediately() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();

        let result = poll_until(&PollConfig::default(), "broken", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<bool, _>(Error::secret("keycloak", "password", "invalid base64"))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::Secret { .. })));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
