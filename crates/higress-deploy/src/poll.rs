//! Bounded readiness polling.
//!
//! Infrastructure changes made through the external CLIs settle
//! asynchronously. A readiness gate checks the observable state a fixed
//! number of times with a fixed delay in between. Running out of attempts is
//! reported as [`PollOutcome::TimedOut`], never as an error; each caller
//! decides whether to continue, retry the root action, or abort.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info};

use crate::Result;

/// Result type for poll check functions.
///
/// - `Ok(Some(value))` - condition met, stop polling
/// - `Ok(None)` - not yet, keep polling
/// - `Err(e)` - fatal, stop polling and propagate
pub type PollResult<T> = Result<Option<T>>;

/// Attempt budget for a readiness gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollBudget {
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Upper bound on the time spent sleeping.
    pub fn max_wait(&self) -> Duration {
        self.interval * self.max_attempts.saturating_sub(1)
    }
}

/// How a readiness gate ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            PollOutcome::Ready(value) => Some(value),
            PollOutcome::TimedOut { .. } => None,
        }
    }
}

/// Call `check_fn` up to `budget.max_attempts` times, sleeping
/// `budget.interval` between calls but not after the last one.
///
/// # Example
/// ```ignore
/// let outcome = poll_until(
///     PollBudget::new(30, Duration::from_secs(1)),
///     "webhook endpoints",
///     || async {
///         let ips = runner.try_capture(&endpoints_cmd).await?;
///         Ok(ips.filter(|ips| !ips.is_empty()))
///     },
/// ).await?;
/// ```
pub async fn poll_until<T, F, Fut>(
    budget: PollBudget,
    description: &str,
    mut check_fn: F,
) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    for attempt in 1..=budget.max_attempts {
        if let Some(value) = check_fn().await? {
            debug!(attempt, "{} ready", description);
            return Ok(PollOutcome::Ready(value));
        }

        if attempt < budget.max_attempts {
            debug!(
                attempt,
                max_attempts = budget.max_attempts,
                "Waiting for {}...",
                description
            );
            if attempt % 10 == 0 {
                info!(
                    "Still waiting for {} ({}/{})",
                    description, attempt, budget.max_attempts
                );
            }
            tokio::time::sleep(budget.interval).await;
        }
    }

    Ok(PollOutcome::TimedOut {
        attempts: budget.max_attempts,
    })
}

/// Poll a text command until `ready` accepts its output.
///
/// A check that yields `None` (command failed) counts as not ready.
pub async fn poll_text<F, Fut, P>(
    budget: PollBudget,
    description: &str,
    mut check: F,
    ready: P,
) -> Result<PollOutcome<String>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<String>>>,
    P: Fn(&str) -> bool,
{
    poll_until(budget, description, || {
        let fut = check();
        let ready = &ready;
        async move { fut.await.map(|out| out.filter(|text| ready(text))) }
    })
    .await
}
