//! Bounded retry for redeposit submission.

use super::RebalanceError;
use backoff::backoff::Backoff;
use backoff::future::retry;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

pub const RETRY_ATTEMPTS: usize = 5;
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Constant delay, giving up after `max_retries` waits.
#[derive(Debug, Clone)]
pub struct LimitedConstant {
    delay: Duration,
    max_retries: usize,
    retries: usize,
}

impl LimitedConstant {
    pub fn new(delay: Duration, max_retries: usize) -> Self {
        Self {
            delay,
            max_retries,
            retries: 0,
        }
    }
}

impl Backoff for LimitedConstant {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.retries >= self.max_retries {
            return None;
        }
        self.retries += 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.retries = 0;
    }
}

/// Run `op` up to `attempts` times, sleeping `delay` between transient failures.
pub async fn retry_limited<T, F, Fut>(
    attempts: usize,
    delay: Duration,
    mut op: F,
) -> Result<T, RebalanceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RebalanceError>>,
{
    let backoff = LimitedConstant::new(delay, attempts.saturating_sub(1));
    retry(backoff, || {
        let attempt = op();
        async move {
            attempt.await.map_err(|e| {
                if e.is_transient() {
                    warn!(error = %e, "Retrying after transient failure");
                    backoff::Error::transient(e)
                } else {
                    backoff::Error::permanent(e)
                }
            })
        }
    })
    .await
}
