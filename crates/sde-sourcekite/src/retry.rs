//! Restart-and-resubmit policy for failed requests.
use std::future::Future;

use crate::error::SourcekiteError;

/// Bounded retry with a backend restart between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
}

impl RetryPolicy {
    /// Retries allowed when nothing is configured.
    pub const DEFAULT_MAX_RETRIES: u32 = 5;

    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Drive `attempt` until it succeeds or the policy gives up.
    ///
    /// `attempt` receives the number of retries so far. After a retryable
    /// failure `restart` is awaited before the next attempt; once
    /// `max_retries` retries have failed the result is
    /// [`SourcekiteError::TransportExhausted`] and no further restart
    /// happens. Non-retryable errors are returned unchanged.
    pub async fn run<T, A, AF, R, RF>(
        &self,
        mut attempt: A,
        mut restart: R,
    ) -> Result<T, SourcekiteError>
    where
        A: FnMut(u32) -> AF,
        AF: Future<Output = Result<T, SourcekiteError>>,
        R: FnMut() -> RF,
        RF: Future<Output = ()>,
    {
        let mut retries = 0;
        loop {
            let err = match attempt(retries).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if retries >= self.max_retries {
                tracing::error!("request failed {} times, giving up: {}", retries + 1, err);
                return Err(SourcekiteError::TransportExhausted {
                    attempts: retries + 1,
                });
            }

            tracing::warn!("request failed ({}), restarting sourcekite", err);
            restart().await;
            retries += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_RETRIES)
    }
}
