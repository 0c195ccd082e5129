//! Built-in Middleware
//!
//! Opt-in middleware for common cross-cutting concerns. None of these is
//! installed by default: without [`RetryMiddleware`] a failed run is
//! final, and without [`TimeoutMiddleware`] a run may take as long as its
//! steps do.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use log::{info, warn};

use super::middleware::{Middleware, Next};
use crate::error::{Result, WorkflowError};
use crate::workflow::Context;

/// Logs how long everything downstream took.
#[derive(Debug, Clone)]
pub struct TimingMiddleware {
    label: String,
}

impl TimingMiddleware {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Default for TimingMiddleware {
    fn default() -> Self {
        Self::new("run")
    }
}

impl Middleware for TimingMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<()>> {
        let label = self.label.clone();
        Box::pin(async move {
            let run = ctx.run().clone();
            let start = Instant::now();
            let result = next.run(ctx).await;
            info!("[{}] {} took {:.2?}", run, label, start.elapsed());
            result
        })
    }
}

/// Fails the run with [`WorkflowError::Timeout`] if downstream takes
/// longer than the limit. The downstream future is dropped at that point.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    limit: Duration,
}

impl TimeoutMiddleware {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl Middleware for TimeoutMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<()>> {
        let limit = self.limit;
        Box::pin(async move {
            tokio::time::timeout(limit, next.run(ctx))
                .await
                .map_err(|_| WorkflowError::Timeout(limit))?
        })
    }
}

/// Decides whether a failed attempt is tried again.
pub trait RetryPolicy: Send + Sync + 'static {
    /// Returns the delay before the next attempt, or `None` to give up.
    /// `attempt` counts the attempts made so far, starting at 1.
    fn next_delay(&self, attempt: u32, error: &WorkflowError) -> Option<Duration>;
}

/// Never retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl RetryPolicy for NoRetry {
    fn next_delay(&self, _attempt: u32, _error: &WorkflowError) -> Option<Duration> {
        None
    }
}

/// Retries up to `max_attempts` total attempts with a constant delay.
#[derive(Debug, Clone, Copy)]
pub struct FixedRetry {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl FixedRetry {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

impl RetryPolicy for FixedRetry {
    fn next_delay(&self, attempt: u32, _error: &WorkflowError) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.delay)
    }
}

/// Re-runs everything downstream while the policy allows it.
///
/// Each attempt starts from the same context, so steps run again from the
/// first one. No new attempt starts once the worker is shutting down.
pub struct RetryMiddleware<P> {
    policy: Arc<P>,
}

impl<P: RetryPolicy> RetryMiddleware<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }
}

impl<P: RetryPolicy> Middleware for RetryMiddleware<P> {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<()>> {
        let policy = Arc::clone(&self.policy);
        Box::pin(async move {
            let mut attempt = 1;
            loop {
                let error = match next.clone().run(ctx.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => e,
                };

                let Some(delay) = policy.next_delay(attempt, &error) else {
                    return Err(error);
                };
                if ctx.is_shutting_down() {
                    return Err(error);
                }

                warn!(
                    "[{}] attempt {} failed: {}. Retrying in {:?}",
                    ctx.run(),
                    attempt,
                    error,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}
