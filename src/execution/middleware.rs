//! Middleware Chain
//!
//! Middleware wrap a run: each one receives the run context and a
//! [`Next`] handle, and decides whether, how often and with what context
//! to call the rest of the chain. The innermost call is the terminal
//! operation, which for a dispatched event is "run the job".
//!
//! Registration order is call order: the first middleware added is the
//! outermost. Work done after `next.run(..).await` returns happens
//! inner-to-outer, so timing and logging around `next` see the full
//! downstream duration.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::workflow::Context;

/// Innermost operation of a chain.
pub type Terminal = Arc<dyn Fn(Context) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// An interceptor around the rest of the chain.
///
/// Implemented for any `Fn(Context, Next) -> impl Future<Output = Result<()>>`:
///
/// ```
/// use eventrunner::execution::{MiddlewareChain, Next};
/// use eventrunner::workflow::Context;
///
/// let mut chain = MiddlewareChain::new();
/// chain.push(|ctx: Context, next: Next| async move {
///     next.run(ctx.with_value("request-id", 42u64)).await
/// });
/// assert_eq!(chain.len(), 1);
/// ```
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Middleware for F
where
    F: Fn(Context, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn handle(&self, ctx: Context, next: Next) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(ctx, next))
    }
}

/// The remainder of a chain, as seen from one middleware.
///
/// Not calling [`Next::run`] skips everything downstream, including the
/// job. `Next` is `Clone`, so it can be run more than once.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    terminal: Terminal,
}

impl Next {
    /// Invokes the rest of the chain with `ctx`.
    pub fn run(self, ctx: Context) -> BoxFuture<'static, Result<()>> {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    index: self.index + 1,
                    ..self
                };
                middleware.handle(ctx, next)
            }
            None => (self.terminal)(ctx),
        }
    }

    /// Number of middleware left before the terminal operation.
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining())
            .finish()
    }
}

/// Ordered list of middleware.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware; it runs inside every middleware added before it.
    pub fn push<M: Middleware>(&mut self, middleware: M) {
        self.middleware.push(Arc::new(middleware));
    }

    /// Appends an already shared middleware.
    pub fn push_shared(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Returns a chain running `self` outside `inner`.
    pub fn compose(&self, inner: &MiddlewareChain) -> MiddlewareChain {
        let mut middleware = self.middleware.clone();
        middleware.extend(inner.middleware.iter().cloned());
        MiddlewareChain { middleware }
    }

    /// Runs the chain around `terminal`.
    pub fn invoke(&self, ctx: Context, terminal: Terminal) -> BoxFuture<'static, Result<()>> {
        let next = Next {
            chain: Arc::from(self.middleware.as_slice()),
            index: 0,
            terminal,
        };
        next.run(ctx)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middleware.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recording(log: &Log, name: &'static str) -> impl Middleware {
        let log = Arc::clone(log);
        move |ctx: Context, next: Next| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(format!("{}:before", name));
                let result = next.run(ctx).await;
                log.lock().unwrap().push(format!("{}:after", name));
                result
            }
        }
    }

    fn terminal(log: &Log) -> Terminal {
        let log = Arc::clone(log);
        Arc::new(move |_ctx: Context| -> BoxFuture<'static, Result<()>> {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push("terminal".to_string());
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn test_registration_order_is_call_order() {
        let log: Log = Arc::default();
        let mut chain = MiddlewareChain::new();
        chain.push(recording(&log, "a"));
        chain.push(recording(&log, "b"));
        chain.push(recording(&log, "c"));

        chain
            .invoke(Context::background(), terminal(&log))
            .await
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "a:before", "b:before", "c:before", "terminal", "c:after", "b:after", "a:after"
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_chain_runs_terminal() {
        let log: Log = Arc::default();
        MiddlewareChain::new()
            .invoke(Context::background(), terminal(&log))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["terminal"]);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_terminal() {
        let log: Log = Arc::default();
        let mut chain = MiddlewareChain::new();
        chain.push(recording(&log, "outer"));
        chain.push(|_ctx: Context, _next: Next| async move { Ok::<(), WorkflowError>(()) });
        chain.push(recording(&log, "never"));

        let result = chain.invoke(Context::background(), terminal(&log)).await;

        assert!(result.is_ok());
        assert_eq!(*log.lock().unwrap(), vec!["outer:before", "outer:after"]);
    }

    #[tokio::test]
    async fn test_context_flows_inward() {
        let seen: Arc<Mutex<Option<(String, bool)>>> = Arc::default();
        let sink = Arc::clone(&seen);

        let mut chain = MiddlewareChain::new();
        chain.push(|ctx: Context, next: Next| async move {
            next.run(ctx.with_value("testkey", "testvalue".to_string())).await
        });

        let terminal: Terminal = Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<()>> {
            let sink = Arc::clone(&sink);
            Box::pin(async move {
                let value = ctx.get::<String>("testkey")?.clone();
                *sink.lock().unwrap() = Some((value, ctx.contains("other")));
                Ok(())
            })
        });

        chain.invoke(Context::background(), terminal).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            Some(("testvalue".to_string(), false))
        );
    }

    #[tokio::test]
    async fn test_errors_propagate_and_can_be_suppressed() {
        let failing: Terminal = Arc::new(|_ctx: Context| -> BoxFuture<'static, Result<()>> {
            Box::pin(async { Err(WorkflowError::Middleware("inner".to_string())) })
        });

        let mut propagating = MiddlewareChain::new();
        propagating.push(|ctx: Context, next: Next| async move { next.run(ctx).await });
        let err = propagating
            .invoke(Context::background(), Arc::clone(&failing))
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::Middleware("inner".to_string()));

        let mut suppressing = MiddlewareChain::new();
        suppressing.push(|ctx: Context, next: Next| async move {
            let _ = next.run(ctx).await;
            Ok::<(), WorkflowError>(())
        });
        assert!(suppressing
            .invoke(Context::background(), failing)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_compose_keeps_outer_first() {
        let log: Log = Arc::default();
        let mut outer = MiddlewareChain::new();
        outer.push(recording(&log, "worker"));
        let mut inner = MiddlewareChain::new();
        inner.push(recording(&log, "service"));

        let composed = outer.compose(&inner);
        assert_eq!(composed.len(), 2);
        assert_eq!(outer.len(), 1);

        composed
            .invoke(Context::background(), terminal(&log))
            .await
            .unwrap();
        assert_eq!(log.lock().unwrap()[0], "worker:before");
        assert_eq!(log.lock().unwrap()[1], "service:before");
    }

    #[tokio::test]
    async fn test_next_can_run_twice() {
        let log: Log = Arc::default();
        let mut chain = MiddlewareChain::new();
        chain.push(|ctx: Context, next: Next| async move {
            assert_eq!(next.remaining(), 0);
            next.clone().run(ctx.clone()).await?;
            next.run(ctx).await
        });

        chain
            .invoke(Context::background(), terminal(&log))
            .await
            .unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["terminal", "terminal"]);
    }
}
