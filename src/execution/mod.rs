//! Workflow Execution Module
//!
//! Dispatches events to workflow jobs through layered middleware.
//!
//! # Architecture
//!
//! - [`engine`]: The worker, its lifecycle and the dispatch loop
//! - [`service`]: Named groups of jobs bound to event keys
//! - [`middleware`]: Chain-of-responsibility around each run
//! - [`builtin`]: Opt-in timing, timeout and retry middleware
//! - [`event`]: Event values and the sender used to push them

pub mod builtin;
pub mod engine;
pub mod event;
pub mod middleware;
pub mod service;

pub use builtin::{
    FixedRetry, NoRetry, RetryMiddleware, RetryPolicy, TimeoutMiddleware, TimingMiddleware,
};
pub use engine::{Worker, WorkerState};
pub use event::{Event, EventSender};
pub use middleware::{Middleware, MiddlewareChain, Next, Terminal};
pub use service::Service;
