//! EventRunner - Event-Driven Workflow Worker
//!
//! Runs typed, multi-step workflow jobs in response to named events.
//! Every run is wrapped in two layers of middleware, one shared by the
//! whole worker and one per service, and carries a strongly-typed
//! context from the outermost middleware down to the last step.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Jobs, typed steps and the run context
//! - [`execution`]: Worker, services, middleware and event ingress
//! - [`monitoring`]: Run observers and the execution timeline
//! - [`config`]: Worker settings, loadable from YAML
//! - [`error`]: The shared error type
//!
//! # Example
//!
//! ```rust,no_run
//! use eventrunner::execution::{TimingMiddleware, Worker};
//! use eventrunner::workflow::{BoxError, Context, WorkflowJob};
//! use eventrunner::WorkerConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut worker = Worker::new(WorkerConfig::default())?;
//!     worker.use_middleware(TimingMiddleware::default());
//!
//!     let job = WorkflowJob::builder("count-words")
//!         .step("split", |_ctx: Context, text: String| async move {
//!             Ok::<_, BoxError>(text.split_whitespace().count())
//!         })
//!         .step("report", |_ctx: Context, n: usize| async move {
//!             Ok::<_, BoxError>(format!("{} words", n))
//!         })
//!         .build()?;
//!     worker.new_service("text")?.on("text:received", job)?;
//!
//!     let events = worker.event_sender();
//!     let shutdown = CancellationToken::new();
//!     let handle = tokio::spawn(worker.start(shutdown.clone()));
//!
//!     events.push("text:received", "hello event world").await?;
//!     tokio::signal::ctrl_c().await?;
//!     shutdown.cancel();
//!     handle.await??;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod demo;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

// Re-export commonly used types
pub use config::{load_config, WorkerConfig};
pub use error::{Result, WorkflowError};
pub use execution::{EventSender, Next, Service, Worker, WorkerState};
pub use workflow::{Context, WorkflowJob};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "EventRunner";
