//! Worker
//!
//! The worker owns the process-wide middleware chain, the registered
//! services and the event dispatch loop:
//!
//! - Registration happens on a `Worker` value before it starts
//! - [`Worker::start`] consumes the worker, so the configuration is
//!   read-only while events are dispatched
//! - Each event runs every job bound to its key, once per binding, each
//!   in its own task with a fresh [`Context`]
//! - Shutdown stops new runs and waits for the ones in flight

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use super::event::{Event, EventSender};
use super::middleware::{Middleware, MiddlewareChain, Terminal};
use super::service::Service;
use crate::config::WorkerConfig;
use crate::error::{Result, WorkflowError};
use crate::monitoring::observer::{Observer, ObserverSet, RunEventKind};
use crate::workflow::validator::validate_service_name;
use crate::workflow::{Context, RunInfo, WorkflowJob};

/// Lifecycle of a worker. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

/// Event-driven workflow worker.
///
/// # Example
///
/// ```rust,no_run
/// use eventrunner::config::WorkerConfig;
/// use eventrunner::execution::{Next, Worker};
/// use eventrunner::workflow::{BoxError, Context, WorkflowJob};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut worker = Worker::new(WorkerConfig::default())?;
///     worker.use_middleware(|ctx: Context, next: Next| async move {
///         next.run(ctx.with_value("tenant", "acme".to_string())).await
///     });
///
///     let job = WorkflowJob::builder("greet")
///         .step("hello", |_ctx: Context, name: String| async move {
///             Ok::<_, BoxError>(format!("hello {}", name))
///         })
///         .build()?;
///     worker.new_service("greeter")?.on("user:create", job)?;
///
///     let events = worker.event_sender();
///     let shutdown = CancellationToken::new();
///     let handle = tokio::spawn(worker.start(shutdown.clone()));
///
///     events.push("user:create", "echo-test").await?;
///     shutdown.cancel();
///     handle.await??;
///     Ok(())
/// }
/// ```
pub struct Worker {
    config: WorkerConfig,
    middleware: MiddlewareChain,
    services: Vec<Service>,
    observers: ObserverSet,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    /// Creates a worker with no middleware and no services.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        config.validate()?;

        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);
        let (state, _) = watch::channel(WorkerState::Created);

        Ok(Self {
            config,
            middleware: MiddlewareChain::new(),
            services: Vec::new(),
            observers: ObserverSet::new(),
            events_tx,
            events_rx,
            state,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Appends a middleware that wraps every run of every service.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    /// Adds an observer receiving the events of every run.
    pub fn add_observer(&mut self, observer: Arc<dyn Observer>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    /// Registers a new, empty service and returns it for configuration.
    pub fn new_service(&mut self, name: &str) -> Result<&mut Service> {
        validate_service_name(name).map_err(|_| WorkflowError::InvalidService(name.to_string()))?;
        let name = name.trim();

        if self.service(name).is_some() {
            return Err(WorkflowError::DuplicateService(name.to_string()));
        }

        debug!("Registered service '{}'", name);
        self.services.push(Service::new(name));
        let index = self.services.len() - 1;
        Ok(&mut self.services[index])
    }

    /// Gets a service by name.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name() == name)
    }

    /// Services in registration order.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Returns a handle for pushing events to this worker.
    ///
    /// Once every sender is dropped no further events can arrive and a
    /// running worker shuts down on its own.
    pub fn event_sender(&self) -> EventSender {
        EventSender::new(self.events_tx.clone())
    }

    /// Subscribes to lifecycle changes.
    pub fn state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Runs the dispatch loop until `shutdown` is cancelled or every
    /// [`EventSender`] has been dropped.
    ///
    /// Runs in flight at that point are awaited, never aborted. Returns
    /// `Ok(())` unless `surface_run_errors` is set and a run failed, in
    /// which case the first failure is returned.
    pub async fn start(self, shutdown: CancellationToken) -> Result<()> {
        let Worker {
            config,
            middleware,
            services,
            observers,
            events_tx,
            mut events_rx,
            state,
        } = self;
        drop(events_tx);

        let mut dispatcher = Dispatcher {
            routes: services
                .into_iter()
                .map(|service| Route {
                    chain: middleware.compose(service.middleware()),
                    service,
                })
                .collect(),
            observer: Arc::new(observers),
            shutdown: shutdown.clone(),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_runs)),
            last_run_id: 0,
        };

        state.send_replace(WorkerState::Running);
        info!(
            "Worker '{}' started ({} services, max {} concurrent runs)",
            config.name,
            dispatcher.routes.len(),
            config.max_concurrent_runs
        );

        let mut runs: JoinSet<Result<()>> = JoinSet::new();
        let mut first_error: Option<WorkflowError> = None;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Worker '{}' received shutdown signal", config.name);
                    break;
                }

                Some(result) = runs.join_next(), if !runs.is_empty() => {
                    record_outcome(result, &mut first_error);
                }

                event = events_rx.recv() => match event {
                    Some(event) => {
                        if !dispatcher.dispatch(event, &mut runs).await {
                            break;
                        }
                    }
                    None => {
                        info!("Worker '{}': all event senders dropped", config.name);
                        break;
                    }
                },
            }
        }

        state.send_replace(WorkerState::ShuttingDown);

        events_rx.close();
        let mut dropped = 0;
        while events_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Dropped {} queued events during shutdown", dropped);
        }

        if !runs.is_empty() {
            info!("Waiting for {} in-flight runs", runs.len());
        }
        while let Some(result) = runs.join_next().await {
            record_outcome(result, &mut first_error);
        }

        state.send_replace(WorkerState::Stopped);
        info!("Worker '{}' stopped", config.name);

        match first_error {
            Some(e) if config.surface_run_errors => Err(e),
            _ => Ok(()),
        }
    }
}

/// A service together with its fully composed chain.
struct Route {
    service: Service,
    chain: MiddlewareChain,
}

/// Dispatch-time view of the worker, frozen at start.
struct Dispatcher {
    routes: Vec<Route>,
    observer: Arc<dyn Observer>,
    shutdown: CancellationToken,
    limiter: Arc<Semaphore>,
    last_run_id: u64,
}

impl Dispatcher {
    /// Spawns one run per matching binding.
    ///
    /// Returns false if shutdown was signalled while waiting for a free
    /// run slot; the remaining matches are not started.
    async fn dispatch(&mut self, event: Event, runs: &mut JoinSet<Result<()>>) -> bool {
        let matches: Vec<(usize, Arc<WorkflowJob>)> = self
            .routes
            .iter()
            .enumerate()
            .flat_map(|(index, route)| {
                route
                    .service
                    .jobs_for(&event.key)
                    .into_iter()
                    .map(move |job| (index, job))
            })
            .collect();

        if matches.is_empty() {
            debug!("No jobs bound to event '{}'", event.key);
            return true;
        }

        debug!("Event '{}' matched {} jobs", event.key, matches.len());

        let total = matches.len();
        for (started, (index, job)) in matches.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => None,
                permit = Arc::clone(&self.limiter).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                warn!(
                    "Shutdown while dispatching '{}': skipped {} of {} matched jobs",
                    event.key,
                    total - started,
                    total
                );
                return false;
            };

            self.last_run_id += 1;
            let route = &self.routes[index];
            let run = RunInfo::new(
                self.last_run_id,
                event.key.as_str(),
                route.service.name(),
                job.name(),
            );
            let ctx = Context::new(run, Arc::clone(&self.observer), self.shutdown.clone());
            let chain = route.chain.clone();
            let payload = event.payload.clone();

            runs.spawn(async move {
                let result = execute_run(chain, job, ctx, payload).await;
                drop(permit);
                result
            });
        }

        true
    }
}

/// Runs `job` inside `chain` and reports the outcome.
async fn execute_run(
    chain: MiddlewareChain,
    job: Arc<WorkflowJob>,
    ctx: Context,
    payload: Value,
) -> Result<()> {
    let output: Arc<Mutex<Option<Value>>> = Arc::default();
    let slot = Arc::clone(&output);

    let terminal: Terminal = Arc::new(move |ctx: Context| -> BoxFuture<'static, Result<()>> {
        let job = Arc::clone(&job);
        let payload = payload.clone();
        let slot = Arc::clone(&slot);
        Box::pin(async move {
            let value = job.run(&ctx, payload).await?;
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = value;
            Ok(())
        })
    });

    ctx.emit(RunEventKind::RunStarted);
    let started = Instant::now();
    let result = AssertUnwindSafe(chain.invoke(ctx.clone(), terminal))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(WorkflowError::RunPanicked(panic_message(panic.as_ref()))));
    let elapsed = started.elapsed();

    match &result {
        Ok(()) => {
            let output = output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if output.is_none() {
                debug!("[{}] finished without an output", ctx.run());
            }
            ctx.emit(RunEventKind::RunCompleted { output, elapsed });
        }
        Err(e) => {
            error!("[{}] failed: {}", ctx.run(), e);
            ctx.emit(RunEventKind::RunFailed {
                error: e.clone(),
                elapsed,
            });
        }
    }

    result
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn record_outcome(
    result: std::result::Result<Result<()>, JoinError>,
    first_error: &mut Option<WorkflowError>,
) {
    let error = match result {
        Ok(Ok(())) => return,
        Ok(Err(e)) => e,
        Err(e) => {
            error!("Run task did not complete: {}", e);
            WorkflowError::RunPanicked(e.to_string())
        }
    };
    first_error.get_or_insert(error);
}
