//! Run Observers
//!
//! Instrumentation interface that the worker, the step runner, middleware
//! and step handlers report through. Observers are injected into the
//! worker once and reach every run via its [`Context`](crate::workflow::Context).

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::WorkflowError;
use crate::workflow::context::RunInfo;

/// What happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEventKind {
    /// Run was dispatched and is entering the middleware chain
    RunStarted,
    /// Step handler is about to run
    StepStarted { step: String },
    /// Step handler returned an output
    StepCompleted { step: String, elapsed: Duration },
    /// Step handler returned an error; remaining steps are skipped
    StepFailed { step: String, error: WorkflowError },
    /// Free-form label reported by a middleware or step
    Marker { label: String },
    /// Middleware chain returned successfully. `output` is `None` when a
    /// middleware did not call through to the job.
    RunCompleted {
        output: Option<Value>,
        elapsed: Duration,
    },
    /// Middleware chain returned an error
    RunFailed {
        error: WorkflowError,
        elapsed: Duration,
    },
}

/// A single observation tied to the run that produced it.
#[derive(Debug, Clone)]
pub struct RunEvent {
    pub run: RunInfo,
    pub kind: RunEventKind,
    pub timestamp: DateTime<Utc>,
}

impl RunEvent {
    pub fn new(run: RunInfo, kind: RunEventKind) -> Self {
        Self {
            run,
            kind,
            timestamp: Utc::now(),
        }
    }

    /// Returns the step name for step-level events.
    pub fn step(&self) -> Option<&str> {
        match &self.kind {
            RunEventKind::StepStarted { step }
            | RunEventKind::StepCompleted { step, .. }
            | RunEventKind::StepFailed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Returns true for events that end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            RunEventKind::RunCompleted { .. } | RunEventKind::RunFailed { .. }
        )
    }
}

/// Receives run events.
///
/// Called synchronously on the task executing the run, so implementations
/// should not block.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &RunEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn on_event(&self, _event: &RunEvent) {}
}

/// Writes run events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&self, event: &RunEvent) {
        let run = &event.run;
        match &event.kind {
            RunEventKind::RunStarted => debug!("[{}] run started", run),
            RunEventKind::StepStarted { step } => debug!("[{}] step '{}' started", run, step),
            RunEventKind::StepCompleted { step, elapsed } => {
                debug!("[{}] step '{}' completed in {:.2?}", run, step, elapsed)
            }
            RunEventKind::StepFailed { step, error } => {
                error!("[{}] step '{}' failed: {}", run, step, error)
            }
            RunEventKind::Marker { label } => debug!("[{}] {}", run, label),
            RunEventKind::RunCompleted { elapsed, .. } => {
                info!("[{}] run completed in {:.2?}", run, elapsed)
            }
            RunEventKind::RunFailed { error, elapsed } => {
                error!("[{}] run failed after {:.2?}: {}", run, elapsed, error)
            }
        }
    }
}

/// Forwards every event into a tokio channel.
///
/// Send failures (receiver dropped) are ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<RunEvent>,
}

impl ChannelObserver {
    pub fn new(tx: UnboundedSender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl Observer for ChannelObserver {
    fn on_event(&self, event: &RunEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Fans one event out to several observers in order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<std::sync::Arc<dyn Observer>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: std::sync::Arc<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl Observer for ObserverSet {
    fn on_event(&self, event: &RunEvent) {
        for observer in &self.observers {
            observer.on_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc::unbounded_channel;

    fn run_info() -> RunInfo {
        RunInfo::new(7, "user:create", "test", "post-user-update")
    }

    #[test]
    fn test_event_step_accessor() {
        let event = RunEvent::new(
            run_info(),
            RunEventKind::StepStarted {
                step: "step-one".to_string(),
            },
        );
        assert_eq!(event.step(), Some("step-one"));

        let marker = RunEvent::new(
            run_info(),
            RunEventKind::Marker {
                label: "x".to_string(),
            },
        );
        assert_eq!(marker.step(), None);
    }

    #[test]
    fn test_terminal_events() {
        let done = RunEvent::new(
            run_info(),
            RunEventKind::RunCompleted {
                output: None,
                elapsed: Duration::ZERO,
            },
        );
        let started = RunEvent::new(run_info(), RunEventKind::RunStarted);
        assert!(done.is_terminal());
        assert!(!started.is_terminal());
    }

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, mut rx) = unbounded_channel();
        let observer = ChannelObserver::new(tx);
        observer.on_event(&RunEvent::new(run_info(), RunEventKind::RunStarted));

        let received = rx.try_recv().unwrap();
        assert_eq!(received.kind, RunEventKind::RunStarted);
        assert_eq!(received.run.run_id, 7);
    }

    #[test]
    fn test_channel_observer_ignores_closed_receiver() {
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let observer = ChannelObserver::new(tx);
        observer.on_event(&RunEvent::new(run_info(), RunEventKind::RunStarted));
    }

    #[test]
    fn test_observer_set_fans_out() {
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        let mut set = ObserverSet::new();
        assert!(set.is_empty());
        set.push(Arc::new(ChannelObserver::new(tx1)));
        set.push(Arc::new(ChannelObserver::new(tx2)));
        assert_eq!(set.len(), 2);

        set.on_event(&RunEvent::new(run_info(), RunEventKind::RunStarted));
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_log_observer_handles_all_kinds() {
        let observer = LogObserver;
        let kinds = vec![
            RunEventKind::RunStarted,
            RunEventKind::Marker {
                label: "m".to_string(),
            },
            RunEventKind::RunFailed {
                error: WorkflowError::WorkerStopped,
                elapsed: Duration::from_millis(3),
            },
        ];
        for kind in kinds {
            observer.on_event(&RunEvent::new(run_info(), kind));
        }
    }
}
