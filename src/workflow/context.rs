//! Execution Context
//!
//! Per-run key/value carrier threaded through the middleware chain and
//! into every step of a run.
//!
//! A [`Context`] is append-only: [`Context::with_value`] returns a derived
//! context holding all ancestor entries plus the new one, and leaves the
//! original untouched. A middleware therefore only ever sees what its
//! ancestors added, never what a sibling added.

use std::any::{type_name, Any};
use std::fmt;
use std::iter;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{Result, WorkflowError};
use crate::monitoring::observer::{NoopObserver, Observer, RunEvent, RunEventKind};

/// Identifies a single run of a workflow job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    /// Worker-unique, monotonically increasing run number
    pub run_id: u64,
    /// Event key that triggered the run
    pub event_key: String,
    /// Service owning the job
    pub service: String,
    /// Job name
    pub job: String,
}

impl RunInfo {
    pub fn new(
        run_id: u64,
        event_key: impl Into<String>,
        service: impl Into<String>,
        job: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            event_key: event_key.into(),
            service: service.into(),
            job: job.into(),
        }
    }
}

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run #{} {}/{} on '{}'",
            self.run_id, self.service, self.job, self.event_key
        )
    }
}

struct Entry {
    key: String,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

/// Strongly-typed, append-only context for one run.
///
/// Cloning is cheap; entries are shared between a context and the
/// contexts derived from it.
#[derive(Clone)]
pub struct Context {
    entries: Option<Arc<Entry>>,
    run: Arc<RunInfo>,
    observer: Arc<dyn Observer>,
    shutdown: CancellationToken,
}

impl Context {
    /// Creates an empty context for a run.
    pub fn new(run: RunInfo, observer: Arc<dyn Observer>, shutdown: CancellationToken) -> Self {
        Self {
            entries: None,
            run: Arc::new(run),
            observer,
            shutdown,
        }
    }

    /// Creates an empty context that is not tied to a worker.
    ///
    /// Events are discarded and shutdown is never signalled. Useful for
    /// running a job directly.
    pub fn background() -> Self {
        Self::new(
            RunInfo::new(0, "", "", ""),
            Arc::new(NoopObserver),
            CancellationToken::new(),
        )
    }

    /// Returns a derived context with `key` set to `value`.
    ///
    /// An existing entry with the same key is shadowed in the derived
    /// context only.
    pub fn with_value<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Context {
        Self {
            entries: Some(Arc::new(Entry {
                key: key.into(),
                value: Arc::new(value),
                parent: self.entries.clone(),
            })),
            run: Arc::clone(&self.run),
            observer: Arc::clone(&self.observer),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Looks up `key` and returns it as a `T`.
    ///
    /// Fails with [`WorkflowError::MissingContextValue`] if the key was
    /// never set, or [`WorkflowError::ContextTypeMismatch`] if it holds a
    /// value of another type.
    pub fn get<T: Any>(&self, key: &str) -> Result<&T> {
        let entry = self
            .entries()
            .find(|e| e.key == key)
            .ok_or_else(|| WorkflowError::MissingContextValue(key.to_string()))?;

        entry
            .value
            .downcast_ref::<T>()
            .ok_or_else(|| WorkflowError::ContextTypeMismatch {
                key: key.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Returns true if `key` is set.
    pub fn contains(&self, key: &str) -> bool {
        self.entries().any(|e| e.key == key)
    }

    /// Returns the visible keys, most recently added first.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for entry in self.entries() {
            if !keys.contains(&entry.key.as_str()) {
                keys.push(&entry.key);
            }
        }
        keys
    }

    /// Run this context belongs to.
    pub fn run(&self) -> &RunInfo {
        &self.run
    }

    /// Reports a marker to the worker's observer.
    pub fn report(&self, label: impl Into<String>) {
        self.emit(RunEventKind::Marker {
            label: label.into(),
        });
    }

    /// True once the worker has been asked to shut down.
    ///
    /// Runs are never pre-empted; long steps may poll this to stop early.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Completes when the worker is asked to shut down.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }

    pub(crate) fn emit(&self, kind: RunEventKind) {
        self.observer
            .on_event(&RunEvent::new(self.run.as_ref().clone(), kind));
    }

    fn entries(&self) -> impl Iterator<Item = &Entry> {
        iter::successors(self.entries.as_deref(), |e| e.parent.as_deref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("run", &self.run)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::ExecutionTimeline;

    #[test]
    fn test_with_value_and_get() {
        let ctx = Context::background().with_value("testkey", "testvalue".to_string());
        assert_eq!(ctx.get::<String>("testkey").unwrap(), "testvalue");
        assert!(ctx.contains("testkey"));
    }

    #[test]
    fn test_missing_key() {
        let ctx = Context::background();
        assert_eq!(
            ctx.get::<String>("nope").unwrap_err(),
            WorkflowError::MissingContextValue("nope".to_string())
        );
    }

    #[test]
    fn test_type_mismatch() {
        let ctx = Context::background().with_value("count", 3u32);
        let err = ctx.get::<String>("count").unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::ContextTypeMismatch { ref key, .. } if key == "count"
        ));
    }

    #[test]
    fn test_parent_unchanged_by_derivation() {
        let parent = Context::background().with_value("a", 1i32);
        let child = parent.with_value("b", 2i32);

        assert!(child.contains("a"));
        assert!(child.contains("b"));
        assert!(!parent.contains("b"));
    }

    #[test]
    fn test_siblings_are_isolated() {
        let root = Context::background().with_value("shared", true);
        let left = root.with_value("left", 1u8);
        let right = root.with_value("right", 2u8);

        assert!(!left.contains("right"));
        assert!(!right.contains("left"));
        assert!(*left.get::<bool>("shared").unwrap());
        assert!(*right.get::<bool>("shared").unwrap());
    }

    #[test]
    fn test_shadowing() {
        let outer = Context::background().with_value("k", "outer".to_string());
        let inner = outer.with_value("k", "inner".to_string());

        assert_eq!(inner.get::<String>("k").unwrap(), "inner");
        assert_eq!(outer.get::<String>("k").unwrap(), "outer");
        assert_eq!(inner.keys(), vec!["k"]);
    }

    #[test]
    fn test_keys_newest_first() {
        let ctx = Context::background()
            .with_value("first", 1)
            .with_value("second", 2);
        assert_eq!(ctx.keys(), vec!["second", "first"]);
    }

    #[test]
    fn test_report_reaches_observer() {
        let timeline = Arc::new(ExecutionTimeline::new());
        let ctx = Context::new(
            RunInfo::new(4, "evt", "svc", "job"),
            timeline.clone(),
            CancellationToken::new(),
        );
        ctx.with_value("x", 1).report("hello");
        assert_eq!(timeline.markers(), vec!["hello"]);
    }

    #[test]
    fn test_shutdown_flag() {
        let token = CancellationToken::new();
        let ctx = Context::new(
            RunInfo::new(1, "evt", "svc", "job"),
            Arc::new(NoopObserver),
            token.clone(),
        );
        assert!(!ctx.is_shutting_down());
        token.cancel();
        assert!(ctx.with_value("k", 0).is_shutting_down());
    }

    #[test]
    fn test_run_info_display() {
        let run = RunInfo::new(9, "user:create", "test", "post-user-update");
        assert_eq!(run.to_string(), "run #9 test/post-user-update on 'user:create'");
    }
}
