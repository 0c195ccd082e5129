//! Run Monitoring Module
//!
//! Instrumentation for workflow runs: the observer interface that the
//! worker, steps and middleware report through, and a recording
//! timeline built on it.
//!
//! # Components
//!
//! - [`Observer`]: injectable run event sink
//! - [`ExecutionTimeline`]: step timing, markers and Gantt charts

pub mod observer;
pub mod timeline;

pub use observer::{
    ChannelObserver, LogObserver, NoopObserver, Observer, ObserverSet, RunEvent, RunEventKind,
};
pub use timeline::{EventType, ExecutionTimeline, TimelineEvent};
