//! Execution Timeline
//!
//! An [`Observer`] that records step start/end times and reported markers
//! for every run, for timing reports and Gantt charts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use super::observer::{Observer, RunEvent, RunEventKind};

/// Type of timeline event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    /// Step started executing
    Started,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
    /// Marker reported through the run context
    Marker(String),
    /// Run finished, successfully or not
    RunFinished { success: bool },
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Run that produced the event
    pub run_id: u64,
    /// Step name, empty for run-level events
    pub step: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event was recorded
    pub timestamp: Instant,
}

impl TimelineEvent {
    /// Key identifying a step within a run, e.g. `3/step-one`.
    pub fn step_key(&self) -> String {
        format!("{}/{}", self.run_id, self.step)
    }
}

/// Records run events as they are observed.
#[derive(Debug)]
pub struct ExecutionTimeline {
    events: Mutex<Vec<TimelineEvent>>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            start_time: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TimelineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records an event.
    pub fn add_event(&self, run_id: u64, step: impl Into<String>, event_type: EventType) {
        self.lock().push(TimelineEvent {
            run_id,
            step: step.into(),
            event_type,
            timestamp: Instant::now(),
        });
    }

    /// Returns a snapshot of all recorded events.
    pub fn get_events(&self) -> Vec<TimelineEvent> {
        self.lock().clone()
    }

    /// Returns reported marker labels in the order they were recorded.
    pub fn markers(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|e| match &e.event_type {
                EventType::Marker(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of runs that have finished.
    pub fn finished_runs(&self) -> usize {
        self.lock()
            .iter()
            .filter(|e| matches!(e.event_type, EventType::RunFinished { .. }))
            .count()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Generates an ASCII Gantt chart of step executions.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total_time = Instant::now().duration_since(self.start_time).as_millis();

        if total_time == 0 {
            return output;
        }

        // Scale to 50 characters width
        let scale = 50.0 / total_time as f64;

        let mut sorted_steps: Vec<_> = self.step_spans().into_iter().collect();
        sorted_steps.sort_by_key(|(_, (start, _))| *start);

        for (key, (start, end)) in sorted_steps {
            if end > start {
                let start_pos = (start as f64 * scale) as usize;
                let duration = ((end - start) as f64 * scale).max(1.0) as usize;

                let mut bar = " ".repeat(start_pos);
                bar.push_str(&"#".repeat(duration));

                output.push_str(&format!(
                    "{:16} |{}| ({} ms)\n",
                    truncate(&key, 16),
                    bar,
                    end - start
                ));
            }
        }

        output.push_str(&format!("\nTotal: {} ms\n", total_time));
        output
    }

    /// Returns step durations in milliseconds keyed by `run_id/step`.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        self.step_spans()
            .into_iter()
            .filter(|(_, (start, end))| end >= start)
            .map(|(key, (start, end))| (key, end - start))
            .collect()
    }

    /// Start and end offsets in milliseconds for finished steps.
    fn step_spans(&self) -> HashMap<String, (u128, u128)> {
        let mut starts: HashMap<String, u128> = HashMap::new();
        let mut spans: HashMap<String, (u128, u128)> = HashMap::new();

        for event in self.lock().iter() {
            let elapsed = event.timestamp.duration_since(self.start_time).as_millis();

            match event.event_type {
                EventType::Started => {
                    starts.insert(event.step_key(), elapsed);
                }
                EventType::Completed | EventType::Failed => {
                    let key = event.step_key();
                    if let Some(start) = starts.get(&key) {
                        spans.insert(key, (*start, elapsed));
                    }
                }
                _ => {}
            }
        }

        spans
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Observer for ExecutionTimeline {
    fn on_event(&self, event: &RunEvent) {
        let run_id = event.run.run_id;
        match &event.kind {
            RunEventKind::StepStarted { step } => self.add_event(run_id, step, EventType::Started),
            RunEventKind::StepCompleted { step, .. } => {
                self.add_event(run_id, step, EventType::Completed)
            }
            RunEventKind::StepFailed { step, .. } => {
                self.add_event(run_id, step, EventType::Failed)
            }
            RunEventKind::Marker { label } => {
                self.add_event(run_id, "", EventType::Marker(label.clone()))
            }
            RunEventKind::RunCompleted { .. } => {
                self.add_event(run_id, "", EventType::RunFinished { success: true })
            }
            RunEventKind::RunFailed { .. } => {
                self.add_event(run_id, "", EventType::RunFinished { success: false })
            }
            RunEventKind::RunStarted => {}
        }
    }
}

/// Truncates a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkflowError;
    use crate::workflow::context::RunInfo;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_timeline_creation() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.get_events().is_empty());
    }

    #[test]
    fn test_get_durations() {
        let timeline = ExecutionTimeline::new();
        timeline.add_event(1, "step1", EventType::Started);
        thread::sleep(Duration::from_millis(50));
        timeline.add_event(1, "step1", EventType::Completed);

        let durations = timeline.get_durations();
        assert!(*durations.get("1/step1").unwrap() >= 50);
    }

    #[test]
    fn test_durations_are_per_run() {
        let timeline = ExecutionTimeline::new();
        timeline.add_event(1, "step1", EventType::Started);
        timeline.add_event(2, "step1", EventType::Started);
        timeline.add_event(2, "step1", EventType::Failed);

        let durations = timeline.get_durations();
        assert!(durations.contains_key("2/step1"));
        assert!(!durations.contains_key("1/step1"));
    }

    #[test]
    fn test_gantt_chart_generation() {
        let timeline = ExecutionTimeline::new();

        timeline.add_event(1, "step1", EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event(1, "step1", EventType::Completed);
        timeline.add_event(1, "step2", EventType::Started);
        thread::sleep(Duration::from_millis(20));
        timeline.add_event(1, "step2", EventType::Completed);

        let chart = timeline.gantt_chart();
        assert!(chart.contains("1/step1"));
        assert!(chart.contains("1/step2"));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_observer_records_markers_in_order() {
        let timeline = ExecutionTimeline::new();
        let run = RunInfo::new(1, "evt", "svc", "job");
        for label in ["first", "second"] {
            timeline.on_event(&RunEvent::new(
                run.clone(),
                RunEventKind::Marker {
                    label: label.to_string(),
                },
            ));
        }
        assert_eq!(timeline.markers(), vec!["first", "second"]);
    }

    #[test]
    fn test_observer_counts_finished_runs() {
        let timeline = ExecutionTimeline::new();
        let run = RunInfo::new(1, "evt", "svc", "job");
        timeline.on_event(&RunEvent::new(run.clone(), RunEventKind::RunStarted));
        assert_eq!(timeline.finished_runs(), 0);

        timeline.on_event(&RunEvent::new(
            run.clone(),
            RunEventKind::RunFailed {
                error: WorkflowError::WorkerStopped,
                elapsed: Duration::ZERO,
            },
        ));
        assert_eq!(timeline.finished_runs(), 1);
    }

    #[test]
    fn test_gantt_chart_empty() {
        let timeline = ExecutionTimeline::new();
        assert!(timeline.gantt_chart().contains("Timeline"));
    }

    #[test]
    fn test_truncate_long_label() {
        assert_eq!(truncate("abcdefghij", 6), "abc...");
        assert_eq!(truncate("ab", 4), "ab  ");
    }
}
