//! Workflow Job Model
//!
//! A [`WorkflowJob`] is an ordered list of steps run one after another,
//! each receiving the previous step's output. The first step receives the
//! event payload, decoded into its input type.
//!
//! # Example
//!
//! ```
//! use eventrunner::workflow::{BoxError, Context, WorkflowJob};
//!
//! let job = WorkflowJob::builder("count-words")
//!     .description("Counts the words in a message")
//!     .step("split", |_ctx: Context, text: String| async move {
//!         Ok::<_, BoxError>(text.split_whitespace().count())
//!     })
//!     .step("report", |_ctx: Context, count: usize| async move {
//!         Ok::<_, BoxError>(format!("{} words", count))
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(job.len(), 2);
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::time::Instant;

use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::context::Context;
use super::step::{decode_input, encode_output, BoxError, Decoder, Encoder, StepHandler};
use super::validator::validate_job;
use crate::error::{Result, WorkflowError};
use crate::monitoring::observer::RunEventKind;

/// An ordered, named sequence of steps.
pub struct WorkflowJob {
    name: String,
    description: String,
    steps: Vec<StepHandler>,
    decode: Decoder,
    encode: Encoder,
}

impl WorkflowJob {
    /// Starts building a job.
    pub fn builder(name: impl Into<String>) -> JobBuilder {
        JobBuilder {
            name: name.into().trim().to_string(),
            description: String::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[StepHandler] {
        &self.steps
    }

    /// Gets a step by name.
    pub fn get_step(&self, name: &str) -> Option<&StepHandler> {
        self.steps.iter().find(|s| s.name() == name)
    }

    /// Returns the number of steps in the job.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built job; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order and returns the encoded final output.
    ///
    /// The first failing step stops the job; later steps never run. The
    /// output is only encoded for observers: if it cannot be encoded the
    /// job still succeeds and `None` is returned.
    pub async fn run(&self, ctx: &Context, payload: Value) -> Result<Option<Value>> {
        let first = self.steps.first().ok_or_else(|| WorkflowError::InvalidJob {
            job: self.name.clone(),
            reason: "job has no steps".to_string(),
        })?;

        let mut value = match (self.decode)(first.name(), payload) {
            Ok(value) => value,
            Err(e) => {
                ctx.emit(RunEventKind::StepFailed {
                    step: first.name().to_string(),
                    error: e.clone(),
                });
                return Err(e);
            }
        };

        for step in &self.steps {
            ctx.emit(RunEventKind::StepStarted {
                step: step.name().to_string(),
            });
            let started = Instant::now();

            match step.call(ctx.clone(), value).await {
                Ok(output) => {
                    ctx.emit(RunEventKind::StepCompleted {
                        step: step.name().to_string(),
                        elapsed: started.elapsed(),
                    });
                    value = output;
                }
                Err(e) => {
                    ctx.emit(RunEventKind::StepFailed {
                        step: step.name().to_string(),
                        error: e.clone(),
                    });
                    return Err(e);
                }
            }
        }

        match (self.encode)(&value) {
            Ok(output) => Ok(Some(output)),
            Err(e) => {
                warn!("[{}] final output not reported: {}", ctx.run(), e);
                Ok(None)
            }
        }
    }
}

impl fmt::Debug for WorkflowJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowJob")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("steps", &self.steps)
            .finish()
    }
}

/// Builder for a job that has no steps yet.
#[derive(Debug, Clone)]
pub struct JobBuilder {
    name: String,
    description: String,
}

impl JobBuilder {
    /// Sets a human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds the first step. Its input type is what event payloads are
    /// decoded into.
    pub fn step<I, O, F, Fut, E>(self, name: impl Into<String>, handler: F) -> JobSteps<I, O>
    where
        I: DeserializeOwned + Send + 'static,
        O: Send + 'static,
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        JobSteps {
            name: self.name,
            description: self.description,
            steps: vec![StepHandler::new(name, handler)],
            decode: decode_input::<I>,
            _types: PhantomData,
        }
    }
}

/// Builder for a job whose payload type is `I` and whose last step
/// currently produces `O`.
///
/// Each added step must accept `O`, which keeps the handoff between
/// steps checked at compile time.
pub struct JobSteps<I, O> {
    name: String,
    description: String,
    steps: Vec<StepHandler>,
    decode: Decoder,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> JobSteps<I, O>
where
    O: Send + 'static,
{
    /// Sets a human-readable description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Appends a step consuming the previous step's output.
    pub fn step<N, F, Fut, E>(mut self, name: impl Into<String>, handler: F) -> JobSteps<I, N>
    where
        N: Send + 'static,
        F: Fn(Context, O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<N, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.steps.push(StepHandler::new(name, handler));
        JobSteps {
            name: self.name,
            description: self.description,
            steps: self.steps,
            decode: self.decode,
            _types: PhantomData,
        }
    }

    /// Validates and builds the job.
    pub fn build(self) -> Result<WorkflowJob>
    where
        O: Serialize,
    {
        validate_job(&self.name, &self.steps).map_err(|e| WorkflowError::InvalidJob {
            job: self.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(WorkflowJob {
            name: self.name,
            description: self.description,
            steps: self.steps,
            decode: self.decode,
            encode: encode_output::<O>,
        })
    }
}
