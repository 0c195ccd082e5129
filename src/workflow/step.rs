//! Step Handlers
//!
//! A step is a named, typed async function `(Context, In) -> Out`. Steps
//! are stored type-erased so that jobs with different step types can live
//! in the same registry; the typed handoff between consecutive steps is
//! checked when the job is built (see [`JobSteps`](super::model::JobSteps)).

use std::any::{type_name, Any};
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::context::Context;
use crate::error::{Result, WorkflowError};

/// Error type step handlers may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Output of one step, handed to the next.
pub(crate) type StepValue = Box<dyn Any + Send>;

type StepFn =
    Arc<dyn Fn(Context, StepValue) -> BoxFuture<'static, Result<StepValue>> + Send + Sync>;

/// Decodes an event payload into the first step's input.
pub(crate) type Decoder = fn(&str, Value) -> Result<StepValue>;

/// Encodes the last step's output for observers.
pub(crate) type Encoder = fn(&StepValue) -> Result<Value>;

/// A single named unit of work within a job.
#[derive(Clone)]
pub struct StepHandler {
    name: String,
    input_type: &'static str,
    output_type: &'static str,
    run: StepFn,
}

impl StepHandler {
    /// Wraps a typed async handler.
    pub fn new<I, O, F, Fut, E>(name: impl Into<String>, handler: F) -> Self
    where
        I: Send + 'static,
        O: Send + 'static,
        F: Fn(Context, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<O, E>> + Send + 'static,
        E: Into<BoxError>,
    {
        let name: String = name.into().trim().to_string();
        let step_name = name.clone();
        let handler = Arc::new(handler);

        let run: StepFn = Arc::new(
            move |ctx: Context, input: StepValue| -> BoxFuture<'static, Result<StepValue>> {
                let handler = Arc::clone(&handler);
                let step_name = step_name.clone();

                Box::pin(async move {
                    let input = input.downcast::<I>().map_err(|_| WorkflowError::InputDecode {
                        step: step_name.clone(),
                        expected: type_name::<I>(),
                        reason: "previous step produced a different type".to_string(),
                    })?;

                    match (*handler)(ctx, *input).await {
                        Ok(output) => Ok(Box::new(output) as StepValue),
                        Err(e) => Err(into_step_error(&step_name, e.into())),
                    }
                })
            },
        );

        Self {
            name,
            input_type: type_name::<I>(),
            output_type: type_name::<O>(),
            run,
        }
    }

    /// Step name, unique within its job.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name of the step input.
    pub fn input_type(&self) -> &'static str {
        self.input_type
    }

    /// Rust type name of the step output.
    pub fn output_type(&self) -> &'static str {
        self.output_type
    }

    pub(crate) async fn call(&self, ctx: Context, input: StepValue) -> Result<StepValue> {
        (self.run)(ctx, input).await
    }
}

impl fmt::Debug for StepHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHandler")
            .field("name", &self.name)
            .field("input_type", &self.input_type)
            .field("output_type", &self.output_type)
            .finish()
    }
}

/// Keeps errors the handler raised through the crate's own API (for
/// example a missing context value) and wraps everything else.
fn into_step_error(step: &str, err: BoxError) -> WorkflowError {
    match err.downcast::<WorkflowError>() {
        Ok(inner) => *inner,
        Err(other) => WorkflowError::StepFailed {
            step: step.to_string(),
            message: other.to_string(),
        },
    }
}

pub(crate) fn decode_input<I>(step: &str, payload: Value) -> Result<StepValue>
where
    I: DeserializeOwned + Send + 'static,
{
    serde_json::from_value::<I>(payload)
        .map(|input| Box::new(input) as StepValue)
        .map_err(|e| WorkflowError::InputDecode {
            step: step.to_string(),
            expected: type_name::<I>(),
            reason: e.to_string(),
        })
}

pub(crate) fn encode_output<O>(value: &StepValue) -> Result<Value>
where
    O: Serialize + 'static,
{
    let output = value.downcast_ref::<O>().ok_or_else(|| {
        WorkflowError::Encode(format!("final output is not of type {}", type_name::<O>()))
    })?;
    serde_json::to_value(output).map_err(|e| WorkflowError::Encode(e.to_string()))
}
