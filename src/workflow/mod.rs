//! Workflow Definition Module
//!
//! Provides the data structures for defining workflow jobs and the
//! per-run context their steps execute in.
//!
//! # Structure
//!
//! - [`context`]: Append-only, strongly-typed run context
//! - [`step`]: Type-erased step handlers
//! - [`model`]: Workflow jobs and their typed builder
//! - [`validator`]: Setup-time validation rules

pub mod context;
pub mod model;
pub mod step;
pub mod validator;

pub use context::{Context, RunInfo};
pub use model::{JobBuilder, JobSteps, WorkflowJob};
pub use step::{BoxError, StepHandler};
pub use validator::ValidationError;
