//! Service Registry
//!
//! A [`Service`] groups workflow jobs under a name, binds them to event
//! keys and carries its own middleware chain, which runs inside the
//! worker-wide chain for every job of the service.

use std::sync::Arc;

use log::debug;

use super::middleware::{Middleware, MiddlewareChain};
use crate::error::{Result, WorkflowError};
use crate::workflow::validator::validate_event_key;
use crate::workflow::WorkflowJob;

/// A named group of jobs sharing a middleware chain.
#[derive(Debug)]
pub struct Service {
    name: String,
    middleware: MiddlewareChain,
    bindings: Vec<(String, Arc<WorkflowJob>)>,
}

impl Service {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            middleware: MiddlewareChain::new(),
            bindings: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends a middleware to this service's chain.
    pub fn use_middleware<M: Middleware>(&mut self, middleware: M) -> &mut Self {
        self.middleware.push(middleware);
        self
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    /// Binds `job` to `event_key`.
    ///
    /// Fails if a job with the same name is already registered on this
    /// service or the key is not usable.
    pub fn on(&mut self, event_key: &str, job: WorkflowJob) -> Result<&mut Self> {
        self.on_events(&[event_key], job)
    }

    /// Binds one job to several event keys.
    pub fn on_events(&mut self, event_keys: &[&str], job: WorkflowJob) -> Result<&mut Self> {
        if self.has_job(job.name()) {
            return Err(WorkflowError::DuplicateJob {
                service: self.name.clone(),
                job: job.name().to_string(),
            });
        }

        if event_keys.is_empty() {
            return Err(WorkflowError::InvalidJob {
                job: job.name().to_string(),
                reason: "no event keys given".to_string(),
            });
        }

        for key in event_keys {
            validate_event_key(key).map_err(|e| WorkflowError::InvalidJob {
                job: job.name().to_string(),
                reason: e.to_string(),
            })?;
        }

        let job = Arc::new(job);
        for key in event_keys {
            debug!(
                "Service '{}': job '{}' bound to '{}'",
                self.name,
                job.name(),
                key
            );
            self.bindings.push((key.to_string(), Arc::clone(&job)));
        }

        Ok(self)
    }

    /// Returns true if a job with this name is registered.
    pub fn has_job(&self, name: &str) -> bool {
        self.bindings.iter().any(|(_, job)| job.name() == name)
    }

    /// Jobs bound to `event_key`, in registration order.
    pub fn jobs_for(&self, event_key: &str) -> Vec<Arc<WorkflowJob>> {
        self.bindings
            .iter()
            .filter(|(key, _)| key == event_key)
            .map(|(_, job)| Arc::clone(job))
            .collect()
    }

    /// All distinct event keys this service listens on.
    pub fn event_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (key, _) in &self.bindings {
            if !keys.contains(&key.as_str()) {
                keys.push(key);
            }
        }
        keys
    }
}
