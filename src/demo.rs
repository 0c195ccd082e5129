//! Middleware Demo
//!
//! A complete registration exercising both middleware scopes and a typed
//! two-step job. The binary runs it, and the worker tests assert on the
//! markers it reports.
//!
//! Expected marker order for one `user:create:middleware` event:
//!
//! ```text
//! 1st-middleware, 2nd-middleware, svc-middleware,
//! step-one, testvalue, svcvalue, step-two
//! ```

use std::collections::HashMap;
use std::time::Instant;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkflowError};
use crate::execution::{Next, Worker};
use crate::workflow::{Context, WorkflowJob};

/// Event key the demo job is bound to.
pub const DEMO_EVENT: &str = "user:create:middleware";

/// Payload of a user creation event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserCreateEvent {
    pub username: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl UserCreateEvent {
    pub fn sample() -> Self {
        Self {
            username: "echo-test".to_string(),
            user_id: "1".to_string(),
            data: HashMap::new(),
        }
    }
}

/// Output of each demo step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageOutput {
    pub message: String,
}

/// Registers the demo middleware, service and job on `worker`.
pub fn register_middleware_demo(worker: &mut Worker) -> Result<()> {
    worker.use_middleware(|ctx: Context, next: Next| async move {
        ctx.report("1st-middleware");
        next.run(ctx.with_value("testkey", "testvalue".to_string()))
            .await
    });

    worker.use_middleware(|ctx: Context, next: Next| async move {
        ctx.report("2nd-middleware");
        let run = ctx.run().to_string();
        let started = Instant::now();
        let result = next.run(ctx).await;
        info!("[{}] took {:?}", run, started.elapsed());
        result
    });

    let job = WorkflowJob::builder("post-user-update")
        .description("Builds a greeting from a newly created user")
        .step("step-one", |ctx: Context, event: UserCreateEvent| async move {
            ctx.report("step-one");
            let test_value = ctx.get::<String>("testkey")?.clone();
            ctx.report(test_value);
            let svc_value = ctx.get::<String>("svckey")?.clone();
            ctx.report(svc_value);
            Ok::<_, WorkflowError>(MessageOutput {
                message: format!("Username is: {}", event.username),
            })
        })
        .step("step-two", |ctx: Context, input: MessageOutput| async move {
            ctx.report("step-two");
            Ok::<_, WorkflowError>(MessageOutput {
                message: format!("Above message is: {}", input.message),
            })
        })
        .build()?;

    worker
        .new_service("test")?
        .use_middleware(|ctx: Context, next: Next| async move {
            ctx.report("svc-middleware");
            next.run(ctx.with_value("svckey", "svcvalue".to_string()))
                .await
        })
        .on(DEMO_EVENT, job)?;

    Ok(())
}
