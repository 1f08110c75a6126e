//! Sequential deployment of solution items
//!
//! [`Orchestrator::provision`] walks a solution in document order. For each
//! item the resolver builds a request from the item and the results earlier
//! items captured, the request is sent through the authenticated client, and
//! management-plane operations are followed to completion. Progress goes out
//! as [`ProvisioningEvent`]s to any subscriber.

mod cache;
mod error;
mod events;
mod lro;
mod orchestrator;
mod resolver;
mod startup;
mod timing;

#[cfg(test)]
mod testing;

pub use cache::{CachedStep, DeviceCredentials, StepOutput, StepResultCache};
pub use error::{ResolveError, Result};
pub use events::{EventSink, Progress, ProvisioningEvent};
pub use lro::{operation_url, LroOutcome, LroPoller};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use resolver::{
    capture, resolve, ResolveContext, ResolvedStep, StartupProbe, StepAction,
    DEFAULT_SUCCESS_MARKER, SOLUTION_TAG, UNKNOWN_STEP_STATUS,
};
pub use startup::{await_edge_runtime, STARTUP_TIMEOUT_STATUS};
pub use timing::DeploymentTiming;
