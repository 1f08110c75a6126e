// components/deployment/src/startup.rs
//! Waiting for the edge runtime to come up on the virtual machine
//!
//! The probe command is repeated at a fixed interval until its response
//! message starts with the expected marker, or the ceiling is reached.

use crate::events::EventSink;
use crate::resolver::StartupProbe;
use crate::timing::DeploymentTiming;
use cloud_client::ApiClient;
use serde_json::Value;
use solution_model::ServiceResponse;
use tokio::time::Instant;

/// Status of the response produced when the runtime never answered
pub const STARTUP_TIMEOUT_STATUS: u16 = 504;

const LABEL: &str = "Waiting for the edge runtime...";

pub async fn await_edge_runtime(
    client: &ApiClient,
    events: &EventSink,
    probe: &StartupProbe,
    timing: &DeploymentTiming,
) -> ServiceResponse {
    let started = Instant::now();
    let mut attempts = 0u32;

    loop {
        let response = client.send(&probe.request).await;
        attempts += 1;

        if response.succeeded()
            && command_message(&response).is_some_and(|m| m.starts_with(&probe.success_marker))
        {
            tracing::info!(attempts, "edge runtime is up");
            return response;
        }

        let elapsed = started.elapsed();
        if elapsed >= timing.startup_timeout {
            tracing::error!(attempts, "edge runtime did not start in time");
            return ServiceResponse::new(
                STARTUP_TIMEOUT_STATUS,
                format!(
                    "Timed out after {} seconds waiting for the edge runtime to start",
                    timing.startup_timeout.as_secs()
                ),
            );
        }

        let value = (elapsed.as_secs_f64() / timing.startup_timeout.as_secs_f64() * 100.0).min(100.0);
        events.progress(LABEL, value, 100.0);
        tracing::debug!(attempts, status = response.status, "edge runtime not ready");
        tokio::time::sleep(timing.startup_poll_interval).await;
    }
}

/// Message returned by the module command, plain or wrapped in an object
fn command_message(response: &ServiceResponse) -> Option<&str> {
    let reply = response.payload.as_ref()?.get("response")?;
    match reply {
        Value::String(message) => Some(message.as_str()),
        other => other.get("message")?.as_str(),
    }
}
