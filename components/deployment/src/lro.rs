// components/deployment/src/lro.rs
//! Waiting on management-plane operations that finish asynchronously
//!
//! The initiating response names a status URL in `azure-asyncoperation`
//! (or failing that `location`). The URL is polled until the reported status
//! leaves `Running`, sleeping for the server's `retry-after` between polls.

use crate::events::EventSink;
use cloud_client::{ApiClient, ApiRequest, ApiScope};
use solution_model::ServiceResponse;
use std::time::Duration;

pub const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";
pub const LOCATION_HEADER: &str = "location";
pub const RETRY_AFTER_HEADER: &str = "retry-after";

const DEFAULT_LABEL: &str = "Provisioning...";
const DEFAULT_FRACTION: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub enum LroOutcome {
    /// No status URL; the initiating call was the whole operation
    Synchronous,
    Succeeded { polls: usize },
    Failed {
        polls: usize,
        status: String,
        last: ServiceResponse,
    },
}

impl LroOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, LroOutcome::Failed { .. })
    }
}

/// Status URL announced by an initiating response
///
/// Blank header values count as absent.
pub fn operation_url(response: &ServiceResponse) -> Option<&str> {
    non_blank(response, ASYNC_OPERATION_HEADER).or_else(|| non_blank(response, LOCATION_HEADER))
}

fn non_blank<'r>(response: &'r ServiceResponse, name: &str) -> Option<&'r str> {
    response.header(name).filter(|value| !value.trim().is_empty())
}

pub struct LroPoller<'a> {
    client: &'a ApiClient,
    events: &'a EventSink,
    default_retry_after: Duration,
}

impl<'a> LroPoller<'a> {
    pub fn new(client: &'a ApiClient, events: &'a EventSink, default_retry_after: Duration) -> Self {
        Self {
            client,
            events,
            default_retry_after,
        }
    }

    /// Follow the operation `initiating` started, if it started one
    pub async fn track(&self, initiating: &ServiceResponse, scope: &ApiScope) -> LroOutcome {
        let Some(url) = operation_url(initiating) else {
            return LroOutcome::Synchronous;
        };

        tracing::info!(%url, "waiting for long-running operation");
        let request = ApiRequest::get(url, scope.clone());
        let mut polls = 0;
        let mut wait = retry_after(initiating).unwrap_or(self.default_retry_after);

        loop {
            let response = self.client.send(&request).await;
            polls += 1;

            let status = response.payload_status();
            let running = matches!(response.status, 200 | 202) && status == Some("Running");
            if !running {
                return match status {
                    Some("Succeeded") => {
                        tracing::info!(polls, "long-running operation succeeded");
                        LroOutcome::Succeeded { polls }
                    }
                    other => LroOutcome::Failed {
                        polls,
                        status: other.unwrap_or(response.message.as_str()).to_string(),
                        last: response,
                    },
                };
            }

            let (label, value) = progress_of(&response);
            self.events.progress(label, value, 100.0);

            if let Some(requested) = retry_after(&response) {
                wait = requested;
            }
            tracing::debug!(polls, wait_secs = wait.as_secs(), "operation still running");
            tokio::time::sleep(wait).await;
        }
    }
}

/// Label and percentage for a status response
///
/// `percentComplete` is sometimes a fraction and sometimes a percentage;
/// anything up to 1 is treated as a fraction.
fn progress_of(response: &ServiceResponse) -> (String, f64) {
    let label = response.payload_status().unwrap_or(DEFAULT_LABEL).to_string();
    let reported = response
        .payload
        .as_ref()
        .and_then(|payload| payload.get("percentComplete"))
        .and_then(|value| value.as_f64())
        .unwrap_or(DEFAULT_FRACTION);
    let value = if reported <= 1.0 {
        reported * 100.0
    } else {
        reported
    };
    (label, value)
}

fn retry_after(response: &ServiceResponse) -> Option<Duration> {
    response
        .header(RETRY_AFTER_HEADER)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
