// components/solution_model/src/response.rs
//! Uniform result shape for every HTTP interaction

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Status used when the failure happened locally (transport, resolver bug)
pub const LOCAL_FAILURE_STATUS: u16 = 500;

/// Status used when no bearer token could be obtained
pub const UNAUTHORIZED_STATUS: u16 = 401;

/// Normalized outcome of a dispatched request
///
/// Headers are stored with lower-case names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    pub status: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl ServiceResponse {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            headers: None,
            payload: None,
        }
    }

    pub fn ok(payload: Option<Value>) -> Self {
        Self {
            payload,
            ..Self::new(200, "OK")
        }
    }

    pub fn local_failure(message: impl Into<String>) -> Self {
        Self::new(LOCAL_FAILURE_STATUS, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(UNAUTHORIZED_STATUS, message)
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn succeeded(&self) -> bool {
        succeeded(self)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        let headers = self.headers.as_ref()?;
        headers
            .get(&name.to_ascii_lowercase())
            .or_else(|| {
                headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    /// `status` field of the decoded payload, if any
    pub fn payload_status(&self) -> Option<&str> {
        self.payload.as_ref()?.get("status")?.as_str()
    }
}

/// The single pass/fail predicate: any 2xx status
pub fn succeeded(response: &ServiceResponse) -> bool {
    (200..=299).contains(&response.status)
}

/// Failure surfaced to the presentation layer when a run aborts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceError {
    pub status: u16,
    pub title: String,
    pub message: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.status, self.title, self.message)
    }
}
