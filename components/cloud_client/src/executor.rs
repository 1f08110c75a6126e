// components/cloud_client/src/executor.rs
//! Single HTTP calls reduced to a `ServiceResponse`
//!
//! An executor never fails: transport problems become status 500 and vendor
//! rejections keep their HTTP status with the vendor's message when one can
//! be found in the error envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solution_model::ServiceResponse;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Fully described HTTP call, headers included
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[async_trait]
pub trait HttpExecutor: Send + Sync {
    /// Perform exactly one call; never returns an error
    async fn execute(&self, request: HttpRequest) -> ServiceResponse;
}

/// Executor backed by a shared `reqwest::Client`
#[derive(Clone, Default)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(&self, request: HttpRequest) -> Result<ServiceResponse, reqwest::Error> {
        let mut builder = self.client.request(request.method.into(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();

        let text = response.text().await?;
        let payload = decode_payload(&text);

        let message = if status.is_success() {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string())
        } else {
            vendor_error_message(payload.as_ref()).unwrap_or_else(|| {
                format!("An error occurred during the request: {}", status.as_u16())
            })
        };

        Ok(ServiceResponse {
            status: status.as_u16(),
            message,
            headers: Some(headers),
            payload,
        })
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: HttpRequest) -> ServiceResponse {
        let method = request.method;
        let url = request.url.clone();
        tracing::debug!(%method, %url, "sending request");

        match self.send(request).await {
            Ok(response) => {
                if response.succeeded() {
                    tracing::debug!(%method, %url, status = response.status, "request succeeded");
                } else {
                    tracing::error!(
                        %method,
                        %url,
                        status = response.status,
                        message = %response.message,
                        "request rejected"
                    );
                }
                response
            }
            Err(e) => {
                tracing::error!(%method, %url, error = %e, "request failed");
                ServiceResponse::local_failure(format!(
                    "An error occurred during the request: {}",
                    e
                ))
            }
        }
    }
}

/// JSON when possible, otherwise the raw text, nothing for an empty body
fn decode_payload(text: &str) -> Option<Value> {
    if text.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string())))
}

/// Message from the `{ "error": { "message": ... } }` envelope
fn vendor_error_message(payload: Option<&Value>) -> Option<String> {
    let error = payload?.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}
