//! Authenticated access to the vendor HTTP APIs
//!
//! Requests are described by [`ApiRequest`], which names the token scope the
//! call needs. [`ApiClient`] obtains the token, attaches it and hands the
//! call to an [`HttpExecutor`]. Both the token source and the executor are
//! trait objects so a run can be driven against scripted doubles.

mod error;
mod executor;
mod token;

use serde_json::Value;
use solution_model::ServiceResponse;
use std::sync::Arc;

pub use error::TokenError;
pub use executor::{HttpExecutor, HttpMethod, HttpRequest, ReqwestExecutor};
pub use token::{
    ApiScope, AzCliTokenProvider, StaticTokenProvider, TokenProvider, APPLICATION_SCOPE,
    MANAGEMENT_SCOPE,
};

/// A call that still needs a bearer token
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: HttpMethod,
    pub url: String,
    pub scope: ApiScope,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>, scope: ApiScope) -> Self {
        Self {
            method,
            url: url.into(),
            scope,
            body: None,
        }
    }

    pub fn get(url: impl Into<String>, scope: ApiScope) -> Self {
        Self::new(HttpMethod::Get, url, scope)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Clone)]
pub struct ApiClient {
    executor: Arc<dyn HttpExecutor>,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    pub fn new(executor: Arc<dyn HttpExecutor>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self { executor, tokens }
    }

    /// Client talking to the real APIs with Azure CLI credentials
    pub fn from_environment() -> Self {
        Self::new(
            Arc::new(ReqwestExecutor::new()),
            Arc::new(AzCliTokenProvider::new()),
        )
    }

    /// Authenticate and perform one call
    ///
    /// A missing token is reported as a 401 response and nothing is sent.
    pub async fn send(&self, request: &ApiRequest) -> ServiceResponse {
        let token = match self.tokens.scoped_token(&request.scope).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(scope = %request.scope, error = %e, "no bearer token");
                return ServiceResponse::unauthorized(e.to_string());
            }
        };

        let mut http = HttpRequest::new(request.method, request.url.clone())
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json");
        if let Some(body) = &request.body {
            http = http.body(body.clone());
        }

        self.executor.execute(http).await
    }
}
