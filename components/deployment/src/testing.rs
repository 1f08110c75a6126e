//! Scripted executor for driving runs without a network

use async_trait::async_trait;
use cloud_client::{HttpExecutor, HttpRequest};
use parking_lot::Mutex;
use serde_json::json;
use solution_model::ServiceResponse;
use std::collections::VecDeque;

struct Route {
    fragment: String,
    responses: VecDeque<ServiceResponse>,
}

/// Answers by URL fragment, first matching route wins
///
/// A route replays its responses in order and keeps repeating the last one.
/// Unmatched calls get an empty 200.
#[derive(Default)]
pub struct ScriptedExecutor {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<HttpRequest>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, fragment: &str, responses: Vec<ServiceResponse>) -> Self {
        self.routes.lock().push(Route {
            fragment: fragment.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn calls(&self) -> Vec<HttpRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, fragment: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|request| request.url.contains(fragment))
            .count()
    }
}

#[async_trait]
impl HttpExecutor for ScriptedExecutor {
    async fn execute(&self, request: HttpRequest) -> ServiceResponse {
        let url = request.url.clone();
        self.calls.lock().push(request);

        let mut routes = self.routes.lock();
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.fragment)) else {
            return ServiceResponse::ok(Some(json!({})));
        };
        if route.responses.len() > 1 {
            route.responses.pop_front().unwrap()
        } else {
            route
                .responses
                .front()
                .cloned()
                .unwrap_or_else(|| ServiceResponse::ok(Some(json!({}))))
        }
    }
}
