// components/deployment/src/orchestrator.rs
//! Runs a solution's items front to back
//!
//! One run at a time, one item at a time, in document order. The first
//! failing item ends the run; earlier items keep their saved responses.

use crate::cache::{CachedStep, StepOutput, StepResultCache};
use crate::error::ResolveError;
use crate::events::{EventSink, ProvisioningEvent};
use crate::lro::{LroOutcome, LroPoller};
use crate::resolver::{self, ResolveContext, ResolvedStep, StepAction};
use crate::startup;
use crate::timing::DeploymentTiming;
use cloud_client::ApiClient;
use serde_json::{json, Value};
use settings_store::{ProvisioningState, SettingsStore};
use solution_model::{ConfigurationItem, ServiceError, ServiceResponse, Solution, StepKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// How a run ended
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Items that completed, all at the start of the solution
    pub completed: usize,
    pub failure: Option<ServiceError>,
    pub cache: StepResultCache,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

pub struct Orchestrator {
    client: ApiClient,
    settings: Arc<dyn SettingsStore>,
    events: EventSink,
    timing: DeploymentTiming,
}

impl Orchestrator {
    pub fn new(client: ApiClient, settings: Arc<dyn SettingsStore>) -> Self {
        Self {
            client,
            settings,
            events: EventSink::new(),
            timing: DeploymentTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: DeploymentTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningEvent> {
        self.events.subscribe()
    }

    /// Provision every item of `solution`, attaching each response as it lands
    ///
    /// Never fails as a whole: the first failing step is reported through the
    /// event stream and in the returned outcome.
    pub async fn provision(&self, solution: &mut Solution) -> RunOutcome {
        let _run = ActiveRun::begin(self.settings.as_ref());
        let subscription_id = self.settings.subscription_id();
        let mut cache = StepResultCache::new();
        let mut completed = 0;
        let mut failure = None;

        tracing::info!(
            solution = %solution.name,
            items = solution.config_items.len(),
            "provisioning started"
        );

        for index in 0..solution.config_items.len() {
            let item = solution.config_items[index].clone();
            self.events.emit(ProvisioningEvent::ItemStarted {
                item_id: item.id.clone(),
            });
            tracing::info!(item = %item.id, kind = %item.item_type, "step started");

            let result = self
                .run_step(&item, solution, subscription_id.as_deref(), &mut cache)
                .await;

            match result {
                Ok(saved) => {
                    solution.record_provision_response(&item.id, saved.clone());
                    self.events.emit(ProvisioningEvent::ItemResultSaved {
                        item_id: item.id.clone(),
                        response: saved,
                    });
                    completed += 1;
                    if let Some(seconds) = item.pause_step.filter(|s| *s > 0) {
                        tracing::debug!(item = %item.id, seconds, "pausing after step");
                        tokio::time::sleep(Duration::from_secs(seconds)).await;
                    }
                }
                Err(response) => {
                    tracing::error!(
                        item = %item.id,
                        status = response.status,
                        message = %response.message,
                        "step failed, stopping"
                    );
                    let error = ServiceError {
                        status: response.status,
                        title: item.item_type.to_string(),
                        message: response.message,
                    };
                    self.events.emit(ProvisioningEvent::ServiceError(error.clone()));
                    failure = Some(error);
                }
            }

            self.events.emit(ProvisioningEvent::ItemEnded {
                item_id: item.id.clone(),
            });
            if failure.is_some() {
                break;
            }
        }

        tracing::info!(completed, failed = failure.is_some(), "provisioning finished");
        RunOutcome {
            completed,
            failure,
            cache,
        }
    }

    /// Resolve, dispatch and capture one item
    ///
    /// Returns the value saved on the item, or the response that failed it.
    async fn run_step(
        &self,
        item: &ConfigurationItem,
        solution: &Solution,
        subscription_id: Option<&str>,
        cache: &mut StepResultCache,
    ) -> Result<Value, ServiceResponse> {
        let ctx = ResolveContext {
            solution,
            subscription_id,
            cache,
        };
        let action = resolver::resolve(item, &ctx).map_err(|e| step_error(item, &e))?;

        let (kind, planned, response) = match action {
            StepAction::Reject(response) => return Err(response),
            StepAction::Dispatch(step) => {
                let response = self.dispatch(item, &step).await;
                (step.kind, step.planned, response)
            }
            StepAction::AwaitEdgeRuntime(probe) => {
                let response =
                    startup::await_edge_runtime(&self.client, &self.events, &probe, &self.timing)
                        .await;
                (StepKind::EdgeRuntimeStartup, StepOutput::Completed, response)
            }
        };

        if !response.succeeded() {
            return Err(response);
        }

        let saved = saved_value(&response);
        let output = resolver::capture(kind, planned, &saved).map_err(|e| step_error(item, &e))?;
        cache.insert(
            kind,
            CachedStep {
                output,
                payload: saved.clone(),
            },
        );
        Ok(saved)
    }

    async fn dispatch(&self, item: &ConfigurationItem, step: &ResolvedStep) -> ServiceResponse {
        let response = self.client.send(&step.request).await;
        if !response.succeeded() || !item.resource_api_type.tracks_long_running_operations() {
            return response;
        }

        let poller = LroPoller::new(&self.client, &self.events, self.timing.default_retry_after);
        if let LroOutcome::Failed { status, last, .. } =
            poller.track(&response, &step.request.scope).await
        {
            // the initiating call succeeded, so the run carries on
            tracing::warn!(
                item = %item.id,
                %status,
                http_status = last.status,
                "long-running operation did not succeed"
            );
            self.events
                .progress(format!("Operation ended with status {status}"), 100.0, 100.0);
        }
        response
    }
}

/// Provision response kept for a successful step
///
/// The decoded payload when there is one, otherwise the status and message.
fn saved_value(response: &ServiceResponse) -> Value {
    match &response.payload {
        Some(payload) if !payload.is_null() => payload.clone(),
        _ => json!({ "status": response.status, "message": response.message }),
    }
}

fn step_error(item: &ConfigurationItem, error: &ResolveError) -> ServiceResponse {
    ServiceResponse::local_failure(format!(
        "Error during provisioning step - {}: {}",
        item.name, error
    ))
}

/// Marks the persisted state Active until dropped
struct ActiveRun<'a> {
    settings: &'a dyn SettingsStore,
}

impl<'a> ActiveRun<'a> {
    fn begin(settings: &'a dyn SettingsStore) -> Self {
        if let Err(e) = settings.set_provisioning_state(ProvisioningState::Active) {
            tracing::warn!(error = %e, "could not record provisioning start");
        }
        Self { settings }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.settings.set_provisioning_state(ProvisioningState::Inactive) {
            tracing::warn!(error = %e, "could not record provisioning end");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedExecutor;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use cloud_client::{HttpExecutor, HttpRequest, StaticTokenProvider};
    use parking_lot::Mutex;
    use settings_store::{MemorySettingsStore, Settings};
    use solution_model::{ItemType, ResourceApiType};
    use std::collections::BTreeMap;

    fn item(id: &str, kind: StepKind, api: ResourceApiType, payload: Value) -> ConfigurationItem {
        ConfigurationItem {
            id: id.to_string(),
            name: format!("{id} step"),
            description: String::new(),
            item_type: kind.into(),
            resource_api_type: api,
            resource_name: id.to_string(),
            payload,
            pause_step: None,
            doc_link: None,
            provision_response: None,
        }
    }

    fn edge_solution() -> Solution {
        Solution {
            name: "Edge sandbox".to_string(),
            id: "sb-1".to_string(),
            resource_suffix_name: "x7".to_string(),
            config_items: vec![
                item(
                    "rg",
                    StepKind::ResourceGroup,
                    ResourceApiType::ResourceManagement,
                    json!({ "location": "westus2" }),
                ),
                item(
                    "app",
                    StepKind::CreateApp,
                    ResourceApiType::ResourceManagement,
                    json!({ "properties": { "subdomain": "plant" } }),
                ),
                item(
                    "edge",
                    StepKind::RegisterEdgeDevice,
                    ResourceApiType::ApplicationApi,
                    json!({ "id": "edge-01" }),
                ),
                item(
                    "creds",
                    StepKind::GetDeviceAttestation,
                    ResourceApiType::ApplicationApi,
                    Value::Null,
                ),
                item(
                    "vm",
                    StepKind::VirtualMachine,
                    ResourceApiType::ResourceManagement,
                    json!({ "properties": { "parameters": {} } }),
                ),
            ],
            ..Solution::empty()
        }
    }

    fn credentials() -> ServiceResponse {
        ServiceResponse::ok(Some(json!({
            "idScope": "0ne00",
            "symmetricKey": { "primaryKey": "k3y" }
        })))
    }

    fn settings() -> Arc<MemorySettingsStore> {
        Arc::new(MemorySettingsStore::new(Settings {
            subscription_id: Some("sub-1".to_string()),
            ..Settings::default()
        }))
    }

    fn orchestrator(executor: Arc<dyn HttpExecutor>, settings: Arc<MemorySettingsStore>) -> Orchestrator {
        let client = ApiClient::new(executor, Arc::new(StaticTokenProvider::new("t")));
        Orchestrator::new(client, settings)
    }

    fn drain(rx: &mut broadcast::Receiver<ProvisioningEvent>) -> Vec<ProvisioningEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn completes_a_dependent_chain() {
        let executor = Arc::new(ScriptedExecutor::new().on("/credentials", vec![credentials()]));
        let settings = settings();
        let orchestrator = orchestrator(executor.clone(), settings.clone());
        let mut solution = edge_solution();

        let outcome = orchestrator.provision(&mut solution).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.completed, 5);
        assert_eq!(solution.provisioned_count(), 5);

        // one entry per step, holding what the step saved
        assert_eq!(outcome.cache.len(), 5);
        for item in &solution.config_items {
            let kind = item.kind().unwrap();
            assert_eq!(
                outcome.cache.get(kind).map(|c| &c.payload),
                item.provision_response.as_ref()
            );
        }

        let vm = executor
            .calls()
            .into_iter()
            .find(|call| call.url.contains("/deployments/vmx7"))
            .unwrap();
        let parameters = &vm.body.unwrap()["properties"]["parameters"];
        assert_eq!(parameters["scopeId"]["value"], "0ne00");
        assert_eq!(parameters["deviceId"]["value"], "edge-01");
        assert_eq!(parameters["deviceKey"]["value"], "k3y");

        assert!(executor.calls_to("plantx7.azureiotcentral.com/api/devices/edge-01") >= 2);
        assert_eq!(settings.provisioning_state(), ProvisioningState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_the_first_failure() {
        let executor = Arc::new(ScriptedExecutor::new().on(
            "/api/devices/edge-01?",
            vec![ServiceResponse::new(409, "Device already exists")],
        ));
        let settings = settings();
        let orchestrator = orchestrator(executor.clone(), settings.clone());
        let mut rx = orchestrator.subscribe();
        let mut solution = edge_solution();

        let outcome = orchestrator.provision(&mut solution).await;

        assert_eq!(outcome.completed, 2);
        assert_eq!(
            outcome.failure,
            Some(ServiceError {
                status: 409,
                title: "register-edge-device".to_string(),
                message: "Device already exists".to_string(),
            })
        );
        let provisioned: Vec<bool> = solution
            .config_items
            .iter()
            .map(ConfigurationItem::is_provisioned)
            .collect();
        assert_eq!(provisioned, vec![true, true, false, false, false]);
        assert_eq!(executor.calls_to("/credentials"), 0);
        assert_eq!(settings.provisioning_state(), ProvisioningState::Inactive);

        let events = drain(&mut rx);
        let tail: Vec<_> = events.iter().rev().take(3).rev().cloned().collect();
        assert_matches!(
            tail.as_slice(),
            [
                ProvisioningEvent::ItemStarted { item_id: started },
                ProvisioningEvent::ServiceError(error),
                ProvisioningEvent::ItemEnded { item_id: ended },
            ] if started == "edge" && ended == "edge" && error.status == 409
        );
    }

    #[tokio::test(start_paused = true)]
    async fn emits_events_in_order() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(executor, settings());
        let mut rx = orchestrator.subscribe();
        let mut solution = Solution {
            config_items: vec![item(
                "rg",
                StepKind::ResourceGroup,
                ResourceApiType::ResourceManagement,
                json!({}),
            )],
            ..edge_solution()
        };

        orchestrator.provision(&mut solution).await;

        assert_matches!(
            drain(&mut rx).as_slice(),
            [
                ProvisioningEvent::ItemStarted { .. },
                ProvisioningEvent::ItemResultSaved { .. },
                ProvisioningEvent::ItemEnded { .. },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn management_steps_wait_for_their_operation() {
        let mut headers = BTreeMap::new();
        headers.insert(
            "azure-asyncoperation".to_string(),
            "https://management.azure.com/operations/op-1".to_string(),
        );
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on(
                    "/resourcegroups/rgx7",
                    vec![ServiceResponse::new(201, "Created")
                        .with_headers(headers)
                        .with_payload(json!({ "name": "rgx7" }))],
                )
                .on(
                    "operations/op-1",
                    vec![
                        ServiceResponse::new(202, "Accepted").with_payload(json!({ "status": "Running" })),
                        ServiceResponse::new(202, "Accepted").with_payload(json!({ "status": "Running" })),
                        ServiceResponse::ok(Some(json!({ "status": "Succeeded" }))),
                    ],
                ),
        );
        let orchestrator = orchestrator(executor.clone(), settings());
        let mut rx = orchestrator.subscribe();
        let mut solution = Solution {
            config_items: vec![item(
                "rg",
                StepKind::ResourceGroup,
                ResourceApiType::ResourceManagement,
                json!({}),
            )],
            ..edge_solution()
        };

        let outcome = orchestrator.provision(&mut solution).await;

        assert!(outcome.succeeded());
        assert_eq!(executor.calls_to("operations/op-1"), 3);
        let progress = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, ProvisioningEvent::Progress(_)))
            .count();
        assert_eq!(progress, 2);
        // the initiating response is what gets saved
        assert_eq!(
            solution.config_items[0].provision_response,
            Some(json!({ "name": "rgx7" }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_operations_only_warn() {
        let mut headers = BTreeMap::new();
        headers.insert("location".to_string(), "https://management.azure.com/operations/op-2".to_string());
        let executor = Arc::new(
            ScriptedExecutor::new()
                .on(
                    "/resourcegroups/rgx7",
                    vec![ServiceResponse::new(202, "Accepted").with_headers(headers)],
                )
                .on(
                    "operations/op-2",
                    vec![ServiceResponse::ok(Some(json!({ "status": "Failed" })))],
                ),
        );
        let orchestrator = orchestrator(executor, settings());
        let mut solution = Solution {
            config_items: vec![
                item("rg", StepKind::ResourceGroup, ResourceApiType::ResourceManagement, json!({})),
                item(
                    "app",
                    StepKind::CreateApp,
                    ResourceApiType::ResourceManagement,
                    json!({}),
                ),
            ],
            ..edge_solution()
        };

        let outcome = orchestrator.provision(&mut solution).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.completed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_item_types_abort_with_400() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(executor.clone(), settings());
        let mut rx = orchestrator.subscribe();
        let mut mystery = item("mystery", StepKind::ResourceGroup, ResourceApiType::ApplicationApi, json!({}));
        mystery.item_type = ItemType::Unrecognized("Teleporter".to_string());
        let mut solution = Solution {
            config_items: vec![
                mystery,
                item("rg", StepKind::ResourceGroup, ResourceApiType::ResourceManagement, json!({})),
            ],
            ..edge_solution()
        };

        let outcome = orchestrator.provision(&mut solution).await;

        assert_matches!(outcome.failure, Some(ServiceError { status: 400, ref title, .. }) if title == "Teleporter");
        assert_eq!(outcome.completed, 0);
        assert!(executor.calls().is_empty());
        let started = drain(&mut rx)
            .into_iter()
            .filter(|event| matches!(event, ProvisioningEvent::ItemStarted { .. }))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_dependencies_fail_the_step() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(executor, settings());
        let mut solution = Solution {
            config_items: vec![item(
                "app",
                StepKind::CreateApp,
                ResourceApiType::ResourceManagement,
                json!({}),
            )],
            ..edge_solution()
        };

        let outcome = orchestrator.provision(&mut solution).await;

        let failure = outcome.failure.unwrap();
        assert_eq!(failure.status, 500);
        assert!(failure
            .message
            .starts_with("Error during provisioning step - app step:"));
    }

    #[tokio::test(start_paused = true)]
    async fn reruns_start_from_an_empty_cache() {
        let executor = Arc::new(ScriptedExecutor::new().on("/credentials", vec![credentials()]));
        let orchestrator = orchestrator(executor, settings());
        let mut solution = edge_solution();
        assert!(orchestrator.provision(&mut solution).await.succeeded());
        assert_eq!(solution.provisioned_count(), 5);

        // same document, but the first step now fails
        let failing = Arc::new(ScriptedExecutor::new().on(
            "/resourcegroups/",
            vec![ServiceResponse::new(403, "Forbidden")],
        ));
        let rerun = self::orchestrator(failing, settings());
        let outcome = rerun.provision(&mut solution).await;

        assert!(outcome.cache.is_empty());
        assert_eq!(outcome.completed, 0);
        assert_eq!(outcome.failure.map(|f| f.status), Some(403));
    }

    /// Records the persisted state seen by each call
    struct StateProbe {
        settings: Arc<MemorySettingsStore>,
        seen: Mutex<Vec<ProvisioningState>>,
    }

    #[async_trait]
    impl HttpExecutor for StateProbe {
        async fn execute(&self, _request: HttpRequest) -> ServiceResponse {
            self.seen.lock().push(self.settings.provisioning_state());
            ServiceResponse::new(500, "boom")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn state_is_active_only_during_the_run() {
        let settings = settings();
        let probe = Arc::new(StateProbe {
            settings: settings.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let orchestrator = orchestrator(probe.clone(), settings.clone());
        let mut solution = edge_solution();

        let outcome = orchestrator.provision(&mut solution).await;

        assert!(!outcome.succeeded());
        assert_eq!(*probe.seen.lock(), vec![ProvisioningState::Active]);
        assert_eq!(settings.provisioning_state(), ProvisioningState::Inactive);
    }

    #[tokio::test(start_paused = true)]
    async fn pauses_after_a_step_when_asked() {
        let executor = Arc::new(ScriptedExecutor::new());
        let orchestrator = orchestrator(executor, settings());
        let mut rg = item("rg", StepKind::ResourceGroup, ResourceApiType::ResourceManagement, json!({}));
        rg.pause_step = Some(30);
        let mut solution = Solution {
            config_items: vec![rg],
            ..edge_solution()
        };

        let started = tokio::time::Instant::now();
        orchestrator.provision(&mut solution).await;

        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
