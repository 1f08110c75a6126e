// components/deployment/src/resolver.rs
//! Turns one configuration item into the request that performs it
//!
//! Every step kind has its own handler. Handlers read the item, the solution
//! identity and the results captured so far, and build a fresh request body;
//! the item's payload is treated as a read-only template. No I/O happens here.

use crate::cache::{DeviceCredentials, StepOutput, StepResultCache};
use crate::error::{ResolveError, Result};
use cloud_client::{ApiRequest, ApiScope, HttpMethod};
use serde_json::{json, Map, Value};
use solution_model::{ConfigurationItem, ResourceApiType, ServiceResponse, Solution, StepKind};

const MANAGEMENT_HOST: &str = "https://management.azure.com";
const RESOURCE_GROUP_API_VERSION: &str = "2021-04-01";
const IOT_CENTRAL_ARM_API_VERSION: &str = "2021-06-01";
const KUSTO_ARM_API_VERSION: &str = "2022-02-01";
const DEPLOYMENTS_API_VERSION: &str = "2021-04-01";
const APPLICATION_API_VERSION: &str = "2022-07-31";
const DATA_EXPORT_API_VERSION: &str = "2022-06-30-preview";

/// Tag added to every management-plane resource naming its solution
pub const SOLUTION_TAG: &str = "solutionId";

pub const DEFAULT_SUCCESS_MARKER: &str = "Succeeded";

/// Status returned for items whose type this build does not know
pub const UNKNOWN_STEP_STATUS: u16 = 400;

/// Everything outside the item a handler may read
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    pub solution: &'a Solution,
    pub subscription_id: Option<&'a str>,
    pub cache: &'a StepResultCache,
}

impl ResolveContext<'_> {
    fn subscription(&self) -> Result<&str> {
        self.subscription_id
            .filter(|id| !id.is_empty())
            .ok_or(ResolveError::MissingSubscription)
    }
}

/// A request plus what it is expected to produce
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub kind: StepKind,
    pub request: ApiRequest,
    /// Output recorded on success; [`capture`] refines it from the response
    pub planned: StepOutput,
}

/// Command repeated until the edge runtime reports it started
#[derive(Debug, Clone, PartialEq)]
pub struct StartupProbe {
    pub request: ApiRequest,
    pub success_marker: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    Dispatch(ResolvedStep),
    AwaitEdgeRuntime(StartupProbe),
    /// Nothing to send; the response is the step's failed result
    Reject(ServiceResponse),
}

pub fn resolve(item: &ConfigurationItem, ctx: &ResolveContext<'_>) -> Result<StepAction> {
    let Some(kind) = item.kind() else {
        return Ok(StepAction::Reject(ServiceResponse::new(
            UNKNOWN_STEP_STATUS,
            format!(
                "Unknown configuration item type '{}' for item '{}'",
                item.item_type, item.name
            ),
        )));
    };

    let step = StepInput { kind, item, ctx };
    match kind {
        StepKind::ResourceGroup => resource_group(&step),
        StepKind::CreateApp => create_app(&step),
        StepKind::ImportCapabilityModel => import_capability_model(&step),
        StepKind::RegisterEdgeDevice | StepKind::RegisterIiotDevice => register_device(&step),
        StepKind::GetDeviceAttestation => device_attestation(&step, StepKind::RegisterEdgeDevice),
        StepKind::GetIiotAttestation => device_attestation(&step, StepKind::RegisterIiotDevice),
        StepKind::VirtualMachine => virtual_machine(&step),
        StepKind::EdgeRuntimeStartup => edge_runtime_startup(&step),
        StepKind::ProvisionIiotDevice => provision_iiot_device(&step),
        StepKind::CreateAnalyticsCluster => analytics_cluster(&step),
        StepKind::CreateAnalyticsDatabase => analytics_database(&step),
        StepKind::ConfigureExportDestination => export_destination(&step),
        StepKind::ConfigureExport => export(&step),
        StepKind::ConfigureDataImport => data_import(&step),
    }
}

/// Output to cache once a step's response arrived
///
/// `saved` is the value attached to the item as its provision response.
pub fn capture(kind: StepKind, planned: StepOutput, saved: &Value) -> Result<StepOutput> {
    match (kind, planned) {
        (
            StepKind::GetDeviceAttestation | StepKind::GetIiotAttestation,
            StepOutput::Device { device_id },
        ) => {
            let scope_id = response_str(kind, saved, &["idScope"], "idScope")?;
            let primary_key = response_str(
                kind,
                saved,
                &["symmetricKey", "primaryKey"],
                "symmetricKey.primaryKey",
            )?;
            Ok(StepOutput::Attestation(DeviceCredentials {
                scope_id,
                device_id,
                primary_key,
            }))
        }
        (StepKind::CreateAnalyticsCluster, StepOutput::Cluster { name, uri }) => {
            let uri = lookup(saved, &["properties", "uri"])
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(uri);
            Ok(StepOutput::Cluster { name, uri })
        }
        (_, planned) => Ok(planned),
    }
}

struct StepInput<'a> {
    kind: StepKind,
    item: &'a ConfigurationItem,
    ctx: &'a ResolveContext<'a>,
}

impl StepInput<'_> {
    fn cache(&self) -> &StepResultCache {
        self.ctx.cache
    }

    fn suffixed_name(&self) -> String {
        self.ctx.solution.suffixed(&self.item.resource_name)
    }

    fn payload_str(&self, field: &'static str) -> Result<String> {
        self.item
            .payload
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(ResolveError::MissingField {
                step: self.kind,
                field,
            })
    }

    /// Scope the item's API family needs
    fn scope(&self) -> Result<ApiScope> {
        Ok(match self.item.resource_api_type {
            ResourceApiType::ResourceManagement => ApiScope::management(),
            ResourceApiType::ApplicationApi => ApiScope::application(),
            ResourceApiType::AnalyticsApi => ApiScope::analytics(self.cache().cluster(self.kind)?.1),
        })
    }

    /// Payload copy with the owning solution added to its tags
    fn tagged_body(&self) -> Map<String, Value> {
        let mut body = payload_object(&self.item.payload);
        let mut tags = body
            .get("tags")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        tags.insert(
            SOLUTION_TAG.to_string(),
            Value::String(self.ctx.solution.id.clone()),
        );
        body.insert("tags".to_string(), Value::Object(tags));
        body
    }

    fn dispatch(
        &self,
        method: HttpMethod,
        url: String,
        body: Option<Value>,
        planned: StepOutput,
    ) -> Result<StepAction> {
        let mut request = ApiRequest::new(method, url, self.scope()?);
        request.body = body;
        Ok(StepAction::Dispatch(ResolvedStep {
            kind: self.kind,
            request,
            planned,
        }))
    }
}

fn resource_group_url(subscription: &str, group: &str) -> String {
    format!("{MANAGEMENT_HOST}/subscriptions/{subscription}/resourceGroups/{group}")
}

fn application_url(subdomain: &str, path: &str, api_version: &str) -> String {
    format!("https://{subdomain}.azureiotcentral.com/api/{path}?api-version={api_version}")
}

fn resource_group(step: &StepInput<'_>) -> Result<StepAction> {
    let subscription = step.ctx.subscription()?;
    let name = step.suffixed_name();
    let url = format!(
        "{MANAGEMENT_HOST}/subscriptions/{subscription}/resourcegroups/{name}?api-version={RESOURCE_GROUP_API_VERSION}"
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(step.tagged_body())),
        StepOutput::ResourceGroup { name },
    )
}

fn create_app(step: &StepInput<'_>) -> Result<StepAction> {
    let subscription = step.ctx.subscription()?;
    let group = step.cache().resource_group(step.kind)?;
    let name = step.suffixed_name();

    let mut body = step.tagged_body();
    let mut subdomain = name.clone();
    if let Some(properties) = body.get_mut("properties").and_then(Value::as_object_mut) {
        for field in ["displayName", "subdomain"] {
            if let Some(value) = properties.get(field).and_then(Value::as_str) {
                let value = step.ctx.solution.suffixed(value);
                if field == "subdomain" {
                    subdomain = value.clone();
                }
                properties.insert(field.to_string(), Value::String(value));
            }
        }
    }

    let url = format!(
        "{}/providers/Microsoft.IoTCentral/iotApps/{name}?api-version={IOT_CENTRAL_ARM_API_VERSION}",
        resource_group_url(subscription, group)
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(body)),
        StepOutput::Application { subdomain },
    )
}

fn import_capability_model(step: &StepInput<'_>) -> Result<StepAction> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let template_id = step.payload_str("@id")?;
    let url = application_url(
        subdomain,
        &format!("deviceTemplates/{template_id}"),
        APPLICATION_API_VERSION,
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(step.item.payload.clone()),
        StepOutput::DeviceTemplate { template_id },
    )
}

fn register_device(step: &StepInput<'_>) -> Result<StepAction> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let device_id = step.payload_str("id")?;
    let url = application_url(
        subdomain,
        &format!("devices/{device_id}"),
        APPLICATION_API_VERSION,
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(step.item.payload.clone()),
        StepOutput::Device { device_id },
    )
}

fn device_attestation(step: &StepInput<'_>, registered_by: StepKind) -> Result<StepAction> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let device_id = step.cache().device_id(step.kind, registered_by)?.to_string();
    let url = application_url(
        subdomain,
        &format!("devices/{device_id}/credentials"),
        APPLICATION_API_VERSION,
    );
    step.dispatch(HttpMethod::Get, url, None, StepOutput::Device { device_id })
}

fn virtual_machine(step: &StepInput<'_>) -> Result<StepAction> {
    let subscription = step.ctx.subscription()?;
    let group = step.cache().resource_group(step.kind)?;
    let credentials = step
        .cache()
        .credentials(step.kind, StepKind::GetDeviceAttestation)?;
    let name = step.suffixed_name();

    let mut body = step.tagged_body();
    let mut properties = take_object(&mut body, "properties");
    let mut parameters = take_object(&mut properties, "parameters");
    parameters.insert("scopeId".to_string(), json!({ "value": credentials.scope_id }));
    parameters.insert("deviceId".to_string(), json!({ "value": credentials.device_id }));
    parameters.insert("deviceKey".to_string(), json!({ "value": credentials.primary_key }));
    properties.insert("parameters".to_string(), Value::Object(parameters));
    body.insert("properties".to_string(), Value::Object(properties));

    let url = format!(
        "{}/providers/Microsoft.Resources/deployments/{name}?api-version={DEPLOYMENTS_API_VERSION}",
        resource_group_url(subscription, group)
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(body)),
        StepOutput::Deployment { name },
    )
}

fn command_url(step: &StepInput<'_>) -> Result<String> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let edge_device = step
        .cache()
        .device_id(step.kind, StepKind::RegisterEdgeDevice)?;
    let module = step.payload_str("moduleName")?;
    let command = step.payload_str("commandName")?;
    Ok(application_url(
        subdomain,
        &format!("devices/{edge_device}/modules/{module}/commands/{command}"),
        APPLICATION_API_VERSION,
    ))
}

fn edge_runtime_startup(step: &StepInput<'_>) -> Result<StepAction> {
    let url = command_url(step)?;
    let request_body = step.item.payload.get("request").cloned().unwrap_or_else(|| json!({}));
    let success_marker = step
        .item
        .payload
        .get("successMarker")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_SUCCESS_MARKER)
        .to_string();

    let request = ApiRequest::new(HttpMethod::Post, url, step.scope()?)
        .with_body(json!({ "request": request_body }));
    Ok(StepAction::AwaitEdgeRuntime(StartupProbe {
        request,
        success_marker,
    }))
}

fn provision_iiot_device(step: &StepInput<'_>) -> Result<StepAction> {
    let url = command_url(step)?;
    let credentials = step
        .cache()
        .credentials(step.kind, StepKind::GetIiotAttestation)?;

    let mut request = step
        .item
        .payload
        .get("request")
        .map(payload_object)
        .unwrap_or_default();
    request.insert("scopeId".to_string(), json!(credentials.scope_id));
    request.insert("deviceId".to_string(), json!(credentials.device_id));
    request.insert("deviceKey".to_string(), json!(credentials.primary_key));

    step.dispatch(
        HttpMethod::Post,
        url,
        Some(json!({ "request": request })),
        StepOutput::Completed,
    )
}

fn analytics_cluster(step: &StepInput<'_>) -> Result<StepAction> {
    let subscription = step.ctx.subscription()?;
    let group = step.cache().resource_group(step.kind)?;
    let location = step.payload_str("location")?;
    let name = step.suffixed_name();
    let uri = format!("https://{name}.{location}.kusto.windows.net");

    let url = format!(
        "{}/providers/Microsoft.Kusto/clusters/{name}?api-version={KUSTO_ARM_API_VERSION}",
        resource_group_url(subscription, group)
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(step.tagged_body())),
        StepOutput::Cluster { name, uri },
    )
}

fn analytics_database(step: &StepInput<'_>) -> Result<StepAction> {
    let subscription = step.ctx.subscription()?;
    let group = step.cache().resource_group(step.kind)?;
    let (cluster, _) = step.cache().cluster(step.kind)?;
    let name = step.suffixed_name();

    let url = format!(
        "{}/providers/Microsoft.Kusto/clusters/{cluster}/databases/{name}?api-version={KUSTO_ARM_API_VERSION}",
        resource_group_url(subscription, group)
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(step.item.payload.clone()),
        StepOutput::Database { name },
    )
}

fn export_destination(step: &StepInput<'_>) -> Result<StepAction> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let (_, cluster_uri) = step.cache().cluster(step.kind)?;
    let destination_id = step.payload_str("id")?;

    let mut body = payload_object(&step.item.payload);
    body.remove("id");
    body.insert("clusterUrl".to_string(), json!(cluster_uri));
    if let Some(database) = step.cache().database() {
        body.entry("database").or_insert_with(|| json!(database));
    }

    let url = application_url(
        subdomain,
        &format!("dataExport/destinations/{destination_id}"),
        DATA_EXPORT_API_VERSION,
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(body)),
        StepOutput::ExportDestination { destination_id },
    )
}

fn export(step: &StepInput<'_>) -> Result<StepAction> {
    let subdomain = step.cache().subdomain(step.kind)?;
    let destination_id = step.cache().destination_id(step.kind)?;
    let export_id = step.payload_str("id")?;

    let mut body = payload_object(&step.item.payload);
    body.remove("id");
    body.insert(
        "destinations".to_string(),
        json!([{ "id": destination_id }]),
    );

    let url = application_url(
        subdomain,
        &format!("dataExport/exports/{export_id}"),
        DATA_EXPORT_API_VERSION,
    );
    step.dispatch(
        HttpMethod::Put,
        url,
        Some(Value::Object(body)),
        StepOutput::Completed,
    )
}

fn data_import(step: &StepInput<'_>) -> Result<StepAction> {
    let (_, cluster_uri) = step.cache().cluster(step.kind)?;
    let database = match step.payload_str("db") {
        Ok(database) => database,
        Err(missing) => step
            .cache()
            .database()
            .map(str::to_string)
            .ok_or(missing)?,
    };
    let csl = step.payload_str("csl")?;

    let url = format!("{}/v1/rest/mgmt", cluster_uri.trim_end_matches('/'));
    step.dispatch(
        HttpMethod::Post,
        url,
        Some(json!({ "db": database, "csl": csl })),
        StepOutput::Completed,
    )
}

/// Copy of a JSON object, or an empty one for anything else
fn payload_object(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

/// Removes `key` from `map`, yielding it when it held an object
fn take_object(map: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match map.remove(key) {
        Some(Value::Object(object)) => object,
        _ => Map::new(),
    }
}

fn lookup<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn response_str(
    kind: StepKind,
    saved: &Value,
    path: &[&str],
    field: &'static str,
) -> Result<String> {
    lookup(saved, path)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(ResolveError::UnreadableResponse { step: kind, field })
}
