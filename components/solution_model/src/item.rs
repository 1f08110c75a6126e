// components/solution_model/src/item.rs
//! Step kinds and API families for configuration items
//!
//! `StepKind` is the closed set of steps the deployer knows how to perform.
//! `ItemType` wraps it with an `Unrecognized` fallback because solution files
//! come from disk and may carry tags this build has never heard of.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of deployment steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    ResourceGroup,
    CreateApp,
    ImportCapabilityModel,
    RegisterEdgeDevice,
    GetDeviceAttestation,
    VirtualMachine,
    RegisterIiotDevice,
    GetIiotAttestation,
    EdgeRuntimeStartup,
    ProvisionIiotDevice,
    CreateAnalyticsCluster,
    CreateAnalyticsDatabase,
    ConfigureExportDestination,
    ConfigureExport,
    ConfigureDataImport,
}

impl StepKind {
    pub const ALL: [StepKind; 15] = [
        StepKind::ResourceGroup,
        StepKind::CreateApp,
        StepKind::ImportCapabilityModel,
        StepKind::RegisterEdgeDevice,
        StepKind::GetDeviceAttestation,
        StepKind::VirtualMachine,
        StepKind::RegisterIiotDevice,
        StepKind::GetIiotAttestation,
        StepKind::EdgeRuntimeStartup,
        StepKind::ProvisionIiotDevice,
        StepKind::CreateAnalyticsCluster,
        StepKind::CreateAnalyticsDatabase,
        StepKind::ConfigureExportDestination,
        StepKind::ConfigureExport,
        StepKind::ConfigureDataImport,
    ];

    /// Canonical tag written to solution files
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::ResourceGroup => "resource-group",
            StepKind::CreateApp => "create-app",
            StepKind::ImportCapabilityModel => "import-capability-model",
            StepKind::RegisterEdgeDevice => "register-edge-device",
            StepKind::GetDeviceAttestation => "get-device-attestation",
            StepKind::VirtualMachine => "virtual-machine",
            StepKind::RegisterIiotDevice => "register-iiot-device",
            StepKind::GetIiotAttestation => "get-iiot-attestation",
            StepKind::EdgeRuntimeStartup => "edge-runtime-startup",
            StepKind::ProvisionIiotDevice => "provision-iiot-device",
            StepKind::CreateAnalyticsCluster => "create-analytics-cluster",
            StepKind::CreateAnalyticsDatabase => "create-analytics-database",
            StepKind::ConfigureExportDestination => "configure-export-destination",
            StepKind::ConfigureExport => "configure-export",
            StepKind::ConfigureDataImport => "configure-data-import",
        }
    }

    /// Parse a tag, accepting the PascalCase names older solution files use
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "resource-group" | "ResourceGroup" => StepKind::ResourceGroup,
            "create-app" | "IotcCreateApp" | "IoTCentralApp" => StepKind::CreateApp,
            "import-capability-model" | "IotcImportEdgeCapabilityModel" => {
                StepKind::ImportCapabilityModel
            }
            "register-edge-device" | "IotcRegisterEdgeDevice" => StepKind::RegisterEdgeDevice,
            "get-device-attestation" | "IotcGetEdgeDeviceAttestation" => {
                StepKind::GetDeviceAttestation
            }
            "virtual-machine" | "VirtualMachine" => StepKind::VirtualMachine,
            "register-iiot-device" | "IotcRegisterIiotDevice" => StepKind::RegisterIiotDevice,
            "get-iiot-attestation" | "IotcGetIiotDeviceAttestation" => StepKind::GetIiotAttestation,
            "edge-runtime-startup" | "IotEdgeRuntimeStartup" => StepKind::EdgeRuntimeStartup,
            "provision-iiot-device" | "IotcProvisionIiotDevice" => StepKind::ProvisionIiotDevice,
            "create-analytics-cluster" | "AdxCreateCluster" | "AzureDataExplorerCluster" => {
                StepKind::CreateAnalyticsCluster
            }
            "create-analytics-database" | "AdxCreateDatabase" => StepKind::CreateAnalyticsDatabase,
            "configure-export-destination" | "IotcConfigureCdeDestination" => {
                StepKind::ConfigureExportDestination
            }
            "configure-export" | "IotcConfigureCdeExport" => StepKind::ConfigureExport,
            "configure-data-import" | "AdxConfigureDataImport" => StepKind::ConfigureDataImport,
            _ => return None,
        };
        Some(kind)
    }

    /// Steps whose captured results this step reads while building its request
    pub fn prerequisites(&self) -> &'static [StepKind] {
        use StepKind::*;
        match self {
            ResourceGroup => &[],
            CreateApp => &[ResourceGroup],
            ImportCapabilityModel => &[CreateApp],
            RegisterEdgeDevice => &[CreateApp],
            GetDeviceAttestation => &[CreateApp, RegisterEdgeDevice],
            VirtualMachine => &[ResourceGroup, GetDeviceAttestation],
            RegisterIiotDevice => &[CreateApp],
            GetIiotAttestation => &[CreateApp, RegisterIiotDevice],
            EdgeRuntimeStartup => &[CreateApp, RegisterEdgeDevice],
            ProvisionIiotDevice => &[CreateApp, RegisterEdgeDevice, GetIiotAttestation],
            CreateAnalyticsCluster => &[ResourceGroup],
            CreateAnalyticsDatabase => &[ResourceGroup, CreateAnalyticsCluster],
            ConfigureExportDestination => &[CreateApp, CreateAnalyticsCluster],
            ConfigureExport => &[CreateApp, ConfigureExportDestination],
            ConfigureDataImport => &[CreateAnalyticsCluster],
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Item type as read from a solution file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    Known(StepKind),
    Unrecognized(String),
}

impl ItemType {
    pub fn kind(&self) -> Option<StepKind> {
        match self {
            ItemType::Known(kind) => Some(*kind),
            ItemType::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Known(kind) => kind.as_str(),
            ItemType::Unrecognized(tag) => tag,
        }
    }
}

impl From<String> for ItemType {
    fn from(tag: String) -> Self {
        match StepKind::from_tag(&tag) {
            Some(kind) => ItemType::Known(kind),
            None => ItemType::Unrecognized(tag),
        }
    }
}

impl From<ItemType> for String {
    fn from(item_type: ItemType) -> Self {
        match item_type {
            ItemType::Known(kind) => kind.as_str().to_string(),
            ItemType::Unrecognized(tag) => tag,
        }
    }
}

impl From<StepKind> for ItemType {
    fn from(kind: StepKind) -> Self {
        ItemType::Known(kind)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Vendor API family a step talks to
///
/// Decides which token scope is requested and whether the response is
/// tracked as a long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceApiType {
    #[serde(
        rename = "resource-management",
        alias = "AzureResourceDeployment",
        alias = "AzureDeployment"
    )]
    ResourceManagement,
    #[serde(rename = "application-api", alias = "IoTCentralApi")]
    ApplicationApi,
    #[serde(rename = "analytics-api", alias = "AzureDataExplorerApi")]
    AnalyticsApi,
}

impl ResourceApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceApiType::ResourceManagement => "resource-management",
            ResourceApiType::ApplicationApi => "application-api",
            ResourceApiType::AnalyticsApi => "analytics-api",
        }
    }

    /// Only management-plane deployments report progress through an
    /// async-operation status URL
    pub fn tracks_long_running_operations(&self) -> bool {
        matches!(self, ResourceApiType::ResourceManagement)
    }
}

impl fmt::Display for ResourceApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
