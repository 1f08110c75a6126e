// components/solution_model/src/solution.rs
use crate::item::{ItemType, ResourceApiType, StepKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity GUID every solution file must carry in `fileType`
pub const SOLUTION_FILE_TYPE: &str = "7c59ae46-6955-49cd-a81c-45d79cad908e";

/// An ordered provisioning plan
///
/// The order of `config_items` is the deployment order. Later items read
/// results captured from earlier ones, so the sequence is never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub file_type: String,
    pub name: String,
    pub id: String,
    pub resource_suffix_name: String,
    pub config_items: Vec<ConfigurationItem>,
}

impl Solution {
    /// The placeholder shown before anything has been opened
    pub fn empty() -> Self {
        Self {
            file_type: SOLUTION_FILE_TYPE.to_string(),
            name: String::new(),
            id: String::new(),
            resource_suffix_name: String::new(),
            config_items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.config_items.is_empty()
    }

    /// Resource name with this solution's suffix appended
    pub fn suffixed(&self, name: &str) -> String {
        format!("{}{}", name, self.resource_suffix_name)
    }

    pub fn item(&self, id: &str) -> Option<&ConfigurationItem> {
        self.config_items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: &str) -> Option<&mut ConfigurationItem> {
        self.config_items.iter_mut().find(|item| item.id == id)
    }

    /// Attach a captured response to the item with the given id
    ///
    /// Returns false when no such item exists.
    pub fn record_provision_response(&mut self, id: &str, response: Value) -> bool {
        match self.item_mut(id) {
            Some(item) => {
                item.provision_response = Some(response);
                true
            }
            None => false,
        }
    }

    /// Number of items that already carry a provision response
    pub fn provisioned_count(&self) -> usize {
        self.config_items
            .iter()
            .filter(|item| item.is_provisioned())
            .count()
    }
}

impl Default for Solution {
    fn default() -> Self {
        Self::empty()
    }
}

/// One step of a solution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub item_type: ItemType,
    pub resource_api_type: ResourceApiType,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub payload: Value,
    /// Seconds to wait after this step succeeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_step: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provision_response: Option<Value>,
}

impl ConfigurationItem {
    pub fn kind(&self) -> Option<StepKind> {
        self.item_type.kind()
    }

    pub fn is_provisioned(&self) -> bool {
        self.provision_response.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "fileType": SOLUTION_FILE_TYPE,
            "name": "Edge sandbox",
            "id": "sb-001",
            "resourceSuffixName": "x7k2",
            "configItems": [
                {
                    "id": "rg",
                    "name": "Resource group",
                    "description": "Holds everything",
                    "itemType": "ResourceGroup",
                    "resourceApiType": "AzureResourceDeployment",
                    "resourceName": "sandbox-rg",
                    "pauseStep": 2,
                    "payload": { "location": "westus2" }
                }
            ]
        })
    }

    #[test]
    fn reads_camel_case_documents() {
        let solution: Solution = serde_json::from_value(sample()).unwrap();
        assert_eq!(solution.resource_suffix_name, "x7k2");

        let item = &solution.config_items[0];
        assert_eq!(item.kind(), Some(StepKind::ResourceGroup));
        assert_eq!(item.resource_api_type, ResourceApiType::ResourceManagement);
        assert_eq!(item.pause_step, Some(2));
        assert!(!item.is_provisioned());
    }

    #[test]
    fn suffixes_resource_names() {
        let solution: Solution = serde_json::from_value(sample()).unwrap();
        assert_eq!(solution.suffixed("sandbox-rg"), "sandbox-rgx7k2");
    }

    #[test]
    fn records_responses_by_item_id() {
        let mut solution: Solution = serde_json::from_value(sample()).unwrap();

        assert!(solution.record_provision_response("rg", json!({ "name": "sandbox-rgx7k2" })));
        assert!(!solution.record_provision_response("missing", json!({})));
        assert_eq!(solution.provisioned_count(), 1);

        let written = serde_json::to_value(&solution).unwrap();
        assert_eq!(
            written["configItems"][0]["provisionResponse"]["name"],
            "sandbox-rgx7k2"
        );
    }

    #[test]
    fn empty_solution_carries_the_file_type() {
        let solution = Solution::default();
        assert_eq!(solution.file_type, SOLUTION_FILE_TYPE);
        assert!(solution.is_empty());
    }
}
