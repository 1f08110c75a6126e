// components/deployment/src/events.rs
//! Event stream consumed by whatever presents a run
//!
//! One writer (the orchestrator) and any number of subscribers. Events are
//! dropped silently when nobody is listening.

use serde::Serialize;
use serde_json::Value;
use solution_model::ServiceError;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ProvisioningEvent {
    #[serde(rename_all = "camelCase")]
    ItemStarted { item_id: String },
    #[serde(rename_all = "camelCase")]
    ItemResultSaved { item_id: String, response: Value },
    #[serde(rename_all = "camelCase")]
    ItemEnded { item_id: String },
    Progress(Progress),
    ServiceError(ServiceError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub label: String,
    pub value: f64,
    pub total: f64,
}

#[derive(Debug, Clone)]
pub struct EventSink {
    sender: broadcast::Sender<ProvisioningEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProvisioningEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ProvisioningEvent) {
        // Err only means there are no subscribers
        let _ = self.sender.send(event);
    }

    pub fn progress(&self, label: impl Into<String>, value: f64, total: f64) {
        self.emit(ProvisioningEvent::Progress(Progress {
            label: label.into(),
            value,
            total,
        }));
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn events_serialize_with_a_type_tag() {
        let event = ProvisioningEvent::ItemResultSaved {
            item_id: "rg".to_string(),
            response: json!({ "name": "rg-x" }),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "type": "itemResultSaved", "data": { "itemId": "rg", "response": { "name": "rg-x" } } })
        );
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let sink = EventSink::new();
        let mut rx = sink.subscribe();

        sink.emit(ProvisioningEvent::ItemStarted {
            item_id: "a".to_string(),
        });
        sink.progress("Provisioning...", 50.0, 100.0);

        assert_eq!(
            rx.recv().await.unwrap(),
            ProvisioningEvent::ItemStarted {
                item_id: "a".to_string()
            }
        );
        assert!(matches!(rx.recv().await.unwrap(), ProvisioningEvent::Progress(p) if p.value == 50.0));
    }

    #[test]
    fn emitting_without_subscribers_is_fine() {
        EventSink::new().progress("nobody listens", 1.0, 100.0);
    }
}
