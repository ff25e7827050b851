//! Kubernetes Events on Services.
//!
//! Publishing is fire-and-forget: a failed event is logged and never fails
//! the reconciliation that emitted it.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::Client;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
#[cfg(test)]
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Reporting component on published events
pub const CONTROLLER_NAME: &str = "service-lb-controller";

/// Event reasons
pub mod reasons {
    /// A pass failed; the note carries the error
    pub const SYNC_FAILED: &str = "SyncLoadBalancerFailed";
    /// A pass converged the load balancer
    pub const ENSURED: &str = "EnsuredLoadBalancer";
    /// The load balancer was deleted or released
    pub const DELETED: &str = "DeletedLoadBalancer";
}

/// Event actions
pub mod actions {
    pub const ENSURE: &str = "Ensure";
    pub const DELETE: &str = "Delete";
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, resource_ref: &ObjectReference, type_: EventType, reason: &str, action: &str, note: Option<String>);
}

/// Publishes through `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl KubeEventPublisher {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(&self, resource_ref: &ObjectReference, type_: EventType, reason: &str, action: &str, note: Option<String>) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// Discards every event
#[cfg(test)]
#[derive(Debug, Default)]
pub struct NoopEventPublisher;

#[cfg(test)]
#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(&self, _: &ObjectReference, _: EventType, _: &str, _: &str, _: Option<String>) {}
}

/// Keeps `(reason, note)` of every event
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

#[cfg(test)]
impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<(String, Option<String>)> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(&self, _: &ObjectReference, _: EventType, reason: &str, _: &str, note: Option<String>) {
        if let Ok(mut events) = self.events.lock() {
            events.push((reason.to_string(), note));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_publisher_keeps_reasons() {
        let publisher = RecordingEventPublisher::default();
        publisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::SYNC_FAILED,
                actions::ENSURE,
                Some("Conflict: port 80".to_string()),
            )
            .await;
        NoopEventPublisher
            .publish(&ObjectReference::default(), EventType::Normal, reasons::ENSURED, actions::ENSURE, None)
            .await;

        assert_eq!(
            publisher.events(),
            vec![(reasons::SYNC_FAILED.to_string(), Some("Conflict: port 80".to_string()))]
        );
    }
}
