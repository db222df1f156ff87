// service/events.rs
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::workflowmodel::Milestone;

/// Facts other subsystems (push notifications, live-update hubs) react to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum MarketEvent {
    RequestAssigned {
        request_id: Uuid,
        provider_id: Uuid,
    },
    QuoteReceived {
        request_id: Uuid,
        provider_id: Uuid,
    },
    AgreementFinalized {
        request_id: Uuid,
        provider_id: Uuid,
        quote_id: Uuid,
    },
    WorkflowMilestoneReached {
        request_id: Uuid,
        provider_id: Uuid,
        milestone: Milestone,
    },
    RequestCompleted {
        request_id: Uuid,
    },
    RequestCancelled {
        request_id: Uuid,
    },
    QuoteExpired {
        request_id: Uuid,
        provider_id: Uuid,
        quote_id: Uuid,
    },
}

impl MarketEvent {
    pub fn name(&self) -> &str {
        match self {
            MarketEvent::RequestAssigned { .. } => "RequestAssigned",
            MarketEvent::QuoteReceived { .. } => "QuoteReceived",
            MarketEvent::AgreementFinalized { .. } => "AgreementFinalized",
            MarketEvent::WorkflowMilestoneReached { .. } => "WorkflowMilestoneReached",
            MarketEvent::RequestCompleted { .. } => "RequestCompleted",
            MarketEvent::RequestCancelled { .. } => "RequestCancelled",
            MarketEvent::QuoteExpired { .. } => "QuoteExpired",
        }
    }
}

/// Publishing never fails from the caller's point of view: events go out after the
/// state change has committed, so a delivery problem is logged, not propagated.
#[async_trait]
pub trait EventPublisher: Send + Sync + std::fmt::Debug {
    async fn publish(&self, event: MarketEvent);
}

#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<MarketEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventPublisher for BroadcastPublisher {
    async fn publish(&self, event: MarketEvent) {
        tracing::info!("Publishing {}: {:?}", event.name(), event);

        if let Err(e) = self.sender.send(event) {
            tracing::debug!("No subscribers for {}", e.0.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();
        let request_id = Uuid::new_v4();

        publisher.publish(MarketEvent::RequestCompleted { request_id }).await;

        assert_eq!(rx.recv().await.unwrap(), MarketEvent::RequestCompleted { request_id });
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let publisher = BroadcastPublisher::new(1);
        publisher
            .publish(MarketEvent::RequestCancelled { request_id: Uuid::new_v4() })
            .await;
    }

    #[test]
    fn events_serialize_with_name_tag() {
        let json = serde_json::to_value(MarketEvent::WorkflowMilestoneReached {
            request_id: Uuid::nil(),
            provider_id: Uuid::nil(),
            milestone: Milestone::CheckedIn,
        })
        .unwrap();

        assert_eq!(json["event"], "WorkflowMilestoneReached");
        assert_eq!(json["payload"]["milestone"], "checked_in");
    }
}
