//! Optional NATS publisher for domain events.
//!
//! Publishing is best effort: the database write has already committed, so a
//! failed publish is logged and otherwise ignored.

use crate::domain::events::DomainEvent;

#[derive(Clone, Default)]
pub struct EventBus {
    client: Option<async_nats::Client>,
}

impl EventBus {
    /// A bus that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Connects to `url`; on failure the bus is disabled and a warning logged.
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url else {
            return Self::disabled();
        };
        match async_nats::connect(url).await {
            Ok(client) => {
                tracing::info!(url, "connected to NATS");
                Self { client: Some(client) }
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "NATS unavailable; domain events will not be published");
                Self::disabled()
            }
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    pub async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.client else {
            return;
        };
        for event in events {
            let subject = event.subject();
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(subject = %subject, error = %e, "failed to serialize domain event");
                    continue;
                }
            };
            if let Err(e) = client.publish(subject.clone(), payload.into()).await {
                tracing::warn!(subject = %subject, error = %e, "failed to publish domain event");
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("enabled", &self.is_enabled()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn disabled_bus_swallows_events() {
        let bus = EventBus::connect(None).await;
        assert!(!bus.is_enabled());
        bus.publish(vec![DomainEvent::ProductPublished { product_id: Uuid::new_v4() }]).await;
    }
}
