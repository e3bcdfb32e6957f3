//! Inbound event bus and single-shot collectors
//!
//! The integration layer publishes every relevant platform event here;
//! confirmation dialogs and form collection subscribe with a filter and a
//! bounded window and resolve on the first match. One subscription per
//! prompt means no two outcomes of the same prompt can both fire.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::timeout;

use super::{ChannelId, ControlId, UserId};

const BUS_CAPACITY: usize = 256;

/// One inbound platform event relevant to ticket flows
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A member clicked a control (button or select option)
    ComponentClick {
        channel: ChannelId,
        user: UserId,
        control: ControlId,
    },
    /// A plain message was posted in a channel
    Message {
        channel: ChannelId,
        author: UserId,
        content: String,
    },
    /// A data-entry form was submitted; values are in entry order
    FormSubmit {
        channel: ChannelId,
        user: UserId,
        form_id: String,
        values: Vec<String>,
    },
}

impl InboundEvent {
    /// Channel the event happened in
    #[must_use]
    pub const fn channel(&self) -> &ChannelId {
        match self {
            Self::ComponentClick { channel, .. }
            | Self::Message { channel, .. }
            | Self::FormSubmit { channel, .. } => channel,
        }
    }
}

/// Broadcast bus carrying [`InboundEvent`]s to any number of collectors
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<InboundEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish an event; returns the number of live collectors
    pub fn publish(&self, event: InboundEvent) -> usize {
        // A send error only means nobody is currently listening
        self.tx.send(event).unwrap_or(0)
    }

    /// Open a collector over this bus
    #[must_use]
    pub fn collector(&self) -> Collector {
        Collector {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Time-boxed, filter-scoped listener for exactly one matching event
pub struct Collector {
    rx: broadcast::Receiver<InboundEvent>,
}

impl Collector {
    /// Wait for the first event matching `filter`, for at most `window`.
    ///
    /// Returns `None` when the window elapses or the bus shuts down.
    /// Missed events due to lag are skipped, never errors.
    pub async fn next<F>(&mut self, window: Duration, filter: F) -> Option<InboundEvent>
    where
        F: Fn(&InboundEvent) -> bool,
    {
        let wait = async {
            loop {
                match self.rx.recv().await {
                    Ok(event) if filter(&event) => return Some(event),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event collector lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        };
        timeout(window, wait).await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click(channel: &str, user: &str, control: ControlId) -> InboundEvent {
        InboundEvent::ComponentClick {
            channel: ChannelId::from(channel),
            user: UserId::from(user),
            control,
        }
    }

    #[tokio::test]
    async fn test_collector_resolves_on_first_match() {
        let bus = EventBus::new();
        let mut collector = bus.collector();

        bus.publish(click("c1", "u1", ControlId::new("other")));
        bus.publish(click("c1", "u1", ControlId::new("wanted")));

        let got = collector
            .next(Duration::from_millis(200), |e| {
                matches!(e, InboundEvent::ComponentClick { control, .. } if control.as_str() == "wanted")
            })
            .await;
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn test_collector_times_out_without_match() {
        let bus = EventBus::new();
        let mut collector = bus.collector();

        bus.publish(click("c1", "u1", ControlId::new("other")));

        let got = collector
            .next(Duration::from_millis(50), |e| {
                matches!(e, InboundEvent::Message { .. })
            })
            .await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_publish_without_collectors_is_harmless() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(click("c1", "u1", ControlId::new("x"))), 0);
    }
}
