//! Confirmation-dialog state machine
//!
//! Every multi-step confirmation in the lifecycle (close, request-close,
//! close-request acceptance) runs through one [`ConfirmationDialog`]:
//! Prompted, then exactly one of Confirmed, Declined, or Expired. A single
//! subscription awaits a single event, so no two outcomes of the same
//! prompt can both execute and there are no sibling collectors to cancel.

use std::time::Duration;

use crate::platform::events::{EventBus, InboundEvent};
use crate::platform::{ChannelId, ControlId, UserId};

/// Window for synchronous confirmations
pub const CONFIRM_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Terminal state of a confirmation dialog
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    /// The responder confirmed, optionally with a free-text reason
    Confirmed { reason: Option<String> },
    /// The responder declined or cancelled
    Declined,
    /// The window elapsed without a response
    Expired,
}

/// One prompted confirmation, bound to a channel and a responder
#[derive(Debug, Clone)]
pub struct ConfirmationDialog {
    channel: ChannelId,
    responder: UserId,
    confirm: ControlId,
    decline: ControlId,
    accept_text_reason: bool,
    window: Duration,
}

impl ConfirmationDialog {
    #[must_use]
    pub fn new(
        channel: ChannelId,
        responder: UserId,
        confirm: ControlId,
        decline: ControlId,
    ) -> Self {
        Self {
            channel,
            responder,
            confirm,
            decline,
            accept_text_reason: false,
            window: CONFIRM_WINDOW,
        }
    }

    /// A plain message from the responder in the channel counts as a
    /// confirmation carrying that message as the reason
    #[must_use]
    pub const fn accept_text_reason(mut self) -> Self {
        self.accept_text_reason = true;
        self
    }

    /// Override the response window
    #[must_use]
    pub const fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Await the first matching response; runs to exactly one outcome
    pub async fn run(&self, events: &EventBus) -> DialogOutcome {
        let mut collector = events.collector();
        let matched = collector
            .next(self.window, |event| match event {
                InboundEvent::ComponentClick {
                    channel,
                    user,
                    control,
                } => {
                    channel == &self.channel
                        && user == &self.responder
                        && (control == &self.confirm || control == &self.decline)
                }
                InboundEvent::Message {
                    channel, author, ..
                } => self.accept_text_reason && channel == &self.channel && author == &self.responder,
                InboundEvent::FormSubmit { .. } => false,
            })
            .await;

        match matched {
            Some(InboundEvent::ComponentClick { control, .. }) if control == self.confirm => {
                DialogOutcome::Confirmed { reason: None }
            }
            Some(InboundEvent::ComponentClick { .. }) => DialogOutcome::Declined,
            Some(InboundEvent::Message { content, .. }) => DialogOutcome::Confirmed {
                reason: Some(content),
            },
            _ => DialogOutcome::Expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dialog() -> ConfirmationDialog {
        ConfirmationDialog::new(
            ChannelId::from("c1"),
            UserId::from("staff"),
            ControlId::new("confirm"),
            ControlId::new("cancel"),
        )
        .window(Duration::from_millis(150))
    }

    fn click(user: &str, control: &str) -> InboundEvent {
        InboundEvent::ComponentClick {
            channel: ChannelId::from("c1"),
            user: UserId::from(user),
            control: ControlId::new(control),
        }
    }

    #[tokio::test]
    async fn test_confirm_without_reason() {
        let bus = EventBus::new();
        let dialog = dialog();
        let run = tokio::spawn({
            let bus = bus.clone();
            async move { dialog.run(&bus).await }
        });
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        bus.publish(click("staff", "confirm"));
        assert_eq!(
            run.await.unwrap(),
            DialogOutcome::Confirmed { reason: None }
        );
    }

    #[tokio::test]
    async fn test_decline_wins_over_later_confirm() {
        let bus = EventBus::new();
        let dialog = dialog();
        let run = tokio::spawn({
            let bus = bus.clone();
            async move { dialog.run(&bus).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        bus.publish(click("staff", "cancel"));
        bus.publish(click("staff", "confirm"));
        assert_eq!(run.await.unwrap(), DialogOutcome::Declined);
    }

    #[tokio::test]
    async fn test_text_reason_only_when_enabled() {
        let bus = EventBus::new();
        let dialog = dialog().accept_text_reason();
        let run = tokio::spawn({
            let bus = bus.clone();
            async move { dialog.run(&bus).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // A bystander's message must not resolve the dialog
        bus.publish(InboundEvent::Message {
            channel: ChannelId::from("c1"),
            author: UserId::from("bystander"),
            content: "hello".into(),
        });
        bus.publish(InboundEvent::Message {
            channel: ChannelId::from("c1"),
            author: UserId::from("staff"),
            content: "resolved the issue".into(),
        });
        assert_eq!(
            run.await.unwrap(),
            DialogOutcome::Confirmed {
                reason: Some("resolved the issue".into())
            }
        );
    }

    #[tokio::test]
    async fn test_expires_without_response() {
        let bus = EventBus::new();
        let dialog = dialog().window(Duration::from_millis(30));
        assert_eq!(dialog.run(&bus).await, DialogOutcome::Expired);
    }

    #[tokio::test]
    async fn test_wrong_responder_is_ignored() {
        let bus = EventBus::new();
        let dialog = dialog().window(Duration::from_millis(60));
        let run = tokio::spawn({
            let bus = bus.clone();
            async move { dialog.run(&bus).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        bus.publish(click("intruder", "confirm"));
        assert_eq!(run.await.unwrap(), DialogOutcome::Expired);
    }
}
