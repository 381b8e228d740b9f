use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::queue::{FlushRequest, NotificationQueue, QueueKind};
use crate::transport::{ChatTransport, OutboundMessage};

pub const DELIVERY_FAILED_TITLE: &str = "Telegram failed";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Idle,
    Delivered,
    Dropped,
}

/// Drains the notification lanes one entry per tick.
///
/// Every entry gets exactly one attempt. A failed escalation is reported on
/// the primary lane; a failed primary delivery is only logged.
pub struct DeliveryLoop {
    queue: Arc<NotificationQueue>,
    primary: Arc<dyn ChatTransport>,
    escalation: Arc<dyn ChatTransport>,
    bot_username: String,
}

impl DeliveryLoop {
    pub fn new(
        queue: Arc<NotificationQueue>,
        primary: Arc<dyn ChatTransport>,
        escalation: Arc<dyn ChatTransport>,
        bot_username: impl Into<String>,
    ) -> Self {
        Self { queue, primary, escalation, bot_username: bot_username.into() }
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        &self.queue
    }

    pub async fn tick(&self, kind: QueueKind) -> DeliveryOutcome {
        let Some(entry) = self.queue.pop(kind) else {
            return DeliveryOutcome::Idle;
        };

        let latency_ms = entry.enqueued_at.elapsed().as_millis() as u64;
        debug!(
            event_name = "delivery.dequeued",
            queue = kind.as_str(),
            destination = %entry.destination,
            latency_ms,
            text = %entry.text.replace('\n', " "),
            "delivering notification"
        );

        let (transport, text) = match kind {
            QueueKind::Primary => (&self.primary, entry.text),
            QueueKind::Escalation => {
                (&self.escalation, format!("{} {}", self.bot_username, entry.text))
            }
        };

        match transport.deliver(&OutboundMessage::html(entry.destination, text)).await {
            Ok(()) => {
                info!(
                    event_name = "delivery.sent",
                    queue = kind.as_str(),
                    destination = %entry.destination,
                    latency_ms,
                    "notification delivered"
                );
                DeliveryOutcome::Delivered
            }
            Err(error) => {
                warn!(
                    event_name = "delivery.failed",
                    queue = kind.as_str(),
                    destination = %entry.destination,
                    error = %error,
                    "notification dropped after failed delivery"
                );
                if kind == QueueKind::Escalation {
                    self.queue.flush(
                        FlushRequest::titled(DELIVERY_FAILED_TITLE).message(format!(
                            "Failed to send warning message to {}",
                            entry.destination
                        )),
                    );
                }
                DeliveryOutcome::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{DeliveryLoop, DeliveryOutcome};
    use crate::queue::{FlushRequest, NotificationQueue, QueueKind};
    use crate::transport::{ChatId, ChatTransport, OutboundMessage, TransportError};

    #[derive(Default)]
    struct RecordingTransport {
        fail: bool,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl RecordingTransport {
        fn failing() -> Self {
            Self { fail: true, ..Self::default() }
        }

        async fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            self.sent.lock().await.push(message.clone());
            if self.fail {
                return Err(TransportError::Api {
                    method: "sendMessage",
                    description: "Forbidden: bot was blocked by the user".to_owned(),
                });
            }
            Ok(())
        }
    }

    fn fixture(
        primary: RecordingTransport,
        escalation: RecordingTransport,
    ) -> (DeliveryLoop, Arc<RecordingTransport>, Arc<RecordingTransport>) {
        let queue = Arc::new(NotificationQueue::new(ChatId(-100), vec![ChatId(1), ChatId(2)]));
        let primary = Arc::new(primary);
        let escalation = Arc::new(escalation);
        let delivery =
            DeliveryLoop::new(queue, primary.clone(), escalation.clone(), "slot_bot");
        (delivery, primary, escalation)
    }

    #[tokio::test]
    async fn idle_tick_sends_nothing() {
        let (delivery, primary, _) =
            fixture(RecordingTransport::default(), RecordingTransport::default());

        assert_eq!(delivery.tick(QueueKind::Primary).await, DeliveryOutcome::Idle);
        assert!(primary.sent().await.is_empty());
    }

    #[tokio::test]
    async fn each_tick_delivers_exactly_one_entry_in_order() {
        let (delivery, primary, _) =
            fixture(RecordingTransport::default(), RecordingTransport::default());
        delivery.queue().flush(FlushRequest::titled("one"));
        delivery.queue().flush(FlushRequest::titled("two"));

        assert_eq!(delivery.tick(QueueKind::Primary).await, DeliveryOutcome::Delivered);
        assert_eq!(primary.sent().await.len(), 1);
        assert_eq!(delivery.queue().depth(QueueKind::Primary), 1);

        assert_eq!(delivery.tick(QueueKind::Primary).await, DeliveryOutcome::Delivered);
        let sent = primary.sent().await;
        assert!(sent[0].text.contains("## one ##"));
        assert!(sent[1].text.contains("## two ##"));
        assert!(sent.iter().all(|message| message.chat_id == ChatId(-100)));
    }

    #[tokio::test]
    async fn escalation_is_prefixed_with_bot_username() {
        let (delivery, _, escalation) =
            fixture(RecordingTransport::default(), RecordingTransport::default());
        delivery.queue().flush(FlushRequest::titled("error occurred").owner_only());

        assert_eq!(delivery.tick(QueueKind::Escalation).await, DeliveryOutcome::Delivered);
        let sent = escalation.sent().await;
        assert_eq!(sent[0].chat_id, ChatId(1));
        assert!(sent[0].text.starts_with("slot_bot <code>## error occurred ##"));
    }

    #[tokio::test]
    async fn failed_escalation_is_reported_on_primary_without_retry() {
        let (delivery, _, escalation) =
            fixture(RecordingTransport::default(), RecordingTransport::failing());
        delivery.queue().flush(FlushRequest::titled("error occurred").owner_only());
        // discard the primary copy of the warning
        delivery.queue().pop(QueueKind::Primary);

        assert_eq!(delivery.tick(QueueKind::Escalation).await, DeliveryOutcome::Dropped);
        assert_eq!(delivery.tick(QueueKind::Escalation).await, DeliveryOutcome::Idle);
        assert_eq!(escalation.sent().await.len(), 1);

        let report = delivery.queue().pop(QueueKind::Primary).expect("failure report");
        assert!(report.text.contains("## Telegram failed ##"));
        assert!(report.text.contains("Failed to send warning message to 1"));
        assert_eq!(delivery.queue().depth(QueueKind::Escalation), 0);
    }

    #[tokio::test]
    async fn failed_primary_delivery_is_dropped() {
        let (delivery, primary, _) =
            fixture(RecordingTransport::failing(), RecordingTransport::default());
        delivery.queue().flush(FlushRequest::titled("search started"));

        assert_eq!(delivery.tick(QueueKind::Primary).await, DeliveryOutcome::Dropped);
        assert_eq!(delivery.queue().depth(QueueKind::Primary), 0);
        assert_eq!(delivery.tick(QueueKind::Primary).await, DeliveryOutcome::Idle);
        assert_eq!(primary.sent().await.len(), 1);
    }
}
