use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::commands::{CommandGate, GateDecision};
use crate::transport::{ChatTransport, InboundMessage, OutboundMessage, UpdateSource};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay_ms: 250, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Long-polls the bot for inbound messages and answers them through the gate.
pub struct UpdateListener {
    source: Arc<dyn UpdateSource>,
    replies: Arc<dyn ChatTransport>,
    gate: Arc<CommandGate>,
    reconnect_policy: ReconnectPolicy,
}

impl UpdateListener {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        replies: Arc<dyn ChatTransport>,
        gate: Arc<CommandGate>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, replies, gate, reconnect_policy }
    }

    /// Runs until the surrounding task is dropped. Poll failures are retried
    /// with exponential backoff and never end the loop.
    pub async fn run(&self) {
        let mut failures = 0_u32;
        loop {
            match self.source.next_updates().await {
                Ok(messages) => {
                    failures = 0;
                    for message in messages {
                        self.handle(&message).await;
                    }
                }
                Err(error) => {
                    let delay = self.reconnect_policy.backoff(failures);
                    warn!(
                        event_name = "listener.poll_failed",
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "update polling failed; backing off"
                    );
                    failures = failures.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    pub async fn handle(&self, message: &InboundMessage) -> GateDecision {
        let decision = self.gate.admit(message, Utc::now());
        let sender_id = message.sender.as_ref().map(|sender| sender.id);

        match &decision {
            GateDecision::Ignored => {
                debug!(
                    event_name = "listener.message_ignored",
                    chat_id = %message.chat_id,
                    sender_id,
                    "inbound message ignored"
                );
            }
            GateDecision::Queued(command) => {
                info!(
                    event_name = "listener.command_queued",
                    chat_id = %message.chat_id,
                    sender_id,
                    command = %command,
                    backlog = self.gate.backlog(),
                    "authorized command queued"
                );
            }
            GateDecision::Reply(text) => {
                let reply = OutboundMessage::plain(message.chat_id, text.clone());
                if let Err(error) = self.replies.deliver(&reply).await {
                    warn!(
                        event_name = "listener.reply_failed",
                        chat_id = %message.chat_id,
                        error = %error,
                        "failed to reply to inbound command"
                    );
                }
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    use super::{ReconnectPolicy, UpdateListener};
    use crate::commands::{CommandGate, GateDecision};
    use crate::transport::{
        ChatId, ChatTransport, InboundMessage, OutboundMessage, Sender, TransportError,
        UpdateSource,
    };

    #[derive(Default)]
    struct ScriptedUpdates {
        batches: Mutex<VecDeque<Result<Vec<InboundMessage>, TransportError>>>,
        polls: Mutex<usize>,
    }

    #[async_trait]
    impl UpdateSource for ScriptedUpdates {
        async fn next_updates(&self) -> Result<Vec<InboundMessage>, TransportError> {
            *self.polls.lock().await += 1;
            match self.batches.lock().await.pop_front() {
                Some(batch) => batch,
                None => {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(Vec::new())
                }
            }
        }
    }

    #[derive(Default)]
    struct RecordingReplies {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingReplies {
        async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            self.sent.lock().await.push(message.clone());
            Ok(())
        }
    }

    fn message(sender_id: i64, text: &str) -> InboundMessage {
        InboundMessage {
            chat_id: ChatId(-100),
            sender: Some(Sender { id: sender_id, username: Some("kim".to_owned()) }),
            text: text.to_owned(),
            sent_at: Utc::now(),
        }
    }

    fn gate() -> Arc<CommandGate> {
        Arc::new(CommandGate::new([7], ["/status"], 2, Duration::from_secs(10)))
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = ReconnectPolicy { base_delay_ms: 100, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn replies_go_back_to_the_originating_chat() {
        let replies = Arc::new(RecordingReplies::default());
        let listener = UpdateListener::new(
            Arc::new(ScriptedUpdates::default()),
            replies.clone(),
            gate(),
            ReconnectPolicy::default(),
        );

        let decision = listener.handle(&message(99, "/status")).await;
        assert_eq!(decision, GateDecision::Reply("You're not commander :(".to_owned()));

        let sent = replies.sent.lock().await.clone();
        assert_eq!(sent, vec![OutboundMessage::plain(ChatId(-100), "You're not commander :(")]);
    }

    #[tokio::test(start_paused = true)]
    async fn polling_failures_do_not_stop_the_listener() {
        let updates = Arc::new(ScriptedUpdates::default());
        {
            let mut batches = updates.batches.lock().await;
            batches.push_back(Err(TransportError::Status { method: "getUpdates", status: 502 }));
            batches.push_back(Err(TransportError::Status { method: "getUpdates", status: 502 }));
            batches.push_back(Ok(vec![message(7, "/status"), message(7, "/whereami")]));
        }
        let replies = Arc::new(RecordingReplies::default());
        let gate = gate();
        let listener = UpdateListener::new(
            updates.clone(),
            replies.clone(),
            gate.clone(),
            ReconnectPolicy { base_delay_ms: 100, max_delay_ms: 1_000 },
        );

        let result = tokio::time::timeout(Duration::from_secs(5), listener.run()).await;

        assert!(result.is_err(), "listener runs until cancelled");
        assert!(*updates.polls.lock().await >= 3);
        assert_eq!(gate.next_command().as_deref(), Some("/status"));
        let sent = replies.sent.lock().await.clone();
        assert_eq!(sent, vec![OutboundMessage::plain(ChatId(-100), "-100")]);
    }
}
