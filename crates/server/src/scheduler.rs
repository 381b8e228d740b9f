use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use slotwatch_core::config::ScheduleConfig;
use slotwatch_telegram::{
    ChatTransport, CommandGate, DeliveryLoop, FlushRequest, Notification, NotificationQueue,
    OutboundMessage, QueueKind, UpdateListener,
};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::watcher::{WatchStatus, Watcher};

pub const STATUS_COMMAND: &str = "/status";
pub const SLOTS_COMMAND: &str = "/slots";
pub const AUTHORIZED_COMMANDS: [&str; 2] = [STATUS_COMMAND, SLOTS_COMMAND];

pub const PROGRAM_TERMINATED: &str = "program terminated";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPeriods {
    pub primary: Duration,
    pub escalation: Duration,
    pub command: Duration,
}

impl From<&ScheduleConfig> for TickPeriods {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self {
            primary: schedule.primary_tick(),
            escalation: schedule.escalation_tick(),
            command: schedule.command_tick(),
        }
    }
}

/// Single cooperative loop over the watcher, listener, delivery ticks and
/// command runner.
pub struct Scheduler {
    watcher: Watcher,
    listener: UpdateListener,
    delivery: DeliveryLoop,
    gate: Arc<CommandGate>,
    primary: Arc<dyn ChatTransport>,
    ticks: TickPeriods,
}

impl Scheduler {
    pub fn new(
        watcher: Watcher,
        listener: UpdateListener,
        delivery: DeliveryLoop,
        gate: Arc<CommandGate>,
        primary: Arc<dyn ChatTransport>,
        ticks: TickPeriods,
    ) -> Self {
        Self { watcher, listener, delivery, gate, primary, ticks }
    }

    pub fn queue(&self) -> &Arc<NotificationQueue> {
        self.delivery.queue()
    }

    /// Runs every component until `shutdown` resolves.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let watcher = self.watcher.run();
        let listener = self.listener.run();
        tokio::pin!(watcher, listener, shutdown);

        let mut primary = ticker(self.ticks.primary);
        let mut escalation = ticker(self.ticks.escalation);
        let mut commands = ticker(self.ticks.command);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = &mut watcher => break,
                () = &mut listener => break,
                _ = primary.tick() => {
                    self.delivery.tick(QueueKind::Primary).await;
                }
                _ = escalation.tick() => {
                    self.delivery.tick(QueueKind::Escalation).await;
                }
                _ = commands.tick() => {
                    self.run_next_command();
                }
            }
        }
    }

    /// Executes at most one queued authorized command.
    pub fn run_next_command(&self) -> Option<String> {
        let command = self.gate.next_command()?;
        let name = command.split_whitespace().next().unwrap_or_default();
        let status = self.watcher.status();

        match name {
            STATUS_COMMAND => {
                self.queue().flush(FlushRequest::titled("status").message(status_report(
                    &status,
                    self.queue(),
                )));
            }
            SLOTS_COMMAND => {
                let snapshot = status.snapshot();
                for line in &snapshot.slot_lines {
                    self.queue().append(line);
                }
                self.queue().flush(FlushRequest::titled("slots").message("no slots fetched yet"));
            }
            other => {
                warn!(event_name = "commands.unsupported", command = other, "command dropped");
                return None;
            }
        }

        info!(event_name = "commands.executed", command = name, "command executed");
        Some(command)
    }

    /// Sends the termination notice straight to the primary chat, bypassing
    /// the queue. Failure is logged only.
    pub async fn announce_shutdown(&self, timeout: Duration) {
        let text = Notification::new(PROGRAM_TERMINATED, "", Local::now()).render();
        let message = OutboundMessage::html(self.queue().group_id(), text);

        match tokio::time::timeout(timeout, self.primary.deliver(&message)).await {
            Ok(Ok(())) => {
                info!(event_name = "system.shutdown.announced", "termination notice delivered");
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "system.shutdown.announce_failed",
                    error = %error,
                    "termination notice failed"
                );
            }
            Err(_) => {
                warn!(
                    event_name = "system.shutdown.announce_timeout",
                    timeout_ms = timeout.as_millis() as u64,
                    "termination notice timed out"
                );
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

fn status_report(status: &WatchStatus, queue: &NotificationQueue) -> String {
    let snapshot = status.snapshot();
    let fingerprint = snapshot.fingerprint.as_ref().map_or("-", |value| value.short());

    format!(
        "state: {:?}\nslots: {}\nfingerprint: {}\nprimary queue: {}\nescalation queue: {}",
        snapshot.state,
        snapshot.slot_lines.len(),
        fingerprint,
        queue.depth(QueueKind::Primary),
        queue.depth(QueueKind::Escalation),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use slotwatch_core::domain::slot::SlotFields;
    use slotwatch_core::{Credential, SearchFilter, Slot, SlotSource, SourceError};
    use slotwatch_telegram::{
        ChatId, ChatTransport, CommandGate, DeliveryLoop, InboundMessage, NotificationQueue,
        OutboundMessage, QueueKind, ReconnectPolicy, Sender, TransportError, UpdateListener,
        UpdateSource,
    };
    use tokio::sync::Mutex;

    use super::{Scheduler, TickPeriods, AUTHORIZED_COMMANDS};
    use crate::watcher::{WatchTimings, Watcher};

    struct FixedSource;

    #[async_trait]
    impl SlotSource for FixedSource {
        async fn authenticate(&self) -> Result<Credential, SourceError> {
            Ok(Credential::new("Bearer", "t"))
        }

        async fn fetch_slots(&self, _filter: &SearchFilter) -> Result<Vec<Slot>, SourceError> {
            let slot = Slot::try_from(SlotFields {
                wedding_date: Some("20251101".to_owned()),
                weekday: Some("토요일".to_owned()),
                time: Some("11:00".to_owned()),
                hall_name: Some("A홀".to_owned()),
                rent_discount: Some("2000000".to_owned()),
                eat_discount: Some("650000".to_owned()),
                per_discount: Some("10".to_owned()),
                hall_image_code: Some("H01".to_owned()),
                ..SlotFields::default()
            })
            .expect("valid slot");
            Ok(vec![slot])
        }
    }

    #[derive(Default)]
    struct InboxOnce {
        delivered: Mutex<bool>,
    }

    #[async_trait]
    impl UpdateSource for InboxOnce {
        async fn next_updates(&self) -> Result<Vec<InboundMessage>, TransportError> {
            let first = !std::mem::replace(&mut *self.delivered.lock().await, true);
            // the command arrives after the first fetch has completed
            tokio::time::sleep(Duration::from_secs(if first { 15 } else { 10 })).await;
            if !first {
                return Ok(Vec::new());
            }
            Ok(vec![InboundMessage {
                chat_id: ChatId(-100),
                sender: Some(Sender { id: 1, username: Some("kim".to_owned()) }),
                text: "/slots".to_owned(),
                sent_at: Utc::now(),
            }])
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        fail: bool,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl ChatTransport for RecordingTransport {
        async fn deliver(&self, message: &OutboundMessage) -> Result<(), TransportError> {
            self.sent.lock().await.push(message.clone());
            if self.fail {
                return Err(TransportError::Status { method: "sendMessage", status: 502 });
            }
            Ok(())
        }
    }

    fn scheduler(
        primary: Arc<RecordingTransport>,
        updates: Arc<dyn UpdateSource>,
    ) -> (Scheduler, Arc<CommandGate>) {
        let queue = Arc::new(NotificationQueue::new(ChatId(-100), vec![ChatId(1)]));
        let gate =
            Arc::new(CommandGate::new([1], AUTHORIZED_COMMANDS, 2, Duration::from_secs(10)));
        let watcher = Watcher::new(
            Arc::new(FixedSource),
            queue.clone(),
            SearchFilter::default(),
            WatchTimings {
                poll_interval: Duration::from_secs(60),
                alert_interval: Duration::from_secs(10),
                error_backoff: Duration::from_secs(300),
                login_refresh: Duration::from_secs(1800),
                login_settle: Duration::from_secs(10),
            },
        );
        let listener =
            UpdateListener::new(updates, primary.clone(), gate.clone(), ReconnectPolicy::default());
        let delivery = DeliveryLoop::new(
            queue,
            primary.clone(),
            Arc::new(RecordingTransport::default()),
            "slot_bot",
        );
        let ticks = TickPeriods {
            primary: Duration::from_secs(2),
            escalation: Duration::from_secs(3),
            command: Duration::from_secs(1),
        };
        (Scheduler::new(watcher, listener, delivery, gate.clone(), primary, ticks), gate)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_shutdown_and_delivers_in_order() {
        let primary = Arc::new(RecordingTransport::default());
        let (scheduler, _gate) =
            scheduler(primary.clone(), Arc::new(InboxOnce { delivered: Mutex::new(true) }));

        scheduler.run_until(tokio::time::sleep(Duration::from_secs(30))).await;

        let sent = primary.sent.lock().await.clone();
        assert!(sent.len() >= 2, "{sent:?}");
        assert!(sent[0].text.contains("## program started ##"));
        assert!(sent[1].text.contains("## search started ##"));
        assert!(sent.iter().all(|message| message.chat_id == ChatId(-100)));
    }

    #[tokio::test(start_paused = true)]
    async fn slots_command_resends_last_listing() {
        let primary = Arc::new(RecordingTransport::default());
        let (scheduler, gate) = scheduler(primary.clone(), Arc::new(InboxOnce::default()));

        scheduler.run_until(tokio::time::sleep(Duration::from_secs(40))).await;

        assert_eq!(gate.backlog(), 0);
        let sent = primary.sent.lock().await.clone();
        let slots = sent.iter().find(|message| message.text.contains("## slots ##"));
        let slots = slots.expect("slots reply delivered");
        assert!(slots.text.contains("11/01(토) 11:00 A홀 200 6.5 10"));
    }

    #[tokio::test]
    async fn status_command_reports_queue_depths() {
        let primary = Arc::new(RecordingTransport::default());
        let (scheduler, gate) = scheduler(primary, Arc::new(InboxOnce::default()));
        gate.admit(
            &InboundMessage {
                chat_id: ChatId(-100),
                sender: Some(Sender { id: 1, username: None }),
                text: "/status@slot_bot".to_owned(),
                sent_at: Utc::now(),
            },
            Utc::now(),
        );

        assert_eq!(scheduler.run_next_command().as_deref(), Some("/status"));
        assert_eq!(scheduler.run_next_command(), None);

        let entry = scheduler.queue().pop(QueueKind::Primary).expect("status entry");
        assert!(entry.text.contains("## status ##"));
        assert!(entry.text.contains("state: Init"));
        assert!(entry.text.contains("primary queue: 0"));
    }

    #[tokio::test]
    async fn shutdown_notice_bypasses_the_queue_and_tolerates_failure() {
        let primary = Arc::new(RecordingTransport { fail: true, ..RecordingTransport::default() });
        let (scheduler, _gate) = scheduler(primary.clone(), Arc::new(InboxOnce::default()));

        scheduler.announce_shutdown(Duration::from_secs(5)).await;

        let sent = primary.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("## program terminated ##"));
        assert_eq!(scheduler.queue().depth(QueueKind::Primary), 0);
    }
}
