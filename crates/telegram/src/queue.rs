use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Local;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::format::Notification;
use crate::transport::ChatId;

/// One rendered message waiting for a single delivery attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueEntry {
    pub destination: ChatId,
    pub text: String,
    pub enqueued_at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    Primary,
    Escalation,
}

impl QueueKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Escalation => "escalation",
        }
    }
}

/// Parameters of a single flush.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlushRequest {
    pub title: String,
    pub message: String,
    pub also_warn: bool,
    pub warn_owner_only: bool,
}

impl FlushRequest {
    pub fn titled(title: impl Into<String>) -> Self {
        Self { title: title.into(), ..Self::default() }
    }

    /// Body used only when nothing has been appended since the last flush.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn warn(mut self) -> Self {
        self.also_warn = true;
        self
    }

    pub fn owner_only(mut self) -> Self {
        self.also_warn = true;
        self.warn_owner_only = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushReceipt {
    pub notification: Notification,
    pub primary_enqueued: usize,
    pub escalation_enqueued: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: String,
    primary: VecDeque<QueueEntry>,
    escalation: VecDeque<QueueEntry>,
}

/// Buffered, two-lane notification queue.
///
/// Lines are appended to a pending buffer and turned into one message per
/// flush. The primary lane targets the group chat; the escalation lane fans
/// out to the commanders. Both lanes are unbounded FIFOs drained by
/// [`crate::delivery::DeliveryLoop`].
#[derive(Debug)]
pub struct NotificationQueue {
    group_id: ChatId,
    commander_ids: Vec<ChatId>,
    state: Mutex<QueueState>,
}

impl NotificationQueue {
    pub fn new(group_id: ChatId, commander_ids: Vec<ChatId>) -> Self {
        Self { group_id, commander_ids, state: Mutex::new(QueueState::default()) }
    }

    pub fn group_id(&self) -> ChatId {
        self.group_id
    }

    pub fn commander_ids(&self) -> &[ChatId] {
        &self.commander_ids
    }

    pub fn append(&self, line: &str) {
        let mut state = self.lock();
        state.pending.push_str(line);
        state.pending.push('\n');
    }

    pub fn flush(&self, request: FlushRequest) -> FlushReceipt {
        let mut state = self.lock();
        let body = if state.pending.is_empty() {
            request.message
        } else {
            std::mem::take(&mut state.pending)
        };

        let notification = Notification::new(&request.title, body, Local::now());
        let text = notification.render();
        let enqueued_at = Instant::now();

        state.primary.push_back(QueueEntry {
            destination: self.group_id,
            text: text.clone(),
            enqueued_at,
        });

        let mut escalation_enqueued = 0;
        if request.also_warn {
            let recipients = if request.warn_owner_only {
                &self.commander_ids[..self.commander_ids.len().min(1)]
            } else {
                &self.commander_ids[..]
            };
            if recipients.is_empty() {
                warn!(
                    event_name = "queue.escalation.no_recipients",
                    title = %notification.title,
                    "escalation requested but no commander ids are configured"
                );
            }
            for recipient in recipients {
                state.escalation.push_back(QueueEntry {
                    destination: *recipient,
                    text: text.clone(),
                    enqueued_at,
                });
                escalation_enqueued += 1;
            }
        }

        debug!(
            event_name = "queue.flushed",
            title = %notification.title,
            primary_depth = state.primary.len(),
            escalation_depth = state.escalation.len(),
            "notification enqueued"
        );

        FlushReceipt { notification, primary_enqueued: 1, escalation_enqueued }
    }

    pub fn pop(&self, kind: QueueKind) -> Option<QueueEntry> {
        let mut state = self.lock();
        match kind {
            QueueKind::Primary => state.primary.pop_front(),
            QueueKind::Escalation => state.escalation.pop_front(),
        }
    }

    pub fn depth(&self, kind: QueueKind) -> usize {
        let state = self.lock();
        match kind {
            QueueKind::Primary => state.primary.len(),
            QueueKind::Escalation => state.escalation.len(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
