use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::transport::InboundMessage;

pub const WHERE_AM_I: &str = "/whereami";
pub const WHO_AM_I: &str = "/whoami";

pub const NOT_COMMANDER_REPLY: &str = "You're not commander :(";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundCommand {
    WhereAmI,
    WhoAmI,
    Authorized(String),
    Unknown,
}

/// What the listener should do with an inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Ignored,
    Reply(String),
    Queued(String),
}

/// Admission control for inbound chat commands.
///
/// Info commands are answered for anyone. Authorized commands are accepted
/// only from commanders, and only while the backlog is within its limit.
/// Anything older than the staleness window is dropped without a reply.
#[derive(Debug)]
pub struct CommandGate {
    commander_ids: HashSet<i64>,
    authorized: HashSet<String>,
    backlog_limit: usize,
    staleness: Duration,
    pending: Mutex<VecDeque<String>>,
}

impl CommandGate {
    pub fn new<I, S>(
        commander_ids: impl IntoIterator<Item = i64>,
        authorized: I,
        backlog_limit: usize,
        staleness: Duration,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commander_ids: commander_ids.into_iter().collect(),
            authorized: authorized.into_iter().map(Into::into).collect(),
            backlog_limit,
            staleness,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn classify(&self, text: &str) -> InboundCommand {
        let Some(first) = text.split_whitespace().next() else {
            return InboundCommand::Unknown;
        };
        let name = first.split('@').next().unwrap_or(first).to_ascii_lowercase();

        match name.as_str() {
            WHERE_AM_I => InboundCommand::WhereAmI,
            WHO_AM_I => InboundCommand::WhoAmI,
            _ if self.authorized.contains(&name) => InboundCommand::Authorized(name),
            _ => InboundCommand::Unknown,
        }
    }

    pub fn admit(&self, message: &InboundMessage, now: DateTime<Utc>) -> GateDecision {
        let age = now.signed_duration_since(message.sent_at);
        if age.to_std().map(|age| age > self.staleness).unwrap_or(false) {
            return GateDecision::Ignored;
        }

        match self.classify(&message.text) {
            InboundCommand::WhereAmI => GateDecision::Reply(message.chat_id.to_string()),
            InboundCommand::WhoAmI => match &message.sender {
                Some(sender) => GateDecision::Reply(format!(
                    "Hello, {}! ({}) :]",
                    sender.username.as_deref().unwrap_or("None"),
                    sender.id
                )),
                None => GateDecision::Ignored,
            },
            InboundCommand::Authorized(_) => self.admit_authorized(message),
            InboundCommand::Unknown => GateDecision::Ignored,
        }
    }

    fn admit_authorized(&self, message: &InboundMessage) -> GateDecision {
        if let Some(sender) = &message.sender {
            if !self.commander_ids.contains(&sender.id) {
                return GateDecision::Reply(NOT_COMMANDER_REPLY.to_owned());
            }
        }

        let mut pending = self.lock();
        if pending.len() > self.backlog_limit {
            let queued = pending.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
            return GateDecision::Reply(format!("I'm busy :(\nPlease wait a moment.\n\n{queued}"));
        }

        let command = match message.text.split_once('@') {
            Some((command, _)) => command.to_owned(),
            None => message.text.clone(),
        };
        pending.push_back(command.clone());
        GateDecision::Queued(command)
    }

    pub fn next_command(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn backlog(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
