//! Telegram integration for slotwatch
//!
//! This crate provides the chat side of the watcher:
//! - **Transport** (`transport`) - Bot API client for `sendMessage` and `getUpdates`
//! - **Queue** (`queue`) - buffered primary and escalation lanes
//! - **Delivery** (`delivery`) - one attempt per queued entry, one entry per tick
//! - **Commands** (`commands`) - allow-list, backlog limit and staleness gate
//! - **Listener** (`listener`) - long-poll loop with reconnect backoff
//!
//! # Architecture
//!
//! ```text
//! Watcher → NotificationQueue → DeliveryLoop → primary bot (group chat)
//!                                          ↘ escalation bot (commanders)
//!
//! getUpdates → UpdateListener → CommandGate → reply / pending command
//! ```
//!
//! # Key Types
//!
//! - `TelegramBotApi` - one instance per bot token
//! - `NotificationQueue` - two FIFO lanes fed by `append` and `flush`
//! - `DeliveryLoop` - drains a lane per tick
//! - `CommandGate` - decides whether an inbound message is answered, queued or ignored

pub mod commands;
pub mod delivery;
pub mod format;
pub mod listener;
pub mod queue;
pub mod transport;

pub use commands::{CommandGate, GateDecision, InboundCommand};
pub use delivery::{DeliveryLoop, DeliveryOutcome};
pub use format::Notification;
pub use listener::{ReconnectPolicy, UpdateListener};
pub use queue::{FlushReceipt, FlushRequest, NotificationQueue, QueueEntry, QueueKind};
pub use transport::{
    ChatId, ChatTransport, InboundMessage, OutboundMessage, Sender, TelegramBotApi,
    TransportError, UpdateSource,
};
