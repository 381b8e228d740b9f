use std::sync::Arc;
use std::time::Duration;

use slotwatch_core::config::{AppConfig, ConfigError};
use slotwatch_core::SourceError;
use slotwatch_telegram::{
    ChatId, CommandGate, DeliveryLoop, NotificationQueue, ReconnectPolicy, TelegramBotApi,
    TransportError, UpdateListener,
};
use thiserror::Error;
use tracing::info;

use crate::reservation::ReservationClient;
use crate::scheduler::{Scheduler, TickPeriods, AUTHORIZED_COMMANDS};
use crate::watcher::{WatchTimings, Watcher};

pub struct Application {
    pub config: AppConfig,
    pub scheduler: Scheduler,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("reservation client setup failed: {0}")]
    Source(#[source] SourceError),
    #[error("telegram client setup failed: {0}")]
    Telegram(#[source] TransportError),
}

pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");
    let source = ReservationClient::new(&config.source).map_err(BootstrapError::Source)?;

    let telegram = &config.telegram;
    let telegram_timeout = Duration::from_secs(telegram.timeout_secs);
    let primary = Arc::new(
        TelegramBotApi::new(
            telegram.api_base_url.clone(),
            telegram.token.clone(),
            telegram_timeout,
            telegram.long_poll_secs,
        )
        .map_err(BootstrapError::Telegram)?,
    );
    let escalation = Arc::new(
        TelegramBotApi::new(
            telegram.api_base_url.clone(),
            telegram.warning_token.clone(),
            telegram_timeout,
            telegram.long_poll_secs,
        )
        .map_err(BootstrapError::Telegram)?,
    );
    info!(
        event_name = "system.bootstrap.telegram_ready",
        group_id = telegram.group_id,
        commanders = telegram.commander_ids.len(),
        "telegram clients constructed"
    );

    let queue = Arc::new(NotificationQueue::new(
        ChatId(telegram.group_id),
        telegram.commander_ids.iter().copied().map(ChatId).collect(),
    ));
    let gate = Arc::new(CommandGate::new(
        telegram.commander_ids.iter().copied(),
        AUTHORIZED_COMMANDS,
        config.schedule.command_backlog_limit,
        config.schedule.command_staleness(),
    ));

    let watcher = Watcher::new(
        Arc::new(source),
        queue.clone(),
        config.search.clone(),
        WatchTimings::from(&config.schedule),
    );
    let listener =
        UpdateListener::new(primary.clone(), primary.clone(), gate.clone(), ReconnectPolicy::default());
    let delivery = DeliveryLoop::new(queue, primary.clone(), escalation, telegram.username.clone());
    let scheduler = Scheduler::new(
        watcher,
        listener,
        delivery,
        gate,
        primary,
        TickPeriods::from(&config.schedule),
    );

    info!(event_name = "system.bootstrap.ready", "application bootstrap complete");
    Ok(Application { config, scheduler })
}
