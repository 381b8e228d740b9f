use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use slotwatch_core::config::ScheduleConfig;
use slotwatch_core::{
    classify, fingerprint, ChangeKind, Credential, Fingerprint, PollAction, PollEvent, PollFlow,
    PollState, SearchFilter, Slot, SlotSource, TransitionOutcome, WatchError,
};
use slotwatch_telegram::{FlushRequest, NotificationQueue};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const PROGRAM_STARTED: &str = "program started";
pub const SEARCH_STARTED: &str = "search started";
pub const CHANGE_DETECTED: &str = "change detected";
pub const ERROR_OCCURRED: &str = "error occurred";

const ERROR_REPORT_CHARS: usize = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WatchTimings {
    pub poll_interval: Duration,
    pub alert_interval: Duration,
    pub error_backoff: Duration,
    pub login_refresh: Duration,
    pub login_settle: Duration,
}

impl From<&ScheduleConfig> for WatchTimings {
    fn from(schedule: &ScheduleConfig) -> Self {
        Self {
            poll_interval: schedule.poll_interval(),
            alert_interval: schedule.alert_interval(),
            error_backoff: schedule.error_backoff(),
            login_refresh: schedule.login_refresh(),
            login_settle: schedule.login_settle(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PollState,
    pub slot_lines: Vec<String>,
    pub fingerprint: Option<Fingerprint>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self { state: PollState::Init, slot_lines: Vec::new(), fingerprint: None }
    }
}

/// Read-only view of the watcher for the command runner.
#[derive(Debug, Default)]
pub struct WatchStatus {
    inner: Mutex<StatusSnapshot>,
}

impl WatchStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().clone()
    }

    fn set_state(&self, state: PollState) {
        self.lock().state = state;
    }

    fn record_slots(&self, slot_lines: Vec<String>, fingerprint: Fingerprint) {
        let mut snapshot = self.lock();
        snapshot.slot_lines = slot_lines;
        snapshot.fingerprint = Some(fingerprint);
    }

    fn lock(&self) -> MutexGuard<'_, StatusSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Session {
    state: PollState,
    last_login: Option<Instant>,
    credential: Option<Credential>,
    previous: Option<Fingerprint>,
}

impl Session {
    fn login_due(&self, refresh: Duration) -> bool {
        match (&self.credential, self.last_login) {
            (Some(_), Some(at)) => at.elapsed() >= refresh,
            _ => true,
        }
    }
}

/// What the current cycle has observed so far.
#[derive(Default)]
struct Cycle {
    correlation_id: String,
    slot_lines: Vec<String>,
    fingerprint: Option<Fingerprint>,
    failure: Option<(String, String)>,
}

impl Cycle {
    fn start() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string(), ..Self::default() }
    }
}

/// Poll loop that drives [`PollFlow`] against a slot source.
pub struct Watcher {
    source: Arc<dyn SlotSource>,
    queue: Arc<NotificationQueue>,
    filter: SearchFilter,
    timings: WatchTimings,
    flow: PollFlow,
    status: Arc<WatchStatus>,
}

impl Watcher {
    pub fn new(
        source: Arc<dyn SlotSource>,
        queue: Arc<NotificationQueue>,
        filter: SearchFilter,
        timings: WatchTimings,
    ) -> Self {
        Self {
            source,
            queue,
            filter,
            timings,
            flow: PollFlow,
            status: Arc::new(WatchStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<WatchStatus> {
        Arc::clone(&self.status)
    }

    /// Never returns. Stops only when the surrounding task is dropped.
    pub async fn run(&self) {
        self.queue.flush(FlushRequest::titled(PROGRAM_STARTED));
        info!(event_name = "watcher.started", filter = ?self.filter, "watcher started");

        let mut session = Session {
            state: self.flow.initial_state(),
            last_login: None,
            credential: None,
            previous: None,
        };

        loop {
            let mut cycle = Cycle::start();
            if let Err(error) = self.cycle(&mut session, &mut cycle).await {
                self.recover(&mut session, &mut cycle, &error).await;
            }
        }
    }

    async fn cycle(&self, session: &mut Session, cycle: &mut Cycle) -> Result<(), WatchError> {
        if session.login_due(self.timings.login_refresh) {
            self.step(session, cycle, PollEvent::LoginRequired).await?;
            self.step(session, cycle, PollEvent::LoginSucceeded).await?;
        }

        let slots = self.source.fetch_slots(&self.filter).await?;
        let current = fingerprint(&slots);
        cycle.slot_lines = slots.iter().map(Slot::notification_line).collect();
        cycle.fingerprint = Some(current.clone());
        self.status.record_slots(cycle.slot_lines.clone(), current.clone());

        let event = match classify(session.previous.as_ref(), &current) {
            ChangeKind::FirstSeen => PollEvent::SlotsFirstSeen,
            ChangeKind::Unchanged => PollEvent::SlotsUnchanged,
            ChangeKind::Changed => PollEvent::SlotsChanged,
        };
        debug!(
            event_name = "watcher.cycle.classified",
            correlation_id = %cycle.correlation_id,
            slot_count = slots.len(),
            fingerprint = current.short(),
            change = ?event,
            "slots classified"
        );
        self.step(session, cycle, event).await?;

        while session.state == PollState::Alerting {
            self.step(session, cycle, PollEvent::AlertRepeated).await?;
        }

        Ok(())
    }

    async fn step(
        &self,
        session: &mut Session,
        cycle: &Cycle,
        event: PollEvent,
    ) -> Result<(), WatchError> {
        let outcome = self.flow.apply(session.state, event)?;
        self.enter(session, cycle, &outcome);
        for action in &outcome.actions {
            self.perform(*action, session, cycle).await?;
        }
        Ok(())
    }

    fn enter(&self, session: &mut Session, cycle: &Cycle, outcome: &TransitionOutcome) {
        debug!(
            event_name = "watcher.transition",
            correlation_id = %cycle.correlation_id,
            from = ?outcome.from,
            to = ?outcome.to,
            event = ?outcome.event,
            "poll state transition"
        );
        session.state = outcome.to;
        self.status.set_state(outcome.to);
    }

    async fn perform(
        &self,
        action: PollAction,
        session: &mut Session,
        cycle: &Cycle,
    ) -> Result<(), WatchError> {
        match action {
            PollAction::Authenticate => {
                let credential = self.source.authenticate().await?;
                info!(
                    event_name = "watcher.login.succeeded",
                    correlation_id = %cycle.correlation_id,
                    grant_type = credential.grant_type(),
                    "authenticated against reservation source"
                );
                session.credential = Some(credential);
                session.last_login = Some(Instant::now());
            }
            PollAction::SettleSession => tokio::time::sleep(self.timings.login_settle).await,
            PollAction::AnnounceSearchStarted => self.announce(SEARCH_STARTED, cycle),
            PollAction::AnnounceChange => {
                warn!(
                    event_name = "watcher.cycle.changed",
                    correlation_id = %cycle.correlation_id,
                    slot_count = cycle.slot_lines.len(),
                    "slot listing changed"
                );
                self.announce(CHANGE_DETECTED, cycle);
            }
            PollAction::StoreFingerprint => session.previous = cycle.fingerprint.clone(),
            PollAction::ReportError => {
                if let Some((message, report)) = &cycle.failure {
                    self.queue.append(message);
                    self.queue.append(report);
                }
                self.queue.flush(FlushRequest::titled(ERROR_OCCURRED).warn());
            }
            PollAction::SleepPollInterval => tokio::time::sleep(self.timings.poll_interval).await,
            PollAction::SleepAlertInterval => tokio::time::sleep(self.timings.alert_interval).await,
            PollAction::SleepErrorBackoff => tokio::time::sleep(self.timings.error_backoff).await,
        }
        Ok(())
    }

    fn announce(&self, title: &str, cycle: &Cycle) {
        for line in &cycle.slot_lines {
            self.queue.append(line);
        }
        self.queue.flush(FlushRequest::titled(title));
    }

    async fn recover(&self, session: &mut Session, cycle: &mut Cycle, failure: &WatchError) {
        error!(
            event_name = "watcher.cycle.failed",
            correlation_id = %cycle.correlation_id,
            state = ?session.state,
            error = %failure,
            "poll cycle failed; backing off"
        );
        cycle.failure = Some((failure.to_string(), error_report(failure)));

        let outcome = self.flow.apply(session.state, PollEvent::CycleFailed).unwrap_or_else(
            |transition| {
                warn!(
                    event_name = "watcher.transition.forced",
                    correlation_id = %cycle.correlation_id,
                    error = %transition,
                    "forcing error backoff"
                );
                TransitionOutcome {
                    from: session.state,
                    to: PollState::ErrorBackoff,
                    event: PollEvent::CycleFailed,
                    actions: vec![PollAction::ReportError, PollAction::SleepErrorBackoff],
                }
            },
        );
        self.enter(session, cycle, &outcome);
        for action in &outcome.actions {
            if let Err(error) = self.perform(*action, session, cycle).await {
                warn!(
                    event_name = "watcher.recover.action_failed",
                    correlation_id = %cycle.correlation_id,
                    action = ?action,
                    error = %error,
                    "recovery action failed"
                );
            }
        }

        if let Err(transition) = self.step(session, cycle, PollEvent::BackoffElapsed).await {
            warn!(
                event_name = "watcher.transition.forced",
                correlation_id = %cycle.correlation_id,
                error = %transition,
                "resuming watch after backoff"
            );
            session.state = PollState::Watching;
            self.status.set_state(PollState::Watching);
        }
    }
}

/// Debug rendering of the error and its sources, cut to a fixed number of characters.
fn error_report(failure: &WatchError) -> String {
    let mut report = format!("{failure:?}");
    let mut source = failure.source();
    while let Some(cause) = source {
        report.push_str("\ncaused by: ");
        report.push_str(&cause.to_string());
        source = cause.source();
    }
    report.chars().take(ERROR_REPORT_CHARS).collect()
}
