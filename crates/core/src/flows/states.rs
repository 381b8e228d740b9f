use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollState {
    Init,
    Authenticating,
    Watching,
    Alerting,
    ErrorBackoff,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollEvent {
    LoginRequired,
    LoginSucceeded,
    SlotsUnchanged,
    SlotsFirstSeen,
    SlotsChanged,
    AlertRepeated,
    CycleFailed,
    BackoffElapsed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollAction {
    Authenticate,
    SettleSession,
    AnnounceSearchStarted,
    AnnounceChange,
    StoreFingerprint,
    ReportError,
    SleepPollInterval,
    SleepAlertInterval,
    SleepErrorBackoff,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: PollState,
    pub to: PollState,
    pub event: PollEvent,
    pub actions: Vec<PollAction>,
}
