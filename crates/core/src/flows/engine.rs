use thiserror::Error;

use crate::flows::states::{PollAction, PollEvent, PollState, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PollTransitionError {
    #[error("invalid poll transition from {state:?} using event {event:?}")]
    InvalidTransition { state: PollState, event: PollEvent },
}

/// Transition table of the poll loop.
///
/// Once `SlotsChanged` moves the loop into `Alerting`, the only way out is
/// `CycleFailed`: the alarm repeats until the process stops or a cycle error
/// is raised.
#[derive(Clone, Debug, Default)]
pub struct PollFlow;

impl PollFlow {
    pub fn initial_state(&self) -> PollState {
        PollState::Init
    }

    pub fn apply(
        &self,
        current: PollState,
        event: PollEvent,
    ) -> Result<TransitionOutcome, PollTransitionError> {
        use PollAction::{
            AnnounceChange, AnnounceSearchStarted, Authenticate, ReportError, SettleSession,
            SleepAlertInterval, SleepErrorBackoff, SleepPollInterval, StoreFingerprint,
        };
        use PollEvent::{
            AlertRepeated, BackoffElapsed, CycleFailed, LoginRequired, LoginSucceeded,
            SlotsChanged, SlotsFirstSeen, SlotsUnchanged,
        };
        use PollState::{Alerting, Authenticating, ErrorBackoff, Init, Watching};

        let (to, actions) = match (current, event) {
            (Init, LoginRequired) | (Watching, LoginRequired) => {
                (Authenticating, vec![Authenticate])
            }
            (Authenticating, LoginSucceeded) => (Watching, vec![SettleSession]),
            (Watching, SlotsUnchanged) => (Watching, vec![SleepPollInterval]),
            (Watching, SlotsFirstSeen) => {
                (Watching, vec![AnnounceSearchStarted, StoreFingerprint, SleepPollInterval])
            }
            (Watching, SlotsChanged) | (Alerting, AlertRepeated) => {
                (Alerting, vec![AnnounceChange, SleepAlertInterval])
            }
            (Init | Authenticating | Watching | Alerting, CycleFailed) => {
                (ErrorBackoff, vec![ReportError, SleepErrorBackoff])
            }
            (ErrorBackoff, BackoffElapsed) => (Watching, Vec::new()),
            (state, event) => {
                return Err(PollTransitionError::InvalidTransition { state, event });
            }
        };

        Ok(TransitionOutcome { from: current, to, event, actions })
    }
}
