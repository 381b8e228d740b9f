use thiserror::Error;

use crate::domain::slot::SlotValidationError;
use crate::flows::PollTransitionError;

/// Failures of the reservation source. Each one aborts the current poll cycle.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("request to {endpoint} failed: {message}")]
    Request { endpoint: String, message: String },
    #[error("{endpoint} returned status {status}: {body}")]
    Status { endpoint: String, status: u16, body: String },
    #[error("could not decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },
    #[error(transparent)]
    Validation(#[from] SlotValidationError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Transition(#[from] PollTransitionError),
}
