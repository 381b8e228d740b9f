pub mod config;
pub mod detector;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod source;

pub use detector::{classify, fingerprint, ChangeKind, Fingerprint};
pub use domain::search::SearchFilter;
pub use domain::slot::{Slot, SlotFields, SlotValidationError};
pub use errors::{SourceError, WatchError};
pub use flows::{PollAction, PollEvent, PollFlow, PollState, PollTransitionError, TransitionOutcome};
pub use source::{Credential, SlotSource};
