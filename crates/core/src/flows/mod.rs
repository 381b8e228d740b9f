pub mod engine;
pub mod states;

pub use engine::{PollFlow, PollTransitionError};
pub use states::{PollAction, PollEvent, PollState, TransitionOutcome};
