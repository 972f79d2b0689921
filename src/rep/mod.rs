pub mod counter;
pub mod state_machine;

pub use counter::{Rep, RepCounter};
pub use state_machine::{Hand, RepKeypoints, RepState, RepStateMachine};
