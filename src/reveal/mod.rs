//! Reveal sessions.
//!
//! The state machine owns a purchase's presentation phase. Presentation
//! only ever reads the broadcast events.

pub mod events;
pub mod machine;

pub use events::RevealEvent;
pub use machine::{RevealError, RevealPhase, RevealStateMachine};
