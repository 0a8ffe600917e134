//! Reveal events broadcast to presentation.

use serde::{Serialize, Deserialize};
use uuid::Uuid;

use crate::purchase::types::DrawResult;
use crate::reveal::machine::RevealPhase;

/// Event emitted by a reveal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RevealEvent {
    /// Phase moved.
    PhaseChanged {
        /// Session.
        session_id: Uuid,
        /// Previous phase.
        from: RevealPhase,
        /// New phase.
        to: RevealPhase,
    },
    /// Item revealed. Emitted once per session.
    Revealed {
        /// Session.
        session_id: Uuid,
        /// Draw shown to the user.
        draw: DrawResult,
    },
}

impl RevealEvent {
    /// Session the event belongs to.
    pub fn session_id(&self) -> Uuid {
        match self {
            Self::PhaseChanged { session_id, .. } | Self::Revealed { session_id, .. } => *session_id,
        }
    }
}
