//! Reveal State Machine
//!
//! One machine per purchase session:
//!
//! ```text
//!   Idle ──start(approved)──▶ Opening ──receive_draw──▶ Revealed
//!     │                          │                         │
//!     └──────────── close() ─────┴──────── close() ────────┴──▶ Closed
//! ```
//!
//! Closing invalidates the session liveness and cancels the attached
//! poller, so nothing scheduled earlier can touch a closed session.

use std::fmt;

use serde::{Serialize, Deserialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::liveness::Liveness;
use crate::purchase::types::{DrawResult, Payment, PaymentId, PaymentStatus};
use crate::reveal::events::RevealEvent;
use crate::settlement::poller::PollerCancel;

/// Reveal session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPhase {
    /// Waiting for an approved payment.
    Idle,
    /// Payment approved, waiting for the draw.
    Opening,
    /// Item shown.
    Revealed,
    /// Session over.
    Closed,
}

impl fmt::Display for RevealPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::Revealed => "revealed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Reveal errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    /// Action not allowed in the current phase.
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        /// Phase at the time of the call.
        from: RevealPhase,
        /// Attempted action.
        action: &'static str,
    },

    /// Draw belongs to another payment.
    #[error("draw for payment {got} does not belong to payment {expected}")]
    DrawMismatch {
        /// Active payment.
        expected: PaymentId,
        /// Payment named by the draw.
        got: PaymentId,
    },

    /// Session already closed.
    #[error("reveal session closed")]
    SessionClosed,
}

/// Reveal state machine for one purchase.
pub struct RevealStateMachine {
    session_id: Uuid,
    phase: RevealPhase,
    payment: Option<Payment>,
    draw: Option<DrawResult>,
    liveness: Liveness,
    poller: Option<PollerCancel>,
    events: broadcast::Sender<RevealEvent>,
}

impl RevealStateMachine {
    /// Create an idle session bound to a liveness token.
    pub fn new(liveness: Liveness, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            session_id: Uuid::new_v4(),
            phase: RevealPhase::Idle,
            payment: None,
            draw: None,
            liveness,
            poller: None,
            events,
        }
    }

    /// Session identifier.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current phase.
    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    /// Active payment, once started.
    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    /// Revealed draw.
    pub fn draw(&self) -> Option<&DrawResult> {
        self.draw.as_ref()
    }

    /// Liveness token of this session.
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Subscribe to phase changes and the reveal notification.
    pub fn subscribe(&self) -> broadcast::Receiver<RevealEvent> {
        self.events.subscribe()
    }

    /// Attach the poller that `close` must cancel.
    ///
    /// Attaching to a closed session cancels the poller immediately.
    pub fn attach_poller(&mut self, poller: PollerCancel) {
        if self.phase == RevealPhase::Closed {
            poller.cancel();
            return;
        }
        self.poller = Some(poller);
    }

    /// Begin opening for an approved payment.
    pub fn start(&mut self, payment: &Payment) -> Result<(), RevealError> {
        match self.phase {
            RevealPhase::Closed => return Err(RevealError::SessionClosed),
            RevealPhase::Idle => {}
            from => return Err(RevealError::InvalidTransition { from, action: "start" }),
        }

        if payment.status() != PaymentStatus::Approved {
            return Err(RevealError::InvalidTransition {
                from: self.phase,
                action: "start with an unapproved payment",
            });
        }

        self.payment = Some(payment.clone());
        self.transition(RevealPhase::Opening);
        Ok(())
    }

    /// Show the draw for the active payment.
    ///
    /// A draw for another payment is refused and the session stays
    /// `Opening`.
    pub fn receive_draw(&mut self, draw: DrawResult) -> Result<(), RevealError> {
        match self.phase {
            RevealPhase::Closed => return Err(RevealError::SessionClosed),
            RevealPhase::Opening => {}
            from => return Err(RevealError::InvalidTransition { from, action: "receive a draw" }),
        }

        let expected = match &self.payment {
            Some(payment) => payment.payment_id.clone(),
            None => {
                return Err(RevealError::InvalidTransition {
                    from: self.phase,
                    action: "receive a draw without a payment",
                })
            }
        };

        if draw.payment_id != expected {
            warn!(
                session = %self.session_id,
                expected = %expected,
                got = %draw.payment_id,
                "Draw does not match active payment"
            );
            return Err(RevealError::DrawMismatch {
                expected,
                got: draw.payment_id,
            });
        }

        self.draw = Some(draw.clone());
        self.transition(RevealPhase::Revealed);

        info!(session = %self.session_id, item = %draw.item_id, "Item revealed");
        let _ = self.events.send(RevealEvent::Revealed {
            session_id: self.session_id,
            draw,
        });
        Ok(())
    }

    /// Close the session.
    ///
    /// Returns false if it was already closed.
    pub fn close(&mut self) -> bool {
        if self.phase == RevealPhase::Closed {
            return false;
        }

        self.liveness.invalidate();
        if let Some(poller) = self.poller.take() {
            poller.cancel();
        }
        self.transition(RevealPhase::Closed);
        true
    }

    fn transition(&mut self, to: RevealPhase) {
        let from = self.phase;
        self.phase = to;
        debug!(session = %self.session_id, %from, %to, "Reveal phase changed");
        let _ = self.events.send(RevealEvent::PhaseChanged {
            session_id: self.session_id,
            from,
            to,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::fairness::commitment::DrawCommitment;
    use crate::purchase::types::ItemId;

    fn payment(id: &str, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        let mut payment =
            Payment::new(PaymentId::new(id), 100, now, now + chrono::Duration::seconds(60), "ref").unwrap();
        if status != PaymentStatus::Pending {
            payment.apply_status(status).unwrap();
        }
        payment
    }

    fn draw(id: &str) -> DrawResult {
        DrawResult {
            payment_id: PaymentId::new(id),
            item_id: ItemId::new("gem"),
            commitment: DrawCommitment::disclosed("server", "client"),
            derived_index: 1,
            timestamp: Utc::now(),
        }
    }

    fn machine() -> RevealStateMachine {
        RevealStateMachine::new(Liveness::new(), 16)
    }

    #[test]
    fn test_happy_path_emits_events() {
        let mut machine = machine();
        let mut events = machine.subscribe();

        machine.start(&payment("pay-1", PaymentStatus::Approved)).unwrap();
        assert_eq!(machine.phase(), RevealPhase::Opening);

        machine.receive_draw(draw("pay-1")).unwrap();
        assert_eq!(machine.phase(), RevealPhase::Revealed);
        assert_eq!(machine.draw().map(|d| d.item_id.as_str()), Some("gem"));

        let session_id = machine.session_id();
        assert_eq!(
            events.try_recv().unwrap(),
            RevealEvent::PhaseChanged { session_id, from: RevealPhase::Idle, to: RevealPhase::Opening }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            RevealEvent::PhaseChanged { session_id, from: RevealPhase::Opening, to: RevealPhase::Revealed }
        );
        assert!(matches!(events.try_recv().unwrap(), RevealEvent::Revealed { .. }));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_start_requires_approved_payment() {
        let mut machine = machine();
        let result = machine.start(&payment("pay-1", PaymentStatus::Pending));
        assert!(matches!(result, Err(RevealError::InvalidTransition { from: RevealPhase::Idle, .. })));
        assert_eq!(machine.phase(), RevealPhase::Idle);

        machine.start(&payment("pay-1", PaymentStatus::Approved)).unwrap();
        let again = machine.start(&payment("pay-1", PaymentStatus::Approved));
        assert!(matches!(again, Err(RevealError::InvalidTransition { from: RevealPhase::Opening, .. })));
    }

    #[test]
    fn test_mismatched_draw_is_refused() {
        let mut machine = machine();
        machine.start(&payment("pay-1", PaymentStatus::Approved)).unwrap();

        let result = machine.receive_draw(draw("pay-2"));
        assert_eq!(
            result,
            Err(RevealError::DrawMismatch {
                expected: PaymentId::new("pay-1"),
                got: PaymentId::new("pay-2"),
            })
        );
        assert_eq!(machine.phase(), RevealPhase::Opening);
        assert!(machine.draw().is_none());
    }

    #[test]
    fn test_draw_outside_opening() {
        let mut machine = machine();
        assert!(matches!(
            machine.receive_draw(draw("pay-1")),
            Err(RevealError::InvalidTransition { from: RevealPhase::Idle, .. })
        ));

        machine.start(&payment("pay-1", PaymentStatus::Approved)).unwrap();
        machine.receive_draw(draw("pay-1")).unwrap();
        assert!(matches!(
            machine.receive_draw(draw("pay-1")),
            Err(RevealError::InvalidTransition { from: RevealPhase::Revealed, .. })
        ));
    }

    #[test]
    fn test_close_is_idempotent_and_kills_liveness() {
        let mut machine = machine();
        let guard = machine.liveness().guard();

        assert!(machine.close());
        assert!(!machine.close());
        assert!(!guard.is_live());
        assert_eq!(machine.phase(), RevealPhase::Closed);

        assert_eq!(machine.receive_draw(draw("pay-1")), Err(RevealError::SessionClosed));
        assert_eq!(
            machine.start(&payment("pay-1", PaymentStatus::Approved)),
            Err(RevealError::SessionClosed)
        );
    }

    #[test]
    fn test_close_from_revealed() {
        let mut machine = machine();
        machine.start(&payment("pay-1", PaymentStatus::Approved)).unwrap();
        machine.receive_draw(draw("pay-1")).unwrap();

        let mut events = machine.subscribe();
        assert!(machine.close());
        assert!(matches!(
            events.try_recv().unwrap(),
            RevealEvent::PhaseChanged { to: RevealPhase::Closed, .. }
        ));
        // Draw stays readable after close
        assert!(machine.draw().is_some());
    }
}
