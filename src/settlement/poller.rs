//! Settlement Poller
//!
//! Watches one payment until it settles. Two independent tasks run per
//! payment: a status task that asks the gateway on every poll tick, and a
//! countdown task that publishes the time left and enforces the absolute
//! deadline. The deadline fires at `expires_at` whatever the countdown
//! cadence, and no fetch starts once it has passed. Whichever reaches a
//! terminal outcome first wins; every later attempt is a no-op.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Serialize, Deserialize};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::core::clock::Clock;
use crate::core::liveness::LivenessGuard;
use crate::core::sync::lock;
use crate::external::gateway::PaymentGateway;
use crate::purchase::types::{Amount, DrawResult, Payment, PaymentId, PaymentStatus};

/// Poller timer cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Time between status fetches. The first fetch happens one interval
    /// after start.
    pub poll_interval: Duration,
    /// Time between countdown updates. The first update is immediate.
    pub countdown_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            countdown_interval: Duration::from_secs(1),
        }
    }
}

impl From<&PipelineConfig> for PollerConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            countdown_interval: config.countdown_interval,
        }
    }
}

/// Why a payment expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryReason {
    /// `expires_at` passed locally before approval.
    DeadlineElapsed,
    /// The provider reported the payment as expired.
    ProviderReported,
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeadlineElapsed => f.write_str("settlement deadline elapsed"),
            Self::ProviderReported => f.write_str("provider reported expiry"),
        }
    }
}

/// Terminal result of polling one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Payment approved; the draw came with the approval.
    Approved {
        /// Payment, now approved.
        payment: Payment,
        /// Server-side draw.
        draw: DrawResult,
        /// Amount the provider says it captured, when it reports one.
        approved_amount: Option<Amount>,
    },
    /// Payment expired before approval.
    Expired {
        /// Payment, now expired.
        payment: Payment,
        /// Deadline or provider.
        reason: ExpiryReason,
    },
    /// Provider cancelled the payment.
    Cancelled {
        /// Payment, now cancelled.
        payment: Payment,
    },
}

impl SettlementOutcome {
    /// Payment in its terminal status.
    pub fn payment(&self) -> &Payment {
        match self {
            Self::Approved { payment, .. }
            | Self::Expired { payment, .. }
            | Self::Cancelled { payment } => payment,
        }
    }
}

/// Ways the poller can end.
enum Termination {
    Approved {
        draw: DrawResult,
        approved_amount: Option<Amount>,
    },
    Expired(ExpiryReason),
    Cancelled,
    /// Owner stopped polling; no outcome.
    Abort,
}

struct PollState {
    payment: Payment,
    terminated: bool,
    outcome_tx: Option<oneshot::Sender<SettlementOutcome>>,
}

/// State shared by both tasks and the cancel handle.
struct Shared {
    state: Mutex<PollState>,
    guard: LivenessGuard,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    /// Compare-and-set termination.
    ///
    /// Returns true only for the call that moved the poller to terminal.
    fn terminate(&self, termination: Termination) -> bool {
        let mut state = lock(&self.state);
        if state.terminated {
            return false;
        }
        state.terminated = true;

        let payment_id = state.payment.payment_id.clone();
        let outcome = if !matches!(termination, Termination::Abort) && !self.guard.is_live() {
            debug!(payment = %payment_id, "Session gone, discarding settlement");
            None
        } else {
            match termination {
                Termination::Abort => None,
                Termination::Approved { draw, approved_amount } => {
                    apply(&mut state.payment, PaymentStatus::Approved);
                    Some(SettlementOutcome::Approved {
                        payment: state.payment.clone(),
                        draw,
                        approved_amount,
                    })
                }
                Termination::Expired(reason) => {
                    apply(&mut state.payment, PaymentStatus::Expired);
                    Some(SettlementOutcome::Expired {
                        payment: state.payment.clone(),
                        reason,
                    })
                }
                Termination::Cancelled => {
                    apply(&mut state.payment, PaymentStatus::Cancelled);
                    Some(SettlementOutcome::Cancelled {
                        payment: state.payment.clone(),
                    })
                }
            }
        };

        let outcome_tx = state.outcome_tx.take();
        drop(state);

        self.shutdown.send_replace(true);

        if let (Some(tx), Some(outcome)) = (outcome_tx, outcome) {
            if tx.send(outcome).is_err() {
                debug!(payment = %payment_id, "Settlement outcome dropped, nobody waiting");
            }
        }
        true
    }

    fn is_terminated(&self) -> bool {
        lock(&self.state).terminated
    }
}

fn apply(payment: &mut Payment, status: PaymentStatus) {
    if let Err(e) = payment.apply_status(status) {
        warn!(payment = %payment.payment_id, error = %e, "Status change refused");
    }
}

/// Resolves once shutdown has been signalled.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Synchronous, idempotent stop switch for a poller.
#[derive(Clone)]
pub struct PollerCancel {
    shared: Arc<Shared>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PollerCancel {
    /// Stop polling without an outcome.
    ///
    /// Returns false when the poller had already terminated. Both tasks are
    /// aborted either way.
    pub fn cancel(&self) -> bool {
        let first = self.shared.terminate(Termination::Abort);
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        if first {
            debug!("Settlement polling cancelled");
        }
        first
    }

    /// Has the poller reached a terminal state?
    pub fn is_terminated(&self) -> bool {
        self.shared.is_terminated()
    }
}

/// Running poller for one payment.
pub struct SettlementPoller {
    payment_id: PaymentId,
    outcome_rx: oneshot::Receiver<SettlementOutcome>,
    remaining_rx: watch::Receiver<Duration>,
    cancel: PollerCancel,
}

impl SettlementPoller {
    /// Start polling a pending payment.
    pub fn start(
        payment: Payment,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        guard: LivenessGuard,
        config: PollerConfig,
    ) -> Self {
        let payment_id = payment.payment_id.clone();
        let expires_at = payment.expires_at;
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (remaining_tx, remaining_rx) = watch::channel(payment.remaining(clock.now()));
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            state: Mutex::new(PollState {
                payment,
                terminated: false,
                outcome_tx: Some(outcome_tx),
            }),
            guard,
            shutdown,
        });

        let status_task = tokio::spawn(run_status_task(
            shared.clone(),
            gateway,
            clock.clone(),
            payment_id.clone(),
            expires_at,
            config.poll_interval,
        ));
        let countdown_task = tokio::spawn(run_countdown_task(
            shared.clone(),
            clock,
            expires_at,
            remaining_tx,
            config.countdown_interval,
        ));

        info!(payment = %payment_id, %expires_at, "Settlement polling started");

        Self {
            payment_id,
            outcome_rx,
            remaining_rx,
            cancel: PollerCancel {
                shared,
                tasks: Arc::new(Mutex::new(vec![status_task, countdown_task])),
            },
        }
    }

    /// Payment being polled.
    pub fn payment_id(&self) -> &PaymentId {
        &self.payment_id
    }

    /// Cancel handle, cloneable.
    pub fn cancel_handle(&self) -> PollerCancel {
        self.cancel.clone()
    }

    /// Observer of the time left before the deadline.
    pub fn remaining(&self) -> watch::Receiver<Duration> {
        self.remaining_rx.clone()
    }

    /// Wait for the terminal outcome.
    ///
    /// `None` when the poller was cancelled or its session went away.
    pub async fn outcome(self) -> Option<SettlementOutcome> {
        self.outcome_rx.await.ok()
    }
}

async fn run_status_task(
    shared: Arc<Shared>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    payment_id: PaymentId,
    expires_at: chrono::DateTime<chrono::Utc>,
    poll_interval: Duration,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stopped(&mut shutdown) => break,
        }

        // Past the deadline only expiry is possible
        if clock.now() >= expires_at {
            if shared.terminate(Termination::Expired(ExpiryReason::DeadlineElapsed)) {
                info!(payment = %payment_id, %expires_at, "Settlement deadline elapsed");
            }
            break;
        }

        let report = tokio::select! {
            report = gateway.payment_status(&payment_id) => report,
            _ = stopped(&mut shutdown) => break,
        };

        let report = match report {
            Ok(report) => report,
            Err(e) => {
                debug!(payment = %payment_id, error = %e, "Status fetch failed, retrying");
                continue;
            }
        };

        let approved_amount = report.approved_amount;
        let termination = match (report.status, report.draw) {
            (PaymentStatus::Pending, _) => {
                debug!(payment = %payment_id, "Payment pending");
                continue;
            }
            (PaymentStatus::Approved, Some(draw)) => Termination::Approved { draw, approved_amount },
            (PaymentStatus::Approved, None) => {
                debug!(payment = %payment_id, "Approved without draw, retrying");
                continue;
            }
            (PaymentStatus::Expired, _) => Termination::Expired(ExpiryReason::ProviderReported),
            (PaymentStatus::Cancelled, _) => Termination::Cancelled,
        };

        if shared.terminate(termination) {
            info!(payment = %payment_id, status = %report.status, "Payment settled");
        }
        break;
    }
}

async fn run_countdown_task(
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    expires_at: chrono::DateTime<chrono::Utc>,
    remaining_tx: watch::Sender<Duration>,
    countdown_interval: Duration,
) {
    let mut shutdown = shared.shutdown.subscribe();
    let mut ticker = interval(countdown_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let deadline = sleep_until(Instant::now() + remaining_until(clock.as_ref(), expires_at));
    tokio::pin!(deadline);

    loop {
        let remaining = tokio::select! {
            _ = ticker.tick() => remaining_until(clock.as_ref(), expires_at),
            _ = &mut deadline => Duration::ZERO,
            _ = stopped(&mut shutdown) => break,
        };
        remaining_tx.send_replace(remaining);

        if remaining.is_zero() {
            if shared.terminate(Termination::Expired(ExpiryReason::DeadlineElapsed)) {
                info!(%expires_at, "Settlement deadline elapsed");
            }
            break;
        }
    }
}

fn remaining_until(clock: &dyn Clock, expires_at: chrono::DateTime<chrono::Utc>) -> Duration {
    (expires_at - clock.now()).to_std().unwrap_or(Duration::ZERO)
}
