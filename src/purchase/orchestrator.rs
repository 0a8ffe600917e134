//! Purchase Orchestrator
//!
//! Runs one purchase from intent to reveal:
//!
//! ```text
//!   buy() ─▶ catalog ─▶ create_payment ─▶ SettlementPoller ─▶ driver task
//!                                                                 │
//!                      ┌────────── approved ──────────────────────┤
//!                      ▼                                          ▼
//!   start ─▶ verify ─▶ claim ─▶ debit ─▶ reveal            expired / cancelled
//!                                                                 │
//!                                                          notice (retry)
//! ```
//!
//! `verify` checks the draw's payment id, the approved amount and the
//! pre-commitment. A draw that fails any of them never reaches the ledger
//! or the user's balance.
//!
//! Each purchase owns its own liveness token, reveal machine, poller and
//! channels. The settlement step runs under the reveal machine's lock
//! after a liveness check, so a cancel that wins the lock leaves nothing
//! behind.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PipelineConfig;
use crate::core::clock::Clock;
use crate::core::hash::short_hex;
use crate::core::liveness::{Liveness, LivenessGuard};
use crate::core::sync::lock;
use crate::external::account::AccountStore;
use crate::external::catalog::CatalogSource;
use crate::external::gateway::PaymentGateway;
use crate::external::notifier::Notifier;
use crate::fairness::verify::check_pre_commitment;
use crate::purchase::error::PurchaseError;
use crate::purchase::ledger::{ClaimResult, SettlementEntry, SettlementLedger};
use crate::purchase::types::{
    Amount, BoxId, DrawResult, Payment, PaymentId, PurchaseId, PurchaseIntent, UserId,
};
use crate::reveal::events::RevealEvent;
use crate::reveal::machine::{RevealPhase, RevealStateMachine};
use crate::settlement::poller::{PollerConfig, SettlementOutcome, SettlementPoller};

/// Observable state of one purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseState {
    /// Payment created, waiting for approval.
    AwaitingSettlement,
    /// Item revealed.
    Revealed(DrawResult),
    /// Purchase failed.
    Failed(PurchaseError),
    /// Cancelled by the user.
    Cancelled,
}

impl PurchaseState {
    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::AwaitingSettlement)
    }
}

/// Drives purchases against injected collaborators.
pub struct PurchaseOrchestrator {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<dyn CatalogSource>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ledger: Arc<SettlementLedger>,
    config: PipelineConfig,
}

impl PurchaseOrchestrator {
    /// Create an orchestrator with a fresh settlement ledger.
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<dyn CatalogSource>,
        accounts: Arc<dyn AccountStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            gateway,
            catalog,
            accounts,
            notifier,
            clock,
            ledger: Arc::new(SettlementLedger::new()),
            config,
        }
    }

    /// Share a settlement ledger with other orchestrators.
    pub fn with_ledger(mut self, ledger: Arc<SettlementLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    /// Settlement ledger.
    pub fn ledger(&self) -> &Arc<SettlementLedger> {
        &self.ledger
    }

    /// Pipeline configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Buy one box.
    ///
    /// Returns once the payment exists; settlement continues in the
    /// background and is observed through the handle.
    #[instrument(skip_all, fields(user = %user_id, box_id = %box_id))]
    pub async fn buy(&self, user_id: UserId, box_id: BoxId) -> Result<PurchaseHandle, PurchaseError> {
        let listing = self
            .catalog
            .box_listing(&box_id)
            .await
            .map_err(PurchaseError::CatalogUnavailable)?;

        let intent = PurchaseIntent::new(user_id.clone(), box_id, listing.price);
        let payment = self.gateway.create_payment(&intent).await.map_err(|e| {
            warn!(error = %e, "Payment creation failed");
            PurchaseError::PaymentCreationFailed(e)
        })?;

        let purchase_id = uuid::Uuid::new_v4();
        let liveness = Liveness::new();
        let guard = liveness.guard();
        let mut machine = RevealStateMachine::new(liveness, self.config.event_buffer);

        let poller = SettlementPoller::start(
            payment.clone(),
            self.gateway.clone(),
            self.clock.clone(),
            guard.clone(),
            PollerConfig::from(&self.config),
        );
        machine.attach_poller(poller.cancel_handle());
        let countdown = poller.remaining();

        let (state_tx, state_rx) = watch::channel(PurchaseState::AwaitingSettlement);
        let session = Arc::new(PurchaseSession {
            purchase_id,
            user_id,
            payment_id: payment.payment_id.clone(),
            published_commitment: payment.commitment_hash.clone(),
            machine: Mutex::new(machine),
            state_tx,
            accounts: self.accounts.clone(),
            notifier: self.notifier.clone(),
            clock: self.clock.clone(),
            ledger: self.ledger.clone(),
        });

        let driver = tokio::spawn(drive(session.clone(), poller, guard));

        info!(
            purchase = %purchase_id,
            payment = %payment.payment_id,
            amount = payment.amount,
            "Purchase started"
        );

        Ok(PurchaseHandle {
            session,
            driver,
            state_rx,
            countdown,
        })
    }

    /// Cancel a purchase. Same as [`PurchaseHandle::cancel`].
    pub fn cancel(&self, handle: &PurchaseHandle) -> bool {
        handle.cancel()
    }
}

/// State shared by a purchase's driver task and its handle.
struct PurchaseSession {
    purchase_id: PurchaseId,
    user_id: UserId,
    payment_id: PaymentId,
    published_commitment: Option<String>,
    machine: Mutex<RevealStateMachine>,
    state_tx: watch::Sender<PurchaseState>,
    accounts: Arc<dyn AccountStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ledger: Arc<SettlementLedger>,
}

impl PurchaseSession {
    /// Apply a settlement outcome. Runs entirely under the machine lock.
    fn settle(&self, outcome: SettlementOutcome, guard: &LivenessGuard) {
        let mut machine = lock(&self.machine);

        if !guard.is_live() {
            if let SettlementOutcome::Approved { payment, .. } = &outcome {
                warn!(
                    purchase = %self.purchase_id,
                    payment = %payment.payment_id,
                    "Payment approved after cancellation, needs reconciliation"
                );
            }
            return;
        }

        let result = match outcome {
            SettlementOutcome::Approved { payment, draw, approved_amount } => {
                self.reveal(&mut machine, &payment, draw, approved_amount)
            }
            SettlementOutcome::Expired { reason, .. } => Err(PurchaseError::SettlementTimeout { reason }),
            SettlementOutcome::Cancelled { .. } => Err(PurchaseError::SettlementCancelled),
        };

        match result {
            Ok(draw) => {
                info!(purchase = %self.purchase_id, item = %draw.item_id, "Purchase revealed");
                self.state_tx.send_replace(PurchaseState::Revealed(draw));
            }
            Err(err) => self.fail(err),
        }
    }

    fn reveal(
        &self,
        machine: &mut RevealStateMachine,
        payment: &Payment,
        draw: DrawResult,
        approved_amount: Option<Amount>,
    ) -> Result<DrawResult, PurchaseError> {
        machine.start(payment)?;
        self.verify(payment, &draw, approved_amount)?;

        let entry = SettlementEntry {
            user_id: self.user_id.clone(),
            amount: payment.amount,
            settled_at: self.clock.now(),
        };

        match self.ledger.claim(&payment.payment_id, entry) {
            ClaimResult::Claimed => {
                let balance = self
                    .accounts
                    .debit(&self.user_id, payment.amount)
                    .map_err(PurchaseError::AccountUpdateFailed)?;
                debug!(purchase = %self.purchase_id, balance, "Account debited");
            }
            ClaimResult::AlreadySettled(_) => {
                debug!(purchase = %self.purchase_id, "Payment already settled, not debiting");
            }
        }

        machine.receive_draw(draw.clone())?;
        Ok(draw)
    }

    /// Checks an approved draw must pass before any money moves.
    fn verify(
        &self,
        payment: &Payment,
        draw: &DrawResult,
        approved_amount: Option<Amount>,
    ) -> Result<(), PurchaseError> {
        if draw.payment_id != payment.payment_id {
            return Err(PurchaseError::DrawMismatch {
                expected: payment.payment_id.clone(),
                got: draw.payment_id.clone(),
            });
        }

        if let Some(approved) = approved_amount {
            if approved != payment.amount {
                return Err(PurchaseError::AmountMismatch {
                    expected: payment.amount,
                    approved,
                });
            }
        }

        match &self.published_commitment {
            Some(published) => check_pre_commitment(published, draw)?,
            None if draw.commitment.is_disclosed() => draw.commitment.check()?,
            None => {}
        }
        debug!(
            purchase = %self.purchase_id,
            commitment = %short_hex(&draw.commitment.commitment_hash),
            "Draw matches pre-commitment"
        );
        Ok(())
    }

    fn fail(&self, err: PurchaseError) {
        if err.is_recoverable() {
            info!(purchase = %self.purchase_id, error = %err, "Purchase failed");
        } else {
            error!(purchase = %self.purchase_id, error = %err, "Purchase failed");
        }
        self.notifier.notify(err.notice(self.purchase_id));
        self.state_tx.send_replace(PurchaseState::Failed(err));
    }
}

async fn drive(session: Arc<PurchaseSession>, poller: SettlementPoller, guard: LivenessGuard) {
    match poller.outcome().await {
        Some(outcome) => session.settle(outcome, &guard),
        None => debug!(purchase = %session.purchase_id, "Polling ended without outcome"),
    }
}

/// Caller's view of one purchase.
pub struct PurchaseHandle {
    session: Arc<PurchaseSession>,
    driver: JoinHandle<()>,
    state_rx: watch::Receiver<PurchaseState>,
    countdown: watch::Receiver<Duration>,
}

impl PurchaseHandle {
    /// Purchase identifier.
    pub fn id(&self) -> PurchaseId {
        self.session.purchase_id
    }

    /// Gateway payment id.
    pub fn payment_id(&self) -> &PaymentId {
        &self.session.payment_id
    }

    /// Cancel the purchase.
    ///
    /// Synchronous: when it returns, nothing scheduled for this purchase
    /// will change its state. Returns false if the purchase had already
    /// ended or been cancelled.
    pub fn cancel(&self) -> bool {
        let mut machine = lock(&self.session.machine);
        if self.state_rx.borrow().is_terminal() {
            return false;
        }

        machine.close();
        self.session.state_tx.send_replace(PurchaseState::Cancelled);
        drop(machine);

        self.driver.abort();
        info!(purchase = %self.session.purchase_id, "Purchase cancelled");
        true
    }

    /// Wait for a terminal state.
    pub async fn wait(&self) -> PurchaseState {
        let mut state_rx = self.state_rx.clone();
        if let Ok(state) = state_rx.wait_for(PurchaseState::is_terminal).await {
            return state.clone();
        }
        let state = state_rx.borrow().clone();
        state
    }

    /// Current state.
    pub fn state(&self) -> PurchaseState {
        self.state_rx.borrow().clone()
    }

    /// Current reveal phase.
    pub fn phase(&self) -> RevealPhase {
        lock(&self.session.machine).phase()
    }

    /// Revealed draw, if any.
    pub fn draw(&self) -> Option<DrawResult> {
        lock(&self.session.machine).draw().cloned()
    }

    /// Observer of the time left before the payment deadline.
    pub fn countdown(&self) -> watch::Receiver<Duration> {
        self.countdown.clone()
    }

    /// Subscribe to reveal events.
    pub fn subscribe(&self) -> broadcast::Receiver<RevealEvent> {
        lock(&self.session.machine).subscribe()
    }

    /// Close the reveal view after the purchase ended.
    ///
    /// Returns false while the purchase is still settling or when the view
    /// is already closed.
    pub fn dismiss(&self) -> bool {
        let mut machine = lock(&self.session.machine);
        if !self.state_rx.borrow().is_terminal() {
            return false;
        }
        machine.close()
    }
}

impl Drop for PurchaseHandle {
    fn drop(&mut self) {
        // Dropping the handle retires the purchase without publishing anything
        lock(&self.session.machine).close();
        self.driver.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::TokioClock;
    use crate::external::catalog::BoxListing;
    use crate::external::gateway::{GatewayError, StatusReport};
    use crate::external::memory::{MemoryAccounts, MemoryArchive, MemoryCatalog, MemoryNotifier};
    use crate::external::notifier::NoticeKind;
    use crate::external::scripted::{MemoryGateway, MemoryGatewayConfig, StatusStep};
    use crate::fairness::commitment::DrawCommitment;
    use crate::fairness::verify::FairnessError;
    use crate::fairness::weights::{WeightTable, WeightedItem};
    use crate::purchase::types::PaymentStatus;
    use crate::settlement::poller::ExpiryReason;
    use tokio::time::Instant;

    /// Gateway that rewrites approval reports on their way out.
    struct TamperingGateway {
        inner: Arc<MemoryGateway>,
        tamper: fn(&mut StatusReport),
    }

    #[async_trait::async_trait]
    impl PaymentGateway for TamperingGateway {
        async fn create_payment(&self, intent: &PurchaseIntent) -> Result<Payment, GatewayError> {
            self.inner.create_payment(intent).await
        }

        async fn payment_status(&self, payment_id: &PaymentId) -> Result<StatusReport, GatewayError> {
            let mut report = self.inner.payment_status(payment_id).await?;
            if report.draw.is_some() {
                (self.tamper)(&mut report);
            }
            Ok(report)
        }
    }

    struct Harness {
        orchestrator: PurchaseOrchestrator,
        gateway: Arc<MemoryGateway>,
        accounts: Arc<MemoryAccounts>,
        notifier: Arc<MemoryNotifier>,
    }

    fn harness(ttl: Duration, script: Vec<StatusStep>, balance: u64) -> Harness {
        harness_with(ttl, script, balance, PipelineConfig::default(), |gateway| {
            gateway as Arc<dyn PaymentGateway>
        })
    }

    fn tampered(tamper: fn(&mut StatusReport)) -> Harness {
        harness_with(
            Duration::from_secs(600),
            approved_on_second(),
            1_000,
            PipelineConfig::default(),
            move |inner| Arc::new(TamperingGateway { inner, tamper }) as Arc<dyn PaymentGateway>,
        )
    }

    fn harness_with(
        ttl: Duration,
        script: Vec<StatusStep>,
        balance: u64,
        config: PipelineConfig,
        wrap: impl FnOnce(Arc<MemoryGateway>) -> Arc<dyn PaymentGateway>,
    ) -> Harness {
        let clock = Arc::new(TokioClock::new());
        let table = WeightTable::new(vec![
            WeightedItem::new("common", 70),
            WeightedItem::new("rare", 25),
            WeightedItem::new("legendary", 5),
        ])
        .unwrap();
        let catalog = Arc::new(MemoryCatalog::new().with_listing(BoxListing {
            box_id: BoxId::new("starter"),
            price: 300,
            table,
        }));
        let gateway = Arc::new(
            MemoryGateway::new(
                MemoryGatewayConfig { payment_ttl: ttl, reject_payments: false },
                clock.clone(),
                catalog.clone(),
                Arc::new(MemoryArchive::new()),
            )
            .with_script(script),
        );
        let accounts = Arc::new(MemoryAccounts::new().with_account("alice", balance));
        let notifier = Arc::new(MemoryNotifier::new());

        let orchestrator = PurchaseOrchestrator::new(
            wrap(gateway.clone()),
            catalog,
            accounts.clone(),
            notifier.clone(),
            clock,
            config,
        );

        Harness {
            orchestrator,
            gateway,
            accounts,
            notifier,
        }
    }

    fn approved_on_second() -> Vec<StatusStep> {
        vec![
            StatusStep::Status(PaymentStatus::Pending),
            StatusStep::Status(PaymentStatus::Approved),
        ]
    }

    async fn buy(h: &Harness) -> PurchaseHandle {
        h.orchestrator
            .buy(UserId::new("alice"), BoxId::new("starter"))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_approved_purchase_reveals_and_debits_once() {
        let h = harness(Duration::from_secs(600), approved_on_second(), 1_000);
        let handle = buy(&h).await;
        let mut events = handle.subscribe();

        let state = handle.wait().await;
        let draw = match state {
            PurchaseState::Revealed(draw) => draw,
            other => panic!("expected reveal, got {:?}", other),
        };

        assert_eq!(draw.payment_id, *handle.payment_id());
        assert_eq!(handle.phase(), RevealPhase::Revealed);
        assert_eq!(handle.draw(), Some(draw.clone()));

        let alice = UserId::new("alice");
        assert_eq!(h.accounts.balance(&alice).unwrap(), 700);
        assert_eq!(h.accounts.write_count(&alice), 1);
        assert!(h.orchestrator.ledger().is_settled(handle.payment_id()));

        let mut revealed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RevealEvent::Revealed { .. }) {
                revealed += 1;
            }
        }
        assert_eq!(revealed, 1);
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_purchase_leaves_balance_alone() {
        let h = harness(
            Duration::from_secs(2),
            vec![StatusStep::Status(PaymentStatus::Pending)],
            1_000,
        );
        let handle = buy(&h).await;

        assert_eq!(
            handle.wait().await,
            PurchaseState::Failed(PurchaseError::SettlementTimeout {
                reason: ExpiryReason::DeadlineElapsed
            })
        );
        assert_eq!(handle.phase(), RevealPhase::Idle);
        assert_eq!(h.accounts.balance(&UserId::new("alice")).unwrap(), 1_000);

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Dismissible { retry: true });
        assert_eq!(notices[0].purchase_id, handle.id());

        // A fresh purchase is always allowed
        h.gateway.set_script(approved_on_second());
        let retry = buy(&h).await;
        assert!(matches!(retry.wait().await, PurchaseState::Revealed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_cancellation_fails_purchase() {
        let h = harness(
            Duration::from_secs(600),
            vec![StatusStep::Status(PaymentStatus::Cancelled)],
            1_000,
        );
        let handle = buy(&h).await;

        assert_eq!(
            handle.wait().await,
            PurchaseState::Failed(PurchaseError::SettlementCancelled)
        );
        assert_eq!(h.accounts.write_count(&UserId::new("alice")), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_idempotent_and_final() {
        let h = harness(Duration::from_secs(600), approved_on_second(), 1_000);
        let handle = buy(&h).await;

        assert!(h.orchestrator.cancel(&handle));
        assert!(!handle.cancel());
        assert_eq!(handle.state(), PurchaseState::Cancelled);
        assert_eq!(handle.phase(), RevealPhase::Closed);

        // Approval would have landed at t=6
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(handle.state(), PurchaseState::Cancelled);
        assert_eq!(h.gateway.fetch_count(handle.payment_id()), 0);
        assert_eq!(h.accounts.write_count(&UserId::new("alice")), 0);
        assert!(h.notifier.notices().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_reveal_is_noop() {
        let h = harness(Duration::from_secs(600), approved_on_second(), 1_000);
        let handle = buy(&h).await;
        assert!(matches!(handle.wait().await, PurchaseState::Revealed(_)));

        assert!(!handle.cancel());
        assert!(matches!(handle.state(), PurchaseState::Revealed(_)));

        assert!(handle.dismiss());
        assert!(!handle.dismiss());
        assert_eq!(handle.phase(), RevealPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_debit_does_not_reveal() {
        let h = harness(Duration::from_secs(600), approved_on_second(), 100);
        let handle = buy(&h).await;

        match handle.wait().await {
            PurchaseState::Failed(PurchaseError::AccountUpdateFailed(_)) => {}
            other => panic!("expected account failure, got {:?}", other),
        }
        assert_eq!(handle.phase(), RevealPhase::Opening);
        assert!(handle.draw().is_none());
    }

    fn forge_commitment(report: &mut StatusReport) {
        if let Some(draw) = report.draw.as_mut() {
            draw.commitment = DrawCommitment::disclosed("forged", &draw.commitment.client_seed);
        }
    }

    fn redirect_draw(report: &mut StatusReport) {
        if let Some(draw) = report.draw.as_mut() {
            draw.payment_id = PaymentId::new("pay-elsewhere");
        }
    }

    fn short_capture(report: &mut StatusReport) {
        report.approved_amount = Some(30);
    }

    /// Integrity failure: nothing revealed, nothing charged, one notice to acknowledge.
    fn assert_rejected_untouched(h: &Harness, handle: &PurchaseHandle) {
        assert_eq!(handle.phase(), RevealPhase::Opening);
        assert!(handle.draw().is_none());

        let alice = UserId::new("alice");
        assert_eq!(h.accounts.balance(&alice).unwrap(), 1_000);
        assert_eq!(h.accounts.write_count(&alice), 0);
        assert!(!h.orchestrator.ledger().is_settled(handle.payment_id()));

        let notices = h.notifier.notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::AcknowledgementRequired);
        assert_eq!(notices[0].purchase_id, handle.id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forged_commitment_is_rejected_before_debit() {
        let h = tampered(forge_commitment);
        let handle = buy(&h).await;

        match handle.wait().await {
            PurchaseState::Failed(PurchaseError::FairnessVerificationFailed(
                FairnessError::PreCommitmentMismatch { .. },
            )) => {}
            other => panic!("expected fairness failure, got {:?}", other),
        }
        assert_rejected_untouched(&h, &handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draw_for_another_payment_is_rejected() {
        let h = tampered(redirect_draw);
        let handle = buy(&h).await;

        assert_eq!(
            handle.wait().await,
            PurchaseState::Failed(PurchaseError::DrawMismatch {
                expected: handle.payment_id().clone(),
                got: PaymentId::new("pay-elsewhere"),
            })
        );
        assert_rejected_untouched(&h, &handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_approved_amount_is_rejected() {
        let h = tampered(short_capture);
        let handle = buy(&h).await;

        assert_eq!(
            handle.wait().await,
            PurchaseState::Failed(PurchaseError::AmountMismatch { expected: 300, approved: 30 })
        );
        assert_rejected_untouched(&h, &handle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_between_countdown_ticks_blocks_late_approval() {
        let config = PipelineConfig {
            poll_interval: Duration::from_secs(3),
            countdown_interval: Duration::from_secs(4),
            ..PipelineConfig::default()
        };
        let h = harness_with(Duration::from_secs(5), approved_on_second(), 1_000, config, |gateway| {
            gateway as Arc<dyn PaymentGateway>
        });
        let started = Instant::now();
        let handle = buy(&h).await;

        assert_eq!(
            handle.wait().await,
            PurchaseState::Failed(PurchaseError::SettlementTimeout {
                reason: ExpiryReason::DeadlineElapsed
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(5));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.gateway.fetch_count(handle.payment_id()), 1);
        assert_eq!(h.accounts.balance(&UserId::new("alice")).unwrap(), 1_000);
        assert!(handle.draw().is_none());
    }

    #[tokio::test]
    async fn test_unknown_box_and_rejected_payment() {
        let h = harness(Duration::from_secs(600), approved_on_second(), 1_000);
        let result = h.orchestrator.buy(UserId::new("alice"), BoxId::new("nope")).await;
        assert!(matches!(result, Err(PurchaseError::CatalogUnavailable(_))));

        let clock = Arc::new(TokioClock::new());
        let catalog = Arc::new(MemoryCatalog::new().with_listing(BoxListing {
            box_id: BoxId::new("starter"),
            price: 300,
            table: WeightTable::new(vec![WeightedItem::new("x", 1)]).unwrap(),
        }));
        let gateway = Arc::new(MemoryGateway::new(
            MemoryGatewayConfig { reject_payments: true, ..Default::default() },
            clock.clone(),
            catalog.clone(),
            Arc::new(MemoryArchive::new()),
        ));
        let orchestrator = PurchaseOrchestrator::new(
            gateway,
            catalog,
            Arc::new(MemoryAccounts::new()),
            Arc::new(MemoryNotifier::new()),
            clock,
            PipelineConfig::default(),
        );
        let result = orchestrator.buy(UserId::new("alice"), BoxId::new("starter")).await;
        assert!(matches!(result, Err(PurchaseError::PaymentCreationFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_is_observable() {
        let h = harness(
            Duration::from_secs(60),
            vec![StatusStep::Status(PaymentStatus::Pending)],
            1_000,
        );
        let handle = buy(&h).await;
        let mut countdown = handle.countdown();

        tokio::time::sleep(Duration::from_millis(10_500)).await;
        assert_eq!(*countdown.borrow_and_update(), Duration::from_secs(50));
        assert!(handle.cancel());
    }
}
