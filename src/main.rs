//! Loot Box Reveal Demo
//!
//! Runs one purchase against the in-memory collaborators, then audits
//! every archived draw and prints the report as JSON.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lootbox::{
    PipelineConfig, PurchaseOrchestrator, PurchaseState, TransparencyQueryService, VERSION,
    core::clock::SystemClock,
    external::{
        AccountStore, BoxListing, MemoryAccounts, MemoryArchive, MemoryCatalog, MemoryGateway,
        MemoryGatewayConfig, StatusStep, TracingNotifier,
    },
    fairness::WeightedItem,
    purchase::{BoxId, PaymentStatus, UserId},
    WeightTable,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PipelineConfig::from_env();
    info!("Lootbox Reveal v{}", VERSION);
    info!(
        "Poll every {:?}, countdown every {:?}",
        config.poll_interval, config.countdown_interval
    );

    let table = WeightTable::new(vec![
        WeightedItem::new("wooden-sword", 600),
        WeightedItem::new("iron-shield", 300),
        WeightedItem::new("dragon-egg", 95),
        WeightedItem::new("crown-of-ages", 5),
    ])?;

    let clock = Arc::new(SystemClock);
    let catalog = Arc::new(MemoryCatalog::new().with_listing(BoxListing {
        box_id: BoxId::new("adventurer-box"),
        price: 499,
        table,
    }));
    let archive = Arc::new(MemoryArchive::new());
    let gateway = Arc::new(
        MemoryGateway::new(
            MemoryGatewayConfig {
                payment_ttl: Duration::from_secs(60),
                reject_payments: false,
            },
            clock.clone(),
            catalog.clone(),
            archive.clone(),
        )
        .with_script(vec![
            StatusStep::Status(PaymentStatus::Pending),
            StatusStep::Status(PaymentStatus::Pending),
            StatusStep::Status(PaymentStatus::Approved),
        ]),
    );
    let accounts = Arc::new(MemoryAccounts::new().with_account("demo-user", 2_000));

    let orchestrator = PurchaseOrchestrator::new(
        gateway,
        catalog,
        accounts.clone(),
        Arc::new(TracingNotifier),
        clock,
        config,
    );

    // Buy and wait
    let user = UserId::new("demo-user");
    let handle = orchestrator.buy(user.clone(), BoxId::new("adventurer-box")).await?;
    info!("Waiting for payment {} to settle", handle.payment_id());

    match handle.wait().await {
        PurchaseState::Revealed(draw) => {
            info!("Revealed {} (index {})", draw.item_id, draw.derived_index);
        }
        other => info!("Purchase ended without reveal: {:?}", other),
    }
    handle.dismiss();

    info!("Balance now {}", accounts.balance(&user)?);

    // Audit everything archived
    let transparency = TransparencyQueryService::new(archive);
    let report = transparency.audit(None).await?;
    let json = report.to_json().context("rendering audit report")?;
    println!("{}", json);

    if report.is_clean() {
        info!("AUDIT CLEAN: every settled draw re-derives");
    } else {
        info!("AUDIT FAILED: {} draw(s) did not verify", report.failures.len());
    }

    Ok(())
}
