//! seatkeeper-demo: runs the encouragement and OTC desk flows against an
//! in-process runtime and logs what happens.
//!
//! ```text
//! RUST_LOG=debug seatkeeper-demo --flow otc
//! seatkeeper-demo --config runtime.json
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use seatkeeper_ledger::{IssuerKit, PaymentRecord};
use seatkeeper_runtime::contracts::{CoveredCall, Encouragement, Messages, OtcDesk, OtcDeskParams};
use seatkeeper_runtime::{Board, BoardValue, EscrowService, ManualTimer};
use seatkeeper_types::{Allocation, Amount, AssetKind, Proposal, RuntimeConfig, constants};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Flow {
    Encouragement,
    Otc,
    All,
}

#[derive(Parser)]
#[command(name = "seatkeeper-demo")]
#[command(about = "Run the Seatkeeper escrow demo flows", version)]
struct Cli {
    /// JSON runtime configuration; defaults are used when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Which flow to run
    #[arg(long, value_enum, default_value = "all")]
    flow: Flow,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => RuntimeConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RuntimeConfig::default(),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(&config.log_filter))?,
        )
        .init();
    info!(
        engine = constants::ENGINE_NAME,
        version = constants::VERSION,
        "starting seatkeeper-demo"
    );

    let service = EscrowService::new(config.clone())?;
    let board = Board::new(config.board_prefix.clone());

    if matches!(cli.flow, Flow::Encouragement | Flow::All) {
        encouragement(&service, &board).await?;
    }
    if matches!(cli.flow, Flow::Otc | Flow::All) {
        otc_desk(&service, &board, config.manual_timer_start).await?;
    }
    info!(board_entries = board.len().await, "demo finished");
    Ok(())
}

async fn encouragement(service: &EscrowService, board: &Board) -> anyhow::Result<()> {
    let mut tips = IssuerKit::new("Tip", AssetKind::Nat);
    let installation = service.install::<Encouragement>("encouragement v1").await;
    let started = service
        .start_instance(
            &installation,
            BTreeMap::from([("Tip".to_string(), tips.brand().clone())]),
            Messages::default(),
        )
        .await?;
    let instance_id = board.register(BoardValue::Instance(started.instance)).await;
    info!(board_id = %instance_id, "encouragement instance published");

    let creator_invitation = started
        .creator_invitation
        .context("encouragement has a creator invitation")?;
    let mut creator = service
        .offer(creator_invitation, Proposal::default(), PaymentRecord::new())
        .await?;
    info!(result = ?creator.take_offer_result()?, "creator seated");

    let free = started.facet.get_free_encouragement().await?;
    info!(message = %free, "free encouragement");

    let tip = Amount::nat(tips.brand(), 1)?;
    let payment = tips.mint_payment(tip.clone())?;
    let mut seat = service
        .offer(
            started.facet.make_invitation().await?,
            Proposal::default().give("Tip", tip),
            PaymentRecord::from([("Tip".to_string(), payment)]),
        )
        .await?;
    info!(result = ?seat.take_offer_result()?, "tipped encouragement");
    let assurance = seat.get_payout("Assurance").await?;
    info!(assurance = %assurance.amount(), "assurance collected");

    let notifier = started.facet.notifier().await?;
    let state = notifier.get_update_since(None).await?;
    info!(count = state.value.count, update = state.update_count, "encouragement state");

    creator.try_exit().await?;
    let collected = creator.get_payout("Tip").await?;
    tips.burn(collected)?;
    Ok(())
}

async fn otc_desk(service: &EscrowService, board: &Board, start: u64) -> anyhow::Result<()> {
    let mut moola = IssuerKit::new("Moola", AssetKind::Nat);
    let mut magic = IssuerKit::new("MagicItem", AssetKind::Set);
    for brand in [moola.brand(), magic.brand()] {
        let id = board.register(BoardValue::Brand(brand.clone())).await;
        info!(brand = %brand, board_id = %id, "brand published");
    }

    let timer_id = service.register_timer(Arc::new(ManualTimer::new(start))).await;
    board.register(BoardValue::Timer(timer_id)).await;

    let covered_call = service.install::<CoveredCall>("covered call v1").await;
    let desk_installation = service.install::<OtcDesk>("otc desk v1").await;
    let desk = service
        .start_instance(
            &desk_installation,
            BTreeMap::new(),
            OtcDeskParams { covered_call },
        )
        .await?
        .facet;

    // Stock the desk.
    let issuers = BTreeMap::from([
        ("Moola".to_string(), moola.brand().clone()),
        ("Magic".to_string(), magic.brand().clone()),
    ]);
    let coins = Amount::nat(moola.brand(), 1000)?;
    let items = Amount::set(magic.brand(), ["magicWand8281", "sword1", "sword2"])?;
    let mut stock = service
        .offer(
            desk.add_inventory_invitation(issuers).await?,
            Proposal::default()
                .give("Moola", coins.clone())
                .give("Magic", items.clone()),
            PaymentRecord::from([
                ("Moola".to_string(), moola.mint_payment(coins)?),
                ("Magic".to_string(), magic.mint_payment(items)?),
            ]),
        )
        .await?;
    info!(result = ?stock.take_offer_result()?, "inventory stocked");

    // Quote the wand for 20 Moola, expiring at start + 2.
    let wand = Amount::set(magic.brand(), ["magicWand8281"])?;
    let strike = Amount::nat(moola.brand(), 20)?;
    let inventory_updates = desk.inventory_notifier().await?;
    let option = desk
        .make_quote(
            Allocation::from([("Magic".to_string(), wand.clone())]),
            Allocation::from([("Moola".to_string(), strike.clone())]),
            timer_id,
            start + 2,
        )
        .await?;

    let option = service.invitation_issuer().claim(option)?;
    let details = service.get_invitation_details(&option)?;
    info!(
        handler = %details.handler.name,
        terms = %details.custom_terms,
        "option inspected"
    );

    let mut exercise = service
        .offer(
            option,
            Proposal::default()
                .give("StrikePrice", strike.clone())
                .want("UnderlyingAsset", wand),
            PaymentRecord::from([("StrikePrice".to_string(), moola.mint_payment(strike)?)]),
        )
        .await?;
    info!(result = ?exercise.take_offer_result()?, "option exercised");
    let bought = exercise.get_payout("UnderlyingAsset").await?;
    info!(asset = %bought.amount(), "underlying asset collected");

    // The sweep adds the strike price to the 1000 Moola left in inventory.
    let mut since = None;
    let swept = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let record = inventory_updates.get_update_since(since).await?;
            since = Some(record.update_count);
            if record.value.get("Moola").and_then(Amount::as_nat) == Some(1020) {
                return Ok::<_, seatkeeper_types::SeatkeeperError>(record.value);
            }
        }
    })
    .await;
    let Ok(inventory) = swept else {
        bail!("sweep did not complete");
    };
    for (keyword, amount) in inventory? {
        info!(%keyword, %amount, "inventory after sweep");
    }

    let mut withdrawal = service
        .offer(
            desk.remove_inventory_invitation().await?,
            Proposal::default().want("Moola", Amount::nat(moola.brand(), 2)?),
            PaymentRecord::new(),
        )
        .await?;
    info!(result = ?withdrawal.take_offer_result()?, "inventory removed");
    let removed = withdrawal.get_payout("Moola").await?;
    moola.burn(removed)?;
    Ok(())
}
