use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pos_fulfillment::config::EngineConfig;
use pos_fulfillment::domain::order::{
    InMemoryOrderStore, ItemStatus, MenuItem, Money, NewItem, OrderKind, PaymentMethod, Role,
};
use pos_fulfillment::domain::stock::{InMemoryStockStore, StockCounter, StockLedger, Unit};
use pos_fulfillment::fulfillment::{FulfillmentService, StaticDirectory};
use pos_fulfillment::messaging::{BroadcastSink, Notifier};
use pos_fulfillment::metrics::Metrics;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pos_fulfillment=debug"))
        )
        .init();

    tracing::info!("Starting order fulfillment demo");

    // === 1. Configuration ===
    let config = EngineConfig::load()?;
    tracing::info!(
        max_attempts = config.ledger.max_attempts,
        lock_timeout_ms = config.ledger.lock_timeout_ms,
        "Configuration loaded"
    );

    // === 2. Metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Stock ledger with a few ingredients ===
    let stock_store = Arc::new(InMemoryStockStore::new(config.ledger.lock_timeout()));
    let ledger = StockLedger::new(stock_store, config.ledger.retry(), metrics.clone());

    let dough = StockCounter::new("pizza dough", 2_000, Unit::Grams);
    let beans = StockCounter::new("espresso beans", 500, Unit::Grams);
    let (dough_id, beans_id) = (dough.ingredient_id, beans.ingredient_id);
    ledger.register(dough).await?;
    ledger.register(beans).await?;

    // === 4. Staff roster, notifications and the service ===
    let directory = StaticDirectory::new()
        .with("carlo", Role::Chef)
        .with("dario", Role::Chef)
        .with("elena", Role::Chef)
        .with("bea", Role::Barista)
        .with("wendy", Role::Waiter)
        .with("cass", Role::Cashier)
        .with("gus", Role::Customer);

    let sink = Arc::new(BroadcastSink::new(config.notifications.channel_capacity));
    let mut notices = sink.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            tracing::debug!(
                order_number = notice.order_number,
                event_type = %notice.envelope.event_type,
                audience = ?notice.audience,
                "Notice"
            );
        }
    });
    let notifier = Notifier::new(sink, &config.notifications, metrics.clone());

    let service = Arc::new(FulfillmentService::new(
        Arc::new(directory),
        Arc::new(InMemoryOrderStore::new()),
        ledger,
        notifier,
        metrics.clone(),
    ));

    // === 5. Full order lifecycle ===
    let margherita = MenuItem::new("margherita", Money::cents(1150))
        .for_chef()
        .with_ingredient(dough_id, 250);
    let cappuccino = MenuItem::new("cappuccino", Money::cents(380))
        .for_barista()
        .with_ingredient(beans_id, 18);
    let water = MenuItem::new("sparkling water", Money::cents(200));

    let order = service
        .create_order(
            "gus",
            OrderKind::DineIn,
            vec![
                NewItem::new(margherita.clone(), 2),
                NewItem::new(cappuccino, 2),
                NewItem::new(water, 1),
            ],
        )
        .await?;
    tracing::info!(order_number = order.order_number, status = ?order.status(), "Order placed");

    // Three chefs race for the same order; exactly one claim sticks
    let pizza_ids: Vec<_> = order
        .items
        .iter()
        .filter(|item| item.menu_item.requires_chef)
        .map(|item| item.id)
        .collect();
    let attempts = ["carlo", "dario", "elena"].map(|chef| {
        let service = service.clone();
        let item_ids = vec![pizza_ids[0]];
        let order_id = order.id;
        async move {
            let outcome = service
                .request_transition(chef, order_id, item_ids, ItemStatus::InPreparation)
                .await;
            (chef, outcome)
        }
    });
    let mut winner = None;
    for (chef, outcome) in futures_util::future::join_all(attempts).await {
        match outcome {
            Ok(_) => {
                tracing::info!(chef = chef, "Claim won");
                winner = Some(chef);
            }
            Err(e) => tracing::info!(chef = chef, error = %e, "Claim lost"),
        }
    }
    let chef = winner.ok_or_else(|| anyhow::anyhow!("no chef claimed the order"))?;

    service.advance_all(chef, order.id).await?;
    service.advance_all("bea", order.id).await?;
    let order = service.advance_all("bea", order.id).await?;
    tracing::info!(status = ?order.status(), "Kitchen done");

    let all_items = order.items.iter().map(|item| item.id).collect();
    service
        .request_transition("wendy", order.id, all_items, ItemStatus::Delivered)
        .await?;

    let paid = service
        .pay("cass", order.id, PaymentMethod::Card, Money::cents(250))
        .await?;
    tracing::info!(total = %paid.total(), status = ?paid.status(), "Order settled");

    // === 6. A cancelled order hands its stock back ===
    let takeout = service
        .create_order("wendy", OrderKind::Takeout, vec![NewItem::new(margherita, 3)])
        .await?;
    tracing::info!(dough_left = service.ledger().level(dough_id).await?.quantity, "After takeout order");
    service
        .cancel_order("wendy", takeout.id, Some("customer never arrived".to_string()))
        .await?;
    tracing::info!(dough_left = service.ledger().level(dough_id).await?.quantity, "After cancellation");

    tracing::info!(
        completed = service.completed_orders(chef).await?.len(),
        history = service.history(paid.id).await?.len(),
        "Demo complete"
    );

    // Let the notice task drain before exit
    tokio::task::yield_now().await;
    tracing::debug!("{}", metrics.render()?);

    Ok(())
}
