use std::sync::Arc;
use uuid::Uuid;

use crate::domain::order::{
    policy_for, Actor, Committed, ItemStatus, Money, NewItem, Order, OrderAction, OrderCommand,
    OrderCommandHandler, OrderEnvelope, OrderError, OrderEvent, OrderItem, OrderKind, OrderStore, PaymentMethod,
    PrepRole, TransitionMode,
};
use crate::domain::stock::{RecipeLine, StockLedger};
use crate::messaging::{notices_for, Notifier};
use crate::metrics::Metrics;

use super::directory::ActorDirectory;
use super::queries;

// ============================================================================
// Fulfillment Service - entry point for external callers
// ============================================================================
//
// Resolves the caller's role, runs the command through the order store's
// unit of work, then handles the side effects that live outside it:
// stock movements, metrics and notifications.
//
// Stock for new lines is deducted before the order write and handed back if
// the write is rejected. Stock for cancelled lines is returned after the
// write commits; a failed return is logged and the cancellation stands.
//
// ============================================================================

pub struct FulfillmentService {
    directory: Arc<dyn ActorDirectory>,
    orders: OrderCommandHandler,
    ledger: StockLedger,
    notifier: Notifier,
    metrics: Arc<Metrics>,
}

impl FulfillmentService {
    pub fn new(
        directory: Arc<dyn ActorDirectory>,
        store: Arc<dyn OrderStore>,
        ledger: StockLedger,
        notifier: Notifier,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            directory,
            orders: OrderCommandHandler::new(store),
            ledger,
            notifier,
            metrics,
        }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    async fn resolve(&self, username: &str) -> Result<Actor, OrderError> {
        self.directory.resolve(username).await.inspect_err(|e| {
            self.metrics.record_rejection(e.kind());
        })
    }

    // ========================================================================
    // Commands
    // ========================================================================

    pub async fn create_order(&self, username: &str, kind: OrderKind, items: Vec<NewItem>) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let created = self.orders.draft(kind, &actor, items).await.inspect_err(|e| {
            self.metrics.record_rejection(e.kind());
        })?;

        let lines = match &created {
            OrderEvent::Created(e) => consumption(e.items.iter()).map_err(|err| self.rejected(&actor, "create", err))?,
            _ => Vec::new(),
        };
        self.take_stock(&lines).await?;

        let committed = match self.orders.create(created, &actor, Uuid::now_v7()).await {
            Ok(committed) => committed,
            Err(err) => {
                self.give_back(&lines, "order creation rejected").await;
                return Err(self.rejected(&actor, "create", err));
            }
        };

        tracing::info!(
            order_id = %committed.order.id,
            order_number = committed.order.order_number,
            created_by = %actor.id,
            items = committed.order.items.len(),
            "Order created"
        );

        Ok(self.committed(&actor, committed))
    }

    pub async fn add_items(&self, username: &str, order_id: Uuid, items: Vec<NewItem>) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;

        // Cheap checks first so a doomed request never touches stock
        policy_for(actor.role)
            .check_action(OrderAction::AddItems)
            .and_then(|_| validate_lines(&items))
            .map_err(|err| self.rejected(&actor, "add_items", err))?;

        let items: Vec<OrderItem> = items
            .into_iter()
            .map(|item| OrderItem::from_new(item, true))
            .collect();
        let lines = consumption(items.iter()).map_err(|err| self.rejected(&actor, "add_items", err))?;
        self.take_stock(&lines).await?;

        let command = OrderCommand::AddItems {
            actor: actor.clone(),
            items,
        };
        match self.orders.handle(order_id, command, Uuid::now_v7()).await {
            Ok(committed) => Ok(self.committed(&actor, committed)),
            Err(err) => {
                self.give_back(&lines, "add items rejected").await;
                Err(self.rejected(&actor, "add_items", err))
            }
        }
    }

    /// Move the given items of one order to `target`
    pub async fn request_transition(
        &self,
        username: &str,
        order_id: Uuid,
        item_ids: Vec<Uuid>,
        target: ItemStatus,
    ) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let command = OrderCommand::TransitionItems {
            actor: actor.clone(),
            item_ids,
            target,
            mode: TransitionMode::Direct,
        };
        self.execute(&actor, order_id, command, "transition").await
    }

    /// Advance every item of the caller's station one stage
    pub async fn advance_all(&self, username: &str, order_id: Uuid) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let command = OrderCommand::AdvanceAll { actor: actor.clone() };
        self.execute(&actor, order_id, command, "advance_all").await
    }

    pub async fn cancel_items(&self, username: &str, order_id: Uuid, item_ids: Vec<Uuid>) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let command = OrderCommand::CancelItems {
            actor: actor.clone(),
            item_ids,
        };
        self.execute(&actor, order_id, command, "cancel_items").await
    }

    pub async fn cancel_order(&self, username: &str, order_id: Uuid, reason: Option<String>) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let command = OrderCommand::CancelOrder {
            actor: actor.clone(),
            reason,
        };
        self.execute(&actor, order_id, command, "cancel_order").await
    }

    pub async fn pay(
        &self,
        username: &str,
        order_id: Uuid,
        method: PaymentMethod,
        tip: Money,
    ) -> Result<Order, OrderError> {
        let actor = self.resolve(username).await?;
        let command = OrderCommand::Pay {
            actor: actor.clone(),
            method,
            tip,
        };
        let order = self.execute(&actor, order_id, command, "pay").await?;

        tracing::info!(
            order_id = %order.id,
            subtotal = %order.subtotal(),
            total = %order.total(),
            "Order paid"
        );
        Ok(order)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.orders.store().load(order_id).await
    }

    pub async fn history(&self, order_id: Uuid) -> Result<Vec<OrderEnvelope>, OrderError> {
        self.orders.store().history(order_id).await
    }

    /// Orders worker `username` may act on right now
    pub async fn visible_orders(&self, username: &str) -> Result<Vec<Order>, OrderError> {
        let (actor, role) = self.kitchen_actor(username).await?;
        let orders = self.orders.store().list().await;
        Ok(queries::visible_to(orders, role, &actor.id))
    }

    /// Finished (paid or cancelled) orders the worker prepared
    pub async fn completed_orders(&self, username: &str) -> Result<Vec<Order>, OrderError> {
        let (actor, role) = self.kitchen_actor(username).await?;
        let orders = self.orders.store().list().await;
        Ok(queries::completed_by(orders, role, &actor.id))
    }

    pub async fn customer_orders(&self, username: &str) -> Result<Vec<Order>, OrderError> {
        let actor = self.resolve(username).await?;
        let orders = self.orders.store().list().await;
        Ok(queries::placed_by(orders, &actor.id))
    }

    pub async fn awaiting_payment(&self, username: &str) -> Result<Vec<Order>, OrderError> {
        let actor = self.resolve(username).await?;
        policy_for(actor.role).check_action(OrderAction::Pay)?;
        let orders = self.orders.store().list().await;
        Ok(queries::awaiting_payment(orders))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn kitchen_actor(&self, username: &str) -> Result<(Actor, PrepRole), OrderError> {
        let actor = self.resolve(username).await?;
        match actor.role.prep_role() {
            Some(role) => Ok((actor, role)),
            None => Err(OrderError::Forbidden {
                role: actor.role,
                action: "view a kitchen queue".to_string(),
            }),
        }
    }

    async fn execute(
        &self,
        actor: &Actor,
        order_id: Uuid,
        command: OrderCommand,
        operation: &'static str,
    ) -> Result<Order, OrderError> {
        let committed = self
            .orders
            .handle(order_id, command, Uuid::now_v7())
            .await
            .map_err(|err| self.rejected(actor, operation, err))?;

        let released = released_items(&committed.events);
        let order = self.committed(actor, committed);

        if !released.is_empty() {
            match consumption(released.iter().filter_map(|id| order.item(*id))) {
                Ok(lines) => self.give_back(&lines, operation).await,
                Err(err) => {
                    tracing::warn!(order_id = %order.id, error = %err, "Released items have no computable stock usage");
                }
            }
        }

        Ok(order)
    }

    fn rejected(&self, actor: &Actor, operation: &'static str, err: OrderError) -> OrderError {
        self.metrics.record_rejection(err.kind());
        tracing::debug!(
            actor = %actor.id,
            role = %actor.role,
            operation = operation,
            reason = err.kind(),
            error = %err,
            "Request rejected"
        );
        err
    }

    /// Record, log and announce a committed write
    fn committed(&self, actor: &Actor, committed: Committed) -> Order {
        let Committed { order, events } = committed;

        for envelope in &events {
            match &envelope.event_data {
                OrderEvent::PreparerClaimed(e) => {
                    self.metrics.record_claim(e.role.role().as_str());
                    tracing::info!(
                        order_id = %order.id,
                        role = %e.role,
                        preparer = %e.preparer,
                        "Order claimed"
                    );
                }
                OrderEvent::ItemStatusChanged(e) => {
                    self.metrics.record_transition(actor.role.as_str(), e.to.as_str());
                    tracing::info!(
                        order_id = %order.id,
                        item_id = %e.item_id,
                        from = %e.from,
                        to = %e.to,
                        actor = %e.actor,
                        order_status = ?order.status(),
                        "Item transitioned"
                    );
                }
                OrderEvent::ItemCancelled(e) => {
                    self.metrics
                        .record_transition(actor.role.as_str(), ItemStatus::Cancelled.as_str());
                    tracing::info!(order_id = %order.id, item_id = %e.item_id, from = %e.from, "Item cancelled");
                }
                OrderEvent::Cancelled(e) => {
                    self.metrics
                        .record_transition(actor.role.as_str(), ItemStatus::Cancelled.as_str());
                    tracing::info!(
                        order_id = %order.id,
                        cancelled_by = %e.cancelled_by,
                        reason = ?e.reason,
                        "Order cancelled"
                    );
                }
                OrderEvent::Paid(_) => {
                    self.metrics.record_transition(actor.role.as_str(), ItemStatus::Paid.as_str());
                }
                OrderEvent::Created(_) | OrderEvent::ItemsAdded(_) => {
                    self.metrics.record_transition(actor.role.as_str(), ItemStatus::Pending.as_str());
                }
            }
        }

        self.notifier.publish(notices_for(&order, &events));
        order
    }

    async fn take_stock(&self, lines: &[RecipeLine]) -> Result<(), OrderError> {
        self.ledger.deduct_lines(lines).await.map_err(|err| {
            self.metrics.record_rejection(err.kind());
            OrderError::from(err)
        })
    }

    async fn give_back(&self, lines: &[RecipeLine], context: &str) {
        if lines.is_empty() {
            return;
        }
        if let Err(err) = self.ledger.return_lines(lines).await {
            tracing::warn!(context = context, error = %err, "Stock return failed; counters left short");
        }
    }
}

fn validate_lines(items: &[NewItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyItems);
    }
    items
        .iter()
        .try_for_each(|item| item.menu_item.check_quantity(item.quantity))
}

fn consumption<'a>(items: impl Iterator<Item = &'a OrderItem>) -> Result<Vec<RecipeLine>, OrderError> {
    let mut lines = Vec::new();
    for item in items {
        lines.extend(item.consumption()?);
    }
    Ok(lines)
}

/// Items whose stock should go back after this write
fn released_items(events: &[OrderEnvelope]) -> Vec<Uuid> {
    events
        .iter()
        .flat_map(|envelope| match &envelope.event_data {
            OrderEvent::ItemCancelled(e) => vec![e.item_id],
            OrderEvent::Cancelled(e) => e.cancelled_items.clone(),
            _ => Vec::new(),
        })
        .collect()
}
