use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::core::Aggregate;
use super::claim::Preparers;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::policy::{policy_for, OrderAction, TransitionMode};
use super::value_objects::{
    Actor, ActorId, ItemStatus, Money, NewItem, OrderItem, OrderKind, OrderStatus, Payment, PaymentMethod,
    PrepRole, Role,
};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// The order status is a projection of its items, recomputed whenever an
// event touches them. Only cancellation and payment set it directly.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub order_number: u64,
    pub kind: OrderKind,
    pub version: i64,

    // Current State (derived from events)
    status: OrderStatus,
    pub customer: Option<ActorId>,
    pub created_by: ActorId,
    pub items: Vec<OrderItem>,
    pub preparers: Preparers,
    pub payment: Option<Payment>,
    pub cancel_reason: Option<String>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lowest-ranked status among active items, or `None` when every item is
/// cancelled.
pub fn derive_status(items: &[OrderItem]) -> Option<OrderStatus> {
    items
        .iter()
        .filter_map(|item| item.status.rank().map(|rank| (rank, item.status)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, status)| OrderStatus::from(status))
}

impl Order {
    /// Validate a new order and produce its creation event
    pub fn open(
        order_id: Uuid,
        order_number: u64,
        kind: OrderKind,
        actor: &Actor,
        items: Vec<NewItem>,
    ) -> Result<OrderEvent, OrderError> {
        policy_for(actor.role).check_action(OrderAction::Create)?;
        validate_new_items(&items)?;

        let customer = (actor.role == Role::Customer).then(|| actor.id.clone());

        Ok(OrderEvent::Created(OrderCreated {
            order_id,
            order_number,
            kind,
            customer,
            created_by: actor.id.clone(),
            items: items.into_iter().map(|item| OrderItem::from_new(item, false)).collect(),
            created_at: Utc::now(),
        }))
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn item(&self, item_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn active_items(&self) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(|item| item.is_active())
    }

    fn station_items(&self, role: PrepRole) -> impl Iterator<Item = &OrderItem> {
        self.active_items().filter(move |item| item.prep_role() == Some(role))
    }

    pub fn has_pending(&self, role: PrepRole) -> bool {
        self.station_items(role).any(|item| item.status == ItemStatus::Pending)
    }

    /// Price of every non-cancelled line
    pub fn subtotal(&self) -> Money {
        self.active_items().map(OrderItem::line_total).sum()
    }

    pub fn total(&self) -> Money {
        let tip = self.payment.as_ref().map(|p| p.tip).unwrap_or(Money::ZERO);
        self.subtotal() + tip
    }

    /// Open to any worker of the station while unclaimed, then only to the
    /// preparer who claimed it.
    pub fn is_visible_to(&self, role: PrepRole, actor: &ActorId) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.preparers.get(role) {
            Some(preparer) => preparer == actor,
            None => self.has_pending(role),
        }
    }

    pub fn is_completed_by(&self, role: PrepRole, actor: &ActorId) -> bool {
        self.status.is_terminal() && self.preparers.is_claimed_by(role, actor)
    }

    fn ensure_open(&self) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Cancelled => Err(OrderError::OrderCancelled(self.id)),
            OrderStatus::Paid => Err(OrderError::OrderFinalized(self.id)),
            _ => Ok(()),
        }
    }

    fn find_item(&self, item_id: Uuid) -> Result<&OrderItem, OrderError> {
        self.item(item_id).ok_or(OrderError::ItemNotFound {
            order_id: self.id,
            item_id,
        })
    }

    fn ensure_customer_owns(&self, actor: &Actor, action: &str) -> Result<(), OrderError> {
        if actor.role == Role::Customer && self.customer.as_ref() != Some(&actor.id) {
            return Err(OrderError::Forbidden {
                role: actor.role,
                action: format!("{action} on another customer's order"),
            });
        }
        Ok(())
    }

    /// A customer may only withdraw work the kitchen has not started
    fn customer_may_cancel(item: &OrderItem) -> bool {
        match item.prep_role() {
            Some(_) => item.status == ItemStatus::Pending,
            None => item.status == ItemStatus::Ready,
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn transition(
        &self,
        actor: &Actor,
        item_ids: &[Uuid],
        target: ItemStatus,
        mode: TransitionMode,
    ) -> Result<Vec<OrderEvent>, OrderError> {
        let policy = policy_for(actor.role);
        policy.check_target(target)?;
        self.ensure_open()?;

        let item_ids = dedup(item_ids);
        if item_ids.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        let station = policy.prep_role();
        let station_in_preparation = station.is_some_and(|role| {
            self.station_items(role)
                .any(|item| item.status == ItemStatus::InPreparation)
        });

        let mut changes = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let item = self.find_item(item_id)?;

            if let Some(role) = station {
                if item.prep_role() != Some(role) {
                    return Err(OrderError::Forbidden {
                        role: actor.role,
                        action: format!("prepare item {item_id}"),
                    });
                }
            }

            if item.status == ItemStatus::Cancelled {
                return Err(OrderError::ItemCancelled(item_id));
            }

            if let Some(role) = station {
                self.preparers.check_owner(role, &actor.id, item_id, item.status)?;
            }

            let skip = item.status == ItemStatus::Pending && target == ItemStatus::Ready;
            if !policy.permits(item.status, target, mode) || (skip && !station_in_preparation) {
                return Err(OrderError::InvalidTransition {
                    item_id,
                    from: item.status,
                    to: target,
                });
            }

            changes.push(ItemStatusChanged {
                item_id,
                from: item.status,
                to: target,
                actor: actor.id.clone(),
            });
        }

        let mut events = Vec::with_capacity(changes.len() + 1);

        // Claim rides in the same write as the first item leaving PENDING
        if let Some(role) = station {
            let leaves_pending = changes.iter().any(|c| c.from == ItemStatus::Pending);
            if leaves_pending && !self.preparers.is_claimed(role) {
                events.push(OrderEvent::PreparerClaimed(PreparerClaimed {
                    role,
                    preparer: actor.id.clone(),
                }));
            }
        }

        events.extend(changes.into_iter().map(OrderEvent::ItemStatusChanged));
        Ok(events)
    }

    fn advance_all(&self, actor: &Actor) -> Result<Vec<OrderEvent>, OrderError> {
        let policy = policy_for(actor.role);
        policy.check_action(OrderAction::AdvanceAll)?;
        let role = policy.prep_role().ok_or_else(|| OrderError::Forbidden {
            role: actor.role,
            action: OrderAction::AdvanceAll.as_str().to_string(),
        })?;
        self.ensure_open()?;

        let in_preparation: Vec<Uuid> = self
            .station_items(role)
            .filter(|item| item.status == ItemStatus::InPreparation)
            .map(|item| item.id)
            .collect();
        let pending: Vec<Uuid> = self
            .station_items(role)
            .filter(|item| item.status == ItemStatus::Pending)
            .map(|item| item.id)
            .collect();

        let (item_ids, target) = if !in_preparation.is_empty() {
            let mut ids = in_preparation;
            if policy.allows_skip() {
                ids.extend(pending);
            }
            (ids, ItemStatus::Ready)
        } else if !pending.is_empty() {
            (pending, ItemStatus::InPreparation)
        } else {
            return Err(OrderError::AllItemsResolved(role));
        };

        self.transition(actor, &item_ids, target, TransitionMode::Bulk)
    }

    fn add_items(&self, actor: &Actor, items: &[OrderItem]) -> Result<Vec<OrderEvent>, OrderError> {
        policy_for(actor.role).check_action(OrderAction::AddItems)?;
        self.ensure_open()?;
        self.ensure_customer_owns(actor, OrderAction::AddItems.as_str())?;

        if items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        for item in items {
            item.menu_item.check_quantity(item.quantity)?;
        }

        Ok(vec![OrderEvent::ItemsAdded(OrderItemsAdded {
            items: items
                .iter()
                .cloned()
                .map(|item| OrderItem { newly_added: true, ..item })
                .collect(),
            added_by: actor.id.clone(),
        })])
    }

    fn cancel_items(&self, actor: &Actor, item_ids: &[Uuid]) -> Result<Vec<OrderEvent>, OrderError> {
        policy_for(actor.role).check_action(OrderAction::CancelItems)?;
        self.ensure_open()?;
        self.ensure_customer_owns(actor, OrderAction::CancelItems.as_str())?;

        let item_ids = dedup(item_ids);
        if item_ids.is_empty() {
            return Err(OrderError::EmptyItems);
        }

        let mut cancelled = Vec::with_capacity(item_ids.len());
        for &item_id in &item_ids {
            let item = self.find_item(item_id)?;

            if item.status == ItemStatus::Cancelled {
                return Err(OrderError::ItemCancelled(item_id));
            }
            if actor.role == Role::Customer && !Self::customer_may_cancel(item) {
                return Err(OrderError::InvalidTransition {
                    item_id,
                    from: item.status,
                    to: ItemStatus::Cancelled,
                });
            }
            cancelled.push(item);
        }

        let remaining: Vec<&OrderItem> = self
            .active_items()
            .filter(|item| !item_ids.contains(&item.id))
            .collect();

        for item in &cancelled {
            if let Some(role) = item.prep_role() {
                if !remaining.iter().any(|r| r.prep_role() == Some(role)) {
                    return Err(OrderError::LastActiveItem {
                        item_id: item.id,
                        role: Some(role),
                    });
                }
            }
        }
        if remaining.is_empty() {
            if let Some(last) = cancelled.last() {
                return Err(OrderError::LastActiveItem {
                    item_id: last.id,
                    role: None,
                });
            }
        }

        Ok(cancelled
            .into_iter()
            .map(|item| {
                OrderEvent::ItemCancelled(ItemCancelled {
                    item_id: item.id,
                    from: item.status,
                    actor: actor.id.clone(),
                })
            })
            .collect())
    }

    fn cancel_order(&self, actor: &Actor, reason: &Option<String>) -> Result<Vec<OrderEvent>, OrderError> {
        policy_for(actor.role).check_action(OrderAction::CancelOrder)?;
        self.ensure_open()?;
        self.ensure_customer_owns(actor, OrderAction::CancelOrder.as_str())?;

        if actor.role == Role::Customer && !self.active_items().all(Self::customer_may_cancel) {
            return Err(OrderError::Forbidden {
                role: actor.role,
                action: "cancel an order the kitchen has started".to_string(),
            });
        }

        Ok(vec![OrderEvent::Cancelled(OrderCancelled {
            reason: reason.clone(),
            cancelled_by: actor.id.clone(),
            cancelled_items: self.active_items().map(|item| item.id).collect(),
        })])
    }

    fn pay(&self, actor: &Actor, method: PaymentMethod, tip: Money) -> Result<Vec<OrderEvent>, OrderError> {
        policy_for(actor.role).check_action(OrderAction::Pay)?;
        self.ensure_open()?;

        if tip < Money::ZERO {
            return Err(OrderError::InvalidAmount(tip));
        }

        if let Some(item) = self.active_items().find(|item| item.status != ItemStatus::Delivered) {
            return Err(OrderError::InvalidTransition {
                item_id: item.id,
                from: item.status,
                to: ItemStatus::Paid,
            });
        }

        Ok(vec![OrderEvent::Paid(OrderPaid {
            payment: Payment {
                method,
                tip,
                paid_by: actor.id.clone(),
                paid_at: Utc::now(),
            },
        })])
    }

    // ========================================================================
    // Event Application Helpers
    // ========================================================================

    fn item_mut(&mut self, item_id: Uuid) -> Result<&mut OrderItem, OrderError> {
        let order_id = self.id;
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(OrderError::ItemNotFound { order_id, item_id })
    }

    fn refresh_status(&mut self) {
        if let Some(status) = derive_status(&self.items) {
            self.status = status;
        }
    }
}

fn validate_new_items(items: &[NewItem]) -> Result<(), OrderError> {
    if items.is_empty() {
        return Err(OrderError::EmptyItems);
    }

    for item in items {
        item.menu_item.check_quantity(item.quantity)?;
    }

    Ok(())
}

fn dedup(ids: &[Uuid]) -> Vec<Uuid> {
    let mut seen = Vec::with_capacity(ids.len());
    for id in ids {
        if !seen.contains(id) {
            seen.push(*id);
        }
    }
    seen
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::Created(e) => Ok(Self {
                id: e.order_id,
                order_number: e.order_number,
                kind: e.kind,
                version: 1,
                status: OrderStatus::Pending,
                customer: e.customer.clone(),
                created_by: e.created_by.clone(),
                items: e.items.clone(),
                preparers: Preparers::default(),
                payment: None,
                cancel_reason: None,
                created_at: e.created_at,
                updated_at: e.created_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::Created(_) => return Err(OrderError::DuplicateOrder(self.id)),
            OrderEvent::ItemsAdded(e) => {
                self.items.extend(e.items.iter().cloned());
                self.refresh_status();
            }
            OrderEvent::PreparerClaimed(e) => {
                self.preparers.claim(e.role, &e.preparer);
            }
            OrderEvent::ItemStatusChanged(e) => {
                // Station items carry the order's claimed preparer, whoever moved them
                let preparer = self
                    .find_item(e.item_id)?
                    .prep_role()
                    .map(|role| self.preparers.get(role).cloned().unwrap_or_else(|| e.actor.clone()));

                let item = self.item_mut(e.item_id)?;
                if e.from == ItemStatus::Pending && item.prepared_by.is_none() {
                    item.prepared_by = preparer;
                }
                item.status = e.to;
                self.refresh_status();
            }
            OrderEvent::ItemCancelled(e) => {
                self.item_mut(e.item_id)?.status = ItemStatus::Cancelled;
                self.refresh_status();
            }
            OrderEvent::Cancelled(e) => {
                for item in self.items.iter_mut().filter(|item| e.cancelled_items.contains(&item.id)) {
                    item.status = ItemStatus::Cancelled;
                }
                self.status = OrderStatus::Cancelled;
                self.cancel_reason = e.reason.clone();
            }
            OrderEvent::Paid(e) => {
                for item in self.items.iter_mut().filter(|item| item.is_active()) {
                    item.status = ItemStatus::Paid;
                }
                self.status = OrderStatus::Paid;
                self.payment = Some(e.payment.clone());
            }
        }

        self.version += 1;
        Ok(())
    }

    fn record_timestamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::TransitionItems { actor, item_ids, target, mode } => {
                self.transition(actor, item_ids, *target, *mode)
            }
            OrderCommand::AdvanceAll { actor } => self.advance_all(actor),
            OrderCommand::AddItems { actor, items } => self.add_items(actor, items),
            OrderCommand::CancelItems { actor, item_ids } => self.cancel_items(actor, item_ids),
            OrderCommand::CancelOrder { actor, reason } => self.cancel_order(actor, reason),
            OrderCommand::Pay { actor, method, tip } => self.pay(actor, *method, *tip),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::value_objects::MenuItem;
    use crate::event_sourcing::core::EventEnvelope;

    fn soup() -> MenuItem {
        MenuItem::new("soup", Money::cents(700)).for_chef()
    }

    fn latte() -> MenuItem {
        MenuItem::new("latte", Money::cents(450)).for_barista()
    }

    fn soda() -> MenuItem {
        MenuItem::new("soda", Money::cents(250))
    }

    fn waiter() -> Actor {
        Actor::new("wendy", Role::Waiter)
    }

    fn open_order(actor: &Actor, menu: Vec<MenuItem>) -> Order {
        let items = menu.into_iter().map(|m| NewItem::new(m, 1)).collect();
        let event = Order::open(Uuid::new_v4(), 1, OrderKind::DineIn, actor, items).unwrap();
        Order::apply_first_event(&event).unwrap()
    }

    fn run(order: &mut Order, command: OrderCommand) -> Result<Vec<OrderEvent>, OrderError> {
        let events = order.handle_command(&command)?;
        for event in &events {
            order.apply_event(event).unwrap();
        }
        Ok(events)
    }

    fn move_items(order: &mut Order, actor: &Actor, item_ids: Vec<Uuid>, target: ItemStatus) -> Result<Vec<OrderEvent>, OrderError> {
        run(
            order,
            OrderCommand::TransitionItems {
                actor: actor.clone(),
                item_ids,
                target,
                mode: TransitionMode::Direct,
            },
        )
    }

    fn ids_of(order: &Order, role: Option<PrepRole>) -> Vec<Uuid> {
        order.items.iter().filter(|i| i.prep_role() == role).map(|i| i.id).collect()
    }

    fn item_with(status: ItemStatus) -> OrderItem {
        let mut item = OrderItem::from_new(NewItem::new(soup(), 1), false);
        item.status = status;
        item
    }

    // Reference rule written as the cascade it is described as
    fn cascade(statuses: &[ItemStatus]) -> Option<OrderStatus> {
        for status in [
            ItemStatus::Pending,
            ItemStatus::InPreparation,
            ItemStatus::Ready,
            ItemStatus::Delivered,
            ItemStatus::Paid,
        ] {
            if statuses.contains(&status) {
                return Some(status.into());
            }
        }
        None
    }

    #[test]
    fn test_aggregation_matches_cascade_for_up_to_four_items() {
        for len in 1..=4u32 {
            let combos = 6usize.pow(len);
            for mut code in 0..combos {
                let mut statuses = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    statuses.push(ItemStatus::ALL[code % 6]);
                    code /= 6;
                }
                let items: Vec<OrderItem> = statuses.iter().map(|s| item_with(*s)).collect();

                assert_eq!(derive_status(&items), cascade(&statuses), "statuses: {statuses:?}");
            }
        }
    }

    #[test]
    fn test_role_policy_is_complete_over_every_triple() {
        let allowed = |role: Role, from: ItemStatus, to: ItemStatus| match role {
            Role::Chef | Role::Barista => matches!(
                (from, to),
                (ItemStatus::Pending, ItemStatus::InPreparation) | (ItemStatus::InPreparation, ItemStatus::Ready)
            ),
            Role::Cashier | Role::Waiter => (from, to) == (ItemStatus::Ready, ItemStatus::Delivered),
            Role::Customer => false,
        };

        for role in Role::ALL {
            let actor = Actor::new("someone", role);
            let menu = if role == Role::Barista { latte() } else { soup() };

            for from in ItemStatus::ALL {
                for to in ItemStatus::ALL {
                    let mut order = open_order(&waiter(), vec![menu.clone(), soda()]);
                    order.items[0].status = from;
                    if let Some(station) = role.prep_role() {
                        order.preparers.claim(station, &actor.id);
                    }
                    let item_id = order.items[0].id;

                    let result = order.handle_command(&OrderCommand::TransitionItems {
                        actor: actor.clone(),
                        item_ids: vec![item_id],
                        target: to,
                        mode: TransitionMode::Direct,
                    });

                    if allowed(role, from, to) {
                        let events = result.unwrap_or_else(|e| panic!("{role} {from}->{to}: {e}"));
                        assert!(matches!(
                            events.last(),
                            Some(OrderEvent::ItemStatusChanged(c)) if c.from == from && c.to == to
                        ));
                    } else {
                        let err = result.expect_err(&format!("{role} {from}->{to} should fail"));
                        if !policy_for(role).reaches(to) {
                            assert!(matches!(err, OrderError::Forbidden { .. }));
                        } else if from == ItemStatus::Cancelled {
                            assert!(matches!(err, OrderError::ItemCancelled(_)));
                        } else {
                            assert!(matches!(err, OrderError::InvalidTransition { .. }));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_chef_and_barista_scenario() {
        let chef = Actor::new("carlo", Role::Chef);
        let barista = Actor::new("bea", Role::Barista);
        let mut order = open_order(&waiter(), vec![soup(), latte()]);
        let food = ids_of(&order, Some(PrepRole::Chef));
        let drinks = ids_of(&order, Some(PrepRole::Barista));

        move_items(&mut order, &chef, food.clone(), ItemStatus::InPreparation).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);

        move_items(&mut order, &barista, drinks.clone(), ItemStatus::InPreparation).unwrap();
        assert_eq!(order.status(), OrderStatus::InPreparation);

        move_items(&mut order, &chef, food, ItemStatus::Ready).unwrap();
        assert_eq!(order.status(), OrderStatus::InPreparation);
        move_items(&mut order, &barista, drinks, ItemStatus::Ready).unwrap();
        assert_eq!(order.status(), OrderStatus::Ready);

        assert!(order.preparers.is_claimed_by(PrepRole::Chef, &chef.id));
        assert!(order.preparers.is_claimed_by(PrepRole::Barista, &barista.id));
    }

    #[test]
    fn test_first_acceptance_claims_and_records_preparer() {
        let chef = Actor::new("carlo", Role::Chef);
        let mut order = open_order(&waiter(), vec![soup(), soup()]);
        let food = ids_of(&order, Some(PrepRole::Chef));

        let events = move_items(&mut order, &chef, vec![food[0]], ItemStatus::InPreparation).unwrap();

        assert!(matches!(&events[0], OrderEvent::PreparerClaimed(c) if c.preparer == chef.id));
        assert_eq!(order.item(food[0]).unwrap().prepared_by.as_ref(), Some(&chef.id));

        // Later acceptances by the same preparer do not re-claim
        let events = move_items(&mut order, &chef, vec![food[1]], ItemStatus::InPreparation).unwrap();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_other_worker_of_the_role_cannot_touch_claimed_work() {
        let first = Actor::new("carlo", Role::Chef);
        let second = Actor::new("dario", Role::Chef);
        let mut order = open_order(&waiter(), vec![soup(), soup()]);
        let food = ids_of(&order, Some(PrepRole::Chef));

        move_items(&mut order, &first, vec![food[0]], ItemStatus::InPreparation).unwrap();

        let err = move_items(&mut order, &second, vec![food[0]], ItemStatus::Ready).unwrap_err();
        assert!(matches!(err, OrderError::NotOwner { ref owner, .. } if *owner == first.id));

        // Accepting another still-pending item works but keeps the claim
        let events = move_items(&mut order, &second, vec![food[1]], ItemStatus::InPreparation).unwrap();
        assert_eq!(events.len(), 1);
        assert!(order.preparers.is_claimed_by(PrepRole::Chef, &first.id));
        assert!(!order.is_visible_to(PrepRole::Chef, &second.id));
        assert!(order.is_visible_to(PrepRole::Chef, &first.id));
    }

    #[test]
    fn test_late_acceptance_inherits_the_claimed_preparer() {
        let carlo = Actor::new("carlo", Role::Chef);
        let dario = Actor::new("dario", Role::Chef);
        let mut order = open_order(&waiter(), vec![soup(), soup()]);
        let food = ids_of(&order, Some(PrepRole::Chef));

        move_items(&mut order, &carlo, vec![food[0]], ItemStatus::InPreparation).unwrap();
        move_items(&mut order, &dario, vec![food[1]], ItemStatus::InPreparation).unwrap();

        let second = order.item(food[1]).unwrap();
        assert_eq!(second.prepared_by.as_ref(), order.preparers.chef.as_ref());
        assert_eq!(second.prepared_by.as_ref(), Some(&carlo.id));

        // Ownership checks and the recorded preparer agree
        let err = move_items(&mut order, &dario, vec![food[1]], ItemStatus::Ready).unwrap_err();
        assert!(matches!(err, OrderError::NotOwner { ref owner, .. } if *owner == carlo.id));
        move_items(&mut order, &carlo, vec![food[1]], ItemStatus::Ready).unwrap();
    }

    #[test]
    fn test_replay_restores_last_update_time() {
        let chef = Actor::new("carlo", Role::Chef);
        let created = Order::open(Uuid::new_v4(), 1, OrderKind::DineIn, &waiter(), vec![NewItem::new(soup(), 1)]).unwrap();
        let mut order = Order::apply_first_event(&created).unwrap();
        let item_id = order.items[0].id;

        let accepted = move_items(&mut order, &chef, vec![item_id], ItemStatus::InPreparation).unwrap();
        let mut history = vec![EventEnvelope::new(order.id, 1, created.name().to_string(), created, Uuid::new_v4())];
        for (seq, event) in accepted.into_iter().enumerate() {
            history.push(EventEnvelope::new(order.id, seq as i64 + 2, event.name().to_string(), event, Uuid::new_v4()));
        }
        let stamp = history.last().unwrap().timestamp;
        order.record_timestamp(stamp);

        let replayed = Order::load_from_events(&history).unwrap();
        assert_eq!(replayed.updated_at, stamp);
        assert_eq!(replayed.updated_at, order.updated_at);
        assert_eq!(replayed.items[0].prepared_by.as_ref(), Some(&chef.id));
    }

    #[test]
    fn test_roles_stay_on_their_own_station() {
        let barista = Actor::new("bea", Role::Barista);
        let mut order = open_order(&waiter(), vec![soup(), latte()]);
        let food = ids_of(&order, Some(PrepRole::Chef));

        let err = move_items(&mut order, &barista, food, ItemStatus::InPreparation).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { role: Role::Barista, .. }));
    }

    #[test]
    fn test_chef_bulk_advance_skips_pending_items() {
        let chef = Actor::new("carlo", Role::Chef);
        let mut order = open_order(&waiter(), vec![soup(), soup(), latte()]);
        let food = ids_of(&order, Some(PrepRole::Chef));

        // Direct skip is never allowed
        let err = move_items(&mut order, &chef, vec![food[0]], ItemStatus::Ready).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));

        move_items(&mut order, &chef, vec![food[0]], ItemStatus::InPreparation).unwrap();
        run(&mut order, OrderCommand::AdvanceAll { actor: chef.clone() }).unwrap();

        assert!(food.iter().all(|id| order.item(*id).unwrap().status == ItemStatus::Ready));
        assert_eq!(
            order.item(food[1]).unwrap().prepared_by.as_ref(),
            Some(&chef.id)
        );

        let err = run(&mut order, OrderCommand::AdvanceAll { actor: chef }).unwrap_err();
        assert!(matches!(err, OrderError::AllItemsResolved(PrepRole::Chef)));
    }

    #[test]
    fn test_barista_bulk_advance_steps_one_stage_at_a_time() {
        let barista = Actor::new("bea", Role::Barista);
        let mut order = open_order(&waiter(), vec![latte(), latte()]);
        let drinks = ids_of(&order, Some(PrepRole::Barista));

        move_items(&mut order, &barista, vec![drinks[0]], ItemStatus::InPreparation).unwrap();
        run(&mut order, OrderCommand::AdvanceAll { actor: barista.clone() }).unwrap();

        assert_eq!(order.item(drinks[0]).unwrap().status, ItemStatus::Ready);
        assert_eq!(order.item(drinks[1]).unwrap().status, ItemStatus::Pending);

        run(&mut order, OrderCommand::AdvanceAll { actor: barista.clone() }).unwrap();
        assert_eq!(order.item(drinks[1]).unwrap().status, ItemStatus::InPreparation);
        run(&mut order, OrderCommand::AdvanceAll { actor: barista }).unwrap();
        assert_eq!(order.status(), OrderStatus::Ready);
    }

    #[test]
    fn test_bulk_advance_is_kitchen_only() {
        let order = open_order(&waiter(), vec![soup()]);
        let err = order.handle_command(&OrderCommand::AdvanceAll { actor: waiter() }).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { role: Role::Waiter, .. }));
    }

    #[test]
    fn test_cancelling_last_item_of_a_station_is_rejected() {
        let mut order = open_order(&waiter(), vec![soup(), latte(), latte()]);
        let food = ids_of(&order, Some(PrepRole::Chef));
        let drinks = ids_of(&order, Some(PrepRole::Barista));

        let err = run(&mut order, OrderCommand::CancelItems { actor: waiter(), item_ids: food }).unwrap_err();
        assert!(matches!(err, OrderError::LastActiveItem { role: Some(PrepRole::Chef), .. }));

        run(&mut order, OrderCommand::CancelItems { actor: waiter(), item_ids: vec![drinks[0]] }).unwrap();
        assert_eq!(order.item(drinks[0]).unwrap().status, ItemStatus::Cancelled);

        let err = run(&mut order, OrderCommand::CancelItems { actor: waiter(), item_ids: vec![drinks[0]] }).unwrap_err();
        assert!(matches!(err, OrderError::ItemCancelled(_)));
    }

    #[test]
    fn test_cancelling_every_item_of_the_order_is_rejected() {
        let mut order = open_order(&waiter(), vec![soda(), soda()]);
        let all = ids_of(&order, None);

        let err = run(&mut order, OrderCommand::CancelItems { actor: waiter(), item_ids: all }).unwrap_err();
        assert!(matches!(err, OrderError::LastActiveItem { role: None, .. }));
    }

    #[test]
    fn test_customer_cancellation_rules() {
        let guest = Actor::new("gus", Role::Customer);
        let chef = Actor::new("carlo", Role::Chef);
        let mut order = open_order(&guest, vec![soup(), soup(), soda()]);
        assert_eq!(order.customer.as_ref(), Some(&guest.id));
        let food = ids_of(&order, Some(PrepRole::Chef));

        move_items(&mut order, &chef, vec![food[0]], ItemStatus::InPreparation).unwrap();

        let err = run(&mut order, OrderCommand::CancelItems { actor: guest.clone(), item_ids: vec![food[0]] }).unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { to: ItemStatus::Cancelled, .. }));

        let err = run(&mut order, OrderCommand::CancelOrder { actor: guest.clone(), reason: None }).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { role: Role::Customer, .. }));

        run(&mut order, OrderCommand::CancelItems { actor: guest.clone(), item_ids: vec![food[1]] }).unwrap();

        let stranger = Actor::new("mallory", Role::Customer);
        let bottled = ids_of(&order, None);
        let err = run(&mut order, OrderCommand::CancelItems { actor: stranger, item_ids: bottled }).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { .. }));
    }

    #[test]
    fn test_customer_may_cancel_untouched_order() {
        let guest = Actor::new("gus", Role::Customer);
        let mut order = open_order(&guest, vec![soup(), soda()]);

        let events = run(
            &mut order,
            OrderCommand::CancelOrder { actor: guest.clone(), reason: Some("changed mind".into()) },
        )
        .unwrap();

        assert!(matches!(&events[0], OrderEvent::Cancelled(c) if c.cancelled_items.len() == 2));
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(order.items.iter().all(|i| i.status == ItemStatus::Cancelled));

        let bottled = order.items[1].id;
        let err = move_items(&mut order, &waiter(), vec![bottled], ItemStatus::Delivered).unwrap_err();
        assert!(matches!(err, OrderError::OrderCancelled(_)));
        let err = run(&mut order, OrderCommand::CancelOrder { actor: waiter(), reason: None }).unwrap_err();
        assert!(matches!(err, OrderError::OrderCancelled(_)));
    }

    #[test]
    fn test_payment_requires_every_active_item_delivered() {
        let chef = Actor::new("carlo", Role::Chef);
        let cashier = Actor::new("cass", Role::Cashier);
        let mut order = open_order(&waiter(), vec![soup(), soda()]);
        let food = ids_of(&order, Some(PrepRole::Chef));
        let drinks = ids_of(&order, None);

        let pay = OrderCommand::Pay { actor: cashier.clone(), method: PaymentMethod::Card, tip: Money::cents(150) };
        assert!(matches!(run(&mut order, pay.clone()), Err(OrderError::InvalidTransition { to: ItemStatus::Paid, .. })));

        move_items(&mut order, &chef, food.clone(), ItemStatus::InPreparation).unwrap();
        move_items(&mut order, &chef, food.clone(), ItemStatus::Ready).unwrap();
        move_items(&mut order, &waiter(), [food, drinks].concat(), ItemStatus::Delivered).unwrap();
        assert_eq!(order.status(), OrderStatus::Delivered);

        let negative = OrderCommand::Pay { actor: cashier.clone(), method: PaymentMethod::Cash, tip: Money::cents(-1) };
        assert!(matches!(run(&mut order, negative), Err(OrderError::InvalidAmount(_))));

        run(&mut order, pay.clone()).unwrap();
        assert_eq!(order.status(), OrderStatus::Paid);
        assert_eq!(order.subtotal(), Money::cents(950));
        assert_eq!(order.total(), Money::cents(1100));
        assert!(order.is_completed_by(PrepRole::Chef, &chef.id));

        assert!(matches!(run(&mut order, pay), Err(OrderError::OrderFinalized(_))));
    }

    #[test]
    fn test_added_items_reopen_the_order() {
        let chef = Actor::new("carlo", Role::Chef);
        let mut order = open_order(&waiter(), vec![soup()]);
        let food = ids_of(&order, Some(PrepRole::Chef));
        move_items(&mut order, &chef, food.clone(), ItemStatus::InPreparation).unwrap();
        move_items(&mut order, &chef, food, ItemStatus::Ready).unwrap();
        assert_eq!(order.status(), OrderStatus::Ready);

        let extra = OrderItem::from_new(NewItem::new(soup(), 2), true);
        run(&mut order, OrderCommand::AddItems { actor: waiter(), items: vec![extra.clone()] }).unwrap();

        assert_eq!(order.status(), OrderStatus::Pending);
        assert!(order.item(extra.id).unwrap().newly_added);
        // Still claimed: other chefs do not see the new work
        assert!(!order.is_visible_to(PrepRole::Chef, &ActorId::new("dario")));

        let err = run(&mut order, OrderCommand::AddItems { actor: chef, items: vec![extra] }).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { role: Role::Chef, .. }));
    }

    #[test]
    fn test_open_validates_lines_and_role() {
        let chef = Actor::new("carlo", Role::Chef);
        let err = Order::open(Uuid::new_v4(), 1, OrderKind::Takeout, &chef, vec![NewItem::new(soup(), 1)]).unwrap_err();
        assert!(matches!(err, OrderError::Forbidden { .. }));

        let err = Order::open(Uuid::new_v4(), 1, OrderKind::Takeout, &waiter(), vec![]).unwrap_err();
        assert!(matches!(err, OrderError::EmptyItems));

        let err = Order::open(Uuid::new_v4(), 1, OrderKind::Takeout, &waiter(), vec![NewItem::new(soup(), 0)]).unwrap_err();
        assert!(matches!(err, OrderError::InvalidQuantity(0)));
    }

    #[test]
    fn test_replaying_history_rebuilds_the_order() {
        let chef = Actor::new("carlo", Role::Chef);
        let items = vec![NewItem::new(soup(), 1), NewItem::new(latte(), 1)];
        let created = Order::open(Uuid::new_v4(), 7, OrderKind::Delivery, &waiter(), items).unwrap();
        let mut order = Order::apply_first_event(&created).unwrap();
        let correlation_id = Uuid::new_v4();

        let mut history = vec![EventEnvelope::new(order.id, 1, created.name().to_string(), created, correlation_id)];
        let food = ids_of(&order, Some(PrepRole::Chef));
        let drinks = ids_of(&order, Some(PrepRole::Barista));

        let commands = vec![
            OrderCommand::TransitionItems {
                actor: chef.clone(),
                item_ids: food,
                target: ItemStatus::InPreparation,
                mode: TransitionMode::Direct,
            },
            OrderCommand::CancelItems { actor: waiter(), item_ids: drinks.clone() },
        ];

        // Cancelling the only drink empties the barista station
        for command in commands {
            match order.handle_command(&command) {
                Ok(events) => {
                    for event in events {
                        order.apply_event(&event).unwrap();
                        let seq = order.version();
                        history.push(EventEnvelope::new(order.id, seq, event.name().to_string(), event, correlation_id));
                    }
                }
                Err(err) => assert!(matches!(err, OrderError::LastActiveItem { .. })),
            }
        }

        let replayed = Order::load_from_events(&history).unwrap();
        assert_eq!(replayed.version(), order.version());
        assert_eq!(replayed.status(), order.status());
        assert_eq!(replayed.items, order.items);
        assert_eq!(replayed.preparers, order.preparers);
        assert_eq!(replayed.aggregate_id(), order.aggregate_id());
    }
}
