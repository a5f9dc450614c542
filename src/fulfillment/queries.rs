use crate::domain::order::{ActorId, Order, OrderStatus, PrepRole};

// ============================================================================
// Read Models - filters over order snapshots
// ============================================================================

/// Work queue of one preparer: unclaimed orders with pending station items,
/// plus everything they already claimed and have not finished.
pub fn visible_to(orders: Vec<Order>, role: PrepRole, actor: &ActorId) -> Vec<Order> {
    orders
        .into_iter()
        .filter(|order| order.is_visible_to(role, actor))
        .collect()
}

pub fn completed_by(orders: Vec<Order>, role: PrepRole, actor: &ActorId) -> Vec<Order> {
    orders
        .into_iter()
        .filter(|order| order.is_completed_by(role, actor))
        .collect()
}

pub fn placed_by(orders: Vec<Order>, customer: &ActorId) -> Vec<Order> {
    orders
        .into_iter()
        .filter(|order| order.customer.as_ref() == Some(customer))
        .collect()
}

pub fn awaiting_payment(orders: Vec<Order>) -> Vec<Order> {
    orders
        .into_iter()
        .filter(|order| order.status() == OrderStatus::Delivered)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Actor, MenuItem, Money, NewItem, OrderKind, Role};
    use crate::event_sourcing::core::Aggregate;
    use uuid::Uuid;

    fn order_for(actor: &Actor, number: u64, menu: MenuItem) -> Order {
        let created = Order::open(Uuid::new_v4(), number, OrderKind::DineIn, actor, vec![NewItem::new(menu, 1)]).unwrap();
        Order::apply_first_event(&created).unwrap()
    }

    #[test]
    fn test_claimed_orders_leave_other_queues() {
        let waiter = Actor::new("wendy", Role::Waiter);
        let carlo = ActorId::new("carlo");
        let dario = ActorId::new("dario");
        let soup = MenuItem::new("soup", Money::cents(700)).for_chef();

        let open = order_for(&waiter, 1, soup.clone());
        let mut claimed = order_for(&waiter, 2, soup.clone());
        claimed.preparers.claim(PrepRole::Chef, &carlo);
        let drinks_only = order_for(&waiter, 3, MenuItem::new("latte", Money::cents(450)).for_barista());

        let orders = vec![open.clone(), claimed.clone(), drinks_only];

        let for_carlo: Vec<u64> = visible_to(orders.clone(), PrepRole::Chef, &carlo)
            .iter()
            .map(|o| o.order_number)
            .collect();
        let for_dario: Vec<u64> = visible_to(orders, PrepRole::Chef, &dario)
            .iter()
            .map(|o| o.order_number)
            .collect();

        assert_eq!(for_carlo, vec![1, 2]);
        assert_eq!(for_dario, vec![1]);
    }

    #[test]
    fn test_customer_orders_and_payment_queue() {
        let gus = Actor::new("gus", Role::Customer);
        let waiter = Actor::new("wendy", Role::Waiter);
        let soda = MenuItem::new("soda", Money::cents(250));

        let mine = order_for(&gus, 1, soda.clone());
        let theirs = order_for(&waiter, 2, soda);

        let placed = placed_by(vec![mine.clone(), theirs.clone()], &gus.id);
        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].id, mine.id);

        assert!(awaiting_payment(vec![mine, theirs]).is_empty());
    }
}
