use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::errors::OrderError;
use crate::domain::stock::RecipeLine;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Username of a staff member or customer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(username: impl Into<String>) -> Self {
        Self(username.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Chef,
    Barista,
    Cashier,
    Waiter,
    Customer,
}

impl Role {
    pub const ALL: [Role; 5] = [Role::Chef, Role::Barista, Role::Cashier, Role::Waiter, Role::Customer];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Chef => "chef",
            Role::Barista => "barista",
            Role::Cashier => "cashier",
            Role::Waiter => "waiter",
            Role::Customer => "customer",
        }
    }

    /// Kitchen station this role prepares for, if any
    pub fn prep_role(self) -> Option<PrepRole> {
        match self {
            Role::Chef => Some(PrepRole::Chef),
            Role::Barista => Some(PrepRole::Barista),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kitchen station with its own pool of interchangeable preparers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrepRole {
    Chef,
    Barista,
}

impl PrepRole {
    pub const ALL: [PrepRole; 2] = [PrepRole::Chef, PrepRole::Barista];

    pub fn role(self) -> Role {
        match self {
            PrepRole::Chef => Role::Chef,
            PrepRole::Barista => Role::Barista,
        }
    }
}

impl fmt::Display for PrepRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.role().as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId::new(username),
            role,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Pending,
    InPreparation,
    Ready,
    Delivered,
    Paid,
    Cancelled,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 6] = [
        ItemStatus::Pending,
        ItemStatus::InPreparation,
        ItemStatus::Ready,
        ItemStatus::Delivered,
        ItemStatus::Paid,
        ItemStatus::Cancelled,
    ];

    /// Position in PENDING < IN_PREPARATION < READY < DELIVERED < PAID;
    /// CANCELLED sits outside the hierarchy.
    pub fn rank(self) -> Option<u8> {
        match self {
            ItemStatus::Pending => Some(0),
            ItemStatus::InPreparation => Some(1),
            ItemStatus::Ready => Some(2),
            ItemStatus::Delivered => Some(3),
            ItemStatus::Paid => Some(4),
            ItemStatus::Cancelled => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Paid | ItemStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "PENDING",
            ItemStatus::InPreparation => "IN_PREPARATION",
            ItemStatus::Ready => "READY",
            ItemStatus::Delivered => "DELIVERED",
            ItemStatus::Paid => "PAID",
            ItemStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    InPreparation,
    Ready,
    Delivered,
    Paid,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Paid | OrderStatus::Cancelled)
    }
}

impl From<ItemStatus> for OrderStatus {
    fn from(status: ItemStatus) -> Self {
        match status {
            ItemStatus::Pending => OrderStatus::Pending,
            ItemStatus::InPreparation => OrderStatus::InPreparation,
            ItemStatus::Ready => OrderStatus::Ready,
            ItemStatus::Delivered => OrderStatus::Delivered,
            ItemStatus::Paid => OrderStatus::Paid,
            ItemStatus::Cancelled => OrderStatus::Cancelled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    DineIn,
    Takeout,
    Delivery,
}

/// Amount in minor currency units (cents)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(pub i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn times(self, quantity: u32) -> Self {
        Self(self.0.saturating_mul(i64::from(quantity)))
    }

    pub fn checked_times(self, quantity: u32) -> Option<Self> {
        self.0.checked_mul(i64::from(quantity)).map(Self)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.0.abs() / 100, self.0.abs() % 100)
    }
}

/// Menu item snapshot taken when the line is ordered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub requires_chef: bool,
    pub requires_barista: bool,
    /// Ingredients consumed per unit ordered
    #[serde(default)]
    pub recipe: Vec<RecipeLine>,
}

impl MenuItem {
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            price,
            requires_chef: false,
            requires_barista: false,
            recipe: Vec::new(),
        }
    }

    pub fn for_chef(mut self) -> Self {
        self.requires_chef = true;
        self
    }

    pub fn for_barista(mut self) -> Self {
        self.requires_barista = true;
        self
    }

    pub fn with_ingredient(mut self, ingredient_id: Uuid, quantity: u64) -> Self {
        self.recipe.push(RecipeLine { ingredient_id, quantity });
        self
    }

    /// Station that prepares this item; the chef takes items flagged for both.
    pub fn prep_role(&self) -> Option<PrepRole> {
        if self.requires_chef {
            Some(PrepRole::Chef)
        } else if self.requires_barista {
            Some(PrepRole::Barista)
        } else {
            None
        }
    }

    /// Zero is rejected, and so is any quantity whose line price or
    /// ingredient amounts would not fit.
    pub fn check_quantity(&self, quantity: u32) -> Result<(), OrderError> {
        let fits = quantity > 0
            && self.price.checked_times(quantity).is_some()
            && self
                .recipe
                .iter()
                .all(|line| line.quantity.checked_mul(u64::from(quantity)).is_some());

        if fits {
            Ok(())
        } else {
            Err(OrderError::InvalidQuantity(quantity))
        }
    }
}

/// A line the caller wants on an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    pub menu_item: MenuItem,
    pub quantity: u32,
}

impl NewItem {
    pub fn new(menu_item: MenuItem, quantity: u32) -> Self {
        Self { menu_item, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub menu_item: MenuItem,
    pub quantity: u32,
    pub status: ItemStatus,
    /// Appended after the order was first placed
    pub newly_added: bool,
    pub prepared_by: Option<ActorId>,
}

impl OrderItem {
    /// Items that need no preparation start out READY
    pub fn from_new(new_item: NewItem, newly_added: bool) -> Self {
        let status = match new_item.menu_item.prep_role() {
            Some(_) => ItemStatus::Pending,
            None => ItemStatus::Ready,
        };

        Self {
            id: Uuid::new_v4(),
            menu_item: new_item.menu_item,
            quantity: new_item.quantity,
            status,
            newly_added,
            prepared_by: None,
        }
    }

    pub fn prep_role(&self) -> Option<PrepRole> {
        self.menu_item.prep_role()
    }

    pub fn is_active(&self) -> bool {
        self.status != ItemStatus::Cancelled
    }

    pub fn line_total(&self) -> Money {
        self.menu_item.price.times(self.quantity)
    }

    /// Ingredients this line takes out of stock
    pub fn consumption(&self) -> Result<Vec<RecipeLine>, OrderError> {
        self.menu_item
            .recipe
            .iter()
            .map(|line| {
                let quantity = line
                    .quantity
                    .checked_mul(u64::from(self.quantity))
                    .ok_or(OrderError::InvalidQuantity(self.quantity))?;
                Ok(RecipeLine {
                    ingredient_id: line.ingredient_id,
                    quantity,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub method: PaymentMethod,
    pub tip: Money,
    pub paid_by: ActorId,
    pub paid_at: DateTime<Utc>,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chef_takes_items_flagged_for_both_stations() {
        let both = MenuItem::new("affogato", Money::cents(650)).for_chef().for_barista();
        let drink = MenuItem::new("latte", Money::cents(450)).for_barista();
        let bottled = MenuItem::new("soda", Money::cents(250));

        assert_eq!(both.prep_role(), Some(PrepRole::Chef));
        assert_eq!(drink.prep_role(), Some(PrepRole::Barista));
        assert_eq!(bottled.prep_role(), None);
    }

    #[test]
    fn test_non_prep_items_start_ready() {
        let soda = OrderItem::from_new(NewItem::new(MenuItem::new("soda", Money::cents(250)), 2), false);
        let soup = OrderItem::from_new(
            NewItem::new(MenuItem::new("soup", Money::cents(700)).for_chef(), 1),
            true,
        );

        assert_eq!(soda.status, ItemStatus::Ready);
        assert_eq!(soup.status, ItemStatus::Pending);
        assert!(soup.newly_added);
        assert_eq!(soda.line_total(), Money::cents(500));
    }

    #[test]
    fn test_consumption_scales_with_quantity() {
        let flour = Uuid::new_v4();
        let pizza = MenuItem::new("pizza", Money::cents(1200))
            .for_chef()
            .with_ingredient(flour, 250);
        let line = OrderItem::from_new(NewItem::new(pizza, 3), false);

        assert_eq!(
            line.consumption().unwrap(),
            vec![RecipeLine { ingredient_id: flour, quantity: 750 }]
        );
    }

    #[test]
    fn test_oversized_quantities_are_rejected() {
        let flour = Uuid::new_v4();
        let pizza = MenuItem::new("pizza", Money::cents(1200))
            .for_chef()
            .with_ingredient(flour, u64::MAX / 2);

        assert!(matches!(pizza.check_quantity(3), Err(OrderError::InvalidQuantity(3))));
        assert!(matches!(pizza.check_quantity(0), Err(OrderError::InvalidQuantity(0))));

        let line = OrderItem::from_new(NewItem::new(pizza.clone(), 3), false);
        assert!(matches!(line.consumption(), Err(OrderError::InvalidQuantity(3))));

        let pricey = MenuItem::new("caviar", Money::cents(i64::MAX / 2));
        assert!(matches!(pricey.check_quantity(3), Err(OrderError::InvalidQuantity(3))));
        assert!(pricey.check_quantity(2).is_ok());
        assert_eq!(Money::cents(i64::MAX) + Money::cents(1), Money::cents(i64::MAX));
    }

    #[test]
    fn test_status_hierarchy() {
        let ranked: Vec<u8> = ItemStatus::ALL.iter().filter_map(|s| s.rank()).collect();
        assert_eq!(ranked, vec![0, 1, 2, 3, 4]);
        assert_eq!(ItemStatus::Cancelled.rank(), None);
        assert!(ItemStatus::Paid.is_terminal());
        assert!(!ItemStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_status_serialization_uses_screaming_case() {
        let json = serde_json::to_string(&ItemStatus::InPreparation).unwrap();
        assert_eq!(json, "\"IN_PREPARATION\"");
        let back: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderStatus::InPreparation);
    }

    #[test]
    fn test_money_display() {
        assert_eq!(Money::cents(1205).to_string(), "12.05");
        assert_eq!(Money::cents(-50).to_string(), "-0.50");
        assert_eq!(vec![Money::cents(100), Money::cents(250)].into_iter().sum::<Money>(), Money::cents(350));
    }
}
