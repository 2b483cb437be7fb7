//! Order model and value objects.

use chrono::{DateTime, Utc};
use common::{CartId, OrderId, OrderItemId, ProductId, ShopId, UserId, VariationId};
use serde::{Deserialize, Serialize};

use crate::order::OrderItemStatus;

/// Money amount in minor units (cents) to avoid floating point issues.
///
/// Serializes as the bare amount, which is also the wire format the
/// platform's events and APIs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from cents.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in cents.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u32) -> Money {
        Money {
            cents: self.cents * i64::from(quantity),
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.cents / 100;
        let part = (self.cents % 100).abs();
        if self.cents < 0 && whole == 0 {
            write!(f, "-{whole}.{part:02}")
        } else {
            write!(f, "{whole}.{part:02}")
        }
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.cents += rhs.cents;
    }
}

/// A single line of a persisted order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Unique identifier of this line.
    pub order_item_id: OrderItemId,

    /// The order this line belongs to.
    pub order_id: OrderId,

    /// The product variation that was bought.
    pub variation_id: VariationId,

    /// The product the variation belongs to.
    pub product_id: ProductId,

    /// The shop that sells and fulfills the variation.
    pub shop_id: ShopId,

    /// Quantity ordered.
    pub quantity: u32,

    /// Price per unit at the moment the order was placed.
    pub unit_price: Money,

    /// Current fulfillment status.
    pub status: OrderItemStatus,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A persisted order.
///
/// Items keep the position they had in the cart at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique identifier of the order.
    pub order_id: OrderId,

    /// The buyer, as asserted by the gateway at checkout.
    pub user_id: UserId,

    /// The cart this order was created from.
    pub cart_id: CartId,

    /// When the order was committed.
    pub created_at: DateTime<Utc>,

    /// Whether every item has reached a terminal status.
    pub approved: bool,

    /// The order lines, in cart order.
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Returns the order total across all lines.
    pub fn total(&self) -> Money {
        self.items
            .iter()
            .fold(Money::zero(), |acc, item| acc + item.total_price())
    }

    /// True when every item is `Delivered` or `Cancelled`.
    pub fn all_items_terminal(&self) -> bool {
        self.items.iter().all(|item| item.status.is_terminal())
    }

    /// Looks up an item by its identifier.
    pub fn item(&self, order_item_id: OrderItemId) -> Option<&OrderItem> {
        self.items
            .iter()
            .find(|item| item.order_item_id == order_item_id)
    }
}

/// One validated, priced line of an order about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftLine {
    pub variation_id: VariationId,
    pub product_id: ProductId,
    pub shop_id: ShopId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// An order ready to be persisted atomically with its lines.
///
/// Identifiers and timestamps are assigned by the store on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub lines: Vec<DraftLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, cents: i64, status: OrderItemStatus) -> OrderItem {
        OrderItem {
            order_item_id: OrderItemId::new(),
            order_id: OrderId::new(),
            variation_id: VariationId::new(),
            product_id: ProductId::new(),
            shop_id: ShopId::new(),
            quantity,
            unit_price: Money::from_cents(cents),
            status,
        }
    }

    #[test]
    fn money_serializes_as_bare_number() {
        let price = Money::from_cents(1999);
        assert_eq!(serde_json::to_string(&price).unwrap(), "1999");
        let back: Money = serde_json::from_str("1999").unwrap();
        assert_eq!(back, price);
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(1234).to_string(), "12.34");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-42).to_string(), "-0.42");
    }

    #[test]
    fn money_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);
        assert_eq!((a + b).cents(), 1500);
        assert_eq!(a.multiply(3).cents(), 3000);

        let mut acc = Money::zero();
        acc += a;
        assert_eq!(acc.cents(), 1000);
    }

    #[test]
    fn item_total_price() {
        let item = item(3, 1000, OrderItemStatus::Processing);
        assert_eq!(item.total_price().cents(), 3000);
    }

    #[test]
    fn order_total_sums_lines() {
        let order = Order {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            cart_id: CartId::new(),
            created_at: Utc::now(),
            approved: false,
            items: vec![
                item(2, 500, OrderItemStatus::Processing),
                item(1, 250, OrderItemStatus::Processing),
            ],
        };
        assert_eq!(order.total().cents(), 1250);
    }

    #[test]
    fn all_items_terminal_requires_every_line() {
        let mut order = Order {
            order_id: OrderId::new(),
            user_id: UserId::new(),
            cart_id: CartId::new(),
            created_at: Utc::now(),
            approved: false,
            items: vec![
                item(1, 100, OrderItemStatus::Delivered),
                item(1, 100, OrderItemStatus::Shipped),
            ],
        };
        assert!(!order.all_items_terminal());

        order.items[1].status = OrderItemStatus::Cancelled;
        assert!(order.all_items_terminal());
    }

    #[test]
    fn item_lookup() {
        let line = item(1, 100, OrderItemStatus::Processing);
        let wanted = line.order_item_id;
        let order = Order {
            order_id: line.order_id,
            user_id: UserId::new(),
            cart_id: CartId::new(),
            created_at: Utc::now(),
            approved: false,
            items: vec![line],
        };

        assert!(order.item(wanted).is_some());
        assert!(order.item(OrderItemId::new()).is_none());
    }
}
