use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::product::{ProductId, RestaurantId};
use crate::errors::DomainError;
use crate::pricing::PriceBreakdown;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderItemId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Order lifecycle. Only `Created` is produced here; the other states are
/// written by the delivery collaborator and only ever read back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Assigned,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Assigned => "ASSIGNED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATED" => Ok(Self::Created),
            "ASSIGNED" => Ok(Self::Assigned),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(DomainError::InvariantViolation(format!("unknown order status `{other}`"))),
        }
    }
}

/// A requested line after the catalog resolved its authoritative name and price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichedItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub delivery_address: String,
    pub coupon_code: Option<String>,
    pub applied_rules: Vec<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: OrderId,
    pub status: OrderStatus,
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

/// An order that has been priced but not yet persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewOrder {
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub delivery_address: String,
    pub coupon_code: Option<String>,
    pub applied_rules: Vec<String>,
    pub items: Vec<NewOrderItem>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Combines enriched lines with the pricing breakdown that was computed
    /// for them. Line totals are taken from the breakdown, matched by position.
    pub fn assemble(
        user_id: UserId,
        restaurant_id: RestaurantId,
        delivery_address: String,
        coupon_code: Option<String>,
        enriched: Vec<EnrichedItem>,
        breakdown: PriceBreakdown,
        created_at: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if enriched.len() != breakdown.lines.len() {
            return Err(DomainError::InvariantViolation(format!(
                "pricing returned {} lines for {} order items",
                breakdown.lines.len(),
                enriched.len()
            )));
        }

        let items = enriched
            .into_iter()
            .zip(breakdown.lines.iter())
            .map(|(item, priced)| {
                if priced.quantity != item.quantity || priced.unit_price != item.unit_price {
                    return Err(DomainError::InvariantViolation(format!(
                        "priced line for product {} does not match the enriched item",
                        item.product_id
                    )));
                }
                Ok(NewOrderItem {
                    product_id: item.product_id,
                    name: item.name,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    total_price: priced.line_total,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = Self {
            user_id,
            restaurant_id,
            status: OrderStatus::Created,
            subtotal: breakdown.subtotal,
            delivery_fee: breakdown.delivery_fee,
            discount: breakdown.discount,
            total: breakdown.total,
            delivery_address,
            coupon_code,
            applied_rules: breakdown.applied_rules,
            items,
            created_at,
        };
        order.check_invariants()?;
        Ok(order)
    }

    pub fn check_invariants(&self) -> Result<(), DomainError> {
        if self.items.is_empty() {
            return Err(DomainError::InvariantViolation("order has no items".to_string()));
        }
        if self.delivery_address.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "order has an empty delivery address".to_string(),
            ));
        }

        let amounts = [self.subtotal, self.delivery_fee, self.discount, self.total];
        if amounts.iter().any(|amount| amount.is_sign_negative()) {
            return Err(DomainError::InvariantViolation(
                "order amounts must be non-negative".to_string(),
            ));
        }
        if self.total != self.subtotal + self.delivery_fee - self.discount {
            return Err(DomainError::InvariantViolation(format!(
                "total {} != subtotal {} + delivery fee {} - discount {}",
                self.total, self.subtotal, self.delivery_fee, self.discount
            )));
        }

        let item_sum: Decimal = self.items.iter().map(|item| item.total_price).sum();
        if item_sum != self.subtotal {
            return Err(DomainError::InvariantViolation(format!(
                "item totals {item_sum} do not add up to subtotal {}",
                self.subtotal
            )));
        }

        Ok(())
    }

    /// Attaches storage-assigned identifiers. `item_ids` follows `items` order.
    pub fn into_order(self, id: OrderId, item_ids: Vec<OrderItemId>) -> Order {
        let items = self
            .items
            .into_iter()
            .zip(item_ids)
            .map(|(item, item_id)| OrderItem {
                id: item_id,
                product_id: item.product_id,
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
                total_price: item.total_price,
            })
            .collect();

        Order {
            id,
            user_id: self.user_id,
            restaurant_id: self.restaurant_id,
            status: self.status,
            subtotal: self.subtotal,
            delivery_fee: self.delivery_fee,
            discount: self.discount,
            total: self.total,
            delivery_address: self.delivery_address,
            coupon_code: self.coupon_code,
            applied_rules: self.applied_rules,
            items,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

impl Order {
    pub fn summary(&self) -> OrderSummary {
        OrderSummary {
            id: self.id,
            status: self.status,
            total: self.total,
            created_at: self.created_at,
        }
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
