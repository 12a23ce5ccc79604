use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RestaurantId(pub i64);

/// Authoritative product data as reported by the catalog collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogProduct {
    pub id: ProductId,
    pub name: String,
    pub price: Decimal,
    pub is_available: bool,
    pub restaurant_id: Option<RestaurantId>,
}

impl CatalogProduct {
    pub fn new(id: i64, name: impl Into<String>, price: Decimal) -> Self {
        Self { id: ProductId(id), name: name.into(), price, is_available: true, restaurant_id: None }
    }

    pub fn at_restaurant(mut self, restaurant_id: RestaurantId) -> Self {
        self.restaurant_id = Some(restaurant_id);
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.is_available = false;
        self
    }

    /// Products without a restaurant reference are accepted for any restaurant.
    pub fn is_sold_by(&self, restaurant_id: RestaurantId) -> bool {
        self.restaurant_id.map_or(true, |owner| owner == restaurant_id)
    }
}

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for RestaurantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
