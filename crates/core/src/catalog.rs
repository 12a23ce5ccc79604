use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::product::{CatalogProduct, ProductId, RestaurantId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("product {0} was not found in the catalog")]
    NotFound(ProductId),
    #[error("catalog lookup for product {product_id} failed: {reason}")]
    Unavailable { product_id: ProductId, reason: String },
}

/// Resolves a product id to its authoritative name and price.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn get_product(&self, product_id: ProductId) -> Result<CatalogProduct, CatalogError>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    products: Vec<CatalogProduct>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<CatalogProduct>) -> Self {
        Self { products }
    }

    /// The menu the catalog service seeds on first start.
    pub fn seeded() -> Self {
        let restaurant = RestaurantId(1);
        Self::new(vec![
            CatalogProduct::new(1, "Taco al pastor", Decimal::new(2000, 2)).at_restaurant(restaurant),
            CatalogProduct::new(2, "Taco de suadero", Decimal::new(2200, 2)).at_restaurant(restaurant),
            CatalogProduct::new(3, "Refresco", Decimal::new(1800, 2)).at_restaurant(restaurant),
        ])
    }

    pub fn find(&self, product_id: ProductId) -> Option<&CatalogProduct> {
        self.products.iter().find(|product| product.id == product_id)
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn get_product(&self, product_id: ProductId) -> Result<CatalogProduct, CatalogError> {
        self.find(product_id).cloned().ok_or(CatalogError::NotFound(product_id))
    }
}
