use async_trait::async_trait;
use thiserror::Error;

use tacoexpress_core::domain::order::{NewOrder, Order, OrderId, OrderSummary, UserId};
use tacoexpress_core::errors::OrderError;

pub mod memory;
pub mod order;

pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for OrderError {
    fn from(value: RepositoryError) -> Self {
        Self::Persistence(value.to_string())
    }
}

/// Durable store for orders and their line items.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the order and all of its items as one unit and returns the
    /// stored order with its assigned identifiers.
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Newest first, ties broken by descending id.
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;
}
