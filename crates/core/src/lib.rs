pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod identity;
pub mod pricing;
pub mod retry;

pub use catalog::{CatalogError, CatalogLookup, InMemoryCatalog};
pub use domain::order::{
    EnrichedItem, NewOrder, NewOrderItem, Order, OrderId, OrderItem, OrderItemId, OrderStatus,
    OrderSummary, UserId,
};
pub use domain::product::{CatalogProduct, ProductId, RestaurantId};
pub use errors::{DomainError, InterfaceError, OrderError};
pub use identity::{bearer_token, CallerIdentity, IdentityError, IdentitySigner};
pub use pricing::{
    FlatFeePricingEngine, PriceBreakdown, PricingEngine, PricingError, PricingLineInput,
    PricingPolicy,
};
pub use retry::{retry_with_backoff, RetryPolicy};
