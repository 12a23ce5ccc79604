//! Order creation: catalog enrichment, pricing and atomic persistence.
//!
//! Nothing is written until every lookup and the pricing call succeeded, so a
//! failure at any earlier step needs no compensation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tacoexpress_core::catalog::{CatalogError, CatalogLookup};
use tacoexpress_core::domain::order::{EnrichedItem, NewOrder, Order, OrderId, OrderSummary};
use tacoexpress_core::domain::product::{CatalogProduct, ProductId, RestaurantId};
use tacoexpress_core::errors::{DomainError, OrderError};
use tacoexpress_core::identity::CallerIdentity;
use tacoexpress_core::pricing::{PricingEngine, PricingLineInput};
use tacoexpress_db::OrderRepository;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestedItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateOrderCommand {
    pub restaurant_id: Option<RestaurantId>,
    pub items: Vec<RequestedItem>,
    pub delivery_address: String,
    pub coupon_code: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub lookup_timeout: Duration,
    pub max_items: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self { lookup_timeout: Duration::from_secs(5), max_items: 50 }
    }
}

/// Validated form of [`CreateOrderCommand`].
struct OrderDraft {
    restaurant_id: RestaurantId,
    items: Vec<(ProductId, u32)>,
    delivery_address: String,
    coupon_code: Option<String>,
}

pub struct OrderOrchestrator {
    catalog: Arc<dyn CatalogLookup>,
    pricing: Arc<dyn PricingEngine>,
    orders: Arc<dyn OrderRepository>,
    settings: OrchestratorSettings,
}

impl OrderOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogLookup>,
        pricing: Arc<dyn PricingEngine>,
        orders: Arc<dyn OrderRepository>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { catalog, pricing, orders, settings }
    }

    pub async fn create_order(
        &self,
        identity: &CallerIdentity,
        command: CreateOrderCommand,
        correlation_id: &str,
    ) -> Result<Order, OrderError> {
        let draft = self.validate(command)?;

        let enriched = self.enrich(draft.restaurant_id, &draft.items).await.map_err(|error| {
            warn!(
                event_name = "orders.create.enrichment_failed",
                correlation_id = correlation_id,
                user_id = identity.user_id.0,
                error = %error,
                "catalog enrichment failed"
            );
            error
        })?;

        let lines: Vec<PricingLineInput> = enriched.iter().map(PricingLineInput::from).collect();
        let breakdown = self.pricing.calculate(&lines, draft.coupon_code.as_deref())?;

        let new_order = NewOrder::assemble(
            identity.user_id,
            draft.restaurant_id,
            draft.delivery_address,
            draft.coupon_code,
            enriched,
            breakdown,
            Utc::now(),
        )?;

        let order = self.orders.create(new_order).await.map_err(|error| {
            error!(
                event_name = "orders.create.persist_failed",
                correlation_id = correlation_id,
                user_id = identity.user_id.0,
                error = %error,
                "order transaction rolled back"
            );
            OrderError::from(error)
        })?;

        info!(
            event_name = "orders.create.persisted",
            correlation_id = correlation_id,
            order_id = order.id.0,
            user_id = order.user_id.0,
            item_count = order.items.len(),
            total = %order.total,
            "order created"
        );

        Ok(order)
    }

    /// Orders owned by another caller are reported as missing.
    pub async fn get_order(
        &self,
        identity: &CallerIdentity,
        order_id: OrderId,
    ) -> Result<Order, OrderError> {
        let order = self.orders.find_by_id(order_id).await?;
        match order {
            Some(order) if order.user_id == identity.user_id => Ok(order),
            _ => Err(OrderError::NotFound(format!("order {order_id} was not found"))),
        }
    }

    pub async fn list_for_user(
        &self,
        identity: &CallerIdentity,
    ) -> Result<Vec<OrderSummary>, OrderError> {
        Ok(self.orders.list_for_user(identity.user_id).await?)
    }

    fn validate(&self, command: CreateOrderCommand) -> Result<OrderDraft, OrderError> {
        let restaurant_id = command
            .restaurant_id
            .filter(|id| id.0 > 0)
            .ok_or_else(|| OrderError::Validation("restaurantId is required".to_string()))?;

        if command.items.is_empty() {
            return Err(OrderError::Validation("items must contain at least one item".to_string()));
        }
        if command.items.len() > self.settings.max_items {
            return Err(OrderError::Validation(format!(
                "an order may contain at most {} items",
                self.settings.max_items
            )));
        }

        let items = command
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                if item.product_id.0 <= 0 {
                    return Err(OrderError::Validation(format!(
                        "items[{index}].productId must be a positive integer"
                    )));
                }
                let quantity = u32::try_from(item.quantity)
                    .ok()
                    .filter(|quantity| *quantity > 0)
                    .ok_or_else(|| {
                        OrderError::Validation(format!(
                            "items[{index}].quantity must be a positive integer"
                        ))
                    })?;
                Ok((item.product_id, quantity))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let delivery_address = command.delivery_address.trim().to_string();
        if delivery_address.is_empty() {
            return Err(OrderError::Validation("deliveryAddress is required".to_string()));
        }

        let coupon_code = command
            .coupon_code
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty());

        Ok(OrderDraft { restaurant_id, items, delivery_address, coupon_code })
    }

    /// Resolves every line concurrently. The first failure aborts the
    /// lookups still in flight.
    async fn enrich(
        &self,
        restaurant_id: RestaurantId,
        items: &[(ProductId, u32)],
    ) -> Result<Vec<EnrichedItem>, OrderError> {
        let mut lookups = JoinSet::new();
        for (index, (product_id, _)) in items.iter().enumerate() {
            let catalog = Arc::clone(&self.catalog);
            let product_id = *product_id;
            let timeout = self.settings.lookup_timeout;
            lookups.spawn(async move {
                let result = match tokio::time::timeout(timeout, catalog.get_product(product_id))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CatalogError::Unavailable {
                        product_id,
                        reason: format!("lookup timed out after {} ms", timeout.as_millis()),
                    }),
                };
                (index, result)
            });
        }

        let mut resolved: Vec<Option<CatalogProduct>> = vec![None; items.len()];
        while let Some(joined) = lookups.join_next().await {
            let (index, result) = match joined {
                Ok(outcome) => outcome,
                Err(join_error) => {
                    lookups.abort_all();
                    return Err(OrderError::UpstreamUnavailable(format!(
                        "catalog lookup task failed: {join_error}"
                    )));
                }
            };
            match result {
                Ok(product) => resolved[index] = Some(product),
                Err(lookup_error) => {
                    lookups.abort_all();
                    return Err(lookup_error.into());
                }
            }
        }

        items
            .iter()
            .zip(resolved)
            .map(|((product_id, quantity), product)| {
                let product = product.ok_or_else(|| {
                    DomainError::InvariantViolation(format!(
                        "catalog lookup for product {product_id} produced no result"
                    ))
                })?;
                if !product.is_available {
                    return Err(OrderError::Validation(format!(
                        "product {product_id} is not available"
                    )));
                }
                if !product.is_sold_by(restaurant_id) {
                    return Err(OrderError::Validation(format!(
                        "product {product_id} is not sold by restaurant {restaurant_id}"
                    )));
                }
                Ok(EnrichedItem {
                    product_id: *product_id,
                    name: product.name,
                    quantity: *quantity,
                    unit_price: product.price,
                })
            })
            .collect()
    }
}
