use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use tacoexpress_core::catalog::{CatalogError, CatalogLookup};
use tacoexpress_core::domain::product::{CatalogProduct, ProductId, RestaurantId};

/// Catalog service client for `GET /catalog/products/{id}`.
#[derive(Clone, Debug)]
pub struct HttpCatalogLookup {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogProductPayload {
    name: String,
    price: Decimal,
    #[serde(default = "available_by_default")]
    is_available: bool,
    restaurant_id: Option<i64>,
}

fn available_by_default() -> bool {
    true
}

impl HttpCatalogLookup {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Hits the service banner; used to wait for the catalog at startup.
    pub async fn probe(&self) -> Result<(), reqwest::Error> {
        self.client.get(format!("{}/", self.base_url)).send().await?.error_for_status()?;
        Ok(())
    }

    fn product_url(&self, product_id: ProductId) -> String {
        format!("{}/catalog/products/{}", self.base_url, product_id)
    }
}

#[async_trait]
impl CatalogLookup for HttpCatalogLookup {
    async fn get_product(&self, product_id: ProductId) -> Result<CatalogProduct, CatalogError> {
        let unavailable = |reason: String| CatalogError::Unavailable { product_id, reason };

        let response =
            self.client.get(self.product_url(product_id)).send().await.map_err(|error| {
                warn!(
                    event_name = "catalog.lookup.transport_error",
                    product_id = product_id.0,
                    error = %error,
                    "catalog request failed"
                );
                unavailable(if error.is_timeout() {
                    "catalog request timed out".to_string()
                } else {
                    format!("catalog request failed: {error}")
                })
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(product_id));
        }
        if !status.is_success() {
            warn!(
                event_name = "catalog.lookup.bad_status",
                product_id = product_id.0,
                status = %status,
                "catalog returned an error status"
            );
            return Err(unavailable(format!("catalog returned {status}")));
        }

        let payload: CatalogProductPayload = response
            .json()
            .await
            .map_err(|error| unavailable(format!("failed to decode catalog product: {error}")))?;

        Ok(CatalogProduct {
            id: product_id,
            name: payload.name,
            price: payload.price,
            is_available: payload.is_available,
            restaurant_id: payload.restaurant_id.map(RestaurantId),
        })
    }
}
