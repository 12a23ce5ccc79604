//! Order HTTP API.
//!
//! - `POST /orders`            create an order for the authenticated caller
//! - `GET  /orders/my`         caller's orders, newest first
//! - `GET  /orders/{id}`       one of the caller's orders with its items
//! - `POST /pricing/calculate` price arbitrary lines without persisting

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use tacoexpress_core::domain::order::{Order, OrderId, OrderItem, OrderStatus, OrderSummary};
use tacoexpress_core::domain::product::{ProductId, RestaurantId};
use tacoexpress_core::errors::{InterfaceError, OrderError};
use tacoexpress_core::identity::{bearer_token, CallerIdentity, IdentityError, IdentitySigner};
use tacoexpress_core::pricing::{PriceBreakdown, PricedLine, PricingEngine, PricingLineInput};

use crate::orchestrator::{CreateOrderCommand, OrderOrchestrator, RequestedItem};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<OrderOrchestrator>,
    pub pricing: Arc<dyn PricingEngine>,
    pub signer: Arc<IdentitySigner>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/my", get(list_my_orders))
        .route("/orders/{id}", get(get_order))
        .route("/pricing/calculate", post(calculate_price))
        .layer(middleware::from_fn(assign_correlation_id))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderBody {
    pub restaurant_id: Option<i64>,
    #[serde(default)]
    pub items: Vec<CreateOrderItemBody>,
    #[serde(default)]
    pub delivery_address: String,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItemBody {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingBody {
    #[serde(default)]
    pub items: Vec<PricingItemBody>,
    pub coupon_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingItemBody {
    pub product_id: Option<i64>,
    pub unit_price: Decimal,
    pub quantity: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub user_id: i64,
    pub restaurant_id: i64,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub delivery_address: String,
    pub coupon_code: Option<String>,
    pub applied_rules: Vec<String>,
    pub items: Vec<OrderItemResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub name: String,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryResponse {
    pub id: i64,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub delivery_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub discount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    pub applied_rules: Vec<String>,
    pub lines: Vec<PricedLineResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLineResponse {
    pub product_id: Option<i64>,
    pub quantity: u32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub line_total: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: bool,
    pub code: &'static str,
    pub message: String,
    pub correlation_id: String,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.0,
            user_id: order.user_id.0,
            restaurant_id: order.restaurant_id.0,
            status: order.status,
            subtotal: order.subtotal,
            delivery_fee: order.delivery_fee,
            discount: order.discount,
            total: order.total,
            delivery_address: order.delivery_address,
            coupon_code: order.coupon_code,
            applied_rules: order.applied_rules,
            items: order.items.into_iter().map(OrderItemResponse::from).collect(),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

impl From<OrderItem> for OrderItemResponse {
    fn from(item: OrderItem) -> Self {
        Self {
            id: item.id.0,
            product_id: item.product_id.0,
            name: item.name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            total_price: item.total_price,
        }
    }
}

impl From<OrderSummary> for OrderSummaryResponse {
    fn from(summary: OrderSummary) -> Self {
        Self {
            id: summary.id.0,
            status: summary.status,
            total: summary.total,
            created_at: summary.created_at,
        }
    }
}

impl From<PriceBreakdown> for PricingResponse {
    fn from(breakdown: PriceBreakdown) -> Self {
        Self {
            subtotal: breakdown.subtotal,
            delivery_fee: breakdown.delivery_fee,
            discount: breakdown.discount,
            total: breakdown.total,
            applied_rules: breakdown.applied_rules,
            lines: breakdown.lines.into_iter().map(PricedLineResponse::from).collect(),
        }
    }
}

impl From<PricedLine> for PricedLineResponse {
    fn from(line: PricedLine) -> Self {
        Self {
            product_id: line.product_id.map(|id| id.0),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.line_total,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and extractors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    fn from_order(error: OrderError, correlation_id: &CorrelationId) -> Self {
        Self(error.into_interface(correlation_id.0.clone()))
    }

    fn bad_request(message: impl Into<String>, correlation_id: &CorrelationId) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.0.clone(),
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let interface = self.0;
        let status = StatusCode::from_u16(interface.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(
                event_name = "http.request.failed",
                correlation_id = interface.correlation_id(),
                code = interface.code(),
                error = %interface,
                "request failed"
            );
        } else {
            warn!(
                event_name = "http.request.rejected",
                correlation_id = interface.correlation_id(),
                code = interface.code(),
                error = %interface,
                "request rejected"
            );
        }

        let body = ErrorBody {
            error: true,
            code: interface.code(),
            message: interface.user_message(),
            correlation_id: interface.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    fn from_parts(parts: &Parts) -> Self {
        parts
            .extensions
            .get::<CorrelationId>()
            .cloned()
            .unwrap_or_else(|| CorrelationId(Uuid::new_v4().to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CorrelationId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

/// Reuses a caller-supplied correlation id when it looks sane, otherwise
/// mints one. The id is echoed back on the response.
async fn assign_correlation_id(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request.extensions_mut().insert(CorrelationId(correlation_id.clone()));
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}

/// Caller identity verified from the bearer token.
#[derive(Clone, Copy, Debug)]
pub struct Authenticated(pub CallerIdentity);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let correlation_id = CorrelationId::from_parts(parts);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or(IdentityError::Missing)
            .map_err(|error| ApiError::from_order(error.into(), &correlation_id))?;

        state
            .signer
            .verify(token, Utc::now())
            .map(Authenticated)
            .map_err(|error| ApiError::from_order(error.into(), &correlation_id))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_order(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Authenticated(identity): Authenticated,
    payload: Result<Json<CreateOrderBody>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &correlation_id))?;

    let command = CreateOrderCommand {
        restaurant_id: body.restaurant_id.map(RestaurantId),
        items: body
            .items
            .into_iter()
            .map(|item| RequestedItem {
                product_id: ProductId(item.product_id),
                quantity: item.quantity,
            })
            .collect(),
        delivery_address: body.delivery_address,
        coupon_code: body.coupon_code,
    };

    let order = state
        .orchestrator
        .create_order(&identity, command, &correlation_id.0)
        .await
        .map_err(|error| ApiError::from_order(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(OrderResponse::from(order))))
}

async fn list_my_orders(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Authenticated(identity): Authenticated,
) -> Result<Json<Vec<OrderSummaryResponse>>, ApiError> {
    let summaries = state
        .orchestrator
        .list_for_user(&identity)
        .await
        .map_err(|error| ApiError::from_order(error, &correlation_id))?;

    Ok(Json(summaries.into_iter().map(OrderSummaryResponse::from).collect()))
}

async fn get_order(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Authenticated(identity): Authenticated,
    Path(raw_id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = raw_id
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(OrderId)
        .ok_or_else(|| ApiError::bad_request("order id must be a positive integer", &correlation_id))?;

    let order = state
        .orchestrator
        .get_order(&identity, order_id)
        .await
        .map_err(|error| ApiError::from_order(error, &correlation_id))?;

    Ok(Json(OrderResponse::from(order)))
}

async fn calculate_price(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    payload: Result<Json<PricingBody>, JsonRejection>,
) -> Result<Json<PricingResponse>, ApiError> {
    let Json(body) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text(), &correlation_id))?;

    let lines = body
        .items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let quantity = u32::try_from(item.quantity).map_err(|_| {
                ApiError::bad_request(
                    format!("items[{index}].quantity must be a positive integer"),
                    &correlation_id,
                )
            })?;
            Ok(PricingLineInput {
                product_id: item.product_id.map(ProductId),
                unit_price: item.unit_price,
                quantity,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    let breakdown = state
        .pricing
        .calculate(&lines, body.coupon_code.as_deref())
        .map_err(|error| ApiError::from_order(error.into(), &correlation_id))?;

    Ok(Json(PricingResponse::from(breakdown)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, header::CONTENT_TYPE, Request, StatusCode},
        Router,
    };
    use chrono::{Duration as ChronoDuration, Utc};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use tacoexpress_core::catalog::InMemoryCatalog;
    use tacoexpress_core::domain::order::UserId;
    use tacoexpress_core::identity::IdentitySigner;
    use tacoexpress_core::pricing::FlatFeePricingEngine;
    use tacoexpress_db::{connect_with_settings, migrations, SqlOrderRepository};

    use super::{router, AppState, CORRELATION_HEADER};
    use crate::orchestrator::{OrchestratorSettings, OrderOrchestrator};

    const SECRET: &str = "route-test-signing-secret";

    async fn app() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let pricing = Arc::new(FlatFeePricingEngine::default());
        let orchestrator = OrderOrchestrator::new(
            Arc::new(InMemoryCatalog::seeded()),
            pricing.clone(),
            Arc::new(SqlOrderRepository::new(pool)),
            OrchestratorSettings { lookup_timeout: Duration::from_secs(5), max_items: 50 },
        );

        router(AppState {
            orchestrator: Arc::new(orchestrator),
            pricing,
            signer: Arc::new(IdentitySigner::new(SECRET.to_string().into())),
        })
    }

    fn token(user_id: i64) -> String {
        IdentitySigner::new(SECRET.to_string().into())
            .issue(UserId(user_id), ChronoDuration::hours(1), Utc::now())
            .expect("issue token")
    }

    fn post_json(uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder =
            Request::builder().method("POST").uri(uri).header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).expect("request")
    }

    fn get(uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .expect("request")
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn order_body() -> Value {
        json!({
            "restaurantId": 1,
            "items": [{ "productId": 1, "quantity": 2 }, { "productId": 3, "quantity": 1 }],
            "deliveryAddress": "Calle 123, CDMX",
            "couponCode": "TACO10"
        })
    }

    #[tokio::test]
    async fn create_order_returns_created_order() {
        let app = app().await;
        let user = token(7);

        let response =
            app.oneshot(post_json("/orders", order_body(), Some(&user))).await.expect("response");

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = read_json(response).await;
        assert_eq!(body["userId"], 7);
        assert_eq!(body["status"], "CREATED");
        assert_eq!(body["subtotal"], 58.0);
        assert_eq!(body["discount"], 5.8);
        assert_eq!(body["total"], 92.2);
        assert_eq!(body["items"][0]["totalPrice"], 40.0);
        assert_eq!(body["appliedRules"][1], "COUPON_TACO10_10_PERCENT");
    }

    #[tokio::test]
    async fn missing_or_forged_token_is_unauthorized() {
        let app = app().await;

        let missing =
            app.clone().oneshot(post_json("/orders", order_body(), None)).await.expect("response");
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(missing).await;
        assert_eq!(body["error"], true);
        assert_eq!(body["code"], "unauthorized");
        assert!(body["correlationId"].as_str().is_some_and(|id| !id.is_empty()));

        let forged = token(7).replacen("v1.7.", "v1.8.", 1);
        let response =
            app.oneshot(post_json("/orders", order_body(), Some(&forged))).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn validation_and_lookup_failures_map_to_client_errors() {
        let app = app().await;
        let user = token(7);

        let empty = json!({ "restaurantId": 1, "items": [], "deliveryAddress": "Calle 123" });
        let response =
            app.clone().oneshot(post_json("/orders", empty, Some(&user))).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "validation_error");

        let unknown = json!({
            "restaurantId": 1,
            "items": [{ "productId": 99, "quantity": 1 }],
            "deliveryAddress": "Calle 123"
        });
        let response =
            app.clone().oneshot(post_json("/orders", unknown, Some(&user))).await.expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let malformed = Request::builder()
            .method("POST")
            .uri("/orders")
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, format!("Bearer {user}"))
            .body(Body::from("{\"restaurantId\": \"one\""))
            .expect("request");
        let response = app.oneshot(malformed).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn orders_can_be_listed_and_fetched_by_owner_only() {
        let app = app().await;
        let owner = token(7);

        let created = app
            .clone()
            .oneshot(post_json("/orders", order_body(), Some(&owner)))
            .await
            .expect("response");
        let id = read_json(created).await["id"].as_i64().expect("order id");

        let mine = app.clone().oneshot(get("/orders/my", &owner)).await.expect("response");
        assert_eq!(mine.status(), StatusCode::OK);
        let listed = read_json(mine).await;
        assert_eq!(listed[0]["id"], id);
        assert_eq!(listed[0]["total"], 92.2);

        let fetched =
            app.clone().oneshot(get(&format!("/orders/{id}"), &owner)).await.expect("response");
        assert_eq!(fetched.status(), StatusCode::OK);
        assert_eq!(read_json(fetched).await["items"].as_array().map(Vec::len), Some(2));

        let foreign =
            app.clone().oneshot(get(&format!("/orders/{id}"), &token(8))).await.expect("response");
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);

        let non_numeric = app.oneshot(get("/orders/abc", &owner)).await.expect("response");
        assert_eq!(non_numeric.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pricing_endpoint_prices_without_authentication() {
        let app = app().await;

        let request = post_json(
            "/pricing/calculate",
            json!({
                "items": [
                    { "productId": 1, "unitPrice": 20, "quantity": 2 },
                    { "unitPrice": "18.00", "quantity": 1 }
                ],
                "couponCode": "taco10"
            }),
            None,
        );
        let response = app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["subtotal"], 58.0);
        assert_eq!(body["deliveryFee"], 40.0);
        assert_eq!(body["total"], 92.2);
        assert_eq!(body["lines"][0]["lineTotal"], 40.0);
        assert_eq!(body["lines"][1]["productId"], Value::Null);

        let empty = post_json("/pricing/calculate", json!({ "items": [] }), None);
        let response = app.clone().oneshot(empty).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let oversized = post_json(
            "/pricing/calculate",
            json!({ "items": [{ "unitPrice": "50000000000000000000000000000", "quantity": 2 }] }),
            None,
        );
        let response = app.oneshot(oversized).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await["code"], "validation_error");
    }

    #[tokio::test]
    async fn correlation_id_is_echoed_on_errors() {
        let app = app().await;

        let request = Request::builder()
            .uri("/orders/my")
            .header(CORRELATION_HEADER, "trace-123")
            .body(Body::empty())
            .expect("request");
        let response = app.oneshot(request).await.expect("response");

        assert_eq!(
            response.headers().get(CORRELATION_HEADER).and_then(|v| v.to_str().ok()),
            Some("trace-123")
        );
        assert_eq!(read_json(response).await["correlationId"], "trace-123");
    }
}
