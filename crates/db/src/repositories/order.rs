use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::Decimal;
use sqlx::Row;
use tracing::debug;

use tacoexpress_core::domain::order::{
    NewOrder, Order, OrderId, OrderItem, OrderItemId, OrderStatus, OrderSummary, UserId,
};
use tacoexpress_core::domain::product::{ProductId, RestaurantId};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn timestamp_to_text(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{field}: {e}")))
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value).map_err(|e| RepositoryError::Decode(format!("{field}: {e}")))
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<OrderItem, RepositoryError> {
    let quantity: i64 = get(row, "quantity")?;
    let unit_price: String = get(row, "unit_price")?;
    let total_price: String = get(row, "total_price")?;

    Ok(OrderItem {
        id: OrderItemId(get(row, "id")?),
        product_id: ProductId(get(row, "product_id")?),
        name: get(row, "name")?,
        quantity: u32::try_from(quantity)
            .map_err(|_| RepositoryError::Decode(format!("quantity out of range: {quantity}")))?,
        unit_price: parse_decimal("unit_price", &unit_price)?,
        total_price: parse_decimal("total_price", &total_price)?,
    })
}

fn row_to_order(
    row: &sqlx::sqlite::SqliteRow,
    items: Vec<OrderItem>,
) -> Result<Order, RepositoryError> {
    let status: String = get(row, "status")?;
    let subtotal: String = get(row, "subtotal")?;
    let delivery_fee: String = get(row, "delivery_fee")?;
    let discount: String = get(row, "discount")?;
    let total: String = get(row, "total")?;
    let applied_rules: String = get(row, "applied_rules")?;
    let created_at: String = get(row, "created_at")?;
    let updated_at: String = get(row, "updated_at")?;

    Ok(Order {
        id: OrderId(get(row, "id")?),
        user_id: UserId(get(row, "user_id")?),
        restaurant_id: RestaurantId(get(row, "restaurant_id")?),
        status: OrderStatus::from_str(&status)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        subtotal: parse_decimal("subtotal", &subtotal)?,
        delivery_fee: parse_decimal("delivery_fee", &delivery_fee)?,
        discount: parse_decimal("discount", &discount)?,
        total: parse_decimal("total", &total)?,
        delivery_address: get(row, "delivery_address")?,
        coupon_code: get(row, "coupon_code")?,
        applied_rules: serde_json::from_str(&applied_rules)
            .map_err(|e| RepositoryError::Decode(format!("applied_rules: {e}")))?,
        items,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create(&self, mut order: NewOrder) -> Result<Order, RepositoryError> {
        // Stored timestamps keep microseconds; match them in the returned value.
        order.created_at = order.created_at.trunc_subsecs(6);
        let created_at = timestamp_to_text(order.created_at);
        let applied_rules = serde_json::to_string(&order.applied_rules)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        let mut tx = self.pool.begin().await?;

        let order_id = sqlx::query(
            "INSERT INTO orders (user_id, restaurant_id, status, subtotal, delivery_fee, discount,
                                 total, delivery_address, coupon_code, applied_rules,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.user_id.0)
        .bind(order.restaurant_id.0)
        .bind(order.status.as_str())
        .bind(order.subtotal.to_string())
        .bind(order.delivery_fee.to_string())
        .bind(order.discount.to_string())
        .bind(order.total.to_string())
        .bind(&order.delivery_address)
        .bind(&order.coupon_code)
        .bind(&applied_rules)
        .bind(&created_at)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let mut item_ids = Vec::with_capacity(order.items.len());
        for item in &order.items {
            let item_id = sqlx::query(
                "INSERT INTO order_items (order_id, product_id, name, quantity, unit_price,
                                          total_price)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(order_id)
            .bind(item.product_id.0)
            .bind(&item.name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.to_string())
            .bind(item.total_price.to_string())
            .execute(&mut *tx)
            .await?
            .last_insert_rowid();
            item_ids.push(OrderItemId(item_id));
        }

        tx.commit().await?;

        debug!(
            event_name = "db.orders.inserted",
            order_id = order_id,
            item_count = item_ids.len(),
            "order and items committed"
        );

        Ok(order.into_order(OrderId(order_id), item_ids))
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, restaurant_id, status, subtotal, delivery_fee, discount, total,
                    delivery_address, coupon_code, applied_rules, created_at, updated_at
             FROM orders WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            "SELECT id, product_id, name, quantity, unit_price, total_price
             FROM order_items WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;
        let items = item_rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;

        row_to_order(&row, items).map(Some)
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, status, total, created_at
             FROM orders WHERE user_id = ?
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: String = get(row, "status")?;
                let total: String = get(row, "total")?;
                let created_at: String = get(row, "created_at")?;
                Ok(OrderSummary {
                    id: OrderId(get(row, "id")?),
                    status: OrderStatus::from_str(&status)
                        .map_err(|e| RepositoryError::Decode(e.to_string()))?,
                    total: parse_decimal("total", &total)?,
                    created_at: parse_timestamp("created_at", &created_at)?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM orders")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count.max(0) as u64)
    }
}
