use tokio::sync::RwLock;

use tacoexpress_core::domain::order::{NewOrder, Order, OrderId, OrderItemId, OrderSummary, UserId};

use super::{OrderRepository, RepositoryError};

#[derive(Default)]
struct OrderStore {
    orders: Vec<Order>,
    next_order_id: i64,
    next_item_id: i64,
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    store: RwLock<OrderStore>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut store = self.store.write().await;

        store.next_order_id += 1;
        let order_id = OrderId(store.next_order_id);
        let mut item_ids = Vec::with_capacity(order.items.len());
        for _ in &order.items {
            store.next_item_id += 1;
            item_ids.push(OrderItemId(store.next_item_id));
        }

        let order = order.into_order(order_id, item_ids);
        store.orders.push(order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.orders.iter().find(|order| order.id == id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<OrderSummary>, RepositoryError> {
        let store = self.store.read().await;
        let mut summaries: Vec<OrderSummary> = store
            .orders
            .iter()
            .filter(|order| order.user_id == user_id)
            .map(Order::summary)
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(summaries)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let store = self.store.read().await;
        Ok(store.orders.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use tacoexpress_core::domain::order::{NewOrder, NewOrderItem, OrderStatus, UserId};
    use tacoexpress_core::domain::product::{ProductId, RestaurantId};

    use super::InMemoryOrderRepository;
    use crate::repositories::OrderRepository;

    fn new_order(user_id: i64) -> NewOrder {
        NewOrder {
            user_id: UserId(user_id),
            restaurant_id: RestaurantId(1),
            status: OrderStatus::Created,
            subtotal: Decimal::new(1800, 2),
            delivery_fee: Decimal::new(4000, 2),
            discount: Decimal::ZERO,
            total: Decimal::new(5800, 2),
            delivery_address: "Calle 123".to_string(),
            coupon_code: None,
            applied_rules: vec!["BASE_DELIVERY_FEE".to_string()],
            items: vec![NewOrderItem {
                product_id: ProductId(3),
                name: "Refresco".to_string(),
                quantity: 1,
                unit_price: Decimal::new(1800, 2),
                total_price: Decimal::new(1800, 2),
            }],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn assigns_sequential_ids_and_lists_per_user() {
        let repo = InMemoryOrderRepository::default();

        let first = repo.create(new_order(1)).await.expect("first");
        let second = repo.create(new_order(1)).await.expect("second");
        repo.create(new_order(2)).await.expect("third");

        assert!(second.id > first.id);
        assert_eq!(repo.count().await.expect("count"), 3);

        let listed = repo.list_for_user(UserId(1)).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);

        let found = repo.find_by_id(first.id).await.expect("find");
        assert_eq!(found.map(|order| order.items.len()), Some(1));
    }
}
