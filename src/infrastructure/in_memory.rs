use crate::domain::order::{Order, OrderId, UserId};
use crate::domain::payment::{PaymentId, PaymentIntent, PaymentStatus};
use crate::domain::ports::{OrderStore, PaymentIntentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory store for orders.
///
/// Uses `Arc<RwLock<HashMap<OrderId, Order>>>` to allow shared concurrent access.
#[derive(Default, Clone)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new, empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(orders: &mut [Order]) {
    orders.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(PaymentError::DuplicateOrder(order.id));
        }
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn store(&self, order: Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let orders = self.orders.read().await;
        Ok(orders.get(order_id).cloned())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut owned: Vec<Order> = orders
            .values()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut owned);
        Ok(owned)
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut all: Vec<Order> = orders.values().cloned().collect();
        newest_first(&mut all);
        Ok(all)
    }
}

#[derive(Default)]
struct IntentTables {
    intents: HashMap<PaymentId, PaymentIntent>,
    by_reference: HashMap<String, PaymentId>,
    /// Insertion order per order.
    by_order: HashMap<OrderId, Vec<PaymentId>>,
}

/// A thread-safe in-memory store for payment intents.
///
/// All tables sit behind one `RwLock`, so the uniqueness checks in `insert`
/// and the status check in `compare_and_set` are atomic with the write.
#[derive(Default, Clone)]
pub struct InMemoryPaymentIntentStore {
    tables: Arc<RwLock<IntentTables>>,
}

impl InMemoryPaymentIntentStore {
    /// Creates a new, empty in-memory payment intent store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentIntentStore for InMemoryPaymentIntentStore {
    async fn insert(&self, intent: PaymentIntent) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.by_reference.contains_key(&intent.external_reference) {
            return Err(PaymentError::DuplicateReference(intent.external_reference));
        }
        if intent.status == PaymentStatus::Pending
            && let Some(pending) = tables
                .by_order
                .get(&intent.order_id)
                .into_iter()
                .flatten()
                .filter_map(|id| tables.intents.get(id))
                .find(|i| i.status == PaymentStatus::Pending)
        {
            return Err(PaymentError::PaymentAlreadyActive {
                order_id: intent.order_id.clone(),
                payment_id: pending.id.clone(),
            });
        }

        tables
            .by_reference
            .insert(intent.external_reference.clone(), intent.id.clone());
        tables
            .by_order
            .entry(intent.order_id.clone())
            .or_default()
            .push(intent.id.clone());
        tables.intents.insert(intent.id.clone(), intent);
        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(tables.intents.get(payment_id).cloned())
    }

    async fn compare_and_set(
        &self,
        expected: PaymentStatus,
        intent: PaymentIntent,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.intents.get_mut(&intent.id) {
            Some(current) if current.status == expected => {
                *current = intent;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(PaymentError::PaymentNotFound(intent.id)),
        }
    }

    async fn for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_order
            .get(order_id)
            .into_iter()
            .flatten()
            .rev()
            .filter_map(|id| tables.intents.get(id).cloned())
            .collect())
    }

    async fn pending_expired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentIntent>> {
        let tables = self.tables.read().await;
        Ok(tables
            .intents
            .values()
            .filter(|i| i.is_stale(now))
            .cloned()
            .collect())
    }
}
