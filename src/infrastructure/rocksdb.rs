use crate::domain::order::{Order, OrderId, UserId};
use crate::domain::payment::{PaymentId, PaymentIntent, PaymentStatus};
use crate::domain::ports::{OrderStore, PaymentIntentStore};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;

/// Column Family for storing orders.
pub const CF_ORDERS: &str = "orders";
/// Column Family for storing payment intents.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent store implementation using RocksDB.
///
/// Orders and payment intents live in separate Column Families as JSON
/// values keyed by their ids. Writes that check before they put (unique
/// inserts, compare-and-set) are serialized by `write_lock`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("orders" and "payments") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_orders = ColumnFamilyDescriptor::new(CF_ORDERS, Options::default());
        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_orders, cf_payments])?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| PaymentError::internal(format!("{name} column family not found")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &str) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key.as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf: &str, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key.as_bytes(), bytes)?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(&self, cf: &str) -> Result<Vec<T>> {
        let mut values = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn orders_where(&self, keep: impl Fn(&Order) -> bool) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self.scan::<Order>(CF_ORDERS)?;
        orders.retain(|o| keep(o));
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(orders)
    }

    fn intents_where(&self, keep: impl Fn(&PaymentIntent) -> bool) -> Result<Vec<PaymentIntent>> {
        let mut intents: Vec<PaymentIntent> = self.scan::<PaymentIntent>(CF_PAYMENTS)?;
        intents.retain(|i| keep(i));
        intents.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(intents)
    }
}

#[async_trait]
impl OrderStore for RocksDBStore {
    async fn insert(&self, order: Order) -> Result<()> {
        let _write = self.write_lock.lock();
        if self.read::<Order>(CF_ORDERS, order.id.as_str())?.is_some() {
            return Err(PaymentError::DuplicateOrder(order.id));
        }
        self.write(CF_ORDERS, order.id.as_str(), &order)
    }

    async fn store(&self, order: Order) -> Result<()> {
        let _write = self.write_lock.lock();
        self.write(CF_ORDERS, order.id.as_str(), &order)
    }

    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>> {
        self.read(CF_ORDERS, order_id.as_str())
    }

    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>> {
        self.orders_where(|o| &o.user_id == user_id)
    }

    async fn get_all(&self) -> Result<Vec<Order>> {
        self.orders_where(|_| true)
    }
}

#[async_trait]
impl PaymentIntentStore for RocksDBStore {
    async fn insert(&self, intent: PaymentIntent) -> Result<()> {
        let _write = self.write_lock.lock();
        for existing in self.scan::<PaymentIntent>(CF_PAYMENTS)? {
            if existing.external_reference == intent.external_reference {
                return Err(PaymentError::DuplicateReference(intent.external_reference));
            }
            if intent.status == PaymentStatus::Pending
                && existing.order_id == intent.order_id
                && existing.status == PaymentStatus::Pending
            {
                return Err(PaymentError::PaymentAlreadyActive {
                    order_id: intent.order_id,
                    payment_id: existing.id,
                });
            }
        }
        self.write(CF_PAYMENTS, intent.id.as_str(), &intent)
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentIntent>> {
        self.read(CF_PAYMENTS, payment_id.as_str())
    }

    async fn compare_and_set(
        &self,
        expected: PaymentStatus,
        intent: PaymentIntent,
    ) -> Result<bool> {
        let _write = self.write_lock.lock();
        let current: PaymentIntent = self
            .read(CF_PAYMENTS, intent.id.as_str())?
            .ok_or_else(|| PaymentError::PaymentNotFound(intent.id.clone()))?;
        if current.status != expected {
            return Ok(false);
        }
        self.write(CF_PAYMENTS, intent.id.as_str(), &intent)?;
        Ok(true)
    }

    async fn for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentIntent>> {
        self.intents_where(|i| &i.order_id == order_id)
    }

    async fn pending_expired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentIntent>> {
        self.intents_where(|i| i.is_stale(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::order::{MerchantId, OrderStatus};
    use crate::domain::payment::{CallbackOutcome, PaymentMethod};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn order(id: &str, user: &str) -> Order {
        let amount = Amount::new(dec!(30.00)).unwrap();
        Order::new(
            OrderId::from(id),
            MerchantId::from("m_1"),
            UserId::from(user),
            amount,
            amount,
            Utc::now(),
        )
        .unwrap()
    }

    fn intent(order_id: &str) -> PaymentIntent {
        PaymentIntent::new(
            OrderId::from(order_id),
            PaymentMethod::Wechat,
            Amount::new(dec!(30.00)).unwrap(),
            Utc::now(),
            chrono::Duration::minutes(15),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_ORDERS).is_some());
        assert!(store.db.cf_handle(CF_PAYMENTS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_order_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let mut first = order("ord_1", "u_1");
        OrderStore::insert(&store, first.clone()).await.unwrap();
        OrderStore::insert(&store, order("ord_2", "u_2")).await.unwrap();
        assert!(matches!(
            OrderStore::insert(&store, first.clone()).await,
            Err(PaymentError::DuplicateOrder(_))
        ));

        first.transition(OrderStatus::AwaitingPayment, Utc::now()).unwrap();
        OrderStore::store(&store, first.clone()).await.unwrap();

        let retrieved = OrderStore::get(&store, &first.id).await.unwrap().unwrap();
        assert_eq!(retrieved.status, OrderStatus::AwaitingPayment);

        let mine = store.list_for_user(&UserId::from("u_1")).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(OrderStore::get_all(&store).await.unwrap().len(), 2);
        assert!(OrderStore::get(&store, &OrderId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rocksdb_intent_store() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();

        let pending = intent("ord_1");
        PaymentIntentStore::insert(&store, pending.clone()).await.unwrap();
        assert!(matches!(
            PaymentIntentStore::insert(&store, intent("ord_1")).await,
            Err(PaymentError::PaymentAlreadyActive { .. })
        ));

        let mut settled = pending.clone();
        settled.settle(CallbackOutcome::Failed, Utc::now()).unwrap();
        assert!(store
            .compare_and_set(PaymentStatus::Pending, settled.clone())
            .await
            .unwrap());
        assert!(!store
            .compare_and_set(PaymentStatus::Pending, settled)
            .await
            .unwrap());

        PaymentIntentStore::insert(&store, intent("ord_1")).await.unwrap();
        assert_eq!(store.for_order(&OrderId::from("ord_1")).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rocksdb_survives_reopen() {
        let dir = tempdir().unwrap();
        let stored = intent("ord_9");
        {
            let store = RocksDBStore::open(dir.path()).unwrap();
            OrderStore::insert(&store, order("ord_9", "u_9")).await.unwrap();
            PaymentIntentStore::insert(&store, stored.clone()).await.unwrap();
        }

        let store = RocksDBStore::open(dir.path()).unwrap();
        assert!(OrderStore::get(&store, &OrderId::from("ord_9")).await.unwrap().is_some());
        let reloaded = PaymentIntentStore::get(&store, &stored.id).await.unwrap().unwrap();
        assert_eq!(reloaded, stored);
        assert!(store.pending_expired(stored.expire_at).await.unwrap().len() == 1);
    }
}
