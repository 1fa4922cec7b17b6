#![allow(dead_code)]

use mealpay::application::engine::{CreatedPayment, LifecycleEngine};
use mealpay::application::notifier::NotificationQueue;
use mealpay::domain::money::Amount;
use mealpay::domain::order::{MerchantId, Order, OrderId, UserId};
use mealpay::domain::payment::{CallbackOutcome, GatewayCallback, PaymentMethod};
use mealpay::domain::ports::Clock;
use mealpay::infrastructure::clock::ManualClock;
use mealpay::infrastructure::gateway::MockGateway;
use mealpay::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentIntentStore};
use mealpay::infrastructure::notify::RecordingDispatcher;
use rust_decimal::Decimal;
use std::io::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// An in-memory engine with a manual clock and recorded notifications.
pub struct Harness {
    pub engine: Arc<LifecycleEngine>,
    pub gateway: Arc<MockGateway>,
    pub clock: ManualClock,
    pub notifications: RecordingDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_dispatcher(RecordingDispatcher::new())
    }

    pub fn with_dispatcher(notifications: RecordingDispatcher) -> Self {
        let clock = ManualClock::default();
        let gateway = Arc::new(MockGateway::default().with_delay(Duration::from_millis(1)));
        let (queue, _worker) = NotificationQueue::spawn(Box::new(notifications.clone()), 256);
        let engine = LifecycleEngine::new(
            Box::new(InMemoryOrderStore::new()),
            Box::new(InMemoryPaymentIntentStore::new()),
            gateway.clone(),
            queue,
        )
        .with_clock(Arc::new(clock.clone()));
        Self {
            engine: Arc::new(engine),
            gateway,
            clock,
            notifications,
        }
    }

    pub async fn order(&self, id: &str, user: &str, pay_amount: Decimal) -> Order {
        let amount = Amount::new(pay_amount).unwrap();
        let order = Order::new(
            OrderId::from(id),
            MerchantId::from("m_1"),
            UserId::from(user),
            amount,
            amount,
            self.clock.now(),
        )
        .unwrap();
        self.engine.register_order(order.clone()).await.unwrap();
        order
    }

    pub async fn pay(&self, order: &Order, method: PaymentMethod) -> CreatedPayment {
        self.engine
            .create_intent(&order.user_id, &order.id, method)
            .await
            .unwrap()
    }

    pub fn callback(&self, created: &CreatedPayment, outcome: CallbackOutcome) -> GatewayCallback {
        self.gateway.callback_for(&created.payment_id, outcome).unwrap()
    }

    /// Notifications dispatched so far.
    pub async fn notified(&self) -> usize {
        self.engine.flush_notifications().await;
        self.notifications.len()
    }

    pub async fn order_status(&self, order: &Order) -> mealpay::domain::order::OrderStatus {
        self.engine
            .all_orders()
            .await
            .unwrap()
            .into_iter()
            .find(|o| o.id == order.id)
            .unwrap()
            .status
    }
}

pub fn generate_csv(path: &Path, rows: usize) -> Result<(), Error> {
    let mut wtr = csv::WriterBuilder::new().from_path(path)?;

    wtr.write_record(["order", "merchant", "user", "total", "pay_amount"])?;

    for i in 1..=rows {
        wtr.write_record([
            format!("ord-{i}"),
            "m-1".to_string(),
            format!("u-{}", i % 7),
            "20.00".to_string(),
            "18.50".to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
