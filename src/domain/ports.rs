use super::notification::NotificationEvent;
use super::order::{Order, OrderId, UserId};
use super::payment::{CallbackOutcome, GatewayCallback, PaymentId, PaymentIntent, PaymentStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order; fails with `DuplicateOrder` if the id is taken.
    async fn insert(&self, order: Order) -> Result<()>;
    async fn store(&self, order: Order) -> Result<()>;
    async fn get(&self, order_id: &OrderId) -> Result<Option<Order>>;
    /// The user's orders, newest first.
    async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Order>>;
    async fn get_all(&self) -> Result<Vec<Order>>;
}

#[async_trait]
pub trait PaymentIntentStore: Send + Sync {
    /// Inserts a new intent.
    ///
    /// Enforces that `external_reference` is unique and that an order holds at
    /// most one `PENDING` intent.
    async fn insert(&self, intent: PaymentIntent) -> Result<()>;
    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentIntent>>;
    /// Replaces the stored intent only if its status is still `expected`.
    async fn compare_and_set(&self, expected: PaymentStatus, intent: PaymentIntent)
    -> Result<bool>;
    /// All intents of an order, newest first.
    async fn for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentIntent>>;
    /// `PENDING` intents whose `expire_at` is at or before `now`.
    async fn pending_expired(&self, now: DateTime<Utc>) -> Result<Vec<PaymentIntent>>;
}

/// Fire-and-forget delivery of user notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn emit(&self, event: NotificationEvent) -> Result<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// What the engine reports back to the gateway for a callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackReceipt {
    pub payment_id: PaymentId,
    pub success: bool,
    /// The outcome recorded for the intent after this call.
    pub status: PaymentStatus,
    /// True when the call changed nothing because an outcome was already recorded.
    pub duplicate: bool,
}

/// Receives gateway callbacks; implemented by the lifecycle engine.
#[async_trait]
pub trait CallbackHandler: Send + Sync {
    async fn handle_callback(&self, callback: GatewayCallback) -> Result<CallbackReceipt>;
}

pub trait PaymentGateway: Send + Sync {
    /// Opens a gateway session for the intent and returns its client payload.
    fn issue_payload(&self, intent: &PaymentIntent) -> String;

    /// Arranges for the gateway to report `outcome` for an open session.
    fn schedule_callback(
        &self,
        payment_id: &PaymentId,
        outcome: CallbackOutcome,
        handler: Arc<dyn CallbackHandler>,
    ) -> Result<JoinHandle<()>>;
}

pub type OrderStoreBox = Box<dyn OrderStore>;
pub type PaymentIntentStoreBox = Box<dyn PaymentIntentStore>;
pub type NotificationDispatcherBox = Box<dyn NotificationDispatcher>;
pub type GatewayRef = Arc<dyn PaymentGateway>;
pub type ClockRef = Arc<dyn Clock>;
