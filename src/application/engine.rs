use super::locks::OrderLocks;
use super::notifier::NotificationQueue;
use crate::config::EngineConfig;
use crate::domain::money::Amount;
use crate::domain::notification::NotificationEvent;
use crate::domain::order::{Order, OrderId, OrderStatus, UserId};
use crate::domain::pagination::{Page, PageRequest};
use crate::domain::payment::{
    CallbackOutcome, GatewayCallback, PaymentId, PaymentIntent, PaymentMethod, PaymentStatus,
};
use crate::domain::ports::{
    CallbackHandler, CallbackReceipt, ClockRef, GatewayRef, OrderStoreBox, PaymentIntentStoreBox,
};
use crate::error::{PaymentError, Result};
use crate::infrastructure::clock::SystemClock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Returned by [`LifecycleEngine::create_intent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub amount: Amount,
    pub method: PaymentMethod,
    pub payment_url: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusView {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub status: PaymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
}

impl From<&PaymentIntent> for PaymentStatusView {
    fn from(intent: &PaymentIntent) -> Self {
        Self {
            payment_id: intent.id.clone(),
            order_id: intent.order_id.clone(),
            status: intent.status,
            paid_at: intent.paid_at,
        }
    }
}

/// Counts from one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub orders_expired: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Skipped,
    IntentOnly,
    WithOrder,
}

fn receipt(intent: &PaymentIntent, duplicate: bool) -> CallbackReceipt {
    CallbackReceipt {
        payment_id: intent.id.clone(),
        success: intent.status == PaymentStatus::Success,
        status: intent.status,
        duplicate,
    }
}

fn ensure_owner(principal: &UserId, order: &Order) -> Result<()> {
    if order.is_owned_by(principal) {
        Ok(())
    } else {
        Err(PaymentError::Forbidden {
            principal: principal.clone(),
            order_id: order.id.clone(),
        })
    }
}

/// The order/payment state machine.
///
/// Every status change of an order or payment intent goes through this type.
/// Each mutating operation takes the owning order's lock from [`OrderLocks`]
/// for its whole read-modify-write and never calls the gateway while holding it.
pub struct LifecycleEngine {
    orders: OrderStoreBox,
    intents: PaymentIntentStoreBox,
    gateway: GatewayRef,
    notifications: NotificationQueue,
    clock: ClockRef,
    locks: OrderLocks,
    config: EngineConfig,
}

impl LifecycleEngine {
    /// Creates an engine with the system clock and default configuration.
    pub fn new(
        orders: OrderStoreBox,
        intents: PaymentIntentStoreBox,
        gateway: GatewayRef,
        notifications: NotificationQueue,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            orders,
            intents,
            gateway,
            notifications,
            clock: Arc::new(SystemClock),
            locks: OrderLocks::from_config(&config),
            config,
        }
    }

    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        self.locks = OrderLocks::from_config(&config);
        self.config = config;
        Ok(self)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Accepts a new order from the ordering flow. Orders must arrive `CREATED`.
    pub async fn register_order(&self, order: Order) -> Result<()> {
        if order.status != OrderStatus::Created {
            return Err(PaymentError::ValidationError(format!(
                "new order {} must be CREATED, got {}",
                order.id, order.status
            )));
        }
        self.orders.insert(order).await
    }

    /// Opens a payment intent for the order and returns the gateway payload.
    #[instrument(skip_all, fields(%order_id, %method))]
    pub async fn create_intent(
        &self,
        principal: &UserId,
        order_id: &OrderId,
        method: PaymentMethod,
    ) -> Result<CreatedPayment> {
        let intent = {
            let _guard = self.locks.acquire(order_id).await?;
            let now = self.clock.now();
            let mut order = self.load_order(order_id).await?;
            ensure_owner(principal, &order)?;
            if !order.status.is_payable() {
                return Err(PaymentError::OrderNotPayable {
                    order_id: order.id,
                    status: order.status,
                });
            }

            for existing in self.intents.for_order(order_id).await? {
                if existing.is_active(now) {
                    return Err(PaymentError::PaymentAlreadyActive {
                        order_id: order.id,
                        payment_id: existing.id,
                    });
                }
                if existing.is_stale(now) {
                    debug!(payment_id = %existing.id, "expiring stale intent before re-issue");
                    let mut stale = existing;
                    stale.expire()?;
                    self.intents
                        .compare_and_set(PaymentStatus::Pending, stale)
                        .await?;
                }
            }

            let intent = PaymentIntent::new(
                order.id.clone(),
                method,
                order.pay_amount,
                now,
                self.config.payment_ttl,
            )?;
            // Order first: an order awaiting payment without an intent is still payable.
            if order.status == OrderStatus::Created {
                order.transition(OrderStatus::AwaitingPayment, now)?;
                self.orders.store(order).await?;
            }
            self.intents.insert(intent.clone()).await?;
            intent
        };

        let payment_url = self.gateway.issue_payload(&intent);
        info!(payment_id = %intent.id, amount = %intent.amount, "payment intent created");
        Ok(CreatedPayment {
            payment_id: intent.id,
            order_id: intent.order_id,
            amount: intent.amount,
            method: intent.method,
            payment_url,
            created_at: intent.created_at,
            expire_at: intent.expire_at,
        })
    }

    /// Reconciles a gateway callback with the intent and its order.
    ///
    /// Replays of an already-settled intent return the recorded outcome
    /// without touching anything.
    #[instrument(skip_all, fields(payment_id = %callback.payment_id, outcome = ?callback.outcome))]
    pub async fn apply_callback(&self, callback: GatewayCallback) -> Result<CallbackReceipt> {
        let order_id = self.load_intent(&callback.payment_id).await?.order_id;
        let _guard = self.locks.acquire(&order_id).await?;
        let now = self.clock.now();
        let mut intent = self.load_intent(&callback.payment_id).await?;

        if intent.external_reference != callback.external_reference {
            warn!(
                anomaly = "reference_mismatch",
                "callback rejected: external reference does not match the session"
            );
            return Err(PaymentError::ReferenceMismatch(intent.id));
        }

        match intent.status {
            PaymentStatus::Success | PaymentStatus::Failed => {
                debug!(recorded = %intent.status, "duplicate callback");
                return Ok(receipt(&intent, true));
            }
            PaymentStatus::Expired => return late_callback(&intent, callback.outcome),
            PaymentStatus::Pending if intent.is_stale(now) => {
                self.expire_locked(intent.clone(), now).await?;
                intent.expire()?;
                return late_callback(&intent, callback.outcome);
            }
            PaymentStatus::Pending => {}
        }

        let mut order = self.load_order(&intent.order_id).await?;
        let target = match callback.outcome {
            CallbackOutcome::Success => OrderStatus::Paid,
            CallbackOutcome::Failed => OrderStatus::AwaitingPayment,
        };
        if !order.status.can_transition_to(target) {
            error!(
                anomaly = "order_not_payable",
                order_status = %order.status,
                "callback for an order that can no longer take this outcome"
            );
            return Err(PaymentError::OrderNotPayable {
                order_id: order.id,
                status: order.status,
            });
        }

        intent.settle(callback.outcome, now)?;
        if !self
            .intents
            .compare_and_set(PaymentStatus::Pending, intent.clone())
            .await?
        {
            let recorded = self.load_intent(&intent.id).await?;
            warn!(recorded = %recorded.status, "intent changed outside the order lock");
            return Ok(receipt(&recorded, true));
        }

        let from = order.transition(target, now)?;
        self.orders.store(order.clone()).await?;
        let event = match callback.outcome {
            CallbackOutcome::Success => NotificationEvent::order_status(&order, from, Some(&intent)),
            CallbackOutcome::Failed => NotificationEvent::payment(&order, from, &intent),
        };
        self.notifications.enqueue(event);
        info!(order_status = %order.status, "callback applied");
        Ok(receipt(&intent, false))
    }

    /// Expires every `PENDING` intent whose `expire_at` is at or before `now`.
    ///
    /// Safe to run repeatedly and concurrently with itself or with callbacks;
    /// a failure on one intent is logged and the scan continues.
    #[instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let candidates = self.intents.pending_expired(now).await?;
        let mut report = SweepReport {
            scanned: candidates.len(),
            ..SweepReport::default()
        };
        for candidate in candidates {
            match self.expire_candidate(&candidate, now).await {
                Ok(Expiry::Skipped) => {}
                Ok(Expiry::IntentOnly) => report.expired += 1,
                Ok(Expiry::WithOrder) => {
                    report.expired += 1;
                    report.orders_expired += 1;
                }
                Err(e) => {
                    warn!(payment_id = %candidate.id, error = %e, "failed to expire payment intent");
                    report.failed += 1;
                }
            }
        }
        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                expired = report.expired,
                orders_expired = report.orders_expired,
                failed = report.failed,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }

    async fn expire_candidate(&self, candidate: &PaymentIntent, now: DateTime<Utc>) -> Result<Expiry> {
        let _guard = self.locks.acquire(&candidate.order_id).await?;
        match self.intents.get(&candidate.id).await? {
            Some(intent) if intent.is_stale(now) => self.expire_locked(intent, now).await,
            _ => Ok(Expiry::Skipped),
        }
    }

    /// Expires a stale intent and, if it was the order's last live attempt,
    /// the order as well. The caller holds the order lock.
    async fn expire_locked(&self, mut intent: PaymentIntent, now: DateTime<Utc>) -> Result<Expiry> {
        intent.expire()?;
        if !self
            .intents
            .compare_and_set(PaymentStatus::Pending, intent.clone())
            .await?
        {
            return Ok(Expiry::Skipped);
        }

        let mut order = self.load_order(&intent.order_id).await?;
        if order.status != OrderStatus::AwaitingPayment {
            return Ok(Expiry::IntentOnly);
        }
        let other_active = self
            .intents
            .for_order(&order.id)
            .await?
            .iter()
            .any(|other| other.id != intent.id && other.is_active(now));
        if other_active {
            return Ok(Expiry::IntentOnly);
        }

        let from = order.transition(OrderStatus::Expired, now)?;
        self.orders.store(order.clone()).await?;
        self.notifications
            .enqueue(NotificationEvent::order_status(&order, from, Some(&intent)));
        info!(payment_id = %intent.id, order_id = %order.id, "order expired unpaid");
        Ok(Expiry::WithOrder)
    }

    /// Cancels an unpaid order that has no live payment attempt.
    #[instrument(skip_all, fields(%order_id))]
    pub async fn cancel_order(&self, principal: &UserId, order_id: &OrderId) -> Result<Order> {
        let _guard = self.locks.acquire(order_id).await?;
        let now = self.clock.now();
        let mut order = self.load_order(order_id).await?;
        ensure_owner(principal, &order)?;

        for existing in self.intents.for_order(order_id).await? {
            if existing.is_active(now) {
                return Err(PaymentError::PaymentAlreadyActive {
                    order_id: order.id,
                    payment_id: existing.id,
                });
            }
            if existing.is_stale(now) {
                let mut stale = existing;
                stale.expire()?;
                self.intents
                    .compare_and_set(PaymentStatus::Pending, stale)
                    .await?;
            }
        }

        let from = order.transition(OrderStatus::Cancelled, now)?;
        self.orders.store(order.clone()).await?;
        self.notifications
            .enqueue(NotificationEvent::order_status(&order, from, None));
        info!("order cancelled");
        Ok(order)
    }

    pub async fn get_payment_status(
        &self,
        principal: &UserId,
        payment_id: &PaymentId,
    ) -> Result<PaymentStatusView> {
        let intent = self.load_intent(payment_id).await?;
        let order = self.load_order(&intent.order_id).await?;
        ensure_owner(principal, &order)?;
        Ok(PaymentStatusView::from(&intent))
    }

    pub async fn list_orders(&self, principal: &UserId, page: PageRequest) -> Result<Page<Order>> {
        let orders = self.orders.list_for_user(principal).await?;
        Page::from_vec(orders, page)
    }

    pub async fn list_payments(
        &self,
        principal: &UserId,
        order_id: &OrderId,
        page: PageRequest,
    ) -> Result<Page<PaymentStatusView>> {
        let order = self.load_order(order_id).await?;
        ensure_owner(principal, &order)?;
        let intents = self.intents.for_order(order_id).await?;
        Ok(Page::from_vec(intents, page)?.map(|intent| PaymentStatusView::from(&intent)))
    }

    /// Every order in the store, newest first.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.orders.get_all().await
    }

    /// Asks the gateway to report `outcome` for an open payment session.
    pub fn simulate_callback(
        engine: &Arc<Self>,
        payment_id: &PaymentId,
        outcome: CallbackOutcome,
    ) -> Result<JoinHandle<()>> {
        let handler: Arc<dyn CallbackHandler> = engine.clone();
        engine.gateway.schedule_callback(payment_id, outcome, handler)
    }

    /// Waits until all notifications emitted so far have been dispatched.
    pub async fn flush_notifications(&self) {
        self.notifications.flush().await;
    }

    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))
    }

    async fn load_intent(&self, payment_id: &PaymentId) -> Result<PaymentIntent> {
        self.intents
            .get(payment_id)
            .await?
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.clone()))
    }
}

fn late_callback(intent: &PaymentIntent, outcome: CallbackOutcome) -> Result<CallbackReceipt> {
    match outcome {
        CallbackOutcome::Success => {
            error!(
                anomaly = "late_success",
                payment_id = %intent.id,
                order_id = %intent.order_id,
                "SUCCESS callback after expiry; funds need manual reconciliation"
            );
            Err(PaymentError::IntentExpired(intent.id.clone()))
        }
        CallbackOutcome::Failed => Ok(receipt(intent, true)),
    }
}

#[async_trait]
impl CallbackHandler for LifecycleEngine {
    async fn handle_callback(&self, callback: GatewayCallback) -> Result<CallbackReceipt> {
        self.apply_callback(callback).await
    }
}
