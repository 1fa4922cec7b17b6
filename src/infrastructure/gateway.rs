use crate::domain::payment::{CallbackOutcome, GatewayCallback, PaymentId, PaymentIntent};
use crate::domain::ports::{CallbackHandler, PaymentGateway};
use crate::error::{PaymentError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Simulated payment processor.
///
/// `issue_payload` opens a session and remembers its external reference;
/// `schedule_callback` later reports an outcome for that session through the
/// callback handler, `deliveries` times, the way a webhook with at-least-once
/// delivery would.
pub struct MockGateway {
    base_url: String,
    delay: Duration,
    deliveries: u32,
    redelivery_interval: Duration,
    sessions: DashMap<PaymentId, String>,
}

impl MockGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            delay: Duration::from_millis(50),
            deliveries: 1,
            redelivery_interval: Duration::from_millis(10),
            sessions: DashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_deliveries(mut self, deliveries: u32) -> Self {
        self.deliveries = deliveries.max(1);
        self
    }

    pub fn session_reference(&self, payment_id: &PaymentId) -> Option<String> {
        self.sessions.get(payment_id).map(|r| r.value().clone())
    }

    /// The callback the gateway would send for an open session.
    pub fn callback_for(
        &self,
        payment_id: &PaymentId,
        outcome: CallbackOutcome,
    ) -> Result<GatewayCallback> {
        let external_reference = self
            .session_reference(payment_id)
            .ok_or_else(|| PaymentError::PaymentNotFound(payment_id.clone()))?;
        Ok(GatewayCallback {
            payment_id: payment_id.clone(),
            external_reference,
            outcome,
        })
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new("http://localhost:8080/mock-gateway")
    }
}

impl PaymentGateway for MockGateway {
    fn issue_payload(&self, intent: &PaymentIntent) -> String {
        self.sessions
            .insert(intent.id.clone(), intent.external_reference.clone());
        intent.method.payload_for(&intent.id, &self.base_url)
    }

    #[instrument(skip(self, handler), fields(%payment_id, ?outcome))]
    fn schedule_callback(
        &self,
        payment_id: &PaymentId,
        outcome: CallbackOutcome,
        handler: Arc<dyn CallbackHandler>,
    ) -> Result<JoinHandle<()>> {
        let callback = self.callback_for(payment_id, outcome)?;
        let delay = self.delay;
        let deliveries = self.deliveries;
        let redelivery_interval = self.redelivery_interval;
        info!(deliveries, "scheduling simulated gateway callback");

        Ok(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            for attempt in 1..=deliveries {
                match handler.handle_callback(callback.clone()).await {
                    Ok(receipt) => debug!(
                        attempt,
                        status = %receipt.status,
                        duplicate = receipt.duplicate,
                        "gateway callback acknowledged"
                    ),
                    Err(e) => warn!(attempt, error = %e, "gateway callback rejected"),
                }
                if attempt < deliveries {
                    tokio::time::sleep(redelivery_interval).await;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Amount;
    use crate::domain::order::OrderId;
    use crate::domain::payment::{PaymentMethod, PaymentStatus};
    use crate::domain::ports::CallbackReceipt;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<GatewayCallback>>,
    }

    #[async_trait]
    impl CallbackHandler for Recorder {
        async fn handle_callback(&self, callback: GatewayCallback) -> Result<CallbackReceipt> {
            let duplicate = !self.seen.lock().is_empty();
            self.seen.lock().push(callback.clone());
            Ok(CallbackReceipt {
                payment_id: callback.payment_id,
                success: true,
                status: PaymentStatus::Success,
                duplicate,
            })
        }
    }

    fn intent(method: PaymentMethod) -> PaymentIntent {
        PaymentIntent::new(
            OrderId::from("ord_1"),
            method,
            Amount::new(dec!(9.90)).unwrap(),
            Utc::now(),
            chrono::Duration::minutes(15),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_payload_opens_session() {
        let gateway = MockGateway::new("http://gw.test");
        let intent = intent(PaymentMethod::Alipay);

        let payload = gateway.issue_payload(&intent);
        assert!(payload.starts_with("http://gw.test/alipay/redirect?payment_id="));
        assert_eq!(payload, gateway.issue_payload(&intent));
        assert_eq!(
            gateway.session_reference(&intent.id),
            Some(intent.external_reference.clone())
        );
    }

    #[tokio::test]
    async fn test_unknown_session_cannot_be_scheduled() {
        let gateway = MockGateway::default();
        let handler: Arc<dyn CallbackHandler> = Arc::new(Recorder::default());
        let result = gateway.schedule_callback(
            &PaymentId::from("pay_missing"),
            CallbackOutcome::Success,
            handler,
        );
        assert!(matches!(result, Err(PaymentError::PaymentNotFound(_))));
    }

    #[tokio::test]
    async fn test_callback_is_delivered_at_least_once() {
        let gateway = MockGateway::default()
            .with_delay(Duration::from_millis(1))
            .with_deliveries(3);
        let intent = intent(PaymentMethod::Card);
        gateway.issue_payload(&intent);

        let recorder = Arc::new(Recorder::default());
        let handle = gateway
            .schedule_callback(&intent.id, CallbackOutcome::Success, recorder.clone())
            .unwrap();
        handle.await.unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 3);
        assert!(seen
            .iter()
            .all(|cb| cb.external_reference == intent.external_reference));
    }
}
