use crate::config::EngineConfig;
use crate::domain::order::OrderId;
use crate::error::{PaymentError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Per-order mutual exclusion.
///
/// Every read-modify-write of an order or of one of its payment intents runs
/// while holding that order's guard, so operations on one order are
/// linearized while different orders proceed independently.
pub struct OrderLocks {
    locks: DashMap<OrderId, Arc<Mutex<()>>>,
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

impl OrderLocks {
    pub fn new(timeout: Duration, retries: u32, backoff: Duration) -> Self {
        Self {
            locks: DashMap::new(),
            timeout,
            retries,
            backoff,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.lock_timeout, config.lock_retries, config.lock_backoff)
    }

    /// Waits for the order's guard, retrying with doubling backoff.
    ///
    /// Fails with `Busy` once every attempt has timed out.
    pub async fn acquire(&self, order_id: &OrderId) -> Result<OwnedMutexGuard<()>> {
        let mutex = self.locks.entry(order_id.clone()).or_default().clone();
        let mut pause = self.backoff;
        for attempt in 0..=self.retries {
            match tokio::time::timeout(self.timeout, mutex.clone().lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    debug!(%order_id, attempt, "order lock contended");
                    if attempt < self.retries {
                        tokio::time::sleep(pause).await;
                        pause = pause.saturating_mul(2);
                    }
                }
            }
        }
        Err(PaymentError::Busy(order_id.clone()))
    }

    /// Drops lock entries nobody holds or waits on.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
