use super::engine::{LifecycleEngine, SweepReport};
use crate::config::SweepConfig;
use crate::error::Result;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Clears the running flag when a sweep ends, even if it panics.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Recurring background task that runs [`LifecycleEngine::expire_stale`].
///
/// Each tick is spawned on its own; a tick that finds the previous sweep still
/// running is skipped. Whole-sweep failures back the schedule off
/// exponentially up to `max_backoff`.
pub struct ExpirySweeper {
    engine: Arc<LifecycleEngine>,
    config: SweepConfig,
    running: Arc<AtomicBool>,
}

impl ExpirySweeper {
    pub fn new(engine: Arc<LifecycleEngine>, config: SweepConfig) -> Self {
        Self {
            engine,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs one sweep at the engine's current time, unless one is already running.
    pub async fn run_once(&self) -> Option<Result<SweepReport>> {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!("previous expiry sweep still running, skipping tick");
            return None;
        }
        let _guard = RunningGuard(self.running.clone());
        let result = self.engine.expire_stale(self.engine.now()).await;
        let pruned = self.engine.prune_locks();
        if pruned > 0 {
            debug!(pruned, "pruned idle order locks");
        }
        Some(result)
    }

    fn next_delay(&self, failures: u32) -> Duration {
        let base = if failures == 0 {
            self.config.interval
        } else {
            self.config
                .interval
                .saturating_mul(2u32.saturating_pow(failures))
                .min(self.config.max_backoff)
        };
        let jitter_ms = self.config.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        base + Duration::from_millis(jitter)
    }

    /// Starts the loop; it stops when `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeper = Arc::new(self);
        tokio::spawn(async move {
            info!(interval = ?sweeper.config.interval, "expiry sweeper started");
            let failures = Arc::new(AtomicU32::new(0));
            loop {
                let delay = sweeper.next_delay(failures.load(Ordering::Acquire));
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                        continue;
                    }
                }

                let tick = sweeper.clone();
                let failures = failures.clone();
                tokio::spawn(async move {
                    match tick.run_once().await {
                        Some(Ok(_)) => failures.store(0, Ordering::Release),
                        Some(Err(e)) => {
                            let n = failures.fetch_add(1, Ordering::AcqRel) + 1;
                            warn!(error = %e, consecutive_failures = n, "expiry sweep failed");
                        }
                        None => {}
                    }
                });
            }
            info!("expiry sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::notifier::NotificationQueue;
    use crate::domain::money::Amount;
    use crate::domain::order::{MerchantId, Order, OrderId, OrderStatus, UserId};
    use crate::domain::pagination::PageRequest;
    use crate::domain::payment::PaymentMethod;
    use crate::domain::ports::Clock;
    use crate::infrastructure::clock::ManualClock;
    use crate::infrastructure::gateway::MockGateway;
    use crate::infrastructure::in_memory::{InMemoryOrderStore, InMemoryPaymentIntentStore};
    use crate::infrastructure::notify::RecordingDispatcher;
    use rust_decimal_macros::dec;

    fn engine(clock: &ManualClock) -> Arc<LifecycleEngine> {
        let (queue, _worker) = NotificationQueue::spawn(Box::new(RecordingDispatcher::new()), 16);
        Arc::new(
            LifecycleEngine::new(
                Box::new(InMemoryOrderStore::new()),
                Box::new(InMemoryPaymentIntentStore::new()),
                Arc::new(MockGateway::default()),
                queue,
            )
            .with_clock(Arc::new(clock.clone())),
        )
    }

    async fn open_intent(engine: &LifecycleEngine, clock: &ManualClock) {
        let amount = Amount::new(dec!(12.00)).unwrap();
        let order = Order::new(
            OrderId::from("ord_1"),
            MerchantId::from("m_1"),
            UserId::from("u_1"),
            amount,
            amount,
            clock.now(),
        )
        .unwrap();
        engine.register_order(order).await.unwrap();
        engine
            .create_intent(&UserId::from("u_1"), &OrderId::from("ord_1"), PaymentMethod::Card)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_once_expires_due_intents() {
        let clock = ManualClock::default();
        let engine = engine(&clock);
        open_intent(&engine, &clock).await;
        let sweeper = ExpirySweeper::new(engine.clone(), SweepConfig::default());

        let report = sweeper.run_once().await.unwrap().unwrap();
        assert_eq!(report.expired, 0);

        clock.advance(chrono::Duration::minutes(15));
        let report = sweeper.run_once().await.unwrap().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.orders_expired, 1);

        let again = sweeper.run_once().await.unwrap().unwrap();
        assert_eq!(again, SweepReport::default());
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let clock = ManualClock::default();
        let sweeper = ExpirySweeper::new(engine(&clock), SweepConfig::default());
        sweeper.running.store(true, Ordering::Release);
        assert!(sweeper.run_once().await.is_none());
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let clock = ManualClock::default();
        let sweeper = ExpirySweeper::new(
            engine(&clock),
            SweepConfig {
                interval: Duration::from_secs(30),
                jitter: Duration::ZERO,
                max_backoff: Duration::from_secs(100),
            },
        );
        assert_eq!(sweeper.next_delay(0), Duration::from_secs(30));
        assert_eq!(sweeper.next_delay(1), Duration::from_secs(60));
        assert_eq!(sweeper.next_delay(5), Duration::from_secs(100));
    }

    #[tokio::test]
    async fn test_spawned_loop_sweeps_and_stops() {
        let clock = ManualClock::default();
        let engine = engine(&clock);
        open_intent(&engine, &clock).await;
        clock.advance(chrono::Duration::minutes(30));

        let (stop, shutdown) = watch::channel(false);
        let handle = ExpirySweeper::new(
            engine.clone(),
            SweepConfig {
                interval: Duration::from_millis(5),
                jitter: Duration::from_millis(2),
                max_backoff: Duration::from_millis(50),
            },
        )
        .spawn(shutdown);

        let mut expired = false;
        for _ in 0..100 {
            let orders = engine
                .list_orders(&UserId::from("u_1"), PageRequest::default())
                .await
                .unwrap();
            if orders.items[0].status == OrderStatus::Expired {
                expired = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(expired, "sweeper never expired the order");

        stop.send(true).unwrap();
        handle.await.unwrap();
    }
}
