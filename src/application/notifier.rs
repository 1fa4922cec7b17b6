use crate::domain::notification::NotificationEvent;
use crate::domain::ports::NotificationDispatcherBox;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

enum Message {
    Event(NotificationEvent),
    Flush(oneshot::Sender<()>),
}

/// Decouples notification delivery from state transitions.
///
/// Events go into a bounded channel drained by a single worker task that
/// calls the dispatcher. Enqueueing never waits: when the queue is full or
/// the worker is gone the event is logged and dropped.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::Sender<Message>,
}

impl NotificationQueue {
    /// Starts the worker on the current tokio runtime.
    pub fn spawn(dispatcher: NotificationDispatcherBox, capacity: usize) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                match message {
                    Message::Event(event) => {
                        let related_id = event.related_id.clone();
                        if let Err(e) = dispatcher.emit(event).await {
                            warn!(%related_id, error = %e, "notification dispatch failed, dropping");
                        }
                    }
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            debug!("notification worker stopped");
        });
        (Self { sender }, worker)
    }

    pub fn enqueue(&self, event: NotificationEvent) {
        if let Err(e) = self.sender.try_send(Message::Event(event)) {
            let (reason, message) = match e {
                mpsc::error::TrySendError::Full(message) => ("queue full", message),
                mpsc::error::TrySendError::Closed(message) => ("queue closed", message),
            };
            if let Message::Event(event) = message {
                warn!(user_id = %event.user_id, related_id = %event.related_id, reason, "notification dropped");
            }
        }
    }

    /// Resolves once every event enqueued before this call has been dispatched.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Message::Flush(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::notification::{NotificationType, TransitionPayload};
    use crate::domain::order::{OrderStatus, UserId};
    use crate::domain::ports::NotificationDispatcher;
    use crate::error::{PaymentError, Result};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(n: usize) -> NotificationEvent {
        NotificationEvent {
            user_id: UserId::from("u_1"),
            r#type: NotificationType::OrderStatus,
            related_id: format!("ord_{n}"),
            payload: TransitionPayload {
                order_id: format!("ord_{n}"),
                payment_id: None,
                from: OrderStatus::AwaitingPayment,
                to: OrderStatus::Paid,
                payment_status: None,
            },
        }
    }

    struct Counting {
        delivered: Arc<AtomicUsize>,
        fail_every_other: bool,
    }

    #[async_trait]
    impl NotificationDispatcher for Counting {
        async fn emit(&self, _event: NotificationEvent) -> Result<()> {
            let n = self.delivered.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && n % 2 == 0 {
                return Err(PaymentError::internal("push service unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_flush_waits_for_prior_events() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (queue, _worker) = NotificationQueue::spawn(
            Box::new(Counting {
                delivered: delivered.clone(),
                fail_every_other: false,
            }),
            16,
        );
        for n in 0..5 {
            queue.enqueue(event(n));
        }
        queue.flush().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_dispatch_failures_do_not_stop_the_worker() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (queue, _worker) = NotificationQueue::spawn(
            Box::new(Counting {
                delivered: delivered.clone(),
                fail_every_other: true,
            }),
            16,
        );
        for n in 0..4 {
            queue.enqueue(event(n));
        }
        queue.flush().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_exit_is_dropped() {
        let delivered = Arc::new(AtomicUsize::new(0));
        let (queue, worker) = NotificationQueue::spawn(
            Box::new(Counting {
                delivered: delivered.clone(),
                fail_every_other: false,
            }),
            1,
        );
        worker.abort();
        let _ = worker.await;

        queue.enqueue(event(1));
        queue.flush().await;
        assert_eq!(delivered.load(Ordering::SeqCst), 0);
    }
}
