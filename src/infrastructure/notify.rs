use crate::domain::notification::NotificationEvent;
use crate::domain::ports::NotificationDispatcher;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::info;

/// Writes each notification to the log. Stands in for the push/SMS service.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn emit(&self, event: NotificationEvent) -> Result<()> {
        info!(
            user_id = %event.user_id,
            kind = ?event.r#type,
            related_id = %event.related_id,
            from = %event.payload.from,
            to = %event.payload.to,
            "notification emitted"
        );
        Ok(())
    }
}

/// Keeps every emitted notification in memory; clones share the record.
#[derive(Debug, Default, Clone)]
pub struct RecordingDispatcher {
    events: Arc<Mutex<Vec<NotificationEvent>>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records events but reports every delivery as failed.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn emit(&self, event: NotificationEvent) -> Result<()> {
        self.events.lock().push(event);
        if self.failing {
            return Err(PaymentError::internal("notification service unavailable"));
        }
        Ok(())
    }
}
