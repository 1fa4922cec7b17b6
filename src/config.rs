use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;

/// Tunables for the lifecycle engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long a payment intent stays payable after creation.
    pub payment_ttl: chrono::Duration,
    /// Longest single wait for an order lock.
    pub lock_timeout: Duration,
    /// Extra attempts after the first lock wait times out.
    pub lock_retries: u32,
    /// Pause before the first retry; doubled on each further attempt.
    pub lock_backoff: Duration,
    pub notification_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            payment_ttl: chrono::Duration::minutes(15),
            lock_timeout: Duration::from_millis(250),
            lock_retries: 3,
            lock_backoff: Duration::from_millis(20),
            notification_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.payment_ttl <= chrono::Duration::zero() {
            return Err(PaymentError::ValidationError(
                "payment TTL must be positive".to_string(),
            ));
        }
        if Utc::now().checked_add_signed(self.payment_ttl).is_none() {
            return Err(PaymentError::ValidationError(
                "payment TTL is out of range".to_string(),
            ));
        }
        if self.notification_capacity == 0 {
            return Err(PaymentError::ValidationError(
                "notification capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    /// Upper bound of the random delay added to each tick.
    pub jitter: Duration,
    pub max_backoff: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_secs(3),
            max_backoff: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.payment_ttl, chrono::Duration::minutes(15));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            payment_ttl: chrono::Duration::zero(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PaymentError::ValidationError(_))
        ));

        let config = EngineConfig {
            payment_ttl: chrono::Duration::days(100_000_000),
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PaymentError::ValidationError(_))
        ));

        let config = EngineConfig {
            notification_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
