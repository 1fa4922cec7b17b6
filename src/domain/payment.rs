use super::money::Amount;
use super::order::{OrderId, string_id};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

string_id!(
    /// Identifier of a single payment attempt.
    PaymentId
);

impl PaymentId {
    pub fn generate() -> Self {
        Self::new(format!("pay_{}", Uuid::new_v4().simple()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Wechat,
    Alipay,
    Card,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wechat => "WECHAT",
            Self::Alipay => "ALIPAY",
            Self::Card => "CARD",
        }
    }

    /// Builds the client-facing payload for a gateway session.
    ///
    /// WECHAT yields a QR string, ALIPAY a redirect URL under `base_url`, CARD
    /// echoes a token. The token is derived from the payment id and method only.
    pub fn payload_for(self, payment_id: &PaymentId, base_url: &str) -> String {
        let token = session_token(payment_id, self);
        match self {
            Self::Wechat => format!("weixin://wxpay/bizpayurl?pr={token}"),
            Self::Alipay => format!(
                "{}/alipay/redirect?payment_id={payment_id}&token={token}",
                base_url.trim_end_matches('/')
            ),
            Self::Card => format!("card_tok_{token}"),
        }
    }
}

fn session_token(payment_id: &PaymentId, method: PaymentMethod) -> String {
    let digest = Sha256::digest(format!("{payment_id}:{}", method.as_str()).as_bytes());
    hex::encode(&digest[..8])
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WECHAT" => Ok(Self::Wechat),
            "ALIPAY" => Ok(Self::Alipay),
            "CARD" => Ok(Self::Card),
            other => Err(PaymentError::ValidationError(format!(
                "unknown payment method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result reported by the gateway for a payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallbackOutcome {
    Success,
    Failed,
}

impl CallbackOutcome {
    pub fn from_success(success: bool) -> Self {
        if success { Self::Success } else { Self::Failed }
    }

    pub fn status(self) -> PaymentStatus {
        match self {
            Self::Success => PaymentStatus::Success,
            Self::Failed => PaymentStatus::Failed,
        }
    }
}

impl FromStr for CallbackOutcome {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(Self::Success),
            "failed" | "failure" => Ok(Self::Failed),
            other => Err(PaymentError::ValidationError(format!(
                "unknown callback outcome '{other}'"
            ))),
        }
    }
}

/// An asynchronous notification from the gateway about one payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCallback {
    pub payment_id: PaymentId,
    pub external_reference: String,
    pub outcome: CallbackOutcome,
}

/// A single payment attempt for an order.
///
/// Created `PENDING`; leaves `PENDING` exactly once, through [`settle`](Self::settle)
/// or [`expire`](Self::expire), and is never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub external_reference: String,
    pub created_at: DateTime<Utc>,
    pub expire_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentIntent {
    pub fn new(
        order_id: OrderId,
        method: PaymentMethod,
        amount: Amount,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self> {
        if ttl <= Duration::zero() {
            return Err(PaymentError::ValidationError(
                "payment TTL must be positive".to_string(),
            ));
        }
        let expire_at = now.checked_add_signed(ttl).ok_or_else(|| {
            PaymentError::ValidationError("payment TTL is out of range".to_string())
        })?;
        Ok(Self {
            id: PaymentId::generate(),
            order_id,
            method,
            amount,
            status: PaymentStatus::Pending,
            external_reference: format!("gw_{}", Uuid::new_v4().simple()),
            created_at: now,
            expire_at,
            paid_at: None,
        })
    }

    /// Pending and not yet past its expiry.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expire_at > now
    }

    /// Pending but past its expiry; the sweep will expire it.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.expire_at <= now
    }

    pub fn settle(&mut self, outcome: CallbackOutcome, now: DateTime<Utc>) -> Result<()> {
        self.ensure_pending()?;
        self.status = outcome.status();
        if outcome == CallbackOutcome::Success {
            self.paid_at = Some(now);
        }
        Ok(())
    }

    pub fn expire(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.status = PaymentStatus::Expired;
        Ok(())
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status == PaymentStatus::Pending {
            Ok(())
        } else {
            Err(PaymentError::IntentFinalized {
                payment_id: self.id.clone(),
                status: self.status,
            })
        }
    }
}
