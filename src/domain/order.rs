use super::money::Amount;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

pub(crate) use string_id;

string_id!(
    /// Opaque order identifier assigned by the ordering flow.
    OrderId
);
string_id!(
    /// Authenticated customer identifier.
    UserId
);
string_id!(MerchantId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    AwaitingPayment,
    Paid,
    Cancelled,
    Refunded,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Paid | Self::Cancelled | Self::Refunded | Self::Expired
        )
    }

    /// Whether a new payment intent may be opened for an order in this status.
    pub fn is_payable(self) -> bool {
        matches!(self, Self::Created | Self::AwaitingPayment)
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, AwaitingPayment)
                | (Created, Cancelled)
                | (AwaitingPayment, AwaitingPayment)
                | (AwaitingPayment, Paid)
                | (AwaitingPayment, Expired)
                | (AwaitingPayment, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
            Self::Refunded => "REFUNDED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The order aggregate as seen by the payment lifecycle.
///
/// Orders are created by the ordering flow in status `CREATED`; from then on
/// only [`Order::transition`] changes the status, and only the lifecycle
/// engine calls it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub merchant_id: MerchantId,
    pub user_id: UserId,
    pub total_amount: Amount,
    pub pay_amount: Amount,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        id: OrderId,
        merchant_id: MerchantId,
        user_id: UserId,
        total_amount: Amount,
        pay_amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if pay_amount > total_amount {
            return Err(PaymentError::ValidationError(format!(
                "pay amount {pay_amount} exceeds total amount {total_amount}"
            )));
        }
        Ok(Self {
            id,
            merchant_id,
            user_id,
            total_amount,
            pay_amount,
            status: OrderStatus::Created,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn is_owned_by(&self, user: &UserId) -> bool {
        &self.user_id == user
    }

    /// Moves the order to `next`, returning the previous status.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<OrderStatus> {
        if !self.status.can_transition_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        let previous = self.status;
        self.status = next;
        self.touch(now);
        Ok(previous)
    }

    /// Bumps `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}
