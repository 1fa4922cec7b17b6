use crate::domain::order::{OrderId, OrderStatus, UserId};
use crate::domain::payment::{PaymentId, PaymentStatus};
use thiserror::Error;

/// Coarse classification of a [`PaymentError`], used by callers to decide
/// whether to re-query, retry or surface the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ConflictingState,
    /// A gateway callback that must not be applied (fraud/replay or late money).
    Rejected,
    Forbidden,
    Busy,
    Validation,
    Internal,
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("order {0} not found")]
    OrderNotFound(OrderId),
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("order {order_id} is not payable in status {status}")]
    OrderNotPayable {
        order_id: OrderId,
        status: OrderStatus,
    },
    #[error("order {order_id} already has an active payment {payment_id}")]
    PaymentAlreadyActive {
        order_id: OrderId,
        payment_id: PaymentId,
    },
    #[error("invalid order transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("payment {payment_id} is already {status}")]
    IntentFinalized {
        payment_id: PaymentId,
        status: PaymentStatus,
    },
    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),
    #[error("external reference {0} is already in use")]
    DuplicateReference(String),
    #[error("external reference does not match payment {0}")]
    ReferenceMismatch(PaymentId),
    #[error("payment {0} expired before the callback arrived")]
    IntentExpired(PaymentId),
    #[error("user {principal} may not access order {order_id}")]
    Forbidden { principal: UserId, order_id: OrderId },
    #[error("order {0} is busy, retry later")]
    Busy(OrderId),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl PaymentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::OrderNotFound(_) | Self::PaymentNotFound(_) => ErrorKind::NotFound,
            Self::OrderNotPayable { .. }
            | Self::PaymentAlreadyActive { .. }
            | Self::InvalidTransition { .. }
            | Self::IntentFinalized { .. }
            | Self::DuplicateOrder(_)
            | Self::DuplicateReference(_) => ErrorKind::ConflictingState,
            Self::ReferenceMismatch(_) | Self::IntentExpired(_) => ErrorKind::Rejected,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Busy(_) => ErrorKind::Busy,
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::CsvError(_) | Self::IoError(_) | Self::InternalError(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OrderNotFound(_) => "order_not_found",
            Self::PaymentNotFound(_) => "payment_not_found",
            Self::OrderNotPayable { .. } => "order_not_payable",
            Self::PaymentAlreadyActive { .. } => "payment_already_active",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::IntentFinalized { .. } => "payment_finalized",
            Self::DuplicateOrder(_) => "duplicate_order",
            Self::DuplicateReference(_) => "duplicate_reference",
            Self::ReferenceMismatch(_) => "reference_mismatch",
            Self::IntentExpired(_) => "intent_expired",
            Self::Forbidden { .. } => "forbidden",
            Self::Busy(_) => "busy",
            Self::ValidationError(_) => "validation_error",
            Self::CsvError(_) | Self::IoError(_) | Self::InternalError(_) => "internal_error",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(Box::new(std::io::Error::other(message.into())))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for PaymentError {
    fn from(err: rocksdb::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::InternalError(Box::new(err))
    }
}

pub type Result<T, E = PaymentError> = std::result::Result<T, E>;
