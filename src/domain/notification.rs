use super::order::{Order, OrderStatus, UserId};
use super::payment::{PaymentId, PaymentIntent, PaymentStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderStatus,
    Payment,
}

/// Describes the status change a notification reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    pub from: OrderStatus,
    pub to: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
}

/// A request to tell a user about a lifecycle change. Produced, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub user_id: UserId,
    pub r#type: NotificationType,
    pub related_id: String,
    pub payload: TransitionPayload,
}

impl NotificationEvent {
    /// An order changed status; `related_id` is the order id.
    pub fn order_status(order: &Order, from: OrderStatus, intent: Option<&PaymentIntent>) -> Self {
        Self {
            user_id: order.user_id.clone(),
            r#type: NotificationType::OrderStatus,
            related_id: order.id.to_string(),
            payload: TransitionPayload {
                order_id: order.id.to_string(),
                payment_id: intent.map(|i| i.id.clone()),
                from,
                to: order.status,
                payment_status: intent.map(|i| i.status),
            },
        }
    }

    /// A payment attempt settled without changing the order; `related_id` is the payment id.
    pub fn payment(order: &Order, from: OrderStatus, intent: &PaymentIntent) -> Self {
        Self {
            user_id: order.user_id.clone(),
            r#type: NotificationType::Payment,
            related_id: intent.id.to_string(),
            payload: TransitionPayload {
                order_id: order.id.to_string(),
                payment_id: Some(intent.id.clone()),
                from,
                to: order.status,
                payment_status: Some(intent.status),
            },
        }
    }
}
