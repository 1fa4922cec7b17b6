use crate::domain::order::OrderId;
use crate::domain::payment::{CallbackOutcome, GatewayCallback, PaymentId, PaymentMethod};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: OrderId,
    pub method: PaymentMethod,
}

/// Body the gateway posts to the callback webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCallbackRequest {
    pub payment_id: PaymentId,
    pub external_reference: String,
    pub success: bool,
}

impl From<PaymentCallbackRequest> for GatewayCallback {
    fn from(req: PaymentCallbackRequest) -> Self {
        Self {
            payment_id: req.payment_id,
            external_reference: req.external_reference,
            outcome: CallbackOutcome::from_success(req.success),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateRequest {
    pub success: bool,
    /// How many times the gateway should deliver the callback. Defaults to once.
    #[serde(default)]
    pub deliveries: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateResponse {
    pub payment_id: PaymentId,
    pub scheduled: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}
