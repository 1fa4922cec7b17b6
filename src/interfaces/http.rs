//! HTTP surface of the engine.
//!
//! The authentication layer in front of this service resolves the caller and
//! forwards the user id in the `x-user-id` header. Gateway callbacks carry no
//! principal; they are authorised by their external reference.

use super::dto::{
    CreatePaymentRequest, ErrorBody, PaymentCallbackRequest, SimulateRequest, SimulateResponse,
};
use crate::application::engine::{CreatedPayment, LifecycleEngine, PaymentStatusView};
use crate::domain::order::{Order, OrderId, UserId};
use crate::domain::pagination::{Page, PageRequest};
use crate::domain::payment::{CallbackOutcome, PaymentId};
use crate::domain::ports::CallbackReceipt;
use crate::error::{ErrorKind, PaymentError};
use async_trait::async_trait;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{error, warn};

pub const PRINCIPAL_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<LifecycleEngine>,
}

impl AppState {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/callback", post(payment_callback))
        .route("/payments/:payment_id", get(payment_status))
        .route("/payments/:payment_id/simulate", post(simulate_callback))
        .route("/orders", get(list_orders))
        .route("/orders/:order_id/payments", get(list_payments))
        .route("/orders/:order_id/cancel", post(cancel_order))
        .with_state(state)
}

/// Errors returned by the handlers.
#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Engine(PaymentError),
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        Self::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                format!("missing {PRINCIPAL_HEADER} header"),
            ),
            ApiError::Engine(e) => {
                let status = match e.kind() {
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::ConflictingState => StatusCode::CONFLICT,
                    ErrorKind::Rejected => StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                    ErrorKind::Busy => StatusCode::SERVICE_UNAVAILABLE,
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                if status.is_server_error() {
                    error!(error = %e, "request failed");
                } else {
                    warn!(error = %e, code = e.code(), "request rejected");
                }
                let message = if e.kind() == ErrorKind::Internal {
                    "internal server error".to_string()
                } else {
                    e.to_string()
                };
                (status, e.code(), message)
            }
        };
        let body = ErrorBody {
            error: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ApiError::Unauthenticated)?;
        Ok(Principal(UserId::from(user)))
    }
}

async fn create_payment(
    State(state): State<AppState>,
    Principal(user): Principal,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<CreatedPayment>), ApiError> {
    let created = state
        .engine
        .create_intent(&user, &req.order_id, req.method)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn payment_callback(
    State(state): State<AppState>,
    Json(req): Json<PaymentCallbackRequest>,
) -> Result<Json<CallbackReceipt>, ApiError> {
    let receipt = state.engine.apply_callback(req.into()).await?;
    Ok(Json(receipt))
}

async fn payment_status(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path(payment_id): Path<PaymentId>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    let view = state.engine.get_payment_status(&user, &payment_id).await?;
    Ok(Json(view))
}

async fn simulate_callback(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path(payment_id): Path<PaymentId>,
    Json(req): Json<SimulateRequest>,
) -> Result<(StatusCode, Json<SimulateResponse>), ApiError> {
    // Ownership check doubles as the existence check.
    state.engine.get_payment_status(&user, &payment_id).await?;

    let outcome = CallbackOutcome::from_success(req.success);
    let deliveries = req.deliveries.unwrap_or(1).clamp(1, 10);
    for _ in 0..deliveries {
        LifecycleEngine::simulate_callback(&state.engine, &payment_id, outcome)?;
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(SimulateResponse {
            payment_id,
            scheduled: deliveries,
        }),
    ))
}

async fn list_orders(
    State(state): State<AppState>,
    Principal(user): Principal,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<Order>>, ApiError> {
    Ok(Json(state.engine.list_orders(&user, page).await?))
}

async fn list_payments(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path(order_id): Path<OrderId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<PaymentStatusView>>, ApiError> {
    Ok(Json(state.engine.list_payments(&user, &order_id, page).await?))
}

async fn cancel_order(
    State(state): State<AppState>,
    Principal(user): Principal,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.engine.cancel_order(&user, &order_id).await?))
}
