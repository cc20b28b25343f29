use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::{health_status, JsonBody, PathParam};
use crate::contracts::{MerchantCallback, PurchaseRequest};
use crate::domain::CallbackKind;
use crate::error::AppError;
use crate::services::MerchantService;

#[derive(Clone)]
pub struct MerchantState {
    pub service: MerchantService,
}

pub fn router(state: MerchantState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/payments/init", post(start_purchase))
        .route("/api/payments/:transaction_id", get(get_order))
        .route("/payment/success", post(on_success))
        .route("/payment/fail", post(on_fail))
        .route("/payment/error", post(on_error))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(health_status("merchant"))
}

async fn start_purchase(
    State(state): State<MerchantState>,
    JsonBody(req): JsonBody<PurchaseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.start_purchase(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_order(
    State(state): State<MerchantState>,
    PathParam(transaction_id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let order = state.service.get_order(transaction_id).await?;
    Ok(Json(order))
}

async fn on_success(
    State(state): State<MerchantState>,
    JsonBody(callback): JsonBody<MerchantCallback>,
) -> Result<impl IntoResponse, AppError> {
    record(state, CallbackKind::Success, callback).await
}

async fn on_fail(
    State(state): State<MerchantState>,
    JsonBody(callback): JsonBody<MerchantCallback>,
) -> Result<impl IntoResponse, AppError> {
    record(state, CallbackKind::Fail, callback).await
}

async fn on_error(
    State(state): State<MerchantState>,
    JsonBody(callback): JsonBody<MerchantCallback>,
) -> Result<impl IntoResponse, AppError> {
    record(state, CallbackKind::Error, callback).await
}

async fn record(
    state: MerchantState,
    kind: CallbackKind,
    callback: MerchantCallback,
) -> Result<Json<crate::contracts::CallbackAck>, AppError> {
    let ack = state.service.record_callback(kind, callback).await?;
    Ok(Json(ack))
}
