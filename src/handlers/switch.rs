use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::{health_status, JsonBody, PathParam, QueryParams};
use crate::contracts::{BankNotification, OrderQuery, SwitchInitRequest, TransactionView};
use crate::domain::PaymentMethod;
use crate::error::AppError;
use crate::middleware::{admin_auth, AdminKey};
use crate::services::{DeliveryOutcome, SwitchService};

#[derive(Clone)]
pub struct SwitchState {
    pub service: SwitchService,
    pub admin_key: AdminKey,
}

pub fn router(state: SwitchState) -> Router {
    let admin = Router::new()
        .route(
            "/api/switch/transactions/:id/notify-merchant",
            post(renotify_merchant),
        )
        .route_layer(middleware::from_fn_with_state(
            state.admin_key.clone(),
            admin_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/switch/transactions/init", post(init_transaction))
        .route("/api/switch/transactions", get(find_by_order))
        .route("/api/switch/transactions/:id", get(get_transaction))
        .route("/api/switch/checkout/:id", get(checkout))
        .route("/api/switch/checkout/:id/card", post(start_card))
        .route("/api/switch/checkout/:id/qr", post(start_qr))
        .route("/api/switch/bank/notify", post(bank_notify))
        .merge(admin)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(health_status("switch"))
}

async fn init_transaction(
    State(state): State<SwitchState>,
    JsonBody(req): JsonBody<SwitchInitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.init(req).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_transaction(
    State(state): State<SwitchState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.service.get(id).await?;
    Ok(Json(TransactionView::from(&tx)))
}

async fn find_by_order(
    State(state): State<SwitchState>,
    QueryParams(query): QueryParams<OrderQuery>,
) -> Result<impl IntoResponse, AppError> {
    let found = state
        .service
        .find_by_order(&query.merchant_id, &query.order_id)
        .await?;
    let views: Vec<TransactionView> = found.iter().map(TransactionView::from).collect();
    Ok(Json(views))
}

/// What the payer's checkout page needs to offer a method.
async fn checkout(
    State(state): State<SwitchState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.service.get(id).await?;
    Ok(Json(json!({
        "transaction_id": tx.id,
        "amount": tx.amount,
        "currency": tx.currency,
        "status": tx.status,
        "methods": [PaymentMethod::Card, PaymentMethod::Qr],
        "card_url": format!("/api/switch/checkout/{}/card", tx.id),
        "qr_url": format!("/api/switch/checkout/{}/qr", tx.id),
    })))
}

async fn start_card(
    State(state): State<SwitchState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.start_payment(id, PaymentMethod::Card).await?;
    Ok(Json(response))
}

async fn start_qr(
    State(state): State<SwitchState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.start_payment(id, PaymentMethod::Qr).await?;
    Ok(Json(response))
}

async fn bank_notify(
    State(state): State<SwitchState>,
    JsonBody(notification): JsonBody<BankNotification>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.service.handle_bank_notification(notification).await?;
    Ok(Json(json!({
        "acknowledged": true,
        "transaction_id": tx.id,
        "status": tx.status,
    })))
}

async fn renotify_merchant(
    State(state): State<SwitchState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (tx, outcome) = state.service.renotify_merchant(id).await?;
    Ok(Json(json!({
        "outcome": describe(&outcome),
        "transaction": TransactionView::from(&tx),
    })))
}

pub(crate) fn describe<S>(outcome: &DeliveryOutcome<S>) -> &'static str {
    match outcome {
        DeliveryOutcome::NothingPending => "nothing_pending",
        DeliveryOutcome::InFlight(_) => "in_flight",
        DeliveryOutcome::Delivered(_) => "delivered",
        DeliveryOutcome::Failed { .. } => "failed",
    }
}
