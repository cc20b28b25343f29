use axum::{
    body::Bytes,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use uuid::Uuid;

use super::switch::describe;
use super::{health_status, JsonBody, PathParam};
use crate::contracts::{
    BankInitRequest, CardSubmitRequest, QrConfirmRequest, SessionView, SubmissionResponse,
};
use crate::domain::{PaymentSession, PaymentStatus};
use crate::error::AppError;
use crate::middleware::{admin_auth, AdminKey};
use crate::services::BankService;

#[derive(Clone)]
pub struct BankState {
    pub service: BankService,
    pub admin_key: AdminKey,
}

pub fn router(state: BankState) -> Router {
    let admin = Router::new()
        .route("/api/bank/payments/:id/notify-switch", post(renotify_switch))
        .route_layer(axum::middleware::from_fn_with_state(
            state.admin_key.clone(),
            admin_auth,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/api/bank/payments/init", post(init_payment))
        .route("/api/bank/payments/:id", get(get_payment))
        .route("/api/bank/payments/:id/card/submit", post(submit_card))
        .route("/api/bank/payments/:id/qr/confirm", post(confirm_qr))
        .merge(admin)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(health_status("bank"))
}

async fn init_payment(
    State(state): State<BankState>,
    JsonBody(req): JsonBody<BankInitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let response = state.service.init(req).await?;
    Ok(Json(response))
}

async fn get_payment(
    State(state): State<BankState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.service.get_status(id).await?;
    Ok(Json(SessionView::from(&session)))
}

async fn submit_card(
    State(state): State<BankState>,
    PathParam(id): PathParam<Uuid>,
    JsonBody(req): JsonBody<CardSubmitRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.service.submit_card(id, req).await?;
    Ok(Json(submission_response(&session)))
}

/// The QR confirmation body is optional.
async fn confirm_qr(
    State(state): State<BankState>,
    PathParam(id): PathParam<Uuid>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        QrConfirmRequest::default()
    } else {
        serde_json::from_slice::<QrConfirmRequest>(&body)
            .map_err(|e| AppError::Validation(format!("invalid body: {}", e)))?
    };
    let session = state.service.confirm_qr(id, req).await?;
    Ok(Json(submission_response(&session)))
}

async fn renotify_switch(
    State(state): State<BankState>,
    PathParam(id): PathParam<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let (session, outcome) = state.service.renotify_switch(id).await?;
    Ok(Json(json!({
        "outcome": describe(&outcome),
        "session": SessionView::from(&session),
    })))
}

fn submission_response(session: &PaymentSession) -> SubmissionResponse {
    let message = match session.status {
        PaymentStatus::Paid => "payment approved",
        PaymentStatus::Failed => "payment declined",
        PaymentStatus::Expired => "payment session expired",
        PaymentStatus::Created => "payment pending",
    };
    SubmissionResponse {
        payment_id: session.id,
        status: session.status,
        message: message.to_string(),
    }
}
