//! Payment API Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::checkout::attempt_allowed;
use crate::core::ServerState;
use crate::db::models::{PaymentStatus, SaleTransaction};
use crate::db::repository::transaction;
use crate::payment::{StkCallback, verify_signature};
use crate::utils::{AppError, AppResponse, AppResult};

#[derive(Debug, Deserialize)]
pub struct InitiateRequest {
    pub transaction_id: String,
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct InitiateResponse {
    pub transaction_id: String,
    pub checkout_request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_message: Option<String>,
}

/// POST /api/payments/initiate - start (or retry) settlement of an
/// existing transaction
///
/// Only AWAITING_PAYMENT and PAYMENT_FAILED transactions accept a new
/// attempt; anything already settled is a conflict. The attempt lock is
/// held across the eligibility check, the gateway call and the attempt
/// registration so a concurrent retry cannot reach the gateway and then
/// lose the registration race.
pub async fn initiate(
    State(state): State<ServerState>,
    Json(payload): Json<InitiateRequest>,
) -> AppResult<Json<AppResponse<InitiateResponse>>> {
    if payload.phone.trim().is_empty() {
        return Err(AppError::validation("phone number is required"));
    }

    let _guard = state.attempt_lock.lock().await;

    let tx = transaction::get_with_lines(state.pool(), &payload.transaction_id)
        .await?
        .transaction;

    match tx.status {
        PaymentStatus::AwaitingPayment | PaymentStatus::PaymentFailed => {}
        other => {
            return Err(AppError::Conflict(format!(
                "Transaction is {} and cannot take a payment attempt",
                other.as_str()
            )));
        }
    }
    // No STK push while another attempt is still live
    if !attempt_allowed(&tx) {
        return Err(AppError::Conflict(
            "An active payment attempt already exists for this transaction".into(),
        ));
    }

    let attempt = state
        .gateway
        .initiate(&tx.id, payload.phone.trim(), tx.total)
        .await?;

    // A retry over a failed attempt re-opens the payment window
    let registered = transaction::register_attempt(
        state.pool(),
        &tx.id,
        &attempt.checkout_request_id,
        attempt.merchant_request_id.as_deref(),
        &attempt.account_reference,
    )
    .await?;
    if !registered {
        return Err(AppError::Conflict(
            "An active payment attempt already exists for this transaction".into(),
        ));
    }

    info!(transaction_id = %tx.id, reference = %attempt.checkout_request_id, "Payment attempt registered");

    Ok(Json(AppResponse::success(InitiateResponse {
        transaction_id: tx.id,
        checkout_request_id: attempt.checkout_request_id,
        customer_message: attempt.customer_message,
    })))
}

/// GET /api/payments/status/{id} - poll a transaction's payment state
pub async fn status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<SaleTransaction>>> {
    let tx = transaction::get_with_lines(state.pool(), &id).await?.transaction;
    Ok(Json(AppResponse::success(tx)))
}

/// POST /mpesa/callback - gateway confirmation endpoint
///
/// Always acknowledges with the provider's expected shape; a non-2xx or
/// unexpected body would make the provider retry forever. Verification
/// failures and malformed bodies are logged and dropped, never surfaced.
pub async fn mpesa_callback(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<Value> {
    let ack = Json(json!({ "ResultCode": 0, "ResultDesc": "Received" }));

    if let Some(secret) = &state.config.mpesa.callback_secret {
        let signature = headers
            .get("x-callback-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if !verify_signature(&body, signature, secret) {
            warn!("Discarding callback with missing or invalid signature");
            return ack;
        }
    }

    let event = StkCallback::parse(&body);
    let outcome = state.reconciler.apply(event).await;
    info!(outcome = ?outcome, "Callback reconciled");

    ack
}
