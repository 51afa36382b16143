//! Checkout API Handler

use axum::{Json, extract::State};

use crate::checkout::{CheckoutOutcome, CheckoutRequest};
use crate::core::ServerState;
use crate::db::models::PaymentMethod;
use crate::utils::{AppError, AppResponse, AppResult};

/// POST /api/checkout - run a checkout
///
/// Input validation happens before any stock is touched: a mobile-money
/// checkout without a phone number is rejected with no side effects.
pub async fn checkout(
    State(state): State<ServerState>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<AppResponse<CheckoutOutcome>>> {
    if payload.method == PaymentMethod::Mpesa
        && payload.phone.as_deref().unwrap_or("").trim().is_empty()
    {
        return Err(AppError::validation(
            "phone number is required for M-Pesa checkout",
        ));
    }

    let outcome = state.checkout.checkout(payload).await?;
    Ok(Json(AppResponse::success(outcome)))
}
