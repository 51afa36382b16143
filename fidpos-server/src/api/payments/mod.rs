//! Payment API module
//!
//! Initiation and status live under `/api/payments`; the gateway posts
//! confirmations to `/mpesa/callback`, which sits outside the `/api`
//! prefix because its path is registered with the payment provider.

mod handler;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/payments/initiate", post(handler::initiate))
        .route("/api/payments/status/{id}", get(handler::status))
        .route("/mpesa/callback", post(handler::mpesa_callback))
}
