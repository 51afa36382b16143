//! Sales report API module

mod handler;

use axum::{Router, routing::get};

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new()
        .route("/api/reports/sales", get(handler::sales))
        .route("/api/reports/summary", get(handler::summary))
        .route("/api/transactions/{id}", get(handler::get_transaction))
}
