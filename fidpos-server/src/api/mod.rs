//! API routing module
//!
//! # Structure
//!
//! - [`health`] - liveness check
//! - [`categories`] - category management
//! - [`items`] - item catalog and stock management
//! - [`checkout`] - checkout orchestration
//! - [`payments`] - payment initiation, status and the gateway callback
//! - [`reports`] - sales reports

pub mod categories;
pub mod checkout;
pub mod health;
pub mod items;
pub mod payments;
pub mod reports;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

// Re-export common types for handlers
pub use crate::utils::{AppResponse, AppResult};

/// Compose the full application router
pub fn router(state: ServerState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(categories::router())
        .merge(items::router())
        .merge(checkout::router())
        .merge(payments::router())
        .merge(reports::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
