//! Health check endpoint

use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::core::ServerState;
use crate::utils::AppResult;

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/health", get(health))
}

/// GET /api/health - liveness plus a database round-trip
async fn health(State(state): State<ServerState>) -> AppResult<Json<Value>> {
    let db_ok = sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(state.pool())
        .await
        .is_ok();

    Ok(Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "version": env!("CARGO_PKG_VERSION"),
    })))
}
