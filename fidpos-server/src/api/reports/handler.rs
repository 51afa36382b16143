//! Report API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;

use crate::core::ServerState;
use crate::db::models::TransactionWithLines;
use crate::db::repository::transaction::{self, SalesSummary};
use crate::utils::{AppResponse, AppResult, now_millis};

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Unix millis, inclusive; defaults to the epoch
    pub from: Option<i64>,
    /// Unix millis, exclusive; defaults to now
    pub to: Option<i64>,
}

/// GET /api/reports/sales?from=&to= - transactions with lines in a window
pub async fn sales(
    State(state): State<ServerState>,
    Query(range): Query<RangeQuery>,
) -> AppResult<Json<AppResponse<Vec<TransactionWithLines>>>> {
    let from = range.from.unwrap_or(0);
    let to = range.to.unwrap_or_else(now_millis);
    let transactions = transaction::find_in_range(state.pool(), from, to).await?;
    Ok(Json(AppResponse::success(transactions)))
}

/// GET /api/reports/summary - catalog and revenue totals
pub async fn summary(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<SalesSummary>>> {
    let summary = transaction::summary(state.pool()).await?;
    Ok(Json(AppResponse::success(summary)))
}

/// GET /api/transactions/{id} - one transaction with its lines
pub async fn get_transaction(
    State(state): State<ServerState>,
    Path(id): Path<String>,
) -> AppResult<Json<AppResponse<TransactionWithLines>>> {
    let tx = transaction::get_with_lines(state.pool(), &id).await?;
    Ok(Json(AppResponse::success(tx)))
}
