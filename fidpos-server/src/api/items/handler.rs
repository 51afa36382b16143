//! Item API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::db::models::{Item, ItemCreate, ItemUpdate, ItemWithCategory};
use crate::db::repository::item;
use crate::utils::{AppError, AppResponse, AppResult};

/// GET /api/items - list the catalog with category names
pub async fn list(
    State(state): State<ServerState>,
) -> AppResult<Json<AppResponse<Vec<ItemWithCategory>>>> {
    let items = item::find_all(state.pool()).await?;
    Ok(Json(AppResponse::success(items)))
}

/// GET /api/items/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<Item>>> {
    let found = item::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Item {id} not found")))?;
    Ok(Json(AppResponse::success(found)))
}

/// GET /api/items/barcode/{barcode} - scanner lookup
pub async fn get_by_barcode(
    State(state): State<ServerState>,
    Path(barcode): Path<String>,
) -> AppResult<Json<AppResponse<Item>>> {
    let found = item::find_by_barcode(state.pool(), &barcode)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Item with barcode {barcode} not found")))?;
    Ok(Json(AppResponse::success(found)))
}

/// POST /api/items
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<ItemCreate>,
) -> AppResult<Json<AppResponse<Item>>> {
    let created = item::create(state.pool(), payload).await?;
    Ok(Json(AppResponse::success(created)))
}

/// PUT /api/items/{id}
pub async fn update(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
    Json(payload): Json<ItemUpdate>,
) -> AppResult<Json<AppResponse<Item>>> {
    let updated = item::update(state.pool(), id, payload).await?;
    Ok(Json(AppResponse::success(updated)))
}

/// DELETE /api/items/{id}
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<bool>>> {
    item::delete(state.pool(), id).await?;
    Ok(Json(AppResponse::success(true)))
}
