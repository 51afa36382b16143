//! Category API Handlers

use axum::{
    Json,
    extract::{Path, State},
};

use crate::core::ServerState;
use crate::db::models::{Category, CategoryCreate};
use crate::db::repository::category;
use crate::utils::{AppError, AppResponse, AppResult};

/// GET /api/categories - list all categories
pub async fn list(State(state): State<ServerState>) -> AppResult<Json<AppResponse<Vec<Category>>>> {
    let categories = category::find_all(state.pool()).await?;
    Ok(Json(AppResponse::success(categories)))
}

/// GET /api/categories/{id}
pub async fn get_by_id(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<Category>>> {
    let found = category::find_by_id(state.pool(), id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Category {id} not found")))?;
    Ok(Json(AppResponse::success(found)))
}

/// POST /api/categories
pub async fn create(
    State(state): State<ServerState>,
    Json(payload): Json<CategoryCreate>,
) -> AppResult<Json<AppResponse<Category>>> {
    let created = category::create(state.pool(), payload).await?;
    Ok(Json(AppResponse::success(created)))
}

/// DELETE /api/categories/{id}
pub async fn delete(
    State(state): State<ServerState>,
    Path(id): Path<i64>,
) -> AppResult<Json<AppResponse<bool>>> {
    category::delete(state.pool(), id).await?;
    Ok(Json(AppResponse::success(true)))
}
