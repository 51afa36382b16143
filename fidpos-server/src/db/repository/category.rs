//! Category Repository

use super::{RepoError, RepoResult};
use crate::db::models::{Category, CategoryCreate};
use crate::utils::now_millis;
use sqlx::SqlitePool;

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>(
        "SELECT id, name, created_at FROM categories ORDER BY name",
    )
    .fetch_all(pool)
    .await?;
    Ok(categories)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Category>> {
    let category =
        sqlx::query_as::<_, Category>("SELECT id, name, created_at FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(category)
}

pub async fn create(pool: &SqlitePool, data: CategoryCreate) -> RepoResult<Category> {
    let name = data.name.trim();
    if name.is_empty() {
        return Err(RepoError::Validation("Category name required".into()));
    }

    let now = now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO categories (name, created_at) VALUES (?, ?) RETURNING id",
    )
    .bind(name)
    .bind(now)
    .fetch_one(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create category".into()))
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let rows = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Category {id}")));
    }
    Ok(())
}
