//! Item Repository + Inventory Ledger
//!
//! Besides catalog CRUD, this module owns the stock-deduction side of
//! checkout: [`reserve_and_deduct`] runs inside the caller's SQLite
//! transaction so the deduction commits (or rolls back) together with the
//! sale record.

use super::{RepoError, RepoResult};
use crate::db::models::{Item, ItemCreate, ItemUpdate, ItemWithCategory};
use crate::utils::now_millis;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};

const ITEM_COLUMNS: &str = "id, barcode, name, price, quantity, category_id, created_at";

// =============================================================================
// Catalog CRUD
// =============================================================================

pub async fn find_all(pool: &SqlitePool) -> RepoResult<Vec<ItemWithCategory>> {
    let items = sqlx::query_as::<_, ItemWithCategory>(
        "SELECT i.id, i.barcode, i.name, i.price, i.quantity, i.category_id, \
         c.name AS category_name, i.created_at \
         FROM items i LEFT JOIN categories c ON c.id = i.category_id \
         ORDER BY i.created_at DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(items)
}

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<Item>> {
    let item =
        sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
    Ok(item)
}

pub async fn find_by_barcode(pool: &SqlitePool, barcode: &str) -> RepoResult<Option<Item>> {
    let item = sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE barcode = ?"
    ))
    .bind(barcode)
    .fetch_optional(pool)
    .await?;
    Ok(item)
}

pub async fn create(pool: &SqlitePool, data: ItemCreate) -> RepoResult<Item> {
    if data.barcode.trim().is_empty() || data.name.trim().is_empty() {
        return Err(RepoError::Validation("Barcode and name are required".into()));
    }
    if data.price < 0.0 {
        return Err(RepoError::Validation(format!(
            "Price cannot be negative: {}",
            data.price
        )));
    }
    if data.quantity < 0 {
        return Err(RepoError::Validation(format!(
            "Quantity cannot be negative: {}",
            data.quantity
        )));
    }

    let now = now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO items (barcode, name, price, quantity, category_id, created_at) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(data.barcode.trim())
    .bind(data.name.trim())
    .bind(data.price)
    .bind(data.quantity)
    .bind(data.category_id)
    .bind(now)
    .fetch_one(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::Database("Failed to create item".into()))
}

pub async fn update(pool: &SqlitePool, id: i64, data: ItemUpdate) -> RepoResult<Item> {
    if let Some(price) = data.price
        && price < 0.0
    {
        return Err(RepoError::Validation(format!(
            "Price cannot be negative: {price}"
        )));
    }
    if let Some(quantity) = data.quantity
        && quantity < 0
    {
        return Err(RepoError::Validation(format!(
            "Quantity cannot be negative: {quantity}"
        )));
    }

    let rows = sqlx::query(
        "UPDATE items SET \
         name = COALESCE(?, name), \
         price = COALESCE(?, price), \
         quantity = COALESCE(?, quantity), \
         category_id = COALESCE(?, category_id) \
         WHERE id = ?",
    )
    .bind(data.name.as_deref().map(str::trim))
    .bind(data.price)
    .bind(data.quantity)
    .bind(data.category_id)
    .bind(id)
    .execute(pool)
    .await?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Item {id}")));
    }
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Item {id}")))
}

pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let rows = sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Item {id}")));
    }
    Ok(())
}

// =============================================================================
// Inventory Ledger
// =============================================================================

/// One requested cart line
#[derive(Debug, Clone)]
pub struct DeductRequest {
    pub barcode: String,
    pub quantity: i64,
}

/// A line the ledger accepted, with price/name snapshotted at deduction time
#[derive(Debug, Clone, Serialize)]
pub struct DeductedLine {
    pub barcode: String,
    pub item_name: String,
    pub unit_price: f64,
    /// What the cart asked for
    pub requested: i64,
    /// What was actually deducted (capped at available stock)
    pub quantity: i64,
    pub line_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    UnknownBarcode,
    OutOfStock,
    NothingRequested,
}

/// A line the ledger rejected (skipped, not fatal to the cart)
#[derive(Debug, Clone, Serialize)]
pub struct RejectedLine {
    pub barcode: String,
    pub requested: i64,
    pub reason: RejectReason,
}

/// Deduct stock for a cart, line by line, inside an open transaction.
///
/// - Unknown barcodes and zero-stock lines are rejected, not errors.
/// - Requested quantities are capped at available stock.
/// - The guarded `UPDATE ... WHERE quantity >= ?` keeps the quantity >= 0
///   invariant even if another writer slipped in between read and write.
///
/// The caller commits or rolls back: a rollback restores every deduction,
/// which is the compensation path for persistence failures.
pub async fn reserve_and_deduct(
    conn: &mut SqliteConnection,
    requests: &[DeductRequest],
) -> RepoResult<(Vec<DeductedLine>, Vec<RejectedLine>)> {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();

    for request in requests {
        if request.quantity <= 0 {
            rejected.push(RejectedLine {
                barcode: request.barcode.clone(),
                requested: request.quantity,
                reason: RejectReason::NothingRequested,
            });
            continue;
        }

        let item = sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE barcode = ?"
        ))
        .bind(&request.barcode)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(item) = item else {
            rejected.push(RejectedLine {
                barcode: request.barcode.clone(),
                requested: request.quantity,
                reason: RejectReason::UnknownBarcode,
            });
            continue;
        };

        // Partial fulfillment: cap at available stock
        let take = request.quantity.min(item.quantity);
        if take == 0 {
            rejected.push(RejectedLine {
                barcode: request.barcode.clone(),
                requested: request.quantity,
                reason: RejectReason::OutOfStock,
            });
            continue;
        }

        let rows = sqlx::query(
            "UPDATE items SET quantity = quantity - ? WHERE barcode = ? AND quantity >= ?",
        )
        .bind(take)
        .bind(&request.barcode)
        .bind(take)
        .execute(&mut *conn)
        .await?;

        if rows.rows_affected() == 0 {
            // Stock vanished under us; treat as out of stock
            rejected.push(RejectedLine {
                barcode: request.barcode.clone(),
                requested: request.quantity,
                reason: RejectReason::OutOfStock,
            });
            continue;
        }

        accepted.push(DeductedLine {
            barcode: item.barcode,
            item_name: item.name,
            unit_price: item.price,
            requested: request.quantity,
            quantity: take,
            line_total: item.price * take as f64,
        });
    }

    Ok((accepted, rejected))
}
