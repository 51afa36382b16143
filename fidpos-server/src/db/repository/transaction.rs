//! Sale Transaction Repository
//!
//! Durable append of transactions with their line snapshots, conditional
//! status transitions for payment reconciliation, point lookups and range
//! queries. Status transitions are single guarded UPDATE statements so the
//! move out of AWAITING_PAYMENT happens at most once even under duplicate
//! concurrent callbacks.

use super::{RepoError, RepoResult};
use super::item::DeductedLine;
use crate::db::models::{
    PaymentMethod, PaymentStatus, SaleLine, SaleTransaction, TransactionWithLines,
};
use sqlx::{SqliteConnection, SqlitePool};

const TX_COLUMNS: &str = "id, total, status, payment_method, checkout_request_id, \
    merchant_request_id, account_reference, attempt_registered_at, payer_phone, \
    settled_amount, failure_reason, created_at, paid_at";

/// Fields for a new transaction row
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub id: String,
    pub total: f64,
    pub status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

/// Append a transaction and its line snapshots inside an open transaction.
///
/// The caller opens the sqlx transaction that also carries the stock
/// deduction, so sale record and deduction commit as one atomic unit.
///
/// Returns the inserted line rows so the caller can build its response
/// without re-reading the committed rows.
pub async fn insert_with_lines(
    conn: &mut SqliteConnection,
    tx: &NewTransaction,
    lines: &[DeductedLine],
) -> RepoResult<Vec<SaleLine>> {
    sqlx::query(
        "INSERT INTO sale_transactions (id, total, status, payment_method, created_at, paid_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&tx.id)
    .bind(tx.total)
    .bind(tx.status)
    .bind(tx.payment_method)
    .bind(tx.created_at)
    .bind(tx.paid_at)
    .execute(&mut *conn)
    .await?;

    let mut inserted = Vec::with_capacity(lines.len());
    for line in lines {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO sale_lines (transaction_id, barcode, item_name, price, quantity, total, sold_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&tx.id)
        .bind(&line.barcode)
        .bind(&line.item_name)
        .bind(line.unit_price)
        .bind(line.quantity)
        .bind(line.line_total)
        .bind(tx.created_at)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(SaleLine {
            id,
            transaction_id: tx.id.clone(),
            barcode: line.barcode.clone(),
            item_name: line.item_name.clone(),
            price: line.unit_price,
            quantity: line.quantity,
            total: line.line_total,
            sold_at: tx.created_at,
        });
    }

    Ok(inserted)
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> RepoResult<Option<SaleTransaction>> {
    let tx = sqlx::query_as::<_, SaleTransaction>(&format!(
        "SELECT {TX_COLUMNS} FROM sale_transactions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(tx)
}

pub async fn find_lines(pool: &SqlitePool, transaction_id: &str) -> RepoResult<Vec<SaleLine>> {
    let lines = sqlx::query_as::<_, SaleLine>(
        "SELECT id, transaction_id, barcode, item_name, price, quantity, total, sold_at \
         FROM sale_lines WHERE transaction_id = ? ORDER BY id",
    )
    .bind(transaction_id)
    .fetch_all(pool)
    .await?;
    Ok(lines)
}

pub async fn find_with_lines(
    pool: &SqlitePool,
    id: &str,
) -> RepoResult<Option<TransactionWithLines>> {
    let Some(transaction) = find_by_id(pool, id).await? else {
        return Ok(None);
    };
    let lines = find_lines(pool, id).await?;
    Ok(Some(TransactionWithLines { transaction, lines }))
}

/// Transactions created in `[from, to)`, newest first, with lines
pub async fn find_in_range(
    pool: &SqlitePool,
    from: i64,
    to: i64,
) -> RepoResult<Vec<TransactionWithLines>> {
    let transactions = sqlx::query_as::<_, SaleTransaction>(&format!(
        "SELECT {TX_COLUMNS} FROM sale_transactions \
         WHERE created_at >= ? AND created_at < ? ORDER BY created_at DESC"
    ))
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    let mut result = Vec::with_capacity(transactions.len());
    for transaction in transactions {
        let lines = find_lines(pool, &transaction.id).await?;
        result.push(TransactionWithLines { transaction, lines });
    }
    Ok(result)
}

// =============================================================================
// Payment attempt + reconciliation transitions
// =============================================================================

/// Record a new payment attempt on a transaction.
///
/// Allowed only when no attempt is active: status AWAITING_PAYMENT with no
/// stored reference (first attempt), or PAYMENT_FAILED (retry, which
/// returns the row to AWAITING_PAYMENT). Returns false when the guard does
/// not match (active attempt exists or transaction is settled).
///
/// Stamps `attempt_registered_at` so the expiry window restarts with the
/// new attempt instead of running from the original checkout time.
pub async fn register_attempt(
    pool: &SqlitePool,
    transaction_id: &str,
    checkout_request_id: &str,
    merchant_request_id: Option<&str>,
    account_reference: &str,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE sale_transactions SET \
         status = 'AWAITING_PAYMENT', \
         payment_method = 'MPESA', \
         checkout_request_id = ?, \
         merchant_request_id = ?, \
         account_reference = ?, \
         attempt_registered_at = ?, \
         failure_reason = NULL \
         WHERE id = ? AND (status = 'PAYMENT_FAILED' \
            OR (status = 'AWAITING_PAYMENT' AND checkout_request_id IS NULL))",
    )
    .bind(checkout_request_id)
    .bind(merchant_request_id)
    .bind(account_reference)
    .bind(crate::utils::now_millis())
    .bind(transaction_id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Mark the transaction matching an attempt reference as PAID.
///
/// Guarded on AWAITING_PAYMENT so the transition (and the settlement
/// timestamp) is applied at most once; duplicate callbacks are no-ops.
pub async fn settle_paid(
    pool: &SqlitePool,
    checkout_request_id: &str,
    settled_amount: f64,
    payer_phone: &str,
    paid_at: i64,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE sale_transactions SET \
         status = 'PAID', \
         payment_method = 'MPESA', \
         settled_amount = ?, \
         payer_phone = ?, \
         failure_reason = NULL, \
         paid_at = ? \
         WHERE checkout_request_id = ? AND status = 'AWAITING_PAYMENT'",
    )
    .bind(settled_amount)
    .bind(payer_phone)
    .bind(paid_at)
    .bind(checkout_request_id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Mark the transaction matching an attempt reference as PAYMENT_FAILED
pub async fn settle_failed(
    pool: &SqlitePool,
    checkout_request_id: &str,
    reason: &str,
) -> RepoResult<bool> {
    let rows = sqlx::query(
        "UPDATE sale_transactions SET \
         status = 'PAYMENT_FAILED', \
         failure_reason = ? \
         WHERE checkout_request_id = ? AND status = 'AWAITING_PAYMENT'",
    )
    .bind(reason)
    .bind(checkout_request_id)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected() > 0)
}

/// Does any transaction carry this attempt reference?
///
/// Used to tell an unmatched callback apart from a duplicate of an
/// already-settled one.
pub async fn exists_by_reference(
    pool: &SqlitePool,
    checkout_request_id: &str,
) -> RepoResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sale_transactions WHERE checkout_request_id = ?",
    )
    .bind(checkout_request_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

/// Fail all AWAITING_PAYMENT transactions whose current attempt started
/// before `cutoff_millis`.
///
/// The window is measured from `attempt_registered_at` (a retried attempt
/// gets a full fresh window), falling back to `created_at` for rows that
/// never registered an attempt. Returns the number of expired rows. A late
/// callback for an expired attempt is absorbed by the settle guards above.
pub async fn expire_awaiting(pool: &SqlitePool, cutoff_millis: i64) -> RepoResult<u64> {
    let rows = sqlx::query(
        "UPDATE sale_transactions SET \
         status = 'PAYMENT_FAILED', \
         failure_reason = 'payment window expired' \
         WHERE status = 'AWAITING_PAYMENT' \
           AND COALESCE(attempt_registered_at, created_at) < ?",
    )
    .bind(cutoff_millis)
    .execute(pool)
    .await?;
    Ok(rows.rows_affected())
}

/// Dashboard summary numbers
#[derive(Debug, Clone, serde::Serialize)]
pub struct SalesSummary {
    pub total_items: i64,
    pub total_stock: i64,
    pub total_transactions: i64,
    pub total_revenue: f64,
}

pub async fn summary(pool: &SqlitePool) -> RepoResult<SalesSummary> {
    let (total_items, total_stock): (i64, i64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(quantity), 0) FROM items")
            .fetch_one(pool)
            .await?;
    let (total_transactions, total_revenue): (i64, f64) =
        sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(total), 0) FROM sale_transactions")
            .fetch_one(pool)
            .await?;
    Ok(SalesSummary {
        total_items,
        total_stock,
        total_transactions,
        total_revenue,
    })
}

/// Fetch a transaction or surface NotFound
pub async fn get_with_lines(pool: &SqlitePool, id: &str) -> RepoResult<TransactionWithLines> {
    find_with_lines(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Transaction {id}")))
}
