//! Database row models and DTOs

use serde::{Deserialize, Serialize};

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CategoryCreate {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub barcode: String,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    pub category_id: Option<i64>,
    pub created_at: i64,
}

/// Item joined with its category name, for listings
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ItemWithCategory {
    pub id: i64,
    pub barcode: String,
    pub name: String,
    pub price: f64,
    pub quantity: i64,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct ItemCreate {
    pub barcode: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub quantity: i64,
    pub category_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ItemUpdate {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub category_id: Option<i64>,
}

// =============================================================================
// Sale transactions
// =============================================================================

/// Payment lifecycle of a sale transaction
///
/// `OPEN` is the initial state; `AWAITING_PAYMENT` is OPEN with an
/// asynchronous settlement pending. `CASH_SETTLED`, `PAID` and
/// `PAYMENT_FAILED` are terminal for one reconciliation pass
/// (a failed payment may be retried with a new attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Open,
    CashSettled,
    AwaitingPayment,
    Paid,
    PaymentFailed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Open => "OPEN",
            PaymentStatus::CashSettled => "CASH_SETTLED",
            PaymentStatus::AwaitingPayment => "AWAITING_PAYMENT",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::PaymentFailed => "PAYMENT_FAILED",
        }
    }

    /// Terminal states cannot transition further without a new attempt
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::CashSettled | PaymentStatus::Paid | PaymentStatus::PaymentFailed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Mpesa,
}

/// Durable record of one checkout (aggregate root)
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SaleTransaction {
    pub id: String,
    pub total: f64,
    pub status: PaymentStatus,
    pub payment_method: Option<PaymentMethod>,
    /// External reference of the current payment attempt (gateway-issued)
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub account_reference: Option<String>,
    /// When the current attempt was registered; the expiry window for
    /// AWAITING_PAYMENT is measured from here, falling back to `created_at`
    pub attempt_registered_at: Option<i64>,
    pub payer_phone: Option<String>,
    pub settled_amount: Option<f64>,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub paid_at: Option<i64>,
}

/// Immutable record of one item sold within a transaction
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SaleLine {
    pub id: i64,
    pub transaction_id: String,
    pub barcode: String,
    pub item_name: String,
    pub price: f64,
    pub quantity: i64,
    pub total: f64,
    pub sold_at: i64,
}

/// Transaction with its line snapshots
#[derive(Debug, Clone, Serialize)]
pub struct TransactionWithLines {
    #[serde(flatten)]
    pub transaction: SaleTransaction,
    pub lines: Vec<SaleLine>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        assert_eq!(PaymentStatus::AwaitingPayment.as_str(), "AWAITING_PAYMENT");
        assert_eq!(
            serde_json::to_string(&PaymentStatus::CashSettled).unwrap(),
            "\"CASH_SETTLED\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(!PaymentStatus::Open.is_terminal());
        assert!(!PaymentStatus::AwaitingPayment.is_terminal());
        assert!(PaymentStatus::Paid.is_terminal());
        assert!(PaymentStatus::PaymentFailed.is_terminal());
        assert!(PaymentStatus::CashSettled.is_terminal());
    }
}
