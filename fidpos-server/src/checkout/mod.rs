//! Checkout orchestrator
//!
//! Turns a cart into a durable, stock-consistent sale transaction:
//! validates the cart, deducts stock and appends the transaction in one
//! atomic SQLite transaction, emits a best-effort receipt, and hands
//! non-cash sales to the payment gateway for asynchronous settlement.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::models::{PaymentMethod, PaymentStatus, SaleTransaction, TransactionWithLines};
use crate::db::repository::item::{self, DeductRequest, DeductedLine, RejectedLine};
use crate::db::repository::transaction::{self, NewTransaction};
use crate::payment::{GatewayError, PaymentGateway};
use crate::receipt::{ReceiptDelivery, ReceiptService};
use crate::utils::now_millis;

/// One requested cart line
#[derive(Debug, Clone, Deserialize)]
pub struct CartLine {
    pub barcode: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Checkout input
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub cart: Vec<CartLine>,
    #[serde(default = "default_method")]
    pub method: PaymentMethod,
    /// Required for M-Pesa settlement
    pub phone: Option<String>,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Empty cart input; no side effects
    #[error("cart is empty")]
    EmptyCart,

    /// Every line was rejected (unknown barcodes / nothing in stock);
    /// no side effects
    #[error("no cart line could be fulfilled")]
    NothingFulfillable,

    /// Commit failed; the stock deduction was rolled back
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Gateway hand-off result, reported in the checkout response.
///
/// A failed hand-off never fails the checkout and never changes the
/// transaction status; the attempt can be retried via the payment API.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PaymentHandoff {
    Initiated {
        checkout_request_id: String,
        customer_message: Option<String>,
    },
    Failed {
        kind: &'static str,
        message: String,
    },
}

/// What a checkout produced
#[derive(Debug, Serialize)]
pub struct CheckoutOutcome {
    pub transaction: TransactionWithLines,
    /// Accepted lines with requested vs actually-sold quantities
    pub fulfilled: Vec<DeductedLine>,
    /// Skipped lines with reasons
    pub rejected: Vec<RejectedLine>,
    /// How the receipt was delivered, if it could be delivered at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt: Option<ReceiptDelivery>,
    /// Present for non-cash checkouts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentHandoff>,
}

/// Checkout orchestrator service
pub struct CheckoutService {
    pool: SqlitePool,
    receipts: Arc<ReceiptService>,
    gateway: Arc<dyn PaymentGateway>,
    /// Serializes the deduct-and-persist critical section across
    /// concurrent checkouts; two requests for the last unit of an item
    /// resolve so at most one takes it
    ledger_lock: tokio::sync::Mutex<()>,
    /// Serializes attempt registration against concurrent retries through
    /// the payment API, so eligibility is checked before the gateway is
    /// contacted. Shared with the payment initiation handler.
    attempt_lock: Arc<tokio::sync::Mutex<()>>,
}

impl CheckoutService {
    pub fn new(
        pool: SqlitePool,
        receipts: Arc<ReceiptService>,
        gateway: Arc<dyn PaymentGateway>,
        attempt_lock: Arc<tokio::sync::Mutex<()>>,
    ) -> Self {
        Self {
            pool,
            receipts,
            gateway,
            ledger_lock: tokio::sync::Mutex::new(()),
            attempt_lock,
        }
    }

    /// Run one checkout.
    ///
    /// Stock deduction and the transaction append commit as one unit: a
    /// failure after deduction rolls the deduction back before the error
    /// is surfaced.
    #[instrument(skip(self, request), fields(lines = request.cart.len(), method = ?request.method))]
    pub async fn checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        if request.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let requests: Vec<DeductRequest> = request
            .cart
            .iter()
            .map(|line| DeductRequest {
                barcode: line.barcode.clone(),
                quantity: line.quantity,
            })
            .collect();

        let now = now_millis();
        let id = Uuid::new_v4().to_string();
        let (status, paid_at) = match request.method {
            PaymentMethod::Cash => (PaymentStatus::CashSettled, Some(now)),
            PaymentMethod::Mpesa => (PaymentStatus::AwaitingPayment, None),
        };

        let (fulfilled, lines, rejected) = {
            let _guard = self.ledger_lock.lock().await;

            let mut db_tx = self
                .pool
                .begin()
                .await
                .map_err(|e| CheckoutError::Persistence(e.to_string()))?;

            let (accepted, rejected) = item::reserve_and_deduct(&mut db_tx, &requests)
                .await
                .map_err(|e| CheckoutError::Persistence(e.to_string()))?;

            if accepted.is_empty() {
                // Nothing deducted; the open transaction has no effects
                drop(db_tx);
                return Err(CheckoutError::NothingFulfillable);
            }

            let total: f64 = accepted.iter().map(|l| l.line_total).sum();
            let new_tx = NewTransaction {
                id: id.clone(),
                total,
                status,
                payment_method: Some(request.method),
                created_at: now,
                paid_at,
            };

            // Rollback on failure restores every deduction (compensation)
            let lines = match transaction::insert_with_lines(&mut db_tx, &new_tx, &accepted).await {
                Ok(lines) => lines,
                Err(e) => {
                    warn!(error = %e, "Transaction append failed, rolling back deduction");
                    let _ = db_tx.rollback().await;
                    return Err(CheckoutError::Persistence(e.to_string()));
                }
            };

            db_tx
                .commit()
                .await
                .map_err(|e| CheckoutError::Persistence(e.to_string()))?;

            (accepted, lines, rejected)
        };

        // The sale is durably committed from here on; everything below
        // works from the data already in hand so no read failure can
        // surface an error for a sale that went through.
        let total: f64 = fulfilled.iter().map(|l| l.line_total).sum();
        let mut recorded = SaleTransaction {
            id: id.clone(),
            total,
            status,
            payment_method: Some(request.method),
            checkout_request_id: None,
            merchant_request_id: None,
            account_reference: None,
            attempt_registered_at: None,
            payer_phone: None,
            settled_amount: None,
            failure_reason: None,
            created_at: now,
            paid_at,
        };

        info!(
            transaction_id = %id,
            total,
            fulfilled = fulfilled.len(),
            rejected = rejected.len(),
            "Checkout recorded"
        );

        // Best-effort receipt; failures are logged, never fatal
        let receipt = match self.receipts.emit(&recorded, &lines).await {
            Ok(delivery) => Some(delivery),
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "Receipt emission failed");
                None
            }
        };

        // Asynchronous settlement hand-off for non-cash methods
        let payment = match request.method {
            PaymentMethod::Cash => None,
            PaymentMethod::Mpesa => {
                let phone = request.phone.as_deref().unwrap_or_default();
                Some(self.hand_off_payment(&mut recorded, phone).await)
            }
        };

        Ok(CheckoutOutcome {
            transaction: TransactionWithLines {
                transaction: recorded,
                lines,
            },
            fulfilled,
            rejected,
            receipt,
            payment,
        })
    }

    /// Initiate settlement and record the attempt reference.
    ///
    /// Eligibility is confirmed under the attempt lock before the gateway
    /// is contacted, so a concurrent retry cannot prompt the customer's
    /// phone and then fail to register. On success the attempt fields are
    /// written back onto `row` so the caller's view matches the stored
    /// record. Gateway failures leave the transaction AWAITING_PAYMENT
    /// with no active attempt, so a retry through the payment API stays
    /// possible.
    async fn hand_off_payment(&self, row: &mut SaleTransaction, phone: &str) -> PaymentHandoff {
        if phone.is_empty() {
            return PaymentHandoff::Failed {
                kind: "MISSING_PHONE",
                message: "phone number required for M-Pesa settlement".into(),
            };
        }

        let _guard = self.attempt_lock.lock().await;

        // Mirror of the register_attempt guard, checked before any STK
        // push goes out
        match transaction::find_by_id(&self.pool, &row.id).await {
            Ok(Some(current)) if attempt_allowed(&current) => {}
            Ok(_) => {
                return PaymentHandoff::Failed {
                    kind: "ATTEMPT_CONFLICT",
                    message: "an active payment attempt already exists".into(),
                };
            }
            Err(e) => {
                warn!(transaction_id = %row.id, error = %e, "Attempt eligibility check failed");
                return PaymentHandoff::Failed {
                    kind: "PERSISTENCE_FAILURE",
                    message: e.to_string(),
                };
            }
        }

        match self.gateway.initiate(&row.id, phone, row.total).await {
            Ok(attempt) => {
                let registered = transaction::register_attempt(
                    &self.pool,
                    &row.id,
                    &attempt.checkout_request_id,
                    attempt.merchant_request_id.as_deref(),
                    &attempt.account_reference,
                )
                .await;
                match registered {
                    Ok(true) => {
                        row.status = PaymentStatus::AwaitingPayment;
                        row.checkout_request_id = Some(attempt.checkout_request_id.clone());
                        row.merchant_request_id = attempt.merchant_request_id.clone();
                        row.account_reference = Some(attempt.account_reference.clone());
                        row.attempt_registered_at = Some(now_millis());
                        row.failure_reason = None;
                        PaymentHandoff::Initiated {
                            checkout_request_id: attempt.checkout_request_id,
                            customer_message: attempt.customer_message,
                        }
                    }
                    Ok(false) => PaymentHandoff::Failed {
                        kind: "ATTEMPT_CONFLICT",
                        message: "an active payment attempt already exists".into(),
                    },
                    Err(e) => {
                        warn!(transaction_id = %row.id, error = %e, "Attempt registration failed");
                        PaymentHandoff::Failed {
                            kind: "PERSISTENCE_FAILURE",
                            message: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                warn!(transaction_id = %row.id, error = %e, "Payment initiation failed");
                let kind = match &e {
                    GatewayError::Auth(_) => "GATEWAY_AUTH_FAILURE",
                    GatewayError::Unreachable(_) => "GATEWAY_UNREACHABLE",
                    GatewayError::Rejected(_) => "GATEWAY_REJECTED",
                };
                PaymentHandoff::Failed {
                    kind,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// A new attempt may be registered when the previous one failed, or when
/// the transaction awaits payment without an active attempt reference
pub fn attempt_allowed(tx: &SaleTransaction) -> bool {
    matches!(tx.status, PaymentStatus::PaymentFailed)
        || (matches!(tx.status, PaymentStatus::AwaitingPayment)
            && tx.checkout_request_id.is_none())
}
