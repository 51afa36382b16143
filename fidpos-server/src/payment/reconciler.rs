//! Payment reconciler
//!
//! Maps decoded callback events onto transaction status transitions:
//! `AWAITING_PAYMENT -> PAID | PAYMENT_FAILED`. All transitions are
//! guarded conditional updates, so duplicate or reordered deliveries are
//! acknowledged no-ops and two concurrent callbacks for the same reference
//! settle at most once.

use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use super::callback::StkCallback;
use crate::db::repository::transaction;
use crate::utils::now_millis;

/// What applying a callback did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Transition to PAID applied
    Settled,
    /// Transition to PAYMENT_FAILED applied
    MarkedFailed,
    /// Reference known but transaction already in a terminal state
    Duplicate,
    /// No transaction carries the reference (stale or forged callback)
    Unmatched,
    /// Payload unusable or an internal error was absorbed
    Ignored,
}

/// Applies callback events to the transaction store
#[derive(Clone)]
pub struct Reconciler {
    pool: SqlitePool,
}

impl Reconciler {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply one decoded callback.
    ///
    /// Never errors: callback processing failures are absorbed and logged,
    /// since the external caller only gets a delivery acknowledgment
    /// either way.
    #[instrument(skip(self, event))]
    pub async fn apply(&self, event: StkCallback) -> ReconcileOutcome {
        match event {
            StkCallback::Success {
                checkout_request_id,
                amount,
                phone,
                receipt_number,
            } => {
                let applied = transaction::settle_paid(
                    &self.pool,
                    &checkout_request_id,
                    amount,
                    &phone,
                    now_millis(),
                )
                .await;
                match applied {
                    Ok(true) => {
                        info!(
                            reference = %checkout_request_id,
                            amount,
                            receipt = receipt_number.as_deref().unwrap_or("-"),
                            "Payment settled"
                        );
                        ReconcileOutcome::Settled
                    }
                    Ok(false) => self.classify_noop(&checkout_request_id).await,
                    Err(e) => {
                        warn!(reference = %checkout_request_id, error = %e, "Settle failed");
                        ReconcileOutcome::Ignored
                    }
                }
            }

            StkCallback::Failure {
                checkout_request_id,
                result_code,
                description,
            } => {
                let applied =
                    transaction::settle_failed(&self.pool, &checkout_request_id, &description)
                        .await;
                match applied {
                    Ok(true) => {
                        info!(
                            reference = %checkout_request_id,
                            result_code,
                            reason = %description,
                            "Payment marked failed"
                        );
                        ReconcileOutcome::MarkedFailed
                    }
                    Ok(false) => self.classify_noop(&checkout_request_id).await,
                    Err(e) => {
                        warn!(reference = %checkout_request_id, error = %e, "Mark-failed failed");
                        ReconcileOutcome::Ignored
                    }
                }
            }

            StkCallback::Malformed { reason } => {
                warn!(reason = %reason, "Discarding malformed callback");
                ReconcileOutcome::Ignored
            }
        }
    }

    /// A guarded transition matched nothing: either the reference is
    /// unknown, or the transaction already left AWAITING_PAYMENT.
    async fn classify_noop(&self, checkout_request_id: &str) -> ReconcileOutcome {
        match transaction::exists_by_reference(&self.pool, checkout_request_id).await {
            Ok(true) => {
                info!(reference = %checkout_request_id, "Duplicate callback, already settled");
                ReconcileOutcome::Duplicate
            }
            Ok(false) => {
                warn!(reference = %checkout_request_id, "Callback for unknown reference");
                ReconcileOutcome::Unmatched
            }
            Err(e) => {
                warn!(reference = %checkout_request_id, error = %e, "Reference lookup failed");
                ReconcileOutcome::Ignored
            }
        }
    }
}
