//! Payment reconciliation: idempotent settlement from gateway callbacks

mod common;

use fidpos_server::checkout::{CartLine, CheckoutRequest};
use fidpos_server::db::models::{PaymentMethod, PaymentStatus, SaleTransaction};
use fidpos_server::db::repository::transaction;
use fidpos_server::payment::{ReconcileOutcome, StkCallback};
use fidpos_server::utils::now_millis;

async fn mpesa_checkout(ctx: &common::TestCtx, barcode: &str, qty: i64) -> SaleTransaction {
    ctx.state
        .checkout
        .checkout(CheckoutRequest {
            cart: vec![CartLine {
                barcode: barcode.into(),
                quantity: qty,
            }],
            method: PaymentMethod::Mpesa,
            phone: Some("254712345678".into()),
        })
        .await
        .unwrap()
        .transaction
        .transaction
}

async fn reload(ctx: &common::TestCtx, id: &str) -> SaleTransaction {
    transaction::get_with_lines(ctx.state.pool(), id)
        .await
        .unwrap()
        .transaction
}

#[tokio::test]
async fn success_callback_settles_the_transaction() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 2).await;
    let reference = tx.checkout_request_id.clone().unwrap();

    let event = StkCallback::parse(&common::success_callback(&reference, 100.0, "254712345678"));
    let outcome = ctx.state.reconciler.apply(event).await;
    assert!(matches!(outcome, ReconcileOutcome::Settled));

    let settled = reload(&ctx, &tx.id).await;
    assert_eq!(settled.status, PaymentStatus::Paid);
    assert_eq!(settled.settled_amount, Some(100.0));
    assert_eq!(settled.payer_phone.as_deref(), Some("254712345678"));
    assert!(settled.paid_at.is_some());
}

#[tokio::test]
async fn duplicate_callback_is_a_noop() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 2).await;
    let reference = tx.checkout_request_id.clone().unwrap();
    let body = common::success_callback(&reference, 100.0, "254712345678");

    let first = ctx.state.reconciler.apply(StkCallback::parse(&body)).await;
    assert!(matches!(first, ReconcileOutcome::Settled));
    let paid_at = reload(&ctx, &tx.id).await.paid_at;

    // Replay: recognized but nothing changes, including the timestamp
    let second = ctx.state.reconciler.apply(StkCallback::parse(&body)).await;
    assert!(matches!(second, ReconcileOutcome::Duplicate));
    let after = reload(&ctx, &tx.id).await;
    assert_eq!(after.status, PaymentStatus::Paid);
    assert_eq!(after.paid_at, paid_at);
}

#[tokio::test]
async fn failure_callback_marks_failed_and_retry_opens_new_attempt() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 2).await;
    let reference = tx.checkout_request_id.clone().unwrap();

    let event = StkCallback::parse(&common::failure_callback(
        &reference,
        1032,
        "Request cancelled by user",
    ));
    let outcome = ctx.state.reconciler.apply(event).await;
    assert!(matches!(outcome, ReconcileOutcome::MarkedFailed));

    let failed = reload(&ctx, &tx.id).await;
    assert_eq!(failed.status, PaymentStatus::PaymentFailed);
    assert_eq!(
        failed.failure_reason.as_deref(),
        Some("Request cancelled by user")
    );

    // A failed transaction accepts a fresh attempt with a new reference
    let attempt = ctx
        .state
        .gateway
        .initiate(&tx.id, "254712345678", tx.total)
        .await
        .unwrap();
    let registered = transaction::register_attempt(
        ctx.state.pool(),
        &tx.id,
        &attempt.checkout_request_id,
        attempt.merchant_request_id.as_deref(),
        &attempt.account_reference,
    )
    .await
    .unwrap();
    assert!(registered);

    let retried = reload(&ctx, &tx.id).await;
    assert_eq!(retried.status, PaymentStatus::AwaitingPayment);
    assert_eq!(
        retried.checkout_request_id.as_deref(),
        Some(attempt.checkout_request_id.as_str())
    );
    assert_ne!(attempt.checkout_request_id, reference);
}

#[tokio::test]
async fn unmatched_reference_changes_nothing() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 1).await;

    let event = StkCallback::parse(&common::success_callback(
        "ws_CO_never_issued",
        50.0,
        "254700000000",
    ));
    let outcome = ctx.state.reconciler.apply(event).await;
    assert!(matches!(outcome, ReconcileOutcome::Unmatched));

    let after = reload(&ctx, &tx.id).await;
    assert_eq!(after.status, PaymentStatus::AwaitingPayment);
}

#[tokio::test]
async fn success_callback_without_metadata_fails_the_attempt() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 1).await;
    let reference = tx.checkout_request_id.clone().unwrap();

    // ResultCode 0 but no CallbackMetadata: cannot be trusted as settlement
    let body = serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "mr_test",
                "CheckoutRequestID": reference,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully."
            }
        }
    })
    .to_string();

    let outcome = ctx
        .state
        .reconciler
        .apply(StkCallback::parse(body.as_bytes()))
        .await;
    assert!(matches!(outcome, ReconcileOutcome::MarkedFailed));
    assert_eq!(reload(&ctx, &tx.id).await.status, PaymentStatus::PaymentFailed);
}

#[tokio::test]
async fn malformed_callback_is_ignored() {
    let ctx = common::setup().await;

    let outcome = ctx
        .state
        .reconciler
        .apply(StkCallback::parse(b"not json at all"))
        .await;
    assert!(matches!(outcome, ReconcileOutcome::Ignored));
}

#[tokio::test]
async fn retried_attempt_gets_a_fresh_expiry_window() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 1).await;

    // Age the original attempt well past a 300s window
    let stale = now_millis() - 400_000;
    sqlx::query(
        "UPDATE sale_transactions SET created_at = ?, attempt_registered_at = ? WHERE id = ?",
    )
    .bind(stale)
    .bind(stale)
    .bind(&tx.id)
    .execute(ctx.state.pool())
    .await
    .unwrap();

    let cutoff = now_millis() - 300_000;
    let expired = transaction::expire_awaiting(ctx.state.pool(), cutoff).await.unwrap();
    assert_eq!(expired, 1);

    // Retry after expiry: registration stamps a fresh attempt time
    let attempt = ctx
        .state
        .gateway
        .initiate(&tx.id, "254712345678", tx.total)
        .await
        .unwrap();
    let registered = transaction::register_attempt(
        ctx.state.pool(),
        &tx.id,
        &attempt.checkout_request_id,
        attempt.merchant_request_id.as_deref(),
        &attempt.account_reference,
    )
    .await
    .unwrap();
    assert!(registered);

    // The next sweep must not kill the retry just because the original
    // checkout is old
    let expired = transaction::expire_awaiting(ctx.state.pool(), cutoff).await.unwrap();
    assert_eq!(expired, 0);
    let open = reload(&ctx, &tx.id).await;
    assert_eq!(open.status, PaymentStatus::AwaitingPayment);
    assert!(open.attempt_registered_at.unwrap() >= cutoff);

    // The retry's confirmation settles normally
    let event = StkCallback::parse(&common::success_callback(
        &attempt.checkout_request_id,
        50.0,
        "254712345678",
    ));
    let outcome = ctx.state.reconciler.apply(event).await;
    assert!(matches!(outcome, ReconcileOutcome::Settled));
    assert_eq!(reload(&ctx, &tx.id).await.status, PaymentStatus::Paid);
}

#[tokio::test]
async fn expired_attempt_absorbs_late_callback() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    let tx = mpesa_checkout(&ctx, "100", 1).await;
    let reference = tx.checkout_request_id.clone().unwrap();

    // Sweep with a cutoff in the future: the attempt's window has closed
    let expired = transaction::expire_awaiting(ctx.state.pool(), now_millis() + 1_000)
        .await
        .unwrap();
    assert_eq!(expired, 1);
    assert_eq!(
        reload(&ctx, &tx.id).await.status,
        PaymentStatus::PaymentFailed
    );

    // The confirmation arrives too late; the guarded transition rejects it
    let event = StkCallback::parse(&common::success_callback(&reference, 50.0, "254712345678"));
    let outcome = ctx.state.reconciler.apply(event).await;
    assert!(matches!(outcome, ReconcileOutcome::Duplicate));
    assert_eq!(
        reload(&ctx, &tx.id).await.status,
        PaymentStatus::PaymentFailed
    );
}
