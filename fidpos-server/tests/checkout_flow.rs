//! Checkout orchestration: validation, partial fulfillment, atomicity

mod common;

use std::sync::Arc;

use fidpos_server::checkout::{CartLine, CheckoutError, CheckoutRequest};
use fidpos_server::db::models::{PaymentMethod, PaymentStatus};
use fidpos_server::db::repository::item::RejectReason;
use fidpos_server::db::repository::transaction;

fn cart(lines: &[(&str, i64)]) -> Vec<CartLine> {
    lines
        .iter()
        .map(|(barcode, quantity)| CartLine {
            barcode: (*barcode).into(),
            quantity: *quantity,
        })
        .collect()
}

fn cash_request(lines: &[(&str, i64)]) -> CheckoutRequest {
    CheckoutRequest {
        cart: cart(lines),
        method: PaymentMethod::Cash,
        phone: None,
    }
}

#[tokio::test]
async fn empty_cart_is_rejected_without_side_effects() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 10).await;

    let err = ctx
        .state
        .checkout
        .checkout(cash_request(&[]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::EmptyCart));

    assert_eq!(common::stock_of(&ctx, "100").await, 10);
    let txs = transaction::find_in_range(ctx.state.pool(), 0, i64::MAX)
        .await
        .unwrap();
    assert!(txs.is_empty());
}

#[tokio::test]
async fn all_lines_unfulfillable_fails_and_deducts_nothing() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 0).await;

    let err = ctx
        .state
        .checkout
        .checkout(cash_request(&[("100", 1), ("no-such-barcode", 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::NothingFulfillable));

    assert_eq!(common::stock_of(&ctx, "100").await, 0);
    let txs = transaction::find_in_range(ctx.state.pool(), 0, i64::MAX)
        .await
        .unwrap();
    assert!(txs.is_empty());
}

#[tokio::test]
async fn partial_fulfillment_caps_at_available_stock() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 3).await;
    common::seed_item(&ctx, "200", "Bread", 60.0, 10).await;

    let outcome = ctx
        .state
        .checkout
        .checkout(cash_request(&[("100", 5), ("200", 2), ("999", 1)]))
        .await
        .unwrap();

    // Soda capped at 3, Bread fully served, unknown barcode rejected
    assert_eq!(outcome.fulfilled.len(), 2);
    let soda = &outcome.fulfilled[0];
    assert_eq!(soda.requested, 5);
    assert_eq!(soda.quantity, 3);
    assert_eq!(outcome.rejected.len(), 1);
    assert!(matches!(
        outcome.rejected[0].reason,
        RejectReason::UnknownBarcode
    ));

    // Total reflects what was actually sold
    assert_eq!(outcome.transaction.transaction.total, 3.0 * 50.0 + 2.0 * 60.0);
    assert_eq!(common::stock_of(&ctx, "100").await, 0);
    assert_eq!(common::stock_of(&ctx, "200").await, 8);
}

#[tokio::test]
async fn cash_checkout_settles_immediately() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;

    let outcome = ctx
        .state
        .checkout
        .checkout(cash_request(&[("100", 2)]))
        .await
        .unwrap();

    let tx = &outcome.transaction.transaction;
    assert_eq!(tx.status, PaymentStatus::CashSettled);
    assert_eq!(tx.payment_method, Some(PaymentMethod::Cash));
    assert!(tx.paid_at.is_some());
    assert!(outcome.payment.is_none());
    // Line snapshot survives independently of the catalog
    assert_eq!(outcome.transaction.lines.len(), 1);
    assert_eq!(outcome.transaction.lines[0].item_name, "Soda");
    assert_eq!(outcome.transaction.lines[0].total, 100.0);
}

#[tokio::test]
async fn checkout_response_matches_the_stored_record() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    common::seed_item(&ctx, "200", "Bread", 60.0, 5).await;

    let outcome = ctx
        .state
        .checkout
        .checkout(cash_request(&[("100", 2), ("200", 1)]))
        .await
        .unwrap();

    // The response is assembled from the data the orchestrator already
    // holds; it must agree with what actually committed, down to the
    // line row ids
    let stored = transaction::get_with_lines(ctx.state.pool(), &outcome.transaction.transaction.id)
        .await
        .unwrap();
    assert_eq!(outcome.transaction.transaction.id, stored.transaction.id);
    assert_eq!(outcome.transaction.transaction.total, stored.transaction.total);
    assert_eq!(outcome.transaction.transaction.status, stored.transaction.status);
    assert_eq!(
        outcome.transaction.transaction.created_at,
        stored.transaction.created_at
    );
    assert_eq!(
        outcome.transaction.transaction.paid_at,
        stored.transaction.paid_at
    );
    assert_eq!(outcome.transaction.lines.len(), stored.lines.len());
    for (got, want) in outcome.transaction.lines.iter().zip(&stored.lines) {
        assert_eq!(got.id, want.id);
        assert_eq!(got.barcode, want.barcode);
        assert_eq!(got.quantity, want.quantity);
        assert_eq!(got.total, want.total);
    }
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 10).await;

    let checkout = ctx.state.checkout.clone();
    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = Arc::clone(&checkout);
        handles.push(tokio::spawn(async move {
            svc.checkout(CheckoutRequest {
                cart: vec![CartLine {
                    barcode: "100".into(),
                    quantity: 3,
                }],
                method: PaymentMethod::Cash,
                phone: None,
            })
            .await
        }));
    }

    let mut sold = 0i64;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => sold += outcome.fulfilled.iter().map(|l| l.quantity).sum::<i64>(),
            Err(CheckoutError::NothingFulfillable) => {}
            Err(e) => panic!("unexpected checkout error: {e}"),
        }
    }

    // Every unit sold exactly once
    assert_eq!(sold, 10);
    assert_eq!(common::stock_of(&ctx, "100").await, 0);
}

#[tokio::test]
async fn persistence_failure_restores_stock() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;

    // Break the transaction store out from under the orchestrator
    sqlx::query("DROP TABLE sale_lines")
        .execute(ctx.state.pool())
        .await
        .unwrap();

    let err = ctx
        .state
        .checkout
        .checkout(cash_request(&[("100", 2)]))
        .await
        .unwrap_err();
    assert!(matches!(err, CheckoutError::Persistence(_)));

    // The deduction was rolled back with the failed append
    assert_eq!(common::stock_of(&ctx, "100").await, 5);
}

#[tokio::test]
async fn mpesa_checkout_awaits_payment_and_registers_attempt() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;

    let outcome = ctx
        .state
        .checkout
        .checkout(CheckoutRequest {
            cart: cart(&[("100", 2)]),
            method: PaymentMethod::Mpesa,
            phone: Some("254712345678".into()),
        })
        .await
        .unwrap();

    let tx = &outcome.transaction.transaction;
    assert_eq!(tx.status, PaymentStatus::AwaitingPayment);
    assert!(tx.paid_at.is_none());
    assert_eq!(
        tx.checkout_request_id.as_deref(),
        Some(common::StubGateway::reference(1).as_str())
    );
    assert!(matches!(
        outcome.payment,
        Some(fidpos_server::checkout::PaymentHandoff::Initiated { .. })
    ));
}

#[tokio::test]
async fn gateway_failure_keeps_checkout_and_allows_retry() {
    let ctx = common::setup().await;
    common::seed_item(&ctx, "100", "Soda", 50.0, 5).await;
    ctx.gateway.set_failing(true);

    let outcome = ctx
        .state
        .checkout
        .checkout(CheckoutRequest {
            cart: cart(&[("100", 1)]),
            method: PaymentMethod::Mpesa,
            phone: Some("254712345678".into()),
        })
        .await
        .unwrap();

    // Checkout succeeded; only the hand-off failed
    let tx = &outcome.transaction.transaction;
    assert_eq!(tx.status, PaymentStatus::AwaitingPayment);
    assert!(tx.checkout_request_id.is_none());
    match outcome.payment {
        Some(fidpos_server::checkout::PaymentHandoff::Failed { kind, .. }) => {
            assert_eq!(kind, "GATEWAY_UNREACHABLE");
        }
        other => panic!("expected failed hand-off, got {other:?}"),
    }
    // Stock stays deducted: the sale is recorded, only settlement is pending
    assert_eq!(common::stock_of(&ctx, "100").await, 4);
}
