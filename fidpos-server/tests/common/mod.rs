//! Shared test support: stub gateway, state bootstrap, seed helpers

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tempfile::TempDir;

use fidpos_server::core::{Config, PrinterMode, ServerState};
use fidpos_server::db::models::{Item, ItemCreate};
use fidpos_server::db::repository::item;
use fidpos_server::payment::{GatewayError, PaymentAttempt, PaymentGateway};

/// In-process gateway double: hands out sequential checkout request ids
/// without any network traffic, and can be switched to fail.
pub struct StubGateway {
    counter: AtomicUsize,
    fail: AtomicBool,
}

impl Default for StubGateway {
    fn default() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

impl StubGateway {
    /// Make every subsequent initiation fail as unreachable
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    /// How many initiations were attempted
    pub fn initiations(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    /// The reference handed out for the n-th initiation (1-based)
    pub fn reference(n: usize) -> String {
        format!("ws_CO_{n:06}")
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initiate(
        &self,
        transaction_id: &str,
        _phone: &str,
        _amount: f64,
    ) -> Result<PaymentAttempt, GatewayError> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail.load(Ordering::SeqCst) {
            return Err(GatewayError::Unreachable("stub offline".into()));
        }
        Ok(PaymentAttempt {
            checkout_request_id: Self::reference(n),
            merchant_request_id: Some(format!("mr_{n:06}")),
            account_reference: format!("FIDPOS-{transaction_id}"),
            customer_message: Some("Success. Request accepted for processing".into()),
        })
    }
}

pub struct TestCtx {
    pub state: ServerState,
    pub gateway: Arc<StubGateway>,
    // Held so the work dir outlives the test
    pub dir: TempDir,
}

/// Fresh server state over a temp work dir, file-only receipts and the
/// stub gateway.
pub async fn setup() -> TestCtx {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = Config::with_overrides(dir.path().to_string_lossy().to_string(), 0);
    config.printer.mode = PrinterMode::File;
    setup_with_config(dir, config).await
}

pub async fn setup_with_config(dir: TempDir, config: Config) -> TestCtx {
    let gateway = Arc::new(StubGateway::default());
    let state = ServerState::initialize_with_gateway(&config, gateway.clone())
        .await
        .expect("state init");
    TestCtx {
        state,
        gateway,
        dir,
    }
}

/// Insert a catalog item and return it
pub async fn seed_item(
    ctx: &TestCtx,
    barcode: &str,
    name: &str,
    price: f64,
    quantity: i64,
) -> Item {
    item::create(
        ctx.state.pool(),
        ItemCreate {
            barcode: barcode.into(),
            name: name.into(),
            price,
            quantity,
            category_id: None,
        },
    )
    .await
    .expect("seed item")
}

/// Current stock level of a barcode
pub async fn stock_of(ctx: &TestCtx, barcode: &str) -> i64 {
    item::find_by_barcode(ctx.state.pool(), barcode)
        .await
        .expect("lookup")
        .expect("item exists")
        .quantity
}

/// Daraja-shaped success callback body
pub fn success_callback(reference: &str, amount: f64, phone: &str) -> Vec<u8> {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "mr_test",
                "CheckoutRequestID": reference,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully.",
                "CallbackMetadata": {
                    "Item": [
                        { "Name": "Amount", "Value": amount },
                        { "Name": "MpesaReceiptNumber", "Value": "RKT12345" },
                        { "Name": "TransactionDate", "Value": 20260829101500_i64 },
                        { "Name": "PhoneNumber", "Value": phone }
                    ]
                }
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// Daraja-shaped failure callback body
pub fn failure_callback(reference: &str, code: i64, desc: &str) -> Vec<u8> {
    serde_json::json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "mr_test",
                "CheckoutRequestID": reference,
                "ResultCode": code,
                "ResultDesc": desc
            }
        }
    })
    .to_string()
    .into_bytes()
}
