//! FidPOS Server - checkout and payment reconciliation backend
//!
//! # Architecture
//!
//! - **Inventory ledger** (`db`): SQLite catalog with atomic stock
//!   deduction inside the checkout transaction
//! - **Checkout** (`checkout`): cart orchestration with partial
//!   fulfillment and compensation on persistence failure
//! - **Payments** (`payment`): M-Pesa STK push gateway adapter plus an
//!   idempotent callback reconciler
//! - **Receipts** (`receipt`): ESC/POS and plain-text rendering with a
//!   guaranteed file fallback
//! - **HTTP API** (`api`): RESTful endpoints and the gateway callback
//!
//! # Module layout
//!
//! ```text
//! fidpos-server/src/
//! ├── core/          # config, state, server, background tasks
//! ├── api/           # HTTP routes and handlers
//! ├── checkout/      # checkout orchestrator
//! ├── payment/       # gateway adapter, callback parsing, reconciler
//! ├── receipt/       # rendering and delivery
//! ├── db/            # pool, models, repositories
//! └── utils/         # errors, logging, time
//! ```

pub mod api;
pub mod checkout;
pub mod core;
pub mod db;
pub mod payment;
pub mod receipt;
pub mod utils;

// Re-export common types
pub use checkout::{CheckoutOutcome, CheckoutService};
pub use core::{Config, Server, ServerState};
pub use payment::{PaymentGateway, Reconciler, StkCallback};
pub use receipt::ReceiptService;
pub use utils::{AppError, AppResponse, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
