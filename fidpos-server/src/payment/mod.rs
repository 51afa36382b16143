//! Payment settlement: gateway adapter and reconciler
//!
//! Checkout hands a transaction to the [`gateway`] for asynchronous
//! settlement (M-Pesa STK push). The provider later reports the outcome on
//! a callback endpoint; the [`reconciler`] maps that event onto a status
//! transition, idempotently.

pub mod callback;
pub mod gateway;
pub mod reconciler;

pub use callback::{StkCallback, verify_signature};
pub use gateway::{GatewayError, MpesaGateway, PaymentAttempt, PaymentGateway};
pub use reconciler::{ReconcileOutcome, Reconciler};
