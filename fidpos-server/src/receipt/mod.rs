//! Receipt Output Pipeline
//!
//! Renders a sale transaction into receipt text/ESC-POS and delivers it
//! through the configured channel, falling back to a durable file so the
//! receipt is never lost. Strictly best-effort: the outcome never affects
//! the stored transaction.

mod renderer;
mod service;

pub use renderer::{ReceiptRenderer, format_ksh};
pub use service::{ReceiptChannel, ReceiptDelivery, ReceiptError, ReceiptService};
