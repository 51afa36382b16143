//! Receipt renderer
//!
//! Renders a sale transaction as receipt text and as ESC/POS bytes for
//! thermal printers.

use chrono_tz::Tz;
use fidpos_printer::{EscPosBuilder, pad_text, text_width};

use crate::db::models::{PaymentMethod, SaleLine, SaleTransaction};
use crate::utils::format_timestamp;

/// Format an amount as Kenyan Shillings, with thousands separators
///
/// `1234.5` -> `"KSh 1,234.50"`
pub fn format_ksh(amount: f64) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("KSh {sign}{grouped}.{frac:02}")
}

/// Receipt renderer
///
/// Produces both a plain-text rendering (used for the durable file
/// fallback) and ESC/POS bytes (used for physical channels).
pub struct ReceiptRenderer {
    width: usize,
    timezone: Tz,
    store_name: String,
    store_address: String,
}

impl ReceiptRenderer {
    /// Create a renderer with the given paper width (columns) and shop info
    pub fn new(width: usize, timezone: Tz, store_name: String, store_address: String) -> Self {
        Self {
            width,
            timezone,
            store_name,
            store_address,
        }
    }

    /// Render the receipt as plain text
    pub fn render_text(&self, tx: &SaleTransaction, lines: &[SaleLine]) -> String {
        let mut out = Vec::new();

        out.push(self.centered(&self.store_name));
        if !self.store_address.is_empty() {
            out.push(self.centered(&self.store_address));
        }
        out.push("-".repeat(self.width));

        for line in lines {
            out.push(line.item_name.clone());
            out.push(self.left_right(
                &format!("  {} x {}", line.quantity, format_ksh(line.price)),
                &format_ksh(line.total),
            ));
        }

        out.push("-".repeat(self.width));
        out.push(self.left_right("TOTAL", &format_ksh(tx.total)));
        if let Some(method) = tx.payment_method {
            let label = match method {
                PaymentMethod::Cash => "Cash",
                PaymentMethod::Mpesa => "M-Pesa",
            };
            out.push(self.left_right("Paid via", label));
        }
        out.push("-".repeat(self.width));

        out.push(format!("Receipt: {}", tx.id));
        out.push(format!(
            "Date: {}",
            format_timestamp(tx.created_at, self.timezone)
        ));
        out.push(String::new());
        out.push(self.centered("Thank you for shopping!"));

        out.join("\n")
    }

    /// Render the receipt as ESC/POS bytes
    pub fn render_escpos(&self, tx: &SaleTransaction, lines: &[SaleLine]) -> Vec<u8> {
        let mut b = EscPosBuilder::new(self.width);

        b.center();
        b.double_size();
        b.bold();
        b.line(&self.store_name);
        b.bold_off();
        b.reset_size();
        if !self.store_address.is_empty() {
            b.line(&self.store_address);
        }
        b.left();
        b.sep_single();

        for line in lines {
            b.line(&line.item_name);
            b.line_lr(
                &format!("  {} x {}", line.quantity, format_ksh(line.price)),
                &format_ksh(line.total),
            );
        }

        b.sep_single();
        b.bold();
        b.line_lr("TOTAL", &format_ksh(tx.total));
        b.bold_off();
        if let Some(method) = tx.payment_method {
            let label = match method {
                PaymentMethod::Cash => "Cash",
                PaymentMethod::Mpesa => "M-Pesa",
            };
            b.line_lr("Paid via", label);
        }
        b.sep_single();

        b.line(&format!("Receipt: {}", tx.id));
        b.line(&format!(
            "Date: {}",
            format_timestamp(tx.created_at, self.timezone)
        ));
        b.newline();
        b.center();
        b.line("Thank you for shopping!");
        b.left();
        b.cut_feed(3);

        b.build()
    }

    fn centered(&self, s: &str) -> String {
        let w = text_width(s);
        if w >= self.width {
            return s.to_string();
        }
        format!("{}{}", " ".repeat((self.width - w) / 2), s)
    }

    fn left_right(&self, left: &str, right: &str) -> String {
        let lw = text_width(left);
        let rw = text_width(right);
        if lw + rw >= self.width {
            return format!("{left} {right}");
        }
        format!("{left}{}", pad_text(right, self.width - lw, true))
    }
}
