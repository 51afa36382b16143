//! # fidpos-printer
//!
//! ESC/POS thermal printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to print:
//! - ESC/POS command building
//! - Column layout for fixed-width receipt paper
//! - Network printing (TCP port 9100)
//! - Character-device printing (USB `/dev/usb/lpN`, Bluetooth rfcomm)
//!
//! Business logic (WHAT to print) stays in application code:
//! - Receipt rendering → fidpos-server
//!
//! ## Example
//!
//! ```ignore
//! use fidpos_printer::{EscPosBuilder, NetworkPrinter, Printer};
//!
//! // Build ESC/POS content
//! let mut builder = EscPosBuilder::new(32);
//! builder.center();
//! builder.double_size();
//! builder.line("FidPOS Store");
//! builder.reset_size();
//! builder.sep_single();
//! builder.left();
//! builder.line_lr("Soap x2", "KSh 160.00");
//! builder.cut_feed(3);
//!
//! // Send to network printer
//! let printer = NetworkPrinter::new("192.168.1.100", 9100)?;
//! printer.print(&builder.build()).await?;
//! ```

mod error;
mod escpos;
mod layout;
mod printer;

// Re-exports
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use layout::{pad_text, text_width, truncate_text};
pub use printer::{DevicePrinter, NetworkPrinter, Printer};
