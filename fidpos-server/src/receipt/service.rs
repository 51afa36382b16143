//! Receipt delivery with tiered fallback
//!
//! Exactly one physical channel is configured; on any failure (device
//! absent, timeout, connection refused) the rendered receipt falls through
//! to a uniquely named file in the receipts directory.

use std::path::PathBuf;
use std::time::Duration;

use fidpos_printer::{DevicePrinter, NetworkPrinter, PrintError, Printer};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument, warn};

use super::renderer::ReceiptRenderer;
use crate::core::config::{Config, PrinterMode};
use crate::db::models::{SaleLine, SaleTransaction};

#[derive(Debug, Error)]
pub enum ReceiptError {
    /// Even the file fallback failed; the receipt could not be stored
    #[error("Fallback write failed: {0}")]
    Fallback(#[from] std::io::Error),
}

/// The configured output channel
pub enum ReceiptChannel {
    Network(NetworkPrinter),
    Usb(DevicePrinter),
    Bluetooth(DevicePrinter),
    /// No physical printer; every emission goes straight to file
    File,
}

impl ReceiptChannel {
    pub fn name(&self) -> &'static str {
        match self {
            ReceiptChannel::Network(_) => "network",
            ReceiptChannel::Usb(_) => "usb",
            ReceiptChannel::Bluetooth(_) => "bluetooth",
            ReceiptChannel::File => "file",
        }
    }

    async fn print(&self, data: &[u8]) -> Result<(), PrintError> {
        match self {
            ReceiptChannel::Network(p) => p.print(data).await,
            ReceiptChannel::Usb(p) | ReceiptChannel::Bluetooth(p) => p.print(data).await,
            ReceiptChannel::File => Err(PrintError::DeviceMissing("file-only channel".into())),
        }
    }
}

/// How a receipt was delivered
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "channel", rename_all = "snake_case")]
pub enum ReceiptDelivery {
    /// Physical print acknowledged by the channel
    Printed { via: &'static str },
    /// Fallback file path
    Filed { path: PathBuf },
}

/// Receipt output service
pub struct ReceiptService {
    channel: ReceiptChannel,
    renderer: ReceiptRenderer,
    receipts_dir: PathBuf,
}

impl ReceiptService {
    /// Build the service from configuration.
    ///
    /// Channel availability is a construction-time capability check: a bad
    /// printer address or missing device node downgrades to file-only with
    /// a warning instead of failing checkout later.
    pub fn from_config(config: &Config) -> Self {
        let timeout = Duration::from_millis(config.printer.timeout_ms);
        let channel = match config.printer.mode {
            PrinterMode::Network => {
                match NetworkPrinter::from_addr(&config.printer.network_addr) {
                    Ok(p) => ReceiptChannel::Network(p.with_timeout(timeout)),
                    Err(e) => {
                        warn!(error = %e, "Network printer unavailable, using file channel");
                        ReceiptChannel::File
                    }
                }
            }
            PrinterMode::Usb => match DevicePrinter::open(&config.printer.device_path) {
                Ok(p) => ReceiptChannel::Usb(p.with_timeout(timeout)),
                Err(e) => {
                    warn!(error = %e, "USB printer unavailable, using file channel");
                    ReceiptChannel::File
                }
            },
            PrinterMode::Bluetooth => match DevicePrinter::open(&config.printer.device_path) {
                Ok(p) => ReceiptChannel::Bluetooth(p.with_timeout(timeout)),
                Err(e) => {
                    warn!(error = %e, "Bluetooth printer unavailable, using file channel");
                    ReceiptChannel::File
                }
            },
            PrinterMode::File => ReceiptChannel::File,
        };

        let renderer = ReceiptRenderer::new(
            config.printer.width,
            config.timezone,
            config.store_name.clone(),
            config.store_address.clone(),
        );

        Self {
            channel,
            renderer,
            receipts_dir: config.receipts_dir(),
        }
    }

    /// Channel name, for logs and responses
    pub fn channel_name(&self) -> &'static str {
        self.channel.name()
    }

    /// Emit a receipt for a transaction.
    ///
    /// Attempts the configured channel once (bounded by the printer
    /// timeout); any failure falls through to a durable file write. Errors
    /// only if even the file cannot be written.
    #[instrument(skip(self, tx, lines), fields(transaction_id = %tx.id, channel = self.channel.name()))]
    pub async fn emit(
        &self,
        tx: &SaleTransaction,
        lines: &[SaleLine],
    ) -> Result<ReceiptDelivery, ReceiptError> {
        if !matches!(self.channel, ReceiptChannel::File) {
            let data = self.renderer.render_escpos(tx, lines);
            match self.channel.print(&data).await {
                Ok(()) => {
                    info!("Receipt printed");
                    return Ok(ReceiptDelivery::Printed {
                        via: self.channel.name(),
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Print failed, falling back to file");
                }
            }
        }

        let text = self.renderer.render_text(tx, lines);
        let path = self.write_fallback(&tx.id, &text).await?;
        info!(path = %path.display(), "Receipt saved to file");
        Ok(ReceiptDelivery::Filed { path })
    }

    /// Write the receipt to `{transaction_id}_{emission_unix_timestamp}`,
    /// one file per emission attempt.
    async fn write_fallback(&self, transaction_id: &str, text: &str) -> Result<PathBuf, ReceiptError> {
        tokio::fs::create_dir_all(&self.receipts_dir).await?;

        let ts = chrono::Utc::now().timestamp();
        // Bump the timestamp on collision so repeated emissions in the same
        // second each keep their own file
        for bump in 0.. {
            let path = self
                .receipts_dir
                .join(format!("{}_{}", transaction_id, ts + bump));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(mut file) => {
                    file.write_all(text.as_bytes()).await?;
                    file.flush().await?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("fallback loop always returns")
    }
}
