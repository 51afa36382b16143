//! Printer adapters for sending ESC/POS data
//!
//! Supports:
//! - Network printers (TCP port 9100)
//! - Character-device printers (USB `/dev/usb/lpN`, Bluetooth rfcomm nodes)

use crate::error::{PrintError, PrintResult};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// Trait for printer adapters
#[allow(async_fn_in_trait)]
pub trait Printer {
    /// Send raw ESC/POS data to the printer
    async fn print(&self, data: &[u8]) -> PrintResult<()>;

    /// Check if the printer is online/reachable
    async fn is_online(&self) -> bool;
}

/// Network printer (TCP port 9100)
///
/// Most thermal printers support raw TCP printing on port 9100.
#[derive(Debug, Clone)]
pub struct NetworkPrinter {
    addr: SocketAddr,
    timeout: Duration,
}

impl NetworkPrinter {
    /// Create a new network printer
    pub fn new(host: &str, port: u16) -> PrintResult<Self> {
        Self::from_addr(&format!("{}:{}", host, port))
    }

    /// Create from a socket address string (e.g., "192.168.1.100:9100")
    pub fn from_addr(addr: &str) -> PrintResult<Self> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| PrintError::InvalidConfig(format!("Invalid address: {}", addr)))?;

        Ok(Self {
            addr,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set connection timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the printer address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Printer for NetworkPrinter {
    #[instrument(skip(data), fields(addr = %self.addr, data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let stream = tokio::time::timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| PrintError::Timeout(format!("Connection timeout: {}", self.addr)))?
            .map_err(|e| PrintError::Connection(format!("{}: {}", self.addr, e)))?;

        let mut stream = stream;
        tokio::time::timeout(self.timeout, async {
            stream.write_all(data).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| PrintError::Timeout(format!("Write timeout: {}", self.addr)))??;

        info!("Print job sent");
        Ok(())
    }

    #[instrument(fields(addr = %self.addr))]
    async fn is_online(&self) -> bool {
        let check_timeout = Duration::from_millis(500);

        match tokio::time::timeout(check_timeout, TcpStream::connect(self.addr)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                warn!(error = %e, "Printer offline");
                false
            }
            Err(_) => {
                warn!("Printer check timeout");
                false
            }
        }
    }
}

/// Character-device printer
///
/// Writes raw ESC/POS bytes to a device node. Covers USB line printers
/// (`/dev/usb/lp0`) and Bluetooth printers bound to an rfcomm node
/// (`/dev/rfcomm0`).
///
/// The device node must exist at construction time; a missing node means
/// the backend is not present on this host.
#[derive(Debug, Clone)]
pub struct DevicePrinter {
    path: PathBuf,
    timeout: Duration,
}

impl DevicePrinter {
    /// Open a device printer, checking the device node exists
    pub fn open(path: impl Into<PathBuf>) -> PrintResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(PrintError::DeviceMissing(path.display().to_string()));
        }
        Ok(Self {
            path,
            timeout: Duration::from_secs(5),
        })
    }

    /// Set write timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the device path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Printer for DevicePrinter {
    #[instrument(skip(data), fields(path = %self.path.display(), data_len = data.len()))]
    async fn print(&self, data: &[u8]) -> PrintResult<()> {
        let write = async {
            let mut dev = tokio::fs::OpenOptions::new()
                .write(true)
                .open(&self.path)
                .await?;
            dev.write_all(data).await?;
            dev.flush().await
        };

        tokio::time::timeout(self.timeout, write)
            .await
            .map_err(|_| PrintError::Timeout(format!("Device write timeout: {}", self.path.display())))?
            .map_err(PrintError::Io)?;

        info!("Print job sent");
        Ok(())
    }

    async fn is_online(&self) -> bool {
        self.path.exists()
    }
}
