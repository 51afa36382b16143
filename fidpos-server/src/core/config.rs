use std::path::PathBuf;
use std::str::FromStr;

use chrono_tz::Tz;

/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Purpose |
/// |----------|---------|---------|
/// | WORK_DIR | /var/lib/fidpos | Working directory (db, receipts, backups, logs) |
/// | HTTP_PORT | 3000 | HTTP API port |
/// | PUBLIC_BASE_URL | http://localhost:3000 | Externally reachable base URL for gateway callbacks |
/// | STORE_TIMEZONE | Africa/Nairobi | Timezone for receipts and gateway timestamps |
/// | STORE_NAME | FidPOS Store | Receipt header |
/// | STORE_ADDRESS | (empty) | Receipt header, second line |
/// | ENVIRONMENT | development | Runtime environment |
/// | PAYMENT_EXPIRY_SECS | 300 | Window before an unconfirmed payment attempt is failed |
/// | BACKUP_INTERVAL_SECS | 86400 | Interval between database backups |
/// | MPESA_CONSUMER_KEY / MPESA_CONSUMER_SECRET | (empty) | Daraja API credentials |
/// | MPESA_SHORTCODE / MPESA_PASSKEY | (empty) | STK push business shortcode and passkey |
/// | MPESA_BASE_URL | https://sandbox.safaricom.co.ke | Daraja API base |
/// | MPESA_CALLBACK_SECRET | (unset) | Shared secret for callback signatures; unset disables verification |
/// | PRINTER_MODE | file | network \| usb \| bluetooth \| file |
/// | PRINTER_ADDR | 127.0.0.1:9100 | Network printer address |
/// | PRINTER_DEVICE | /dev/usb/lp0 | USB / RFCOMM device node |
/// | PRINTER_WIDTH | 32 | Paper width in columns |
/// | PRINTER_TIMEOUT_MS | 5000 | Printer I/O timeout |
///
/// # Example
///
/// ```ignore
/// WORK_DIR=/data/fidpos HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory holding the database, receipts, backups and logs
    pub work_dir: String,
    /// HTTP API port
    pub http_port: u16,
    /// Base URL the gateway can reach us back on
    pub public_base_url: String,
    /// Store timezone (receipt timestamps, gateway password timestamps)
    pub timezone: Tz,
    /// Receipt header
    pub store_name: String,
    /// Receipt header, second line (empty hides it)
    pub store_address: String,
    /// development | staging | production
    pub environment: String,
    /// Seconds before an unconfirmed payment attempt is marked failed
    pub payment_expiry_secs: u64,
    /// Seconds between database backups
    pub backup_interval_secs: u64,
    /// M-Pesa Daraja gateway credentials
    pub mpesa: MpesaConfig,
    /// Receipt printer configuration
    pub printer: PrinterConfig,
}

/// M-Pesa Daraja API credentials and endpoints
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub base_url: String,
    /// Shared secret for HMAC callback signatures; `None` disables the check
    pub callback_secret: Option<String>,
}

/// Receipt printer transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterMode {
    /// TCP raw-socket printer (port 9100 style)
    Network,
    /// USB device node
    Usb,
    /// Paired Bluetooth serial device node
    Bluetooth,
    /// No physical printer; every receipt goes to the fallback directory
    File,
}

impl FromStr for PrinterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "network" => Ok(Self::Network),
            "usb" => Ok(Self::Usb),
            "bluetooth" => Ok(Self::Bluetooth),
            "file" => Ok(Self::File),
            other => Err(format!("unknown printer mode: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PrinterConfig {
    pub mode: PrinterMode,
    pub network_addr: String,
    pub device_path: String,
    /// Paper width in columns (58mm paper is 32)
    pub width: usize,
    pub timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/fidpos".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            timezone: std::env::var("STORE_TIMEZONE")
                .ok()
                .and_then(|tz| tz.parse().ok())
                .unwrap_or(chrono_tz::Africa::Nairobi),
            store_name: std::env::var("STORE_NAME").unwrap_or_else(|_| "FidPOS Store".into()),
            store_address: std::env::var("STORE_ADDRESS").unwrap_or_default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            payment_expiry_secs: std::env::var("PAYMENT_EXPIRY_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            backup_interval_secs: std::env::var("BACKUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86400),
            mpesa: MpesaConfig {
                consumer_key: std::env::var("MPESA_CONSUMER_KEY").unwrap_or_default(),
                consumer_secret: std::env::var("MPESA_CONSUMER_SECRET").unwrap_or_default(),
                shortcode: std::env::var("MPESA_SHORTCODE").unwrap_or_default(),
                passkey: std::env::var("MPESA_PASSKEY").unwrap_or_default(),
                base_url: std::env::var("MPESA_BASE_URL")
                    .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".into()),
                callback_secret: std::env::var("MPESA_CALLBACK_SECRET").ok(),
            },
            printer: PrinterConfig {
                mode: std::env::var("PRINTER_MODE")
                    .ok()
                    .and_then(|m| m.parse().ok())
                    .unwrap_or(PrinterMode::File),
                network_addr: std::env::var("PRINTER_ADDR")
                    .unwrap_or_else(|_| "127.0.0.1:9100".into()),
                device_path: std::env::var("PRINTER_DEVICE")
                    .unwrap_or_else(|_| "/dev/usb/lp0".into()),
                width: std::env::var("PRINTER_WIDTH")
                    .ok()
                    .and_then(|w| w.parse().ok())
                    .unwrap_or(32),
                timeout_ms: std::env::var("PRINTER_TIMEOUT_MS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(5000),
            },
        }
    }

    /// Override work dir and port on top of env defaults.
    ///
    /// Mostly for tests.
    pub fn with_overrides(work_dir: impl Into<String>, http_port: u16) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.http_port = http_port;
        config
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn database_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("database")
    }

    pub fn receipts_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("receipts")
    }

    pub fn backups_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("backups")
    }

    pub fn logs_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    /// Create the working directory tree if missing.
    pub fn ensure_work_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.database_dir())?;
        std::fs::create_dir_all(self.receipts_dir())?;
        std::fs::create_dir_all(self.backups_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printer_mode_parses_case_insensitively() {
        assert_eq!("NETWORK".parse::<PrinterMode>().unwrap(), PrinterMode::Network);
        assert_eq!("file".parse::<PrinterMode>().unwrap(), PrinterMode::File);
        assert!("serial".parse::<PrinterMode>().is_err());
    }

    #[test]
    fn work_dir_layout() {
        let config = Config::with_overrides("/tmp/fidpos-test", 0);
        assert_eq!(config.database_dir(), PathBuf::from("/tmp/fidpos-test/database"));
        assert_eq!(config.receipts_dir(), PathBuf::from("/tmp/fidpos-test/receipts"));
    }
}
