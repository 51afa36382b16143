//! Shared utilities: error types, logging, time helpers

pub mod error;
pub mod logger;
pub mod time;

pub use error::{AppError, AppResponse, AppResult};
pub use time::{format_timestamp, now_millis};
