//! Core module: configuration, shared state, server, background tasks

pub mod config;
pub mod server;
pub mod state;
pub mod tasks;

pub use config::{Config, MpesaConfig, PrinterConfig, PrinterMode};
pub use server::Server;
pub use state::ServerState;
pub use tasks::{BackgroundTasks, TaskKind};
