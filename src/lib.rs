//! InputBridge library root.

pub mod cli;
pub mod config;
pub mod control;
pub mod core;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod web;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use control::{ProcessControl, ShutdownReason};
pub use core::{Delivery, Message, OverflowPolicy, QueueError, QueueStats, RendezvousQueue};
pub use error::{Error, Result};
pub use protocol::McpServer;
pub use web::{create_app_router, AppState};
