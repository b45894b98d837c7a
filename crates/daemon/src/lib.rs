//! peerchat daemon: configuration, logging and startup for a chat node
//! with its HTTP gateway

pub mod config;
pub mod daemon;
pub mod error;
pub mod identity;
pub mod logging;

pub use config::{CliOverrides, Settings};
pub use daemon::Daemon;
pub use error::{DaemonError, Result};
