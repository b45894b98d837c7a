//! Error types for P2P networking

use thiserror::Error;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("Connection error: {0}")]
    Connection(#[from] iroh::endpoint::ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid peer address: {0}")]
    InvalidAddress(String),

    #[error("Endpoint bind failed: {0}")]
    Bind(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Relay closed: {0}")]
    RelayClosed(String),
}
