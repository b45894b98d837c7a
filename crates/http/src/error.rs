//! Gateway error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use peerchat_p2p::P2PError;
use thiserror::Error;

/// Errors surfaced by the gateway routes
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The path did not hold a usable peer address
    #[error("{0}")]
    InvalidAddress(String),

    /// Dialing or opening the stream failed
    #[error("{0}")]
    Connect(String),
}

impl From<P2PError> for GatewayError {
    fn from(err: P2PError) -> Self {
        match err {
            P2PError::InvalidAddress(msg) => Self::InvalidAddress(msg),
            other => Self::Connect(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        warn!("Gateway request failed: {self}");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to connect: {self}"),
        )
            .into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_error_renders_as_plain_500() {
        let response = GatewayError::from(P2PError::InvalidAddress("bad id".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"Failed to connect: bad id");
    }

    #[test]
    fn test_non_address_errors_map_to_connect() {
        let err = GatewayError::from(P2PError::Timeout("dialing x".into()));
        assert!(matches!(err, GatewayError::Connect(_)));
    }
}
