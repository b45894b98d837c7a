//! HTTP gateway for the chat node
//!
//! Thin text/plain routes that dial peers, register relays and broadcast
//! messages through a shared [`peerchat_p2p::ChatNode`].

#[macro_use]
extern crate tracing;

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{GatewayError, Result};
pub use server::HttpServer;
pub use state::AppState;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

/// Build the gateway router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/relay/{*addr}", get(routes::peer::relay_dial))
        .route("/connect/{*addr}", get(routes::peer::connect))
        .route("/addrs", get(routes::peer::addrs))
        .route("/message/{msg}", get(routes::message::send_message))
        .route("/relays", get(routes::message::relays))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
