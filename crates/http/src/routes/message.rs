//! Broadcast and relay listing routes

use axum::extract::{Path, State};

use crate::AppState;

/// `GET /message/{msg}`: write `msg` to every registered relay.
///
/// Always reports success; per-relay failures only show up in the log.
#[tracing::instrument(skip(state))]
pub async fn send_message(State(state): State<AppState>, Path(msg): Path<String>) -> String {
    let report = state.registry().broadcast(&msg).await;
    info!(
        attempted = report.attempted,
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast message"
    );
    format!("Message sent: {msg}")
}

/// `GET /relays`: registered relay keys in registration order
pub async fn relays(State(state): State<AppState>) -> String {
    state
        .registry()
        .keys()
        .await
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
