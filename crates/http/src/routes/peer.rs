//! Dialing and address routes

use axum::extract::{Path, State};
use peerchat_p2p::{DialOptions, PeerAddress, connection_status};

use crate::{AppState, Result};

/// `GET /relay/{*addr}`: dial the peer and report the connection status.
///
/// Dial failures are reported in the body; only an unparseable address is
/// an HTTP error.
#[tracing::instrument(skip(state))]
pub async fn relay_dial(State(state): State<AppState>, Path(addr): Path<String>) -> Result<String> {
    let peer: PeerAddress = addr.parse()?;
    let options = DialOptions::for_address(&peer);

    match state.node.dial(&peer, &options).await {
        Ok(connection) => Ok(format!("relay.dial.status={}", connection_status(&connection))),
        Err(e) => {
            warn!("Dial to {peer} failed: {e}");
            Ok(format!("relay.dial.fail={e}"))
        }
    }
}

/// `GET /connect/{*addr}`: dial, open a chat stream and register its relay
#[tracing::instrument(skip(state))]
pub async fn connect(State(state): State<AppState>, Path(addr): Path<String>) -> Result<String> {
    let peer: PeerAddress = addr.parse()?;
    let handle = state.node.connect_and_relay(&peer).await?;
    info!("Relay {} registered", handle.key());
    Ok(format!("Connected to peer at {addr}"))
}

/// `GET /addrs`: addresses other peers can dial
pub async fn addrs(State(state): State<AppState>) -> String {
    let mut body = String::from("Listening on:");
    for addr in state.node.listen_addrs().await {
        body.push('\n');
        body.push_str(&addr.to_string());
    }
    body
}
