//! Application state management

use peerchat_p2p::{ChatNode, RelayRegistry};
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub node: Arc<ChatNode>,
}

impl AppState {
    pub const fn new(node: Arc<ChatNode>) -> Self {
        Self { node }
    }

    #[must_use]
    pub fn registry(&self) -> &RelayRegistry {
        self.node.registry()
    }
}
