//! Protocol definitions and constants

/// Chat protocol identifier, used both as the iroh ALPN and as the stream
/// preamble line
pub const CHAT_PROTOCOL: &str = "/Chat/1.0.0";

/// ALPN bytes for [`CHAT_PROTOCOL`]
pub const CHAT_ALPN: &[u8] = CHAT_PROTOCOL.as_bytes();

/// Line terminator of the chat wire convention
pub const LINE_TERMINATOR: u8 = b'\n';

/// Longest line accepted from a peer before the stream is treated as broken
pub const MAX_LINE_LENGTH: usize = 64 * 1024;
