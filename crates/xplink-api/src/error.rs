use thiserror::Error;

/// Top-level error type for the `xplink-api` crate.
///
/// Covers every failure mode across the three transports: the UDP
/// discovery beacon, the REST interface, and the WebSocket interface.
/// `xplink-core` maps these into caller-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Beacon ──────────────────────────────────────────────────────
    /// The UDP payload was not a beacon packet (bad magic, truncated
    /// record, malformed hostname).
    #[error("beacon packet malformed: {reason}")]
    BeaconDecode { reason: String },

    /// The packet *was* a beacon, but from a protocol revision or
    /// application this client does not speak.
    #[error("beacon version not supported: {major}.{minor} (host id {host_id})")]
    BeaconVersionUnsupported { major: u8, minor: u8, host_id: i32 },

    /// No beacon packet arrived within the receive window.
    #[error("no beacon received within {timeout_secs}s")]
    BeaconTimeout { timeout_secs: u64 },

    /// Socket-level failure (bind, multicast join, receive).
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, timeout).
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── REST API ────────────────────────────────────────────────────
    /// The simulator answered with a non-success status.
    #[error("REST API error (HTTP {status}): {message}")]
    Rest { message: String, status: u16 },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection (handshake) failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Error on an established WebSocket stream.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The WebSocket was closed by the peer.
    #[error("WebSocket closed")]
    WebSocketClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error the owning monitor
    /// loop should simply retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::BeaconTimeout { .. } | Self::WebSocketConnect(_) | Self::WebSocketClosed => true,
            _ => false,
        }
    }
}
