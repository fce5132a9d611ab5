// ── Core error types ──
//
// Caller-facing errors from xplink-core. Transport details stay in
// `xplink_api::Error`; the `From` impl below translates them into
// domain-appropriate variants. Contract violations (writing a read-only
// dataref, referencing an unknown path) get their own variants and are
// never silently swallowed.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("not connected to the simulator")]
    NotConnected,

    #[error("cannot connect to simulator: {reason}")]
    ConnectionFailed { reason: String },

    #[error("request timed out")]
    Timeout,

    // ── Contract violations ──────────────────────────────────────────
    #[error("unknown path: {path}")]
    UnknownPath { path: String },

    #[error("malformed path: {path}")]
    InvalidPath { path: String },

    #[error("dataref {path} is not writable")]
    NotWritable { path: String },

    #[error("no value to write for {path}")]
    NoValue { path: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("metadata unavailable: {reason}")]
    MetadataUnavailable { reason: String },

    #[error("unexpected value shape for {path}: {reason}")]
    ValueShape { path: String, reason: String },

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code, when the failure came from the REST surface.
        status: Option<u16>,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<xplink_api::Error> for CoreError {
    fn from(err: xplink_api::Error) -> Self {
        match err {
            xplink_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            xplink_api::Error::Rest { message, status } => CoreError::Api {
                message,
                status: Some(status),
            },
            xplink_api::Error::BeaconTimeout { .. } => CoreError::Timeout,
            xplink_api::Error::WebSocketConnect(reason)
            | xplink_api::Error::WebSocket(reason) => CoreError::ConnectionFailed { reason },
            xplink_api::Error::WebSocketClosed => CoreError::NotConnected,
            xplink_api::Error::BeaconDecode { reason } => CoreError::Internal(format!(
                "beacon decode failure escaped the monitor: {reason}"
            )),
            xplink_api::Error::BeaconVersionUnsupported {
                major,
                minor,
                host_id,
            } => CoreError::ConnectionFailed {
                reason: format!("beacon version not supported: {major}.{minor} (host id {host_id})"),
            },
            xplink_api::Error::Socket(e) => CoreError::ConnectionFailed {
                reason: e.to_string(),
            },
            xplink_api::Error::InvalidUrl(e) => CoreError::Internal(format!("invalid URL: {e}")),
            xplink_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("deserialization error: {message}"))
            }
        }
    }
}
