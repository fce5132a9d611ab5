// ── Runtime client configuration ──
//
// Describes *how* to reach a simulator and how aggressively to retry.
// The embedding application constructs a `ClientConfig` and hands it to
// `XplaneClient::new`; the core never reads config files.

use std::time::Duration;

/// Configuration for one simulator client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Simulator host. Overwritten by beacon discovery when
    /// [`use_beacon`](Self::use_beacon) is on.
    pub host: String,
    /// Web API port (X-Plane default 8086).
    pub port: u16,
    /// Preferred API version segment (e.g. `"v2"`). `None` negotiates the
    /// newest version advertised by the capabilities document.
    pub preferred_api_version: Option<String>,
    /// Listen for the UDP discovery beacon and follow the endpoint it
    /// advertises.
    pub use_beacon: bool,
    /// Route writes and command activations through REST even while the
    /// WebSocket is up.
    pub use_rest: bool,

    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Cadence for re-checking an established connection.
    pub reconnect_interval: Duration,
    /// Cadence between connection attempts while disconnected.
    pub retry_interval: Duration,
    /// Consecutive WebSocket open failures before the monitor stops
    /// attempting until a fresh beacon/reachability signal.
    pub max_ws_failures: u32,

    /// Single beacon receive window.
    pub beacon_receive_timeout: Duration,
    /// Pause between beacon probes; kept longer than the receive window to
    /// avoid needless socket churn.
    pub beacon_probe_interval: Duration,

    /// Minimum *simulator uptime* between metadata reloads.
    pub min_metadata_reload: Duration,
    /// Retained index-set generations per array dataref.
    pub index_history_depth: usize,

    /// WebSocket receive timeout while waiting for the first frame.
    pub searching_receive_timeout: Duration,
    /// WebSocket receive timeout once data is flowing.
    pub steady_receive_timeout: Duration,

    /// How long to wait for each background loop to stop on disconnect.
    pub join_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8086,
            preferred_api_version: None,
            use_beacon: false,
            use_rest: false,
            http_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(1),
            max_ws_failures: 5,
            beacon_receive_timeout: Duration::from_secs(3),
            beacon_probe_interval: Duration::from_secs(10),
            min_metadata_reload: Duration::from_secs(10),
            index_history_depth: 3,
            searching_receive_timeout: Duration::from_secs(1),
            steady_receive_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    /// Convenience constructor for a fixed endpoint.
    pub fn for_endpoint(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }
}
