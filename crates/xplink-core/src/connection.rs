// ── Connection monitor ──
//
// The reconnect state machine. Owns REST reachability probing, the
// WebSocket open/close lifecycle, version negotiation, and the strictly
// sequential connect procedure: metadata reload, identifier rebuild,
// resubscription. The WebSocket receive loop lives here too, since its
// death is what sends the monitor back to probing.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use xplink_api::protocol::WsRequestBody;
use xplink_api::rest::{Capabilities, RestClient, newest_version};
use xplink_api::websocket::{self, WsEvent, WsSource};

use crate::client::ClientShared;
use crate::error::CoreError;

/// Simulator versions this client is tested against. Outside the range
/// is a warning, never a failure: the client keeps operating with
/// reduced guarantees.
const MIN_SIMULATOR_VERSION: &str = "12.1.4";
const MAX_SIMULATOR_VERSION: &str = "12.2.1";

/// Rate limit for "REST unreachable" warnings.
const UNREACHABLE_WARN_EVERY: u32 = 20;

// ── ConnectionState ──────────────────────────────────────────────────

/// The authoritative connection state, one instance per client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No discovery beacon seen (or discovery disabled and not yet
    /// reachable).
    NoBeacon,
    /// Beacon received, endpoint known, not yet connected.
    ReceivingBeacon,
    /// REST probe succeeded.
    RestReachable,
    /// REST probe failed after having been reachable.
    RestUnreachable,
    /// WebSocket handshake completed.
    WsConnected,
    /// WebSocket dropped; the monitor is going back to probing.
    WsDisconnected,
    /// Receive loop running, waiting for the first frame.
    Listening,
    /// Data is flowing.
    Receiving,
}

impl ConnectionState {
    /// Whether the WebSocket side of the connection is up.
    pub fn is_connected(self) -> bool {
        matches!(self, Self::WsConnected | Self::Listening | Self::Receiving)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NoBeacon => "no beacon",
            Self::ReceivingBeacon => "receiving beacon",
            Self::RestReachable => "REST reachable",
            Self::RestUnreachable => "REST unreachable",
            Self::WsConnected => "WebSocket connected",
            Self::WsDisconnected => "WebSocket disconnected",
            Self::Listening => "listening",
            Self::Receiving => "receiving",
        };
        f.write_str(label)
    }
}

// ── Monitor loop ─────────────────────────────────────────────────────

enum ConnectFailure {
    /// REST probe failed; the simulator is down or not yet serving.
    Unreachable,
    /// REST was up but the WebSocket handshake failed.
    WsOpen(xplink_api::Error),
    /// Connected but the post-open sequence (metadata, resubscribe)
    /// failed; the connection is torn down and retried.
    Setup(CoreError),
}

pub(crate) async fn connection_monitor_loop(shared: Arc<ClientShared>, cancel: CancellationToken) {
    debug!("connection monitor started");
    let mut ws_failures: u32 = 0;
    let mut unreachable_streak: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if shared.ws_alive() {
            // Established; re-check after the monitoring interval. A dead
            // receive loop clears ws_alive and we fall back to probing.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(shared.config.reconnect_interval) => {}
            }
            continue;
        }

        match try_connect(&shared).await {
            Ok(()) => {
                ws_failures = 0;
                unreachable_streak = 0;
                continue;
            }
            Err(ConnectFailure::Unreachable) => {
                unreachable_streak += 1;
                if shared.state().is_connected()
                    || shared.state() == ConnectionState::RestReachable
                    || shared.state() == ConnectionState::WsDisconnected
                {
                    shared.set_state(ConnectionState::RestUnreachable);
                }
                if unreachable_streak % UNREACHABLE_WARN_EVERY == 1 {
                    warn!(
                        attempts = unreachable_streak,
                        "REST API unreachable, simulator may not be running"
                    );
                }
            }
            Err(ConnectFailure::WsOpen(e)) => {
                ws_failures += 1;
                warn!(
                    error = %e,
                    attempt = ws_failures,
                    max = shared.config.max_ws_failures,
                    "WebSocket open failed"
                );
                if ws_failures >= shared.config.max_ws_failures {
                    warn!("too many consecutive WebSocket failures, waiting for a reachability signal");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = shared.retry_notify.notified() => {
                            info!("reachability signal received, resuming connection attempts");
                            ws_failures = 0;
                        }
                    }
                    continue;
                }
            }
            Err(ConnectFailure::Setup(e)) => {
                warn!(error = %e, "connection setup failed, retrying");
                shared.teardown_ws().await;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(shared.config.retry_interval) => {}
        }
    }
    debug!("connection monitor stopped");
}

/// One full connection attempt: probe, negotiate, open, establish.
async fn try_connect(shared: &Arc<ClientShared>) -> Result<(), ConnectFailure> {
    let (host, port) = shared.endpoint();
    let mut rest = RestClient::new(&host, port, shared.config.http_timeout)
        .map_err(|e| ConnectFailure::Setup(e.into()))?;

    if !rest.reachable().await {
        return Err(ConnectFailure::Unreachable);
    }
    shared.set_state(ConnectionState::RestReachable);

    let caps = match rest.capabilities().await {
        Ok(caps) => caps,
        Err(e) => {
            debug!(error = %e, "no capabilities document, assuming the v1 set");
            Capabilities::v1_fallback()
        }
    };
    let version = select_api_version(shared.config.preferred_api_version.as_deref(), &caps);
    rest.set_version(&version);
    warn_if_unsupported(&caps.xplane.version);
    info!(api = %version, simulator = %caps.xplane.version, "API version negotiated");

    let (sink, source) = websocket::connect(&rest.ws_url())
        .await
        .map_err(ConnectFailure::WsOpen)?;
    shared.set_state(ConnectionState::WsConnected);
    shared.install_rest(rest);
    shared.set_capabilities(caps);
    shared.install_sink(sink).await;

    // Strictly sequential: the metadata reload completes before any
    // subscription request referencing freshly reloaded identifiers.
    if let Err(e) = establish(shared).await {
        return Err(ConnectFailure::Setup(e));
    }

    let loop_shared = Arc::clone(shared);
    let loop_cancel = shared.cancel_token();
    shared.spawn_task("ws-receive", ws_receive_loop(loop_shared, source, loop_cancel));

    shared.callbacks.emit_open();
    Ok(())
}

/// Post-open sequence: reload metadata, rebuild the identifier index,
/// re-establish surviving subscriptions.
async fn establish(shared: &Arc<ClientShared>) -> Result<(), CoreError> {
    let rest = shared.rest_client()?;
    shared.cache.reload(&rest, true).await?;
    shared.subscriptions.rebuild(&shared.cache);

    let dataref_specs = shared.subscriptions.resubscribe_specs();
    if !dataref_specs.is_empty() {
        shared
            .send_request(WsRequestBody::DatarefSubscribeValues {
                datarefs: dataref_specs,
            })
            .await?;
    }
    let command_specs = shared.subscriptions.resubscribe_command_specs();
    if !command_specs.is_empty() {
        shared
            .send_request(WsRequestBody::CommandSubscribeIsActive {
                commands: command_specs,
            })
            .await?;
    }
    Ok(())
}

// ── Receive loop ─────────────────────────────────────────────────────

/// Reads frames until cancellation or connection loss.
///
/// The receive timeout is short while waiting for the first frame and
/// longer once data flows, so an idle steady state does not busy-poll.
pub(crate) async fn ws_receive_loop(
    shared: Arc<ClientShared>,
    mut source: WsSource,
    cancel: CancellationToken,
) {
    shared.set_state(ConnectionState::Listening);
    let mut timeout = shared.config.searching_receive_timeout;
    let mut received_any = false;
    let mut idle_cycles: u64 = 0;

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = source.next_event(timeout) => event,
        };

        match event {
            Ok(WsEvent::Message(message)) => {
                if !received_any {
                    received_any = true;
                    timeout = shared.config.steady_receive_timeout;
                    shared.set_state(ConnectionState::Receiving);
                    info!("first WebSocket frame received");
                }
                shared.dispatcher.dispatch(
                    message,
                    &shared.cache,
                    &shared.subscriptions,
                    &shared.callbacks,
                );
            }
            Ok(WsEvent::Timeout) => {
                idle_cycles += 1;
                if idle_cycles % 50 == 0 {
                    debug!(idle_cycles, "waiting for data from the simulator");
                }
            }
            Ok(WsEvent::Closed) => {
                warn!("WebSocket closed by the simulator");
                break;
            }
            Err(e) => {
                warn!(error = %e, "WebSocket receive failed");
                break;
            }
        }
    }

    shared.on_ws_down().await;
    debug!("WebSocket receive loop stopped");
}

// ── Version negotiation ──────────────────────────────────────────────

fn select_api_version(preferred: Option<&str>, caps: &Capabilities) -> String {
    if let Some(preferred) = preferred {
        if caps.api.versions.iter().any(|v| v == preferred) {
            return preferred.to_string();
        }
        warn!(
            preferred,
            offered = ?caps.api.versions,
            "preferred API version not offered, falling back to newest"
        );
    }
    newest_version(&caps.api.versions).unwrap_or_else(|| "v1".to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionCheck {
    Below,
    Within,
    Above,
}

/// Dotted version strings compared numerically, segment by segment;
/// suffixes like `-r1` become trailing segments.
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn check_range(version: &str) -> VersionCheck {
    let key = version_key(version);
    if key < version_key(MIN_SIMULATOR_VERSION) {
        VersionCheck::Below
    } else if key > version_key(MAX_SIMULATOR_VERSION) {
        VersionCheck::Above
    } else {
        VersionCheck::Within
    }
}

fn warn_if_unsupported(version: &str) {
    match check_range(version) {
        VersionCheck::Below => warn!(
            version,
            min = MIN_SIMULATOR_VERSION,
            "simulator older than the supported range, some features may not work"
        ),
        VersionCheck::Above => warn!(
            version,
            max = MAX_SIMULATOR_VERSION,
            "simulator newer than the tested range, some features may not work"
        ),
        VersionCheck::Within => {
            info!(version, "simulator version within the supported range");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use xplink_api::rest::{ApiInfo, SimulatorInfo};

    fn caps(versions: &[&str]) -> Capabilities {
        Capabilities {
            api: ApiInfo {
                versions: versions.iter().map(|s| (*s).to_string()).collect(),
            },
            xplane: SimulatorInfo {
                version: "12.1.4".into(),
            },
        }
    }

    #[test]
    fn version_range_check_is_numeric() {
        assert_eq!(check_range("12.1.3"), VersionCheck::Below);
        assert_eq!(check_range("12.1.4"), VersionCheck::Within);
        assert_eq!(check_range("12.2.0"), VersionCheck::Within);
        assert_eq!(check_range("12.2.1"), VersionCheck::Within);
        assert_eq!(check_range("12.3.0"), VersionCheck::Above);
        // release suffixes sort after the base version
        assert_eq!(check_range("12.2.0-r1"), VersionCheck::Within);
    }

    #[test]
    fn preferred_version_wins_when_offered() {
        assert_eq!(
            select_api_version(Some("v1"), &caps(&["v1", "v2"])),
            "v1"
        );
    }

    #[test]
    fn missing_preference_falls_back_to_newest() {
        assert_eq!(select_api_version(None, &caps(&["v1", "v2"])), "v2");
        assert_eq!(
            select_api_version(Some("v3"), &caps(&["v1", "v2"])),
            "v2"
        );
    }

    #[test]
    fn connected_states() {
        assert!(ConnectionState::Receiving.is_connected());
        assert!(ConnectionState::Listening.is_connected());
        assert!(!ConnectionState::RestReachable.is_connected());
        assert!(!ConnectionState::NoBeacon.is_connected());
    }
}
