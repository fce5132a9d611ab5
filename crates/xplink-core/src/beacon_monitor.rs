// ── Beacon monitor ──
//
// Periodically probes the UDP multicast group for the simulator's
// beacon and reports reachability *transitions* to a single registered
// callback. Timeouts while already disconnected stay quiet (past a few
// rate-limited warnings) so an absent simulator does not spam the log.

use std::net::IpAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use xplink_api::Error as ApiError;
use xplink_api::beacon::{BeaconData, BeaconSocket};

/// After this many consecutive "no beacon" warnings, the monitor goes
/// quiet until the beacon is seen again.
const MAX_WARNINGS: u32 = 3;

/// Reachability callback: `(connected, beacon, same_host)`.
pub type BeaconCallback = Box<dyn Fn(bool, Option<&BeaconData>, bool) + Send + Sync>;

/// Monitor lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconStatus {
    NotRunning,
    /// Probing, no beacon currently detected.
    Running,
    /// Beacon detected at regular intervals.
    DetectingBeacon,
}

// ── BeaconMonitor ────────────────────────────────────────────────────

/// Watches the multicast group for the simulator's discovery beacon.
///
/// Cheaply cloneable; `start`/`stop` control one background probe loop
/// bounded by a cancellation token.
#[derive(Clone)]
pub struct BeaconMonitor {
    inner: Arc<BeaconMonitorInner>,
}

struct BeaconMonitorInner {
    receive_timeout: Duration,
    probe_interval: Duration,
    join_timeout: Duration,
    status: watch::Sender<BeaconStatus>,
    data: RwLock<Option<BeaconData>>,
    callback: RwLock<Option<BeaconCallback>>,
    local_ips: Vec<IpAddr>,
    cancel: RwLock<CancellationToken>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BeaconMonitor {
    pub fn new(receive_timeout: Duration, probe_interval: Duration, join_timeout: Duration) -> Self {
        let (status, _) = watch::channel(BeaconStatus::NotRunning);
        Self {
            inner: Arc::new(BeaconMonitorInner {
                receive_timeout,
                probe_interval,
                join_timeout,
                status,
                data: RwLock::new(None),
                callback: RwLock::new(None),
                local_ips: list_local_ips(),
                cancel: RwLock::new(CancellationToken::new()),
                handle: Mutex::new(None),
            }),
        }
    }

    /// Register the reachability callback, replacing any previous one.
    /// Fired on transitions only, never on every timeout.
    pub fn set_callback(&self, f: impl Fn(bool, Option<&BeaconData>, bool) + Send + Sync + 'static) {
        if let Ok(mut callback) = self.inner.callback.write() {
            *callback = Some(Box::new(f));
        }
    }

    pub fn status(&self) -> BeaconStatus {
        *self.inner.status.borrow()
    }

    /// Subscribe to status transitions.
    pub fn status_rx(&self) -> watch::Receiver<BeaconStatus> {
        self.inner.status.subscribe()
    }

    /// The most recent beacon, while one is being detected.
    pub fn data(&self) -> Option<BeaconData> {
        self.inner.data.read().ok().and_then(|guard| guard.clone())
    }

    /// Whether the advertised simulator runs on this machine, judged
    /// against every local interface address.
    pub fn same_host(&self) -> bool {
        self.data()
            .is_some_and(|data| self.inner.local_ips.contains(&data.host))
    }

    /// Start the probe loop. Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let Ok(mut handle) = self.inner.handle.lock() else {
            return;
        };
        if handle.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("beacon monitor already running");
            return;
        }

        let cancel = CancellationToken::new();
        if let Ok(mut guard) = self.inner.cancel.write() {
            *guard = cancel.clone();
        }
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(beacon_loop(inner, cancel)));
        debug!("beacon monitor started");
    }

    /// Stop the probe loop, waiting up to the join timeout.
    pub async fn stop(&self) {
        if let Ok(guard) = self.inner.cancel.read() {
            guard.cancel();
        }
        let handle = match self.inner.handle.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if tokio::time::timeout(self.inner.join_timeout, handle)
                .await
                .is_err()
            {
                warn!("beacon monitor did not stop within join timeout, potential resource leak");
            }
        }
    }
}

impl BeaconMonitorInner {
    fn fire(&self, connected: bool, data: Option<&BeaconData>, same_host: bool) {
        if let Ok(callback) = self.callback.read() {
            if let Some(callback) = callback.as_ref() {
                callback(connected, data, same_host);
            }
        }
    }

    /// Fire the disconnected transition exactly once when leaving
    /// DetectingBeacon; repeated timeouts afterwards stay silent.
    fn leave_detecting(&self) {
        if *self.status.borrow() == BeaconStatus::DetectingBeacon {
            self.status.send_replace(BeaconStatus::Running);
            warn!("beacon lost");
            if let Ok(mut data) = self.data.write() {
                *data = None;
            }
            self.fire(false, None, false);
        }
    }
}

// ── Probe loop ───────────────────────────────────────────────────────

async fn beacon_loop(inner: Arc<BeaconMonitorInner>, cancel: CancellationToken) {
    inner.status.send_replace(BeaconStatus::Running);
    let mut warned: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = probe(&inner) => result,
        };

        match result {
            Ok(data) => {
                warned = 0;
                let same_host = inner.local_ips.contains(&data.host);
                let entering = *inner.status.borrow() != BeaconStatus::DetectingBeacon;
                if let Ok(mut guard) = inner.data.write() {
                    *guard = Some(data.clone());
                }
                if entering {
                    inner.status.send_replace(BeaconStatus::DetectingBeacon);
                    info!(
                        host = %data.host,
                        port = data.port,
                        hostname = %data.hostname,
                        version = data.version,
                        same_host,
                        "beacon detected"
                    );
                    inner.fire(true, Some(&data), same_host);
                }
            }
            Err(ApiError::BeaconTimeout { .. }) => {
                inner.leave_detecting();
                if warned < MAX_WARNINGS {
                    if warned == MAX_WARNINGS - 1 {
                        warn!("no beacon on the network (last warning)");
                    } else {
                        warn!("no beacon on the network, simulator may not be running");
                    }
                    warned += 1;
                }
            }
            Err(ApiError::BeaconVersionUnsupported {
                major,
                minor,
                host_id,
            }) => {
                inner.leave_detecting();
                error!(major, minor, host_id, "beacon version not supported");
            }
            Err(e) => {
                inner.leave_detecting();
                if warned < MAX_WARNINGS {
                    warn!(error = %e, "beacon probe failed");
                    warned += 1;
                }
            }
        }

        // The idle cadence is deliberately longer than the receive window:
        // sockets are opened per probe, and churn helps nobody.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(inner.probe_interval) => {}
        }
    }

    inner.status.send_replace(BeaconStatus::NotRunning);
    if let Ok(mut data) = inner.data.write() {
        *data = None;
    }
    inner.fire(false, None, false);
    debug!("beacon monitor loop stopped");
}

async fn probe(inner: &BeaconMonitorInner) -> Result<BeaconData, ApiError> {
    let socket = BeaconSocket::open()?;
    socket.recv_beacon(inner.receive_timeout).await
}

fn list_local_ips() -> Vec<IpAddr> {
    match local_ip_address::list_afinet_netifas() {
        Ok(interfaces) => interfaces.into_iter().map(|(_, ip)| ip).collect(),
        Err(e) => {
            warn!(error = %e, "could not enumerate local interfaces, same-host detection disabled");
            Vec::new()
        }
    }
}
