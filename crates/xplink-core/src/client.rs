// ── Client facade ──
//
// `XplaneClient` owns the full lifecycle: beacon discovery, the
// connection monitor, the WebSocket receive loop, the metadata cache,
// and the subscription state. Entities (`Dataref`, `Command`) are thin
// handles over the shared runtime state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock as StdRwLock};

use tokio::sync::{Mutex as TokioMutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use xplink_api::protocol::WsRequestBody;
use xplink_api::rest::{Capabilities, RestClient};
use xplink_api::websocket::WsSink;

use crate::beacon_monitor::BeaconMonitor;
use crate::cache::{MetadataCache, simulator_uptime};
use crate::config::ClientConfig;
use crate::connection::{ConnectionState, connection_monitor_loop};
use crate::dispatcher::Dispatcher;
use crate::entity::{Command, Dataref};
use crate::error::CoreError;
use crate::events::{CallbackRegistry, CommandActive, DatarefUpdate, RequestFeedback};
use crate::model::{CommandMeta, DatarefMeta};
use crate::subscription::SubscriptionManager;

// ── Shared runtime state ─────────────────────────────────────────────

/// State shared between the client facade, its entities, and the three
/// background loops.
pub(crate) struct ClientShared {
    pub(crate) config: ClientConfig,
    pub(crate) cache: MetadataCache,
    pub(crate) subscriptions: SubscriptionManager,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) callbacks: CallbackRegistry,

    state: watch::Sender<ConnectionState>,
    endpoint: StdRwLock<(String, u16)>,
    rest: StdRwLock<Option<Arc<RestClient>>>,
    capabilities: StdRwLock<Option<Capabilities>>,

    ws_sink: TokioMutex<Option<WsSink>>,
    ws_alive: AtomicBool,

    /// Wakes a halted connection monitor when a fresh beacon or
    /// reachability signal arrives.
    pub(crate) retry_notify: Notify,

    cancel: StdRwLock<CancellationToken>,
    tasks: StdMutex<Vec<(&'static str, JoinHandle<()>)>>,
    running: AtomicBool,
}

impl ClientShared {
    fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::NoBeacon);
        let cache = MetadataCache::new(config.min_metadata_reload);
        let subscriptions = SubscriptionManager::new(config.index_history_depth);
        let endpoint = StdRwLock::new((config.host.clone(), config.port));

        Self {
            config,
            cache,
            subscriptions,
            dispatcher: Dispatcher::new(),
            callbacks: CallbackRegistry::new(),
            state,
            endpoint,
            rest: StdRwLock::new(None),
            capabilities: StdRwLock::new(None),
            ws_sink: TokioMutex::new(None),
            ws_alive: AtomicBool::new(false),
            retry_notify: Notify::new(),
            cancel: StdRwLock::new(CancellationToken::new()),
            tasks: StdMutex::new(Vec::new()),
            running: AtomicBool::new(false),
        }
    }

    // ── Connection state ─────────────────────────────────────────────

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn state_rx(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn set_state(&self, next: ConnectionState) {
        let current = *self.state.borrow();
        if current != next {
            info!(from = %current, to = %next, "connection state");
            self.state.send_replace(next);
        }
    }

    // ── Endpoint & REST epoch ────────────────────────────────────────

    pub(crate) fn endpoint(&self) -> (String, u16) {
        match self.endpoint.read() {
            Ok(guard) => guard.clone(),
            Err(_) => (self.config.host.clone(), self.config.port),
        }
    }

    pub(crate) fn set_endpoint(&self, host: String, port: u16) {
        if let Ok(mut guard) = self.endpoint.write() {
            if *guard != (host.clone(), port) {
                info!(host = %host, port, "simulator endpoint updated");
                *guard = (host, port);
            }
        }
    }

    pub(crate) fn install_rest(&self, rest: RestClient) {
        if let Ok(mut guard) = self.rest.write() {
            *guard = Some(Arc::new(rest));
        }
    }

    /// The REST client of the current connection epoch.
    pub(crate) fn rest_client(&self) -> Result<Arc<RestClient>, CoreError> {
        self.rest
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(CoreError::NotConnected)
    }

    pub(crate) fn set_capabilities(&self, caps: Capabilities) {
        if let Ok(mut guard) = self.capabilities.write() {
            *guard = Some(caps);
        }
    }

    pub(crate) fn capabilities(&self) -> Option<Capabilities> {
        self.capabilities.read().ok().and_then(|g| g.clone())
    }

    // ── WebSocket plumbing ───────────────────────────────────────────

    pub(crate) fn ws_alive(&self) -> bool {
        self.ws_alive.load(Ordering::Acquire)
    }

    pub(crate) async fn install_sink(&self, sink: WsSink) {
        *self.ws_sink.lock().await = Some(sink);
        self.ws_alive.store(true, Ordering::Release);
    }

    /// Close and drop the sink; idempotent.
    pub(crate) async fn teardown_ws(&self) {
        self.ws_alive.store(false, Ordering::Release);
        if let Some(mut sink) = self.ws_sink.lock().await.take() {
            if let Err(e) = sink.close().await {
                debug!(error = %e, "closing WebSocket sink");
            }
        }
    }

    /// Receive-loop exit path: tear down, publish the state, notify
    /// close listeners once per established connection.
    pub(crate) async fn on_ws_down(&self) {
        self.teardown_ws().await;
        self.set_state(ConnectionState::WsDisconnected);
        self.callbacks.emit_close();
    }

    /// Tag `body` with a request id and send it as one frame.
    pub(crate) async fn send_request(&self, body: WsRequestBody) -> Result<u64, CoreError> {
        let mut guard = self.ws_sink.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(CoreError::NotConnected);
        };
        let request = self.dispatcher.prepare(body);
        sink.send_json(&request).await?;
        Ok(request.req_id)
    }

    // ── Subscription plumbing ────────────────────────────────────────

    pub(crate) async fn subscribe_datarefs(
        &self,
        targets: &[(Arc<DatarefMeta>, Option<usize>)],
    ) -> Result<(), CoreError> {
        if !self.ws_alive() {
            return Err(CoreError::NotConnected);
        }
        let specs = self.subscriptions.subscribe_datarefs(targets);
        if specs.is_empty() {
            return Ok(());
        }
        self.send_request(WsRequestBody::DatarefSubscribeValues { datarefs: specs })
            .await?;
        Ok(())
    }

    pub(crate) async fn unsubscribe_datarefs(
        &self,
        targets: &[(Arc<DatarefMeta>, Option<usize>)],
    ) -> Result<(), CoreError> {
        if !self.ws_alive() {
            return Err(CoreError::NotConnected);
        }
        let specs = self.subscriptions.unsubscribe_datarefs(targets);
        if specs.is_empty() {
            return Ok(());
        }
        self.send_request(WsRequestBody::DatarefUnsubscribeValues { datarefs: specs })
            .await?;
        Ok(())
    }

    pub(crate) async fn subscribe_commands(
        &self,
        metas: &[Arc<CommandMeta>],
    ) -> Result<(), CoreError> {
        if !self.ws_alive() {
            return Err(CoreError::NotConnected);
        }
        let specs = self.subscriptions.subscribe_commands(metas);
        if specs.is_empty() {
            return Ok(());
        }
        self.send_request(WsRequestBody::CommandSubscribeIsActive { commands: specs })
            .await?;
        Ok(())
    }

    pub(crate) async fn unsubscribe_commands(
        &self,
        metas: &[Arc<CommandMeta>],
    ) -> Result<(), CoreError> {
        if !self.ws_alive() {
            return Err(CoreError::NotConnected);
        }
        let specs = self.subscriptions.unsubscribe_commands(metas);
        if specs.is_empty() {
            return Ok(());
        }
        self.send_request(WsRequestBody::CommandUnsubscribeIsActive { commands: specs })
            .await?;
        Ok(())
    }

    // ── Metadata resolution ──────────────────────────────────────────

    /// Resolve dataref metadata: cache first, then a one-off REST lookup.
    ///
    /// The one-off result is deliberately *not* inserted into the cache:
    /// the cache only ever holds full-table snapshots of one epoch.
    pub(crate) async fn resolve_dataref(&self, path: &str) -> Result<Arc<DatarefMeta>, CoreError> {
        if let Some(meta) = self.cache.dataref_by_name(path) {
            return Ok(meta);
        }
        let rest = self.rest_client()?;
        match rest.find_dataref(path).await? {
            Some(info) => Ok(Arc::new(DatarefMeta::from(info))),
            None => Err(CoreError::UnknownPath {
                path: path.to_string(),
            }),
        }
    }

    pub(crate) async fn resolve_command(&self, path: &str) -> Result<Arc<CommandMeta>, CoreError> {
        if let Some(meta) = self.cache.command_by_name(path) {
            return Ok(meta);
        }
        let rest = self.rest_client()?;
        match rest.find_command(path).await? {
            Some(info) => Ok(Arc::new(CommandMeta::from(info))),
            None => Err(CoreError::UnknownPath {
                path: path.to_string(),
            }),
        }
    }

    // ── Task management ──────────────────────────────────────────────

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        match self.cancel.read() {
            Ok(guard) => guard.clone(),
            Err(_) => CancellationToken::new(),
        }
    }

    fn reset_cancel(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut guard) = self.cancel.write() {
            *guard = token.clone();
        }
        token
    }

    pub(crate) fn spawn_task(
        &self,
        name: &'static str,
        task: impl Future<Output = ()> + Send + 'static,
    ) {
        let handle = tokio::spawn(task);
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push((name, handle));
        }
    }
}

// ── XplaneClient ─────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Create one per simulator, register callbacks, then
/// [`connect`](Self::connect). Connection establishment is asynchronous:
/// the monitor loops keep probing and reconnecting until
/// [`disconnect`](Self::disconnect).
pub struct XplaneClient {
    shared: Arc<ClientShared>,
    beacon: BeaconMonitor,
}

impl XplaneClient {
    pub fn new(config: ClientConfig) -> Self {
        let beacon = BeaconMonitor::new(
            config.beacon_receive_timeout,
            config.beacon_probe_interval,
            config.join_timeout,
        );
        let shared = Arc::new(ClientShared::new(config));

        // Beacon transitions feed the endpoint and wake a halted monitor.
        let weak = Arc::downgrade(&shared);
        beacon.set_callback(move |connected, data, _same_host| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            if connected {
                if let Some(data) = data {
                    shared.set_endpoint(data.host.to_string(), data.port);
                    if shared.state() == ConnectionState::NoBeacon {
                        shared.set_state(ConnectionState::ReceivingBeacon);
                    }
                    shared.retry_notify.notify_waiters();
                }
            } else if !shared.ws_alive() && shared.state() == ConnectionState::ReceivingBeacon {
                shared.set_state(ConnectionState::NoBeacon);
            }
        });

        Self { shared, beacon }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the background loops.
    ///
    /// Returns immediately; watch [`connection_state`](Self::connection_state)
    /// or register an open callback to learn when the WebSocket is up.
    pub async fn connect(&self) -> Result<(), CoreError> {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            debug!("already connected");
            return Ok(());
        }

        let cancel = self.shared.reset_cancel();
        let shared = Arc::clone(&self.shared);
        self.shared
            .spawn_task("connection-monitor", connection_monitor_loop(shared, cancel));

        if self.shared.config.use_beacon {
            self.beacon.start();
        }
        Ok(())
    }

    /// Stop all background loops, close the sockets, and invalidate the
    /// metadata cache.
    ///
    /// Loops that fail to stop within the join timeout are logged as
    /// potential resource leaks; disconnect itself never fails.
    pub async fn disconnect(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            debug!("not connected");
            return;
        }

        self.shared.cancel_token().cancel();
        self.beacon.stop().await;

        let handles: Vec<(&'static str, JoinHandle<()>)> = match self.shared.tasks.lock() {
            Ok(mut tasks) => tasks.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for (name, handle) in handles {
            if tokio::time::timeout(self.shared.config.join_timeout, handle)
                .await
                .is_err()
            {
                warn!(
                    task = name,
                    "did not stop within join timeout, potential resource leak"
                );
            }
        }

        self.shared.teardown_ws().await;
        self.shared.dispatcher.clear();
        self.shared.cache.invalidate();
        self.shared.set_state(ConnectionState::NoBeacon);
        info!("disconnected");
    }

    // ── Entity factories ─────────────────────────────────────────────

    /// Create a dataref handle; `path` may carry an `[index]` suffix.
    pub fn dataref(&self, path: &str) -> Result<Dataref, CoreError> {
        Dataref::new(Arc::clone(&self.shared), path)
    }

    /// Create a command handle.
    pub fn command(&self, path: &str) -> Command {
        Command::new(Arc::clone(&self.shared), path)
    }

    // ── Bulk monitoring ──────────────────────────────────────────────

    /// Start monitoring several datarefs with one bulk wire request per
    /// underlying identifier.
    pub async fn monitor_datarefs(&self, datarefs: &[&Dataref]) -> Result<(), CoreError> {
        let mut targets = Vec::with_capacity(datarefs.len());
        for dataref in datarefs {
            targets.push((dataref.resolve_meta().await?, dataref.index()));
        }
        self.shared.subscribe_datarefs(&targets).await
    }

    /// Stop monitoring several datarefs; mirror of
    /// [`monitor_datarefs`](Self::monitor_datarefs).
    pub async fn unmonitor_datarefs(&self, datarefs: &[&Dataref]) -> Result<(), CoreError> {
        let mut targets = Vec::with_capacity(datarefs.len());
        for dataref in datarefs {
            targets.push((dataref.resolve_meta().await?, dataref.index()));
        }
        self.shared.unsubscribe_datarefs(&targets).await
    }

    // ── Callbacks ────────────────────────────────────────────────────

    pub fn on_open(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.add_open(f);
    }

    pub fn on_close(&self, f: impl Fn() + Send + Sync + 'static) {
        self.shared.callbacks.add_close(f);
    }

    pub fn on_dataref_update(&self, f: impl Fn(&DatarefUpdate) + Send + Sync + 'static) {
        self.shared.callbacks.add_dataref_update(f);
    }

    pub fn on_command_active(&self, f: impl Fn(&CommandActive) + Send + Sync + 'static) {
        self.shared.callbacks.add_command_active(f);
    }

    pub fn on_request_feedback(&self, f: impl Fn(&RequestFeedback) + Send + Sync + 'static) {
        self.shared.callbacks.add_request_feedback(f);
    }

    /// Drop every registered callback.
    pub fn clear_callbacks(&self) {
        self.shared.callbacks.clear();
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Subscribe to connection state transitions.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_rx()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the WebSocket is currently up.
    pub fn is_connected(&self) -> bool {
        self.shared.ws_alive()
    }

    /// The capabilities document of the current connection epoch.
    pub fn capabilities(&self) -> Option<Capabilities> {
        self.shared.capabilities()
    }

    /// Simulator version string as reported by the capabilities document.
    pub fn simulator_version(&self) -> Option<String> {
        self.shared.capabilities().map(|c| c.xplane.version)
    }

    /// Simulator uptime in seconds, fetched live over REST.
    pub async fn simulator_uptime(&self) -> Result<Option<f64>, CoreError> {
        let rest = self.shared.rest_client()?;
        simulator_uptime(&rest).await
    }

    /// Force or request a metadata reload. Returns `true` when a fetch
    /// actually happened (see the cache's uptime-based staleness policy).
    pub async fn reload_metadata(&self, force: bool) -> Result<bool, CoreError> {
        let rest = self.shared.rest_client()?;
        let reloaded = self.shared.cache.reload(&rest, force).await?;
        if reloaded {
            self.shared.subscriptions.rebuild(&self.shared.cache);
        }
        Ok(reloaded)
    }

    /// The beacon monitor, for standalone discovery observation.
    pub fn beacon(&self) -> &BeaconMonitor {
        &self.beacon
    }
}
