// ── Entity handles ──
//
// `Dataref` and `Command` are the two addressable entities of the Web
// API. Handles are cheap: identity plus a pending-write cell. All live
// state (metadata, refcounts, the wire) is shared client runtime, so any
// number of handles for the same path cooperate instead of competing.

use std::sync::{Arc, Mutex};

use tracing::debug;

use xplink_api::protocol::{CommandActivation, DatarefWrite, WsRequestBody};
use xplink_api::rest::ValueType;

use crate::client::ClientShared;
use crate::error::CoreError;
use crate::model::{CommandMeta, DatarefMeta, DatarefValue};

// ── Path parsing ─────────────────────────────────────────────────────

/// Split `sim/some/values[4]` into `("sim/some/values", Some(4))`.
///
/// The bracket suffix never survives parsing: `path` downstream is always
/// the bare dataref name the simulator knows.
fn parse_indexed_path(path: &str) -> Result<(String, Option<usize>), CoreError> {
    let Some(open) = path.find('[') else {
        return Ok((path.to_string(), None));
    };
    let invalid = || CoreError::InvalidPath {
        path: path.to_string(),
    };
    let close = path.rfind(']').ok_or_else(invalid)?;
    if close != path.len() - 1 || close <= open + 1 {
        return Err(invalid());
    }
    let index: usize = path[open + 1..close].parse().map_err(|_| invalid())?;
    Ok((path[..open].to_string(), Some(index)))
}

// ── Dataref ──────────────────────────────────────────────────────────

/// Handle on one simulation variable, or one element of an array-typed
/// variable (`path[index]` syntax).
pub struct Dataref {
    shared: Arc<ClientShared>,
    /// Path as the application wrote it, index suffix included.
    name: String,
    /// Bare path, index suffix stripped.
    path: String,
    index: Option<usize>,
    auto_save: bool,
    pending: Mutex<Option<DatarefValue>>,
}

impl Dataref {
    pub(crate) fn new(shared: Arc<ClientShared>, path: &str) -> Result<Self, CoreError> {
        let (bare, index) = parse_indexed_path(path)?;
        Ok(Self {
            shared,
            name: path.to_string(),
            path: bare,
            index,
            auto_save: false,
            pending: Mutex::new(None),
        })
    }

    /// Write pending values to the simulator as soon as they are set.
    pub fn auto_save(mut self, on: bool) -> Self {
        self.auto_save = on;
        self
    }

    /// Bare dataref path, without any index suffix.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path as written, index suffix included.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub(crate) async fn resolve_meta(&self) -> Result<Arc<DatarefMeta>, CoreError> {
        self.shared.resolve_dataref(&self.path).await
    }

    /// Metadata for this dataref (cached table, or one-off REST lookup).
    pub async fn meta(&self) -> Result<Arc<DatarefMeta>, CoreError> {
        self.resolve_meta().await
    }

    pub async fn is_writable(&self) -> Result<bool, CoreError> {
        Ok(self.resolve_meta().await?.is_writable)
    }

    // ── Value access ─────────────────────────────────────────────────

    /// Current value: the pending write if one is set, otherwise a live
    /// fetch over REST (the WebSocket has no one-shot read).
    pub async fn value(&self) -> Result<DatarefValue, CoreError> {
        if let Some(pending) = self.pending_value() {
            return Ok(pending);
        }

        let meta = self.resolve_meta().await?;
        let rest = self.shared.rest_client()?;
        let raw = rest.dataref_value(meta.id.0).await?;
        let parsed = DatarefValue::parse(meta.kind(), &raw, &self.path)?;

        match (self.index, parsed) {
            (Some(i), DatarefValue::Array(values)) => values
                .get(i)
                .copied()
                .map(DatarefValue::Float)
                .ok_or_else(|| CoreError::ValueShape {
                    path: self.name.clone(),
                    reason: format!("index {i} out of bounds ({} elements)", values.len()),
                }),
            (_, value) => Ok(value),
        }
    }

    /// The locally stored value awaiting a write, if any.
    pub fn pending_value(&self) -> Option<DatarefValue> {
        self.pending.lock().ok().and_then(|guard| guard.clone())
    }

    /// Store a new value locally; with auto-save on, write it through
    /// immediately.
    pub async fn set_value(&self, value: DatarefValue) -> Result<(), CoreError> {
        if let Ok(mut pending) = self.pending.lock() {
            *pending = Some(value);
        }
        if self.auto_save {
            self.write().await?;
        }
        Ok(())
    }

    /// Write the pending value to the simulator.
    ///
    /// Routed over REST when `use_rest` is configured or the WebSocket is
    /// down, over the WebSocket otherwise. Writing a read-only dataref is
    /// a contract violation surfaced as [`CoreError::NotWritable`].
    pub async fn write(&self) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        if !meta.is_writable {
            return Err(CoreError::NotWritable {
                path: self.path.clone(),
            });
        }

        let value = match self.pending_value() {
            Some(value) => value,
            None => {
                let fallback =
                    default_write_value(meta.value_type).ok_or_else(|| CoreError::NoValue {
                        path: self.name.clone(),
                    })?;
                debug!(dataref = %self.name, "no new value to write, using default");
                fallback
            }
        };

        let index = if meta.is_array() { self.index } else { None };
        let wire = value.to_wire();

        if self.shared.config.use_rest || !self.shared.ws_alive() {
            let rest = self.shared.rest_client()?;
            rest.write_dataref_value(meta.id.0, &wire, index).await?;
        } else {
            self.shared
                .send_request(WsRequestBody::DatarefSetValues {
                    datarefs: vec![DatarefWrite {
                        id: meta.id.0,
                        value: wire,
                        index,
                    }],
                })
                .await?;
        }
        Ok(())
    }

    // ── Monitoring ───────────────────────────────────────────────────

    /// Register for pushed value changes.
    ///
    /// Refcounted: only the first interested caller triggers a wire
    /// subscribe; see [`unmonitor`](Self::unmonitor) for the mirror.
    pub async fn monitor(&self) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        self.shared
            .subscribe_datarefs(&[(meta, self.index)])
            .await
    }

    /// Drop interest in pushed value changes; the wire unsubscribe only
    /// happens when the last interested caller leaves.
    pub async fn unmonitor(&self) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        self.shared
            .unsubscribe_datarefs(&[(meta, self.index)])
            .await
    }

    /// Whether anyone currently monitors this target.
    pub fn is_monitored(&self) -> bool {
        let Some(meta) = self.shared.cache.dataref_by_name(&self.path) else {
            return false;
        };
        let element = if meta.is_array() { self.index } else { None };
        self.shared.subscriptions.monitored_count(meta.id, element) > 0
    }
}

/// Default for writes without a pending value, mirroring the simulator's
/// zero values. Arrays have no sensible default: that write is refused.
fn default_write_value(value_type: ValueType) -> Option<DatarefValue> {
    match value_type {
        ValueType::Int => Some(DatarefValue::Int(0)),
        ValueType::Float | ValueType::Double => Some(DatarefValue::Float(0.0)),
        ValueType::Data => Some(DatarefValue::Text(String::new())),
        ValueType::IntArray | ValueType::FloatArray => None,
    }
}

// ── Command ──────────────────────────────────────────────────────────

/// Handle on one triggerable simulator action.
pub struct Command {
    shared: Arc<ClientShared>,
    path: String,
    duration: f64,
}

impl Command {
    pub(crate) fn new(shared: Arc<ClientShared>, path: &str) -> Self {
        Self {
            shared,
            path: path.to_string(),
            duration: 0.0,
        }
    }

    /// Default hold duration for [`execute`](Self::execute).
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) async fn resolve_meta(&self) -> Result<Arc<CommandMeta>, CoreError> {
        self.shared.resolve_command(&self.path).await
    }

    pub async fn meta(&self) -> Result<Arc<CommandMeta>, CoreError> {
        self.resolve_meta().await
    }

    /// Command description as provided by the simulator.
    pub async fn description(&self) -> Result<String, CoreError> {
        Ok(self.resolve_meta().await?.description.clone())
    }

    /// Trigger the command, holding it active for `duration` seconds
    /// (falling back to the handle's default duration).
    pub async fn execute(&self, duration: Option<f64>) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        let duration = duration.unwrap_or(self.duration);

        if self.shared.config.use_rest || !self.shared.ws_alive() {
            let rest = self.shared.rest_client()?;
            rest.activate_command(meta.id.0, duration).await?;
        } else {
            self.shared
                .send_request(WsRequestBody::CommandSetIsActive {
                    commands: vec![CommandActivation {
                        id: meta.id.0,
                        is_active: true,
                        duration: Some(duration),
                    }],
                })
                .await?;
        }
        Ok(())
    }

    /// Register for pushed is-active changes (refcounted like dataref
    /// monitoring).
    pub async fn monitor(&self) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        self.shared.subscribe_commands(&[meta]).await
    }

    /// Drop interest in pushed is-active changes.
    pub async fn unmonitor(&self) -> Result<(), CoreError> {
        let meta = self.resolve_meta().await?;
        self.shared.unsubscribe_commands(&[meta]).await
    }
}

// ── Tests ────────────────────────────────────────────────────────────
