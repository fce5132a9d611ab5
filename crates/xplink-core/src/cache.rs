// ── Metadata cache ──
//
// Bidirectional name <-> identifier tables for datarefs and commands.
// Tables are replaced atomically (arc-swap) so the receive loop and
// application threads always see a consistent snapshot. Staleness is
// measured in *simulator uptime*, not wall clock: a paused simulator
// does not age the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use xplink_api::rest::{RUNNING_TIME_DATAREF, RestClient, supports_command_listing};

use crate::error::CoreError;
use crate::model::{CommandId, CommandMeta, DatarefId, DatarefMeta};

// ── Tables ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MetaTables {
    datarefs_by_name: HashMap<String, Arc<DatarefMeta>>,
    datarefs_by_id: HashMap<DatarefId, Arc<DatarefMeta>>,
    commands_by_name: HashMap<String, Arc<CommandMeta>>,
    commands_by_id: HashMap<CommandId, Arc<CommandMeta>>,
}

// ── MetadataCache ────────────────────────────────────────────────────

/// Name/identifier cache for datarefs and commands.
///
/// Identifiers are only meaningful within one connection epoch; the cache
/// must be reloaded on every (re)connect and whenever the simulator loads
/// a different aircraft. Lookups on an invalidated cache return `None`
/// rather than stale identifiers.
pub struct MetadataCache {
    tables: ArcSwap<MetaTables>,
    valid: AtomicBool,
    last_reload_uptime: Mutex<Option<f64>>,
    min_reload_interval: Duration,
}

impl MetadataCache {
    pub fn new(min_reload_interval: Duration) -> Self {
        Self {
            tables: ArcSwap::from_pointee(MetaTables::default()),
            valid: AtomicBool::new(false),
            last_reload_uptime: Mutex::new(None),
            min_reload_interval,
        }
    }

    // ── Reload ───────────────────────────────────────────────────────

    /// Reload both tables through the REST interface.
    ///
    /// Unless `force` is set, the reload is skipped when less than the
    /// minimum interval of simulator uptime has passed since the previous
    /// one. Returns `true` when a fetch actually happened.
    pub async fn reload(&self, rest: &RestClient, force: bool) -> Result<bool, CoreError> {
        if !force && !self.stale(rest).await {
            return Ok(false);
        }

        let datarefs = rest.list_datarefs().await?;
        let commands = if supports_command_listing(rest.version()) {
            rest.list_commands().await?
        } else {
            Vec::new()
        };

        let dataref_count = datarefs.len();
        let command_count = commands.len();
        self.install(
            datarefs.into_iter().map(DatarefMeta::from).collect(),
            commands.into_iter().map(CommandMeta::from).collect(),
        );

        match simulator_uptime(rest).await {
            Ok(Some(uptime)) => {
                if let Ok(mut last) = self.last_reload_uptime.lock() {
                    *last = Some(uptime);
                }
                info!(
                    datarefs = dataref_count,
                    commands = command_count,
                    uptime_secs = uptime as u64,
                    "metadata caches reloaded"
                );
            }
            _ => {
                warn!(
                    dataref = RUNNING_TIME_DATAREF,
                    "no simulator uptime value; staleness tracking degraded"
                );
                info!(
                    datarefs = dataref_count,
                    commands = command_count,
                    "metadata caches reloaded"
                );
            }
        }

        Ok(true)
    }

    /// Whether enough simulator uptime has passed to justify a reload.
    async fn stale(&self, rest: &RestClient) -> bool {
        let last = match self.last_reload_uptime.lock() {
            Ok(guard) => *guard,
            Err(_) => None,
        };
        let Some(last) = last else {
            return true; // never loaded in this epoch
        };

        match simulator_uptime(rest).await {
            Ok(Some(now)) => {
                let elapsed = now - last;
                if elapsed < self.min_reload_interval.as_secs_f64() {
                    info!(
                        elapsed_secs = elapsed as u64,
                        "metadata caches not reloaded, refreshed too recently"
                    );
                    false
                } else {
                    true
                }
            }
            _ => {
                warn!(
                    dataref = RUNNING_TIME_DATAREF,
                    "no simulator uptime value, reloading anyway"
                );
                true
            }
        }
    }

    /// Replace both tables atomically.
    pub(crate) fn install(&self, datarefs: Vec<DatarefMeta>, commands: Vec<CommandMeta>) {
        let mut tables = MetaTables::default();
        for meta in datarefs {
            let meta = Arc::new(meta);
            tables.datarefs_by_id.insert(meta.id, Arc::clone(&meta));
            tables.datarefs_by_name.insert(meta.name.clone(), meta);
        }
        for meta in commands {
            let meta = Arc::new(meta);
            tables.commands_by_id.insert(meta.id, Arc::clone(&meta));
            tables.commands_by_name.insert(meta.name.clone(), meta);
        }
        self.tables.store(Arc::new(tables));
        self.valid.store(true, Ordering::Release);
    }

    /// Drop all entries *and* mark the epoch dead.
    ///
    /// Distinct from an empty cache: lookups refuse to answer until the
    /// next reload, so identifiers from a torn-down connection are never
    /// dereferenced.
    pub fn invalidate(&self) {
        self.valid.store(false, Ordering::Release);
        self.tables.store(Arc::new(MetaTables::default()));
        if let Ok(mut last) = self.last_reload_uptime.lock() {
            *last = None;
        }
        debug!("metadata caches invalidated");
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn dataref_by_name(&self, name: &str) -> Option<Arc<DatarefMeta>> {
        if !self.is_valid() {
            return None;
        }
        self.tables.load().datarefs_by_name.get(name).cloned()
    }

    pub fn dataref_by_id(&self, id: DatarefId) -> Option<Arc<DatarefMeta>> {
        if !self.is_valid() {
            return None;
        }
        self.tables.load().datarefs_by_id.get(&id).cloned()
    }

    pub fn command_by_name(&self, name: &str) -> Option<Arc<CommandMeta>> {
        if !self.is_valid() {
            return None;
        }
        self.tables.load().commands_by_name.get(name).cloned()
    }

    pub fn command_by_id(&self, id: CommandId) -> Option<Arc<CommandMeta>> {
        if !self.is_valid() {
            return None;
        }
        self.tables.load().commands_by_id.get(&id).cloned()
    }

    pub fn dataref_count(&self) -> usize {
        self.tables.load().datarefs_by_name.len()
    }

    pub fn command_count(&self) -> usize {
        self.tables.load().commands_by_name.len()
    }

    // ── Diagnostics ──────────────────────────────────────────────────

    /// Render `"id(name)"` for log lines, tolerating unknown ids.
    pub fn equiv_dataref(&self, id: DatarefId) -> String {
        match self.dataref_by_id(id) {
            Some(meta) => format!("{id}({})", meta.name),
            None => format!("no equivalence for {id}"),
        }
    }

    /// Render `"id(name)"` for log lines, tolerating unknown ids.
    pub fn equiv_command(&self, id: CommandId) -> String {
        match self.command_by_id(id) {
            Some(meta) => format!("{id}({})", meta.name),
            None => format!("no equivalence for {id}"),
        }
    }
}

// ── Uptime ───────────────────────────────────────────────────────────

/// Fetch the simulator's running time in seconds.
///
/// `None` when the dataref is unknown to the simulator or carries no
/// numeric value; the caller decides how much staleness tracking matters.
pub async fn simulator_uptime(rest: &RestClient) -> Result<Option<f64>, CoreError> {
    let Some(info) = rest.find_dataref(RUNNING_TIME_DATAREF).await? else {
        return Ok(None);
    };
    let raw = rest.dataref_value(info.id).await?;
    Ok(raw.as_f64())
}

// ── Tests ────────────────────────────────────────────────────────────
