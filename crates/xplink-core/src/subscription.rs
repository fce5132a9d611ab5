// ── Subscription manager ──
//
// Translates {dataref -> desired indices} into minimal bulk wire
// requests, owns the per-identifier refcounts, and reconciles inbound
// array payloads against possibly-stale index assumptions.
//
// All state lives behind one mutex per entity kind: subscribe and
// unsubscribe are called from application threads while route_update is
// called from the receive loop, and reconciliation depends on reading an
// index-set snapshot and its history without tearing.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use xplink_api::protocol::{CommandSpec, DatarefSpec};
use xplink_api::rest::ValueType;

use crate::cache::MetadataCache;
use crate::model::{CommandId, CommandMeta, DatarefId, DatarefMeta, DatarefValue, ValueKind};

// ── Entries ──────────────────────────────────────────────────────────

/// Wire-subscription state for one dataref identifier.
///
/// `counts` holds one refcount per subscribed element (`None` = whole
/// value); `indices` is the index set the simulator currently serves,
/// `history` the retained previous generations, newest last.
struct DatarefSubscription {
    name: String,
    value_type: ValueType,
    counts: HashMap<Option<usize>, usize>,
    indices: Vec<usize>,
    history: VecDeque<Vec<usize>>,
}

impl DatarefSubscription {
    fn new(meta: &DatarefMeta) -> Self {
        Self {
            name: meta.name.clone(),
            value_type: meta.value_type,
            counts: HashMap::new(),
            indices: Vec::new(),
            history: VecDeque::new(),
        }
    }

    /// Push the current index set into history before changing it.
    fn save_history(&mut self, depth: usize) {
        if self.indices.is_empty() {
            return;
        }
        self.history.push_back(self.indices.clone());
        while self.history.len() > depth {
            self.history.pop_front();
        }
    }
}

struct CommandSubscription {
    name: String,
    count: usize,
}

// ── Routing outcome ──────────────────────────────────────────────────

/// Where one inbound `dataref_update_values` entry should go.
#[derive(Debug, PartialEq)]
pub(crate) enum UpdateRouting {
    /// Scalar dataref, or an array subscribed in full: deliver the raw
    /// payload under the dataref's own name.
    Whole { name: String, kind: ValueKind },
    /// Array elements, already paired with their indices.
    Elements {
        name: String,
        pairs: Vec<(usize, DatarefValue)>,
    },
    /// Length mismatch no retained generation could resolve; the update
    /// is lost, which is tolerated -- duplication is not.
    Dropped,
    /// No subscription for this identifier (typically a frame for an id
    /// from before a resubscription, arriving late).
    Unknown,
}

// ── SubscriptionManager ──────────────────────────────────────────────

pub(crate) struct SubscriptionManager {
    history_depth: usize,
    datarefs: Mutex<HashMap<DatarefId, DatarefSubscription>>,
    commands: Mutex<HashMap<CommandId, CommandSubscription>>,
}

impl SubscriptionManager {
    pub(crate) fn new(history_depth: usize) -> Self {
        Self {
            history_depth,
            datarefs: Mutex::new(HashMap::new()),
            commands: Mutex::new(HashMap::new()),
        }
    }

    // ── Dataref subscribe / unsubscribe ──────────────────────────────

    /// Register interest in a batch of datarefs.
    ///
    /// Only 0->1 refcount transitions produce wire traffic. Array element
    /// requests for the same identifier are folded into one spec carrying
    /// the batch's distinct indices.
    pub(crate) fn subscribe_datarefs(
        &self,
        targets: &[(Arc<DatarefMeta>, Option<usize>)],
    ) -> Vec<DatarefSpec> {
        let Ok(mut table) = self.datarefs.lock() else {
            return Vec::new();
        };

        let mut new_whole: Vec<DatarefId> = Vec::new();
        let mut new_indices: BTreeMap<DatarefId, Vec<usize>> = BTreeMap::new();

        for (meta, index) in targets {
            let element = normalize_element(meta, *index);
            let entry = table
                .entry(meta.id)
                .or_insert_with(|| DatarefSubscription::new(meta));
            let count = entry.counts.entry(element).or_insert(0);
            *count += 1;
            if *count > 1 {
                debug!(
                    dataref = %display_name(&meta.name, element),
                    count = *count,
                    "already monitored, no wire subscribe"
                );
                continue;
            }
            match element {
                Some(i) => new_indices.entry(meta.id).or_default().push(i),
                None => {
                    if !new_whole.contains(&meta.id) {
                        new_whole.push(meta.id);
                    }
                }
            }
        }

        let mut specs: Vec<DatarefSpec> = new_whole
            .into_iter()
            .map(|id| DatarefSpec {
                id: id.0,
                index: None,
            })
            .collect();

        for (id, mut batch) in new_indices {
            if let Some(entry) = table.get_mut(&id) {
                entry.save_history(self.history_depth);
                for i in &batch {
                    if !entry.indices.contains(i) {
                        entry.indices.push(*i);
                    }
                }
                entry.indices.sort_unstable();
            }
            batch.sort_unstable();
            batch.dedup();
            specs.push(DatarefSpec {
                id: id.0,
                index: Some(batch),
            });
        }

        specs
    }

    /// Drop interest in a batch of datarefs; mirror image of subscribe.
    ///
    /// An identifier whose index set empties (and has no whole-value
    /// subscribers left) gets one whole-identifier unsubscribe.
    pub(crate) fn unsubscribe_datarefs(
        &self,
        targets: &[(Arc<DatarefMeta>, Option<usize>)],
    ) -> Vec<DatarefSpec> {
        let Ok(mut table) = self.datarefs.lock() else {
            return Vec::new();
        };

        let mut gone_whole: Vec<DatarefId> = Vec::new();
        let mut gone_indices: BTreeMap<DatarefId, Vec<usize>> = BTreeMap::new();

        for (meta, index) in targets {
            let element = normalize_element(meta, *index);
            let Some(entry) = table.get_mut(&meta.id) else {
                warn!(dataref = %meta.name, "not monitored, nothing to remove");
                continue;
            };
            let Some(count) = entry.counts.get_mut(&element) else {
                warn!(
                    dataref = %display_name(&meta.name, element),
                    "not monitored, nothing to remove"
                );
                continue;
            };
            *count -= 1;
            if *count > 0 {
                debug!(
                    dataref = %display_name(&meta.name, element),
                    count = *count,
                    "still monitored elsewhere, no wire unsubscribe"
                );
                continue;
            }
            entry.counts.remove(&element);
            match element {
                Some(i) => gone_indices.entry(meta.id).or_default().push(i),
                None => {
                    if !gone_whole.contains(&meta.id) {
                        gone_whole.push(meta.id);
                    }
                }
            }
        }

        let mut specs: Vec<DatarefSpec> = Vec::new();

        for id in gone_whole {
            let now_empty = table.get(&id).is_some_and(|entry| entry.counts.is_empty());
            if now_empty {
                table.remove(&id);
            }
            specs.push(DatarefSpec {
                id: id.0,
                index: None,
            });
        }

        for (id, mut batch) in gone_indices {
            let now_empty = {
                let Some(entry) = table.get_mut(&id) else {
                    continue;
                };
                entry.save_history(self.history_depth);
                entry.indices.retain(|i| !batch.contains(i));
                entry.indices.is_empty() && entry.counts.is_empty()
            };

            if now_empty {
                table.remove(&id);
                specs.push(DatarefSpec {
                    id: id.0,
                    index: None,
                });
            } else {
                batch.sort_unstable();
                batch.dedup();
                specs.push(DatarefSpec {
                    id: id.0,
                    index: Some(batch),
                });
            }
        }

        specs
    }

    /// Current refcount for one subscription target.
    pub(crate) fn monitored_count(&self, id: DatarefId, element: Option<usize>) -> usize {
        self.datarefs
            .lock()
            .ok()
            .and_then(|table| {
                table
                    .get(&id)
                    .and_then(|entry| entry.counts.get(&element).copied())
            })
            .unwrap_or(0)
    }

    // ── Command subscribe / unsubscribe ──────────────────────────────

    pub(crate) fn subscribe_commands(&self, metas: &[Arc<CommandMeta>]) -> Vec<CommandSpec> {
        let Ok(mut table) = self.commands.lock() else {
            return Vec::new();
        };
        let mut specs = Vec::new();
        for meta in metas {
            let entry = table.entry(meta.id).or_insert_with(|| CommandSubscription {
                name: meta.name.clone(),
                count: 0,
            });
            entry.count += 1;
            if entry.count == 1 {
                specs.push(CommandSpec { id: meta.id.0 });
            }
        }
        specs
    }

    pub(crate) fn unsubscribe_commands(&self, metas: &[Arc<CommandMeta>]) -> Vec<CommandSpec> {
        let Ok(mut table) = self.commands.lock() else {
            return Vec::new();
        };
        let mut specs = Vec::new();
        for meta in metas {
            let Some(entry) = table.get_mut(&meta.id) else {
                warn!(command = %meta.name, "not monitored, nothing to remove");
                continue;
            };
            entry.count -= 1;
            if entry.count == 0 {
                table.remove(&meta.id);
                specs.push(CommandSpec { id: meta.id.0 });
            }
        }
        specs
    }

    // ── Reconnect support ────────────────────────────────────────────

    /// Re-key every entry by the identifiers in a freshly reloaded cache.
    ///
    /// Identifiers change across connection epochs and aircraft loads;
    /// names are the stable key. Entries whose name vanished are dropped
    /// with a warning.
    pub(crate) fn rebuild(&self, cache: &MetadataCache) {
        if let Ok(mut table) = self.datarefs.lock() {
            let old: Vec<(DatarefId, DatarefSubscription)> = table.drain().collect();
            for (old_id, mut entry) in old {
                match cache.dataref_by_name(&entry.name) {
                    Some(meta) => {
                        if meta.id != old_id {
                            debug!(dataref = %entry.name, old = %old_id, new = %meta.id, "dataref id changed");
                        }
                        entry.value_type = meta.value_type;
                        table.insert(meta.id, entry);
                    }
                    None => {
                        warn!(dataref = %entry.name, "dropped from simulator, subscription discarded");
                    }
                }
            }
        }
        if let Ok(mut table) = self.commands.lock() {
            let old: Vec<(CommandId, CommandSubscription)> = table.drain().collect();
            for (_, entry) in old {
                match cache.command_by_name(&entry.name) {
                    Some(meta) => {
                        table.insert(meta.id, entry);
                    }
                    None => {
                        warn!(command = %entry.name, "dropped from simulator, subscription discarded");
                    }
                }
            }
        }
    }

    /// Wire specs re-establishing every live dataref subscription.
    pub(crate) fn resubscribe_specs(&self) -> Vec<DatarefSpec> {
        let Ok(table) = self.datarefs.lock() else {
            return Vec::new();
        };
        let mut specs: Vec<DatarefSpec> = table
            .iter()
            .map(|(id, entry)| {
                if entry.counts.contains_key(&None) || entry.indices.is_empty() {
                    DatarefSpec {
                        id: id.0,
                        index: None,
                    }
                } else {
                    DatarefSpec {
                        id: id.0,
                        index: Some(entry.indices.clone()),
                    }
                }
            })
            .collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    /// Wire specs re-establishing every live command subscription.
    pub(crate) fn resubscribe_command_specs(&self) -> Vec<CommandSpec> {
        let Ok(table) = self.commands.lock() else {
            return Vec::new();
        };
        let mut specs: Vec<CommandSpec> =
            table.keys().map(|id| CommandSpec { id: id.0 }).collect();
        specs.sort_by_key(|s| s.id);
        specs
    }

    // ── Inbound reconciliation ───────────────────────────────────────

    /// Pair one inbound payload with the index set it was built against.
    ///
    /// A payload whose length does not match the current index set is
    /// checked against all retained generations, most recent first: a
    /// resubscription may be in flight and the simulator's frame built
    /// against the set from just before the change.
    pub(crate) fn route_update(&self, id: DatarefId, value: &serde_json::Value) -> UpdateRouting {
        let Ok(table) = self.datarefs.lock() else {
            return UpdateRouting::Unknown;
        };
        let Some(entry) = table.get(&id) else {
            return UpdateRouting::Unknown;
        };

        if entry.indices.is_empty() {
            return UpdateRouting::Whole {
                name: entry.name.clone(),
                kind: ValueKind::from(entry.value_type),
            };
        }

        let Some(values) = value.as_array() else {
            warn!(dataref = %entry.name, value = %value, "array dataref payload is not a list");
            return UpdateRouting::Dropped;
        };

        let indices = if values.len() == entry.indices.len() {
            &entry.indices
        } else {
            match entry
                .history
                .iter()
                .rev()
                .find(|generation| generation.len() == values.len())
            {
                Some(generation) => {
                    warn!(
                        dataref = %entry.name,
                        payload_len = values.len(),
                        current_len = entry.indices.len(),
                        "size mismatch, matched a previously requested index set"
                    );
                    generation
                }
                None => {
                    warn!(
                        dataref = %entry.name,
                        payload_len = values.len(),
                        current_len = entry.indices.len(),
                        "size mismatch with no matching generation, update dropped"
                    );
                    return UpdateRouting::Dropped;
                }
            }
        };

        let mut pairs = Vec::with_capacity(values.len());
        for (index, raw) in indices.iter().zip(values) {
            let Some(parsed) = DatarefValue::parse_element(entry.value_type, raw) else {
                warn!(dataref = %entry.name, value = %raw, "non-numeric array element, update dropped");
                return UpdateRouting::Dropped;
            };
            pairs.push((*index, parsed));
        }

        UpdateRouting::Elements {
            name: entry.name.clone(),
            pairs,
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// Element key for the refcount table. An index on a non-array dataref
/// falls back to whole-value monitoring rather than failing the batch.
fn normalize_element(meta: &DatarefMeta, index: Option<usize>) -> Option<usize> {
    if meta.is_array() {
        index
    } else {
        if index.is_some() {
            warn!(dataref = %meta.name, "index on non-array dataref, monitoring whole value");
        }
        None
    }
}

fn display_name(name: &str, element: Option<usize>) -> String {
    match element {
        Some(i) => format!("{name}[{i}]"),
        None => name.to_string(),
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn scalar_meta(id: u64, name: &str) -> Arc<DatarefMeta> {
        Arc::new(DatarefMeta {
            name: name.into(),
            id: DatarefId(id),
            value_type: ValueType::Float,
            is_writable: true,
        })
    }

    fn array_meta(id: u64, name: &str) -> Arc<DatarefMeta> {
        Arc::new(DatarefMeta {
            name: name.into(),
            id: DatarefId(id),
            value_type: ValueType::FloatArray,
            is_writable: true,
        })
    }

    fn manager() -> SubscriptionManager {
        SubscriptionManager::new(3)
    }

    // Exactly one wire subscribe on 0->1 and one unsubscribe on N->0,
    // regardless of how many independent callers monitor the same path.
    #[test]
    fn shared_scalar_subscription_counts_references() {
        let subs = manager();
        let meta = scalar_meta(7, "sim/x");

        let first = subs.subscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert_eq!(
            first,
            vec![DatarefSpec {
                id: 7,
                index: None
            }]
        );

        // second independent caller: no wire traffic
        let second = subs.subscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert!(second.is_empty());
        assert_eq!(subs.monitored_count(DatarefId(7), None), 2);

        // first unmonitor leaves the wire subscription active
        let partial = subs.unsubscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert!(partial.is_empty());
        assert_eq!(subs.monitored_count(DatarefId(7), None), 1);

        // last unmonitor issues exactly one unsubscribe
        let last = subs.unsubscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert_eq!(
            last,
            vec![DatarefSpec {
                id: 7,
                index: None
            }]
        );
        assert_eq!(subs.monitored_count(DatarefId(7), None), 0);
    }

    #[test]
    fn batched_array_elements_fold_into_one_spec() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");

        let specs = subs.subscribe_datarefs(&[
            (Arc::clone(&meta), Some(3)),
            (Arc::clone(&meta), Some(7)),
        ]);
        assert_eq!(
            specs,
            vec![DatarefSpec {
                id: 42,
                index: Some(vec![3, 7])
            }]
        );

        // payload in index order pairs back up with the subscribed indices
        let routing = subs.route_update(DatarefId(42), &json!([10.0, 20.0]));
        let UpdateRouting::Elements { name, pairs } = routing else {
            panic!("expected element routing, got {routing:?}");
        };
        assert_eq!(name, "sim/arr");
        assert_eq!(
            pairs,
            vec![
                (3, DatarefValue::Float(10.0)),
                (7, DatarefValue::Float(20.0))
            ]
        );
    }

    #[test]
    fn length_mismatch_resolves_against_most_recent_matching_generation() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");

        // build history: [1,5,7] then [1] then [1,2]; current [1,2,9]
        subs.subscribe_datarefs(&[
            (Arc::clone(&meta), Some(1)),
            (Arc::clone(&meta), Some(5)),
            (Arc::clone(&meta), Some(7)),
        ]);
        subs.unsubscribe_datarefs(&[(Arc::clone(&meta), Some(5)), (Arc::clone(&meta), Some(7))]);
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(2))]);
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(9))]);

        // length 2 must pair with [1,2] -- the most recent set of that
        // length -- not [1,5,7]
        let routing = subs.route_update(DatarefId(42), &json!([10.0, 20.0]));
        let UpdateRouting::Elements { pairs, .. } = routing else {
            panic!("expected element routing, got {routing:?}");
        };
        assert_eq!(
            pairs,
            vec![
                (1, DatarefValue::Float(10.0)),
                (2, DatarefValue::Float(20.0))
            ]
        );

        // length 3 matches the *current* set first
        let routing = subs.route_update(DatarefId(42), &json!([1.0, 2.0, 3.0]));
        let UpdateRouting::Elements { pairs, .. } = routing else {
            panic!("expected element routing, got {routing:?}");
        };
        assert_eq!(pairs[0].0, 1);
        assert_eq!(pairs[1].0, 2);
        assert_eq!(pairs[2].0, 9);

        // older generation of length 1 is still reachable
        let routing = subs.route_update(DatarefId(42), &json!([5.5]));
        let UpdateRouting::Elements { pairs, .. } = routing else {
            panic!("expected element routing, got {routing:?}");
        };
        assert_eq!(pairs, vec![(1, DatarefValue::Float(5.5))]);
    }

    #[test]
    fn unresolvable_length_mismatch_drops_the_update() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(3)), (Arc::clone(&meta), Some(7))]);

        let routing = subs.route_update(DatarefId(42), &json!([1.0, 2.0, 3.0, 4.0]));
        assert_eq!(routing, UpdateRouting::Dropped);
    }

    #[test]
    fn history_is_bounded() {
        let subs = SubscriptionManager::new(2);
        let meta = array_meta(42, "sim/arr");

        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(1))]); // current [1]
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(2))]); // hist [[1]]
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(3))]); // hist [[1],[1,2]]
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(4))]); // hist [[1,2],[1,2,3]] -- [1] evicted

        // a length-1 payload can no longer be reconciled
        let routing = subs.route_update(DatarefId(42), &json!([9.0]));
        assert_eq!(routing, UpdateRouting::Dropped);

        // length 2 and 3 still resolve through retained generations
        assert!(matches!(
            subs.route_update(DatarefId(42), &json!([1.0, 2.0])),
            UpdateRouting::Elements { .. }
        ));
        assert!(matches!(
            subs.route_update(DatarefId(42), &json!([1.0, 2.0, 3.0])),
            UpdateRouting::Elements { .. }
        ));
    }

    #[test]
    fn emptied_index_set_escalates_to_whole_unsubscribe() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(3)), (Arc::clone(&meta), Some(7))]);

        let specs =
            subs.unsubscribe_datarefs(&[(Arc::clone(&meta), Some(3)), (Arc::clone(&meta), Some(7))]);
        assert_eq!(
            specs,
            vec![DatarefSpec {
                id: 42,
                index: None
            }]
        );

        // entry is gone: late frames become Unknown, not Dropped
        assert_eq!(
            subs.route_update(DatarefId(42), &json!([1.0, 2.0])),
            UpdateRouting::Unknown
        );
    }

    #[test]
    fn partial_unsubscribe_keeps_remaining_indices() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(3)), (Arc::clone(&meta), Some(7))]);

        let specs = subs.unsubscribe_datarefs(&[(Arc::clone(&meta), Some(3))]);
        assert_eq!(
            specs,
            vec![DatarefSpec {
                id: 42,
                index: Some(vec![3])
            }]
        );

        let routing = subs.route_update(DatarefId(42), &json!([20.0]));
        let UpdateRouting::Elements { pairs, .. } = routing else {
            panic!("expected element routing, got {routing:?}");
        };
        assert_eq!(pairs, vec![(7, DatarefValue::Float(20.0))]);
    }

    #[test]
    fn scalar_values_bypass_reconciliation() {
        let subs = manager();
        let meta = scalar_meta(7, "sim/x");
        subs.subscribe_datarefs(&[(Arc::clone(&meta), None)]);

        assert_eq!(
            subs.route_update(DatarefId(7), &json!(3.25)),
            UpdateRouting::Whole {
                name: "sim/x".into(),
                kind: ValueKind::Scalar
            }
        );
    }

    #[test]
    fn whole_array_subscription_delivers_whole_payload() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");
        let specs = subs.subscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert_eq!(
            specs,
            vec![DatarefSpec {
                id: 42,
                index: None
            }]
        );

        assert_eq!(
            subs.route_update(DatarefId(42), &json!([1.0, 2.0, 3.0])),
            UpdateRouting::Whole {
                name: "sim/arr".into(),
                kind: ValueKind::Array
            }
        );
    }

    #[test]
    fn unknown_identifier_is_tolerated() {
        let subs = manager();
        assert_eq!(
            subs.route_update(DatarefId(99), &json!(1.0)),
            UpdateRouting::Unknown
        );
    }

    #[test]
    fn unmonitored_unsubscribe_is_a_warning_not_a_panic() {
        let subs = manager();
        let meta = scalar_meta(7, "sim/x");
        let specs = subs.unsubscribe_datarefs(&[(Arc::clone(&meta), None)]);
        assert!(specs.is_empty());
    }

    #[test]
    fn command_refcounts_mirror_datarefs() {
        let subs = manager();
        let meta = Arc::new(CommandMeta {
            name: "sim/do".into(),
            id: CommandId(12),
            description: String::new(),
        });

        assert_eq!(
            subs.subscribe_commands(&[Arc::clone(&meta)]),
            vec![CommandSpec { id: 12 }]
        );
        assert!(subs.subscribe_commands(&[Arc::clone(&meta)]).is_empty());
        assert!(subs.unsubscribe_commands(&[Arc::clone(&meta)]).is_empty());
        assert_eq!(
            subs.unsubscribe_commands(&[Arc::clone(&meta)]),
            vec![CommandSpec { id: 12 }]
        );
    }

    #[test]
    fn rebuild_rekeys_by_fresh_identifiers() {
        let subs = manager();
        let meta = array_meta(42, "sim/arr");
        subs.subscribe_datarefs(&[(Arc::clone(&meta), Some(3))]);

        // simulate a reconnect where sim/arr now has id 99
        let cache = MetadataCache::new(std::time::Duration::from_secs(10));
        cache.install(
            vec![DatarefMeta {
                name: "sim/arr".into(),
                id: DatarefId(99),
                value_type: ValueType::FloatArray,
                is_writable: true,
            }],
            Vec::new(),
        );
        subs.rebuild(&cache);

        assert_eq!(subs.monitored_count(DatarefId(42), Some(3)), 0);
        assert_eq!(subs.monitored_count(DatarefId(99), Some(3)), 1);
        assert_eq!(
            subs.resubscribe_specs(),
            vec![DatarefSpec {
                id: 99,
                index: Some(vec![3])
            }]
        );
    }
}
