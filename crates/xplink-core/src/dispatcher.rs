// ── Dispatcher ──
//
// Correlates outbound request ids with inbound `result` frames and fans
// inbound push frames out to the registered callbacks. Identifier
// resolution goes through the metadata cache and the subscription
// manager; unknown identifiers are tolerated, because frames for a
// previous subscription generation routinely arrive late.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};

use xplink_api::protocol::{WsMessage, WsRequest, WsRequestBody};

use crate::cache::MetadataCache;
use crate::events::{CallbackRegistry, CommandActive, DatarefUpdate, RequestFeedback};
use crate::model::{CommandId, DatarefId, DatarefValue};
use crate::subscription::{SubscriptionManager, UpdateRouting};

/// Outcome of one correlated request, kept until the client clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestState {
    Pending,
    Succeeded,
    Failed,
}

pub(crate) struct Dispatcher {
    next_req: AtomicU64,
    requests: DashMap<u64, RequestState>,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self {
            next_req: AtomicU64::new(0),
            requests: DashMap::new(),
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Tag a request body with the next monotonic id and track it.
    pub(crate) fn prepare(&self, body: WsRequestBody) -> WsRequest {
        let req_id = self.next_req.fetch_add(1, Ordering::Relaxed) + 1;
        self.requests.insert(req_id, RequestState::Pending);
        WsRequest { body, req_id }
    }

    pub(crate) fn request_state(&self, req_id: u64) -> Option<RequestState> {
        self.requests.get(&req_id).map(|entry| *entry)
    }

    /// Forget tracked requests; called when a connection is torn down.
    pub(crate) fn clear(&self) {
        self.requests.clear();
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Route one inbound frame.
    pub(crate) fn dispatch(
        &self,
        message: WsMessage,
        cache: &MetadataCache,
        subscriptions: &SubscriptionManager,
        callbacks: &CallbackRegistry,
    ) {
        match message {
            WsMessage::Result {
                req_id,
                success,
                error_code,
                error_message,
            } => {
                let state = if success {
                    RequestState::Succeeded
                } else {
                    RequestState::Failed
                };
                if self.requests.insert(req_id, state).is_none() {
                    debug!(req_id, "result for a request this client never sent");
                }
                callbacks.emit_request_feedback(&RequestFeedback {
                    req_id,
                    success,
                    error_code,
                    error_message,
                });
            }

            WsMessage::DatarefUpdateValues { data } => {
                for (raw_id, value) in &data {
                    let Ok(id) = raw_id.parse::<u64>() else {
                        warn!(id = %raw_id, "non-numeric dataref id in update frame");
                        continue;
                    };
                    self.dispatch_dataref_update(DatarefId(id), value, cache, subscriptions, callbacks);
                }
            }

            WsMessage::CommandUpdateIsActive { data } => {
                for (raw_id, is_active) in &data {
                    let Ok(id) = raw_id.parse::<u64>() else {
                        warn!(id = %raw_id, "non-numeric command id in update frame");
                        continue;
                    };
                    match cache.command_by_id(CommandId(id)) {
                        Some(meta) => callbacks.emit_command_active(&CommandActive {
                            path: meta.name.clone(),
                            is_active: *is_active,
                        }),
                        None => warn!(
                            command = %cache.equiv_command(CommandId(id)),
                            "command activity for unknown id"
                        ),
                    }
                }
            }
        }
    }

    fn dispatch_dataref_update(
        &self,
        id: DatarefId,
        value: &serde_json::Value,
        cache: &MetadataCache,
        subscriptions: &SubscriptionManager,
        callbacks: &CallbackRegistry,
    ) {
        match subscriptions.route_update(id, value) {
            UpdateRouting::Whole { name, kind } => match DatarefValue::parse(kind, value, &name) {
                Ok(parsed) => callbacks.emit_dataref_update(&DatarefUpdate {
                    path: name,
                    index: None,
                    value: parsed,
                }),
                Err(e) => warn!(dataref = %name, error = %e, "unparseable value, update dropped"),
            },
            UpdateRouting::Elements { name, pairs } => {
                for (index, value) in pairs {
                    callbacks.emit_dataref_update(&DatarefUpdate {
                        path: name.clone(),
                        index: Some(index),
                        value,
                    });
                }
            }
            UpdateRouting::Dropped => {
                // already logged inside the subscription manager
            }
            UpdateRouting::Unknown => {
                debug!(
                    dataref = %cache.equiv_dataref(id),
                    "update for unknown id (late frame from a previous request, safely ignored)"
                );
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::json;

    use xplink_api::rest::ValueType;

    use crate::model::{CommandMeta, DatarefMeta};

    struct Fixture {
        dispatcher: Dispatcher,
        cache: MetadataCache,
        subscriptions: SubscriptionManager,
        callbacks: CallbackRegistry,
        updates: Arc<Mutex<Vec<DatarefUpdate>>>,
        activity: Arc<Mutex<Vec<CommandActive>>>,
        feedback: Arc<Mutex<Vec<RequestFeedback>>>,
    }

    fn fixture() -> Fixture {
        let cache = MetadataCache::new(Duration::from_secs(10));
        cache.install(
            vec![
                DatarefMeta {
                    name: "sim/arr".into(),
                    id: DatarefId(42),
                    value_type: ValueType::FloatArray,
                    is_writable: true,
                },
                DatarefMeta {
                    name: "sim/x".into(),
                    id: DatarefId(7),
                    value_type: ValueType::Float,
                    is_writable: true,
                },
            ],
            vec![CommandMeta {
                name: "sim/do".into(),
                id: CommandId(12),
                description: String::new(),
            }],
        );

        let callbacks = CallbackRegistry::new();
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        callbacks.add_dataref_update(move |u| sink.lock().unwrap().push(u.clone()));
        let activity = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&activity);
        callbacks.add_command_active(move |a| sink.lock().unwrap().push(a.clone()));
        let feedback = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&feedback);
        callbacks.add_request_feedback(move |f| sink.lock().unwrap().push(f.clone()));

        Fixture {
            dispatcher: Dispatcher::new(),
            cache,
            subscriptions: SubscriptionManager::new(3),
            callbacks,
            updates,
            activity,
            feedback,
        }
    }

    fn update_frame(entries: &[(&str, serde_json::Value)]) -> WsMessage {
        let data: HashMap<String, serde_json::Value> = entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        WsMessage::DatarefUpdateValues { data }
    }

    #[test]
    fn request_ids_are_monotonic_from_one() {
        let f = fixture();
        let a = f.dispatcher.prepare(WsRequestBody::CommandSubscribeIsActive {
            commands: Vec::new(),
        });
        let b = f.dispatcher.prepare(WsRequestBody::CommandSubscribeIsActive {
            commands: Vec::new(),
        });
        assert_eq!(a.req_id, 1);
        assert_eq!(b.req_id, 2);
        assert_eq!(
            f.dispatcher.request_state(1),
            Some(RequestState::Pending)
        );
    }

    #[test]
    fn result_frame_resolves_pending_request_and_fires_feedback() {
        let f = fixture();
        let request = f.dispatcher.prepare(WsRequestBody::CommandSubscribeIsActive {
            commands: Vec::new(),
        });

        f.dispatcher.dispatch(
            WsMessage::Result {
                req_id: request.req_id,
                success: false,
                error_code: Some("INVALID_ID".into()),
                error_message: Some("no such dataref".into()),
            },
            &f.cache,
            &f.subscriptions,
            &f.callbacks,
        );

        assert_eq!(
            f.dispatcher.request_state(request.req_id),
            Some(RequestState::Failed)
        );
        let feedback = f.feedback.lock().unwrap();
        assert_eq!(feedback.len(), 1);
        assert!(!feedback[0].success);
        assert_eq!(feedback[0].error_code.as_deref(), Some("INVALID_ID"));
    }

    #[test]
    fn array_update_dispatches_one_callback_per_element() {
        let f = fixture();
        let meta = f.cache.dataref_by_name("sim/arr").unwrap();
        f.subscriptions
            .subscribe_datarefs(&[(Arc::clone(&meta), Some(3)), (meta, Some(7))]);

        f.dispatcher.dispatch(
            update_frame(&[("42", json!([10.0, 20.0]))]),
            &f.cache,
            &f.subscriptions,
            &f.callbacks,
        );

        let updates = f.updates.lock().unwrap();
        assert_eq!(
            *updates,
            vec![
                DatarefUpdate {
                    path: "sim/arr".into(),
                    index: Some(3),
                    value: DatarefValue::Float(10.0),
                },
                DatarefUpdate {
                    path: "sim/arr".into(),
                    index: Some(7),
                    value: DatarefValue::Float(20.0),
                },
            ]
        );
    }

    #[test]
    fn scalar_update_dispatches_under_plain_path() {
        let f = fixture();
        let meta = f.cache.dataref_by_name("sim/x").unwrap();
        f.subscriptions.subscribe_datarefs(&[(meta, None)]);

        f.dispatcher.dispatch(
            update_frame(&[("7", json!(3.5))]),
            &f.cache,
            &f.subscriptions,
            &f.callbacks,
        );

        let updates = f.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].path, "sim/x");
        assert_eq!(updates[0].index, None);
        assert_eq!(updates[0].value, DatarefValue::Float(3.5));
    }

    #[test]
    fn unknown_dataref_id_is_ignored_without_callbacks() {
        let f = fixture();
        f.dispatcher.dispatch(
            update_frame(&[("999", json!(1.0))]),
            &f.cache,
            &f.subscriptions,
            &f.callbacks,
        );
        assert!(f.updates.lock().unwrap().is_empty());
    }

    #[test]
    fn command_activity_resolves_through_cache() {
        let f = fixture();
        let mut data = HashMap::new();
        data.insert("12".to_string(), true);
        f.dispatcher.dispatch(
            WsMessage::CommandUpdateIsActive { data },
            &f.cache,
            &f.subscriptions,
            &f.callbacks,
        );

        let activity = f.activity.lock().unwrap();
        assert_eq!(
            *activity,
            vec![CommandActive {
                path: "sim/do".into(),
                is_active: true,
            }]
        );
    }

    #[test]
    fn clear_forgets_tracked_requests() {
        let f = fixture();
        let request = f.dispatcher.prepare(WsRequestBody::CommandSubscribeIsActive {
            commands: Vec::new(),
        });
        f.dispatcher.clear();
        assert_eq!(f.dispatcher.request_state(request.req_id), None);
    }
}
