// ── Callback registry ──
//
// Typed registration surface, one slot per event kind. Registries are
// owned by the client and cleared on shutdown; there is no ambient
// global state. Callbacks run on the receive loop, so they should be
// quick and must not block.

use std::sync::RwLock;

use tracing::{debug, warn};

use crate::model::DatarefValue;

// ── Event payloads ───────────────────────────────────────────────────

/// One delivered dataref value change.
#[derive(Debug, Clone, PartialEq)]
pub struct DatarefUpdate {
    /// Dataref path, without any index suffix.
    pub path: String,
    /// Array element index, when the subscription was per-element.
    pub index: Option<usize>,
    pub value: DatarefValue,
}

impl DatarefUpdate {
    /// The path as the application wrote it, e.g. `sim/arr[3]`.
    pub fn full_path(&self) -> String {
        match self.index {
            Some(i) => format!("{}[{}]", self.path, i),
            None => self.path.clone(),
        }
    }
}

/// One delivered command activity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandActive {
    pub path: String,
    pub is_active: bool,
}

/// Acknowledgement of one outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFeedback {
    pub req_id: u64,
    pub success: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

// ── Registry ─────────────────────────────────────────────────────────

type Handler<T> = Box<dyn Fn(&T) + Send + Sync>;

#[derive(Default)]
pub(crate) struct CallbackRegistry {
    on_open: RwLock<Vec<Box<dyn Fn() + Send + Sync>>>,
    on_close: RwLock<Vec<Box<dyn Fn() + Send + Sync>>>,
    on_dataref_update: RwLock<Vec<Handler<DatarefUpdate>>>,
    on_command_active: RwLock<Vec<Handler<CommandActive>>>,
    on_request_feedback: RwLock<Vec<Handler<RequestFeedback>>>,
}

impl CallbackRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // ── Registration ─────────────────────────────────────────────────

    pub(crate) fn add_open(&self, f: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.on_open.write() {
            handlers.push(Box::new(f));
        }
    }

    pub(crate) fn add_close(&self, f: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.on_close.write() {
            handlers.push(Box::new(f));
        }
    }

    pub(crate) fn add_dataref_update(&self, f: impl Fn(&DatarefUpdate) + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.on_dataref_update.write() {
            handlers.push(Box::new(f));
        }
    }

    pub(crate) fn add_command_active(&self, f: impl Fn(&CommandActive) + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.on_command_active.write() {
            handlers.push(Box::new(f));
        }
    }

    pub(crate) fn add_request_feedback(
        &self,
        f: impl Fn(&RequestFeedback) + Send + Sync + 'static,
    ) {
        if let Ok(mut handlers) = self.on_request_feedback.write() {
            handlers.push(Box::new(f));
        }
    }

    // ── Emission ─────────────────────────────────────────────────────

    pub(crate) fn emit_open(&self) {
        if let Ok(handlers) = self.on_open.read() {
            for handler in handlers.iter() {
                handler();
            }
        }
    }

    pub(crate) fn emit_close(&self) {
        if let Ok(handlers) = self.on_close.read() {
            for handler in handlers.iter() {
                handler();
            }
        }
    }

    pub(crate) fn emit_dataref_update(&self, update: &DatarefUpdate) {
        if let Ok(handlers) = self.on_dataref_update.read() {
            for handler in handlers.iter() {
                handler(update);
            }
        }
    }

    pub(crate) fn emit_command_active(&self, event: &CommandActive) {
        if let Ok(handlers) = self.on_command_active.read() {
            for handler in handlers.iter() {
                handler(event);
            }
        }
    }

    pub(crate) fn emit_request_feedback(&self, feedback: &RequestFeedback) {
        if feedback.success {
            debug!(req_id = feedback.req_id, "request succeeded");
        } else {
            warn!(
                req_id = feedback.req_id,
                code = feedback.error_code.as_deref().unwrap_or("no error code"),
                message = feedback
                    .error_message
                    .as_deref()
                    .unwrap_or("no error message"),
                "request failed"
            );
        }
        if let Ok(handlers) = self.on_request_feedback.read() {
            for handler in handlers.iter() {
                handler(feedback);
            }
        }
    }

    /// Drop every registered callback; part of client shutdown.
    pub(crate) fn clear(&self) {
        if let Ok(mut handlers) = self.on_open.write() {
            handlers.clear();
        }
        if let Ok(mut handlers) = self.on_close.write() {
            handlers.clear();
        }
        if let Ok(mut handlers) = self.on_dataref_update.write() {
            handlers.clear();
        }
        if let Ok(mut handlers) = self.on_command_active.write() {
            handlers.clear();
        }
        if let Ok(mut handlers) = self.on_request_feedback.write() {
            handlers.clear();
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
