//! WebSocket JSON envelope for the X-Plane Web API.
//!
//! Every outbound frame is `{type, req_id, params}`; the simulator answers
//! with `result` frames correlated by `req_id`, and pushes unsolicited
//! `dataref_update_values` / `command_update_is_active` frames for active
//! subscriptions. Identifier keys in push frames arrive as JSON strings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ── Outbound frames ──────────────────────────────────────────────────

/// A fully formed outbound frame, ready to serialize.
///
/// The request id is assigned by the dispatcher at send time, monotonically
/// increasing per connection, and correlates the eventual `result` frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WsRequest {
    #[serde(flatten)]
    pub body: WsRequestBody,
    pub req_id: u64,
}

/// The six request kinds the client issues.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum WsRequestBody {
    DatarefSubscribeValues { datarefs: Vec<DatarefSpec> },
    DatarefUnsubscribeValues { datarefs: Vec<DatarefSpec> },
    DatarefSetValues { datarefs: Vec<DatarefWrite> },
    CommandSubscribeIsActive { commands: Vec<CommandSpec> },
    CommandUnsubscribeIsActive { commands: Vec<CommandSpec> },
    CommandSetIsActive { commands: Vec<CommandActivation> },
}

/// One dataref in a bulk (un)subscribe request.
///
/// `index` carries the requested array element indices; a whole-value
/// dataref (scalar, or an array subscribed in full) sends no index list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatarefSpec {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<Vec<usize>>,
}

/// One dataref in a `dataref_set_values` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DatarefWrite {
    pub id: u64,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// One command in a bulk is-active (un)subscribe request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CommandSpec {
    pub id: u64,
}

/// One command in a `command_set_is_active` request.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandActivation {
    pub id: u64,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

// ── Inbound frames ───────────────────────────────────────────────────

/// The three inbound frame kinds.
///
/// Push-frame `data` maps are keyed by stringified identifiers; resolution
/// back to names happens in the metadata cache, which must tolerate unknown
/// ids (a late frame for an identifier from before an aircraft change is
/// expected traffic, not an error).
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Acknowledgement of one outbound request.
    Result {
        req_id: u64,
        success: bool,
        #[serde(default)]
        error_code: Option<String>,
        #[serde(default)]
        error_message: Option<String>,
    },
    /// Pushed value changes: scalar values or packed index-order arrays.
    DatarefUpdateValues {
        data: HashMap<String, serde_json::Value>,
    },
    /// Pushed command activity changes.
    CommandUpdateIsActive { data: HashMap<String, bool> },
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn subscribe_frame_wire_shape() {
        let request = WsRequest {
            body: WsRequestBody::DatarefSubscribeValues {
                datarefs: vec![DatarefSpec {
                    id: 42,
                    index: Some(vec![3, 7]),
                }],
            },
            req_id: 1,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "dataref_subscribe_values",
                "req_id": 1,
                "params": { "datarefs": [ { "id": 42, "index": [3, 7] } ] }
            })
        );
    }

    #[test]
    fn whole_value_spec_omits_index() {
        let request = WsRequest {
            body: WsRequestBody::DatarefUnsubscribeValues {
                datarefs: vec![DatarefSpec { id: 7, index: None }],
            },
            req_id: 9,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "dataref_unsubscribe_values",
                "req_id": 9,
                "params": { "datarefs": [ { "id": 7 } ] }
            })
        );
    }

    #[test]
    fn command_activation_wire_shape() {
        let request = WsRequest {
            body: WsRequestBody::CommandSetIsActive {
                commands: vec![CommandActivation {
                    id: 12,
                    is_active: true,
                    duration: Some(1.5),
                }],
            },
            req_id: 3,
        };

        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "command_set_is_active",
                "req_id": 3,
                "params": { "commands": [ { "id": 12, "is_active": true, "duration": 1.5 } ] }
            })
        );
    }

    #[test]
    fn parse_result_frame() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"type":"result","req_id":5,"success":false,
                "error_code":"INVALID_ID","error_message":"no such dataref"}"#,
        )
        .unwrap();

        assert_eq!(
            msg,
            WsMessage::Result {
                req_id: 5,
                success: false,
                error_code: Some("INVALID_ID".into()),
                error_message: Some("no such dataref".into()),
            }
        );
    }

    #[test]
    fn parse_result_frame_without_error_fields() {
        let msg: WsMessage =
            serde_json::from_str(r#"{"type":"result","req_id":1,"success":true}"#).unwrap();
        assert!(matches!(
            msg,
            WsMessage::Result {
                success: true,
                error_code: None,
                ..
            }
        ));
    }

    #[test]
    fn parse_dataref_update_frame() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"type":"dataref_update_values","data":{"42":[10.0,20.0],"7":1.5}}"#,
        )
        .unwrap();

        let WsMessage::DatarefUpdateValues { data } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(data["42"], json!([10.0, 20.0]));
        assert_eq!(data["7"], json!(1.5));
    }

    #[test]
    fn parse_command_active_frame() {
        let msg: WsMessage = serde_json::from_str(
            r#"{"type":"command_update_is_active","data":{"12":true}}"#,
        )
        .unwrap();

        let WsMessage::CommandUpdateIsActive { data } = msg else {
            panic!("wrong variant");
        };
        assert_eq!(data["12"], true);
    }
}
