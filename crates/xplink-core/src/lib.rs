// xplink-core: connection & subscription runtime for the X-Plane Web API
//
// The moving parts:
//   - `BeaconMonitor` discovers the simulator through its UDP beacon
//   - `ConnectionMonitor` (inside `connection`) owns REST probing, the
//     WebSocket lifecycle, and the reconnect state machine
//   - `MetadataCache` maps names to per-epoch identifiers
//   - the subscription manager folds interest into minimal bulk wire
//     requests and reconciles array payloads against index history
//   - the dispatcher correlates request ids and fans out updates
//
// Applications talk to `XplaneClient` and the `Dataref`/`Command`
// handles it hands out.

pub mod beacon_monitor;
pub mod cache;
pub mod client;
pub mod config;
pub mod connection;
pub mod entity;
pub mod error;
pub mod events;
pub mod model;

mod dispatcher;
mod subscription;

pub use beacon_monitor::{BeaconMonitor, BeaconStatus};
pub use cache::MetadataCache;
pub use client::XplaneClient;
pub use config::ClientConfig;
pub use connection::ConnectionState;
pub use entity::{Command, Dataref};
pub use error::CoreError;
pub use events::{CommandActive, DatarefUpdate, RequestFeedback};
pub use model::{CommandId, CommandMeta, DatarefId, DatarefMeta, DatarefValue, ValueKind};

pub use xplink_api::beacon::BeaconData;
