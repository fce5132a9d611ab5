//! REST client for the X-Plane Web API.
//!
//! Wraps `reqwest::Client` with the simulator's URL scheme
//! (`http://host:port/api/{version}/...`), the `{ "data": ... }` response
//! envelope, and the capabilities/version negotiation. All methods return
//! unwrapped `data` payloads.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;

/// Dataref reporting how long the simulator has been running, in seconds.
/// Drives the metadata cache staleness policy: uptime, not wall clock.
pub const RUNNING_TIME_DATAREF: &str = "sim/time/total_running_time_sec";

// ── Wire types ───────────────────────────────────────────────────────

/// Dataref value types as reported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Int,
    Float,
    Double,
    IntArray,
    FloatArray,
    /// Byte buffer, transported base64-encoded.
    Data,
}

impl ValueType {
    pub fn is_array(self) -> bool {
        matches!(self, Self::IntArray | Self::FloatArray)
    }
}

/// Metadata record for one dataref, as listed by `/datarefs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatarefInfo {
    pub id: u64,
    pub name: String,
    pub value_type: ValueType,
    pub is_writable: bool,
}

/// Metadata record for one command, as listed by `/commands`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandInfo {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// The `/api/capabilities` document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub api: ApiInfo,
    #[serde(rename = "x-plane")]
    pub xplane: SimulatorInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInfo {
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatorInfo {
    pub version: String,
}

impl Capabilities {
    /// Hardcoded capability set for simulators predating `/api/capabilities`
    /// (the endpoint appeared together with `/api/v2`).
    pub fn v1_fallback() -> Self {
        Self {
            api: ApiInfo {
                versions: vec!["v1".into()],
            },
            xplane: SimulatorInfo {
                version: "12.1.1".into(),
            },
        }
    }
}

// ── Version selection ────────────────────────────────────────────────

fn numeric_part(version: &str) -> Option<u64> {
    let digits: String = version.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Pick the newest API version by natural sort of version strings.
///
/// Plain lexicographic ordering would rank `v10` below `v2`; the numeric
/// part decides, with the raw string as tie-breaker.
pub fn newest_version(versions: &[String]) -> Option<String> {
    versions
        .iter()
        .max_by(|a, b| match (numeric_part(a.as_str()), numeric_part(b.as_str())) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
            _ => a.cmp(b),
        })
        .cloned()
}

/// Whether an API version exposes the `/commands` listing (v2 and later).
pub fn supports_command_listing(version: &str) -> bool {
    numeric_part(version).is_some_and(|n| n >= 2)
}

// ── Envelope ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

// ── RestClient ───────────────────────────────────────────────────────

/// HTTP client for one simulator endpoint.
///
/// One instance per connection epoch: identifiers fetched through it are
/// only meaningful until the next reconnect.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    host: String,
    port: u16,
    version: String,
}

impl RestClient {
    /// Build a client for `host:port` with the given per-request timeout.
    ///
    /// The API version starts at `v1` (the only version every simulator
    /// serves); call [`set_version`](Self::set_version) after negotiating
    /// against the capabilities document.
    pub fn new(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            host: host.to_string(),
            port,
            version: "v1".into(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The negotiated API version segment, e.g. `"v2"`.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn set_version(&mut self, version: &str) {
        self.version = version.to_string();
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn api_root(&self) -> String {
        format!("http://{}:{}/api", self.host, self.port)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}{}", self.api_root(), self.version, path)
    }

    /// Base URL for the WebSocket interface of the same endpoint.
    pub fn ws_url(&self) -> String {
        format!("ws://{}:{}/api/{}", self.host, self.port, self.version)
    }

    // ── Reachability & capabilities ──────────────────────────────────

    /// Cheap reachability probe.
    ///
    /// Relies on `/api/v1` always being served when the Web API is up,
    /// regardless of the negotiated version. Any transport failure means
    /// "unreachable"; the caller's monitor loop owns the retry policy.
    pub async fn reachable(&self) -> bool {
        let url = format!("{}/v1/datarefs/count", self.api_root());
        match self.http.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "reachability probe failed");
                false
            }
        }
    }

    /// Fetch `/api/capabilities` (version-independent endpoint).
    ///
    /// Fails on simulators older than 12.1.4; callers fall back to
    /// [`Capabilities::v1_fallback`].
    pub async fn capabilities(&self) -> Result<Capabilities, Error> {
        let url = format!("{}/capabilities", self.api_root());
        let resp = self.http.get(&url).send().await?;
        let resp = ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// Fetch the full dataref metadata table.
    pub async fn list_datarefs(&self) -> Result<Vec<DatarefInfo>, Error> {
        let url = self.url("/datarefs");
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = ensure_success(resp).await?;
        let envelope: DataEnvelope<Vec<DatarefInfo>> = resp.json().await?;
        Ok(envelope.data)
    }

    /// Fetch the full command metadata table (v2 and later).
    pub async fn list_commands(&self) -> Result<Vec<CommandInfo>, Error> {
        let url = self.url("/commands");
        debug!("GET {url}");
        let resp = self.http.get(&url).send().await?;
        let resp = ensure_success(resp).await?;
        let envelope: DataEnvelope<Vec<CommandInfo>> = resp.json().await?;
        Ok(envelope.data)
    }

    /// Look up one dataref's metadata by exact name.
    pub async fn find_dataref(&self, name: &str) -> Result<Option<DatarefInfo>, Error> {
        let url = self.url("/datarefs");
        let resp = self
            .http
            .get(&url)
            .query(&[("filter[name]", name)])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let envelope: DataEnvelope<Vec<DatarefInfo>> = resp.json().await?;
        Ok(envelope.data.into_iter().next())
    }

    /// Look up one command's metadata by exact name.
    pub async fn find_command(&self, name: &str) -> Result<Option<CommandInfo>, Error> {
        let url = self.url("/commands");
        let resp = self
            .http
            .get(&url)
            .query(&[("filter[name]", name)])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;
        let envelope: DataEnvelope<Vec<CommandInfo>> = resp.json().await?;
        Ok(envelope.data.into_iter().next())
    }

    // ── Values & commands ────────────────────────────────────────────

    /// Read one dataref's current value.
    pub async fn dataref_value(&self, id: u64) -> Result<serde_json::Value, Error> {
        let url = self.url(&format!("/datarefs/{id}/value"));
        let resp = self.http.get(&url).send().await?;
        let resp = ensure_success(resp).await?;
        let envelope: DataEnvelope<serde_json::Value> = resp.json().await?;
        Ok(envelope.data)
    }

    /// Write one dataref's value; `index` patches a single array element.
    pub async fn write_dataref_value(
        &self,
        id: u64,
        value: &serde_json::Value,
        index: Option<usize>,
    ) -> Result<(), Error> {
        let url = self.url(&format!("/datarefs/{id}/value"));
        debug!("PATCH {url}");
        let mut request = self
            .http
            .patch(&url)
            .json(&serde_json::json!({ "data": value }));
        if let Some(index) = index {
            request = request.query(&[("index", index)]);
        }
        let resp = request.send().await?;
        ensure_success(resp).await?;
        Ok(())
    }

    /// Trigger a command, holding it active for `duration` seconds.
    pub async fn activate_command(&self, id: u64, duration: f64) -> Result<(), Error> {
        let url = self.url(&format!("/command/{id}/activate"));
        debug!("POST {url}");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "id": id, "duration": duration }))
            .send()
            .await?;
        ensure_success(resp).await?;
        Ok(())
    }
}

/// Turn a non-success status into [`Error::Rest`], keeping the body for
/// diagnostics.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(Error::Rest {
        message,
        status: status.as_u16(),
    })
}

// ── Tests ────────────────────────────────────────────────────────────
