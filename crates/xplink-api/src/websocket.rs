//! WebSocket transport for the X-Plane Web API.
//!
//! Thin connector over `tokio-tungstenite`: the caller gets a send half
//! (shareable behind a lock) and a receive half (owned by the receive
//! loop). Reconnection policy lives in the connection monitor, not here.

use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::protocol::WsMessage;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outcome of one bounded receive attempt.
#[derive(Debug)]
pub enum WsEvent {
    /// A parsed protocol frame.
    Message(WsMessage),
    /// Nothing arrived within the timeout; the connection is still up.
    Timeout,
    /// The peer closed the connection or the stream ended.
    Closed,
}

/// Open a WebSocket connection to `url` (`ws://host:port/api/vN`).
pub async fn connect(url: &str) -> Result<(WsSink, WsSource), Error> {
    info!(url, "connecting to WebSocket");
    let (stream, _response) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| Error::WebSocketConnect(e.to_string()))?;
    info!("WebSocket connected");

    let (sink, source) = stream.split();
    Ok((WsSink { inner: sink }, WsSource { inner: source }))
}

// ── Send half ────────────────────────────────────────────────────────

/// The write half of a WebSocket connection.
pub struct WsSink {
    inner: SplitSink<WsStream, Message>,
}

impl WsSink {
    /// Serialize `payload` as JSON and send it as one text frame.
    pub async fn send_json(&mut self, payload: &impl Serialize) -> Result<(), Error> {
        let text = serde_json::to_string(payload).map_err(|e| Error::WebSocket(e.to_string()))?;
        debug!(frame = %text, "sending WebSocket frame");
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }

    /// Send a close frame and shut the sink down.
    pub async fn close(&mut self) -> Result<(), Error> {
        self.inner
            .close()
            .await
            .map_err(|e| Error::WebSocket(e.to_string()))
    }
}

// ── Receive half ─────────────────────────────────────────────────────

/// The read half of a WebSocket connection.
pub struct WsSource {
    inner: SplitStream<WsStream>,
}

impl WsSource {
    /// Wait up to `timeout` for the next protocol frame.
    ///
    /// Control frames and unparseable text frames are consumed here:
    /// pings are answered by tungstenite, malformed frames are logged and
    /// skipped so one bad message never stalls the stream.
    pub async fn next_event(&mut self, timeout: Duration) -> Result<WsEvent, Error> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = match tokio::time::timeout_at(deadline, self.inner.next()).await {
                Ok(frame) => frame,
                Err(_) => return Ok(WsEvent::Timeout),
            };

            match frame {
                Some(Ok(Message::Text(text))) => match serde_json::from_str(text.as_str()) {
                    Ok(message) => return Ok(WsEvent::Message(message)),
                    Err(e) => {
                        warn!(error = %e, "unparseable WebSocket frame, skipping");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    if let Some(ref cf) = frame {
                        info!(code = %cf.code, reason = %cf.reason, "WebSocket close frame");
                    } else {
                        info!("WebSocket close frame (no payload)");
                    }
                    return Ok(WsEvent::Closed);
                }
                Some(Ok(Message::Ping(_))) => {
                    // tungstenite answers pongs automatically
                    debug!("WebSocket ping");
                }
                Some(Ok(_)) => {
                    // Binary, Pong, raw frames -- not part of the protocol
                }
                Some(Err(e)) => return Err(Error::WebSocket(e.to_string())),
                None => {
                    info!("WebSocket stream ended");
                    return Ok(WsEvent::Closed);
                }
            }
        }
    }
}
