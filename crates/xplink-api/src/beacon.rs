//! X-Plane UDP beacon: wire codec and multicast listener socket.
//!
//! The simulator advertises its network API by multicasting a small binary
//! packet ("beacon") to `239.255.1.1:49707` once per second. The packet
//! carries the port the Web API listens on, the simulator version, and the
//! hostname of the machine running it. The sender address of the datagram is
//! the host to connect to.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::error::Error;

/// Multicast group the simulator sends its beacon to.
pub const BEACON_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 1, 1);

/// Multicast port the simulator sends its beacon to.
pub const BEACON_PORT: u16 = 49707;

/// Largest datagram the simulator sends (one ethernet frame).
const MAX_PACKET: usize = 1472;

const BEACON_MAGIC: &[u8; 5] = b"BECN\0";

/// Magic header plus the packed binary record, before the hostname.
const FIXED_LEN: usize = 5 + 16;

// Beacon protocol revisions this client understands. A host id other than 1
// means the beacon was emitted by a companion tool, not the simulator.
const SUPPORTED_MAJOR: u8 = 1;
const SUPPORTED_MINOR_MAX: u8 = 2;
const SIMULATOR_HOST_ID: i32 = 1;

// ── BeaconData ───────────────────────────────────────────────────────

/// One decoded beacon packet.
///
/// Immutable value: each received beacon produces a fresh `BeaconData`,
/// consumers replace it wholesale and never mutate it in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconData {
    /// Address the datagram came from; this is the host to connect to.
    pub host: IpAddr,
    /// Port the simulator's network API listens on.
    pub port: u16,
    /// Hostname of the machine running the simulator.
    pub hostname: String,
    /// Simulator version number, e.g. `121400` for 12.1.4.
    pub version: i32,
    /// 1 = master, 2 = external visual, 3 = instructor station.
    pub role: u32,
}

// ── Codec ────────────────────────────────────────────────────────────

/// Decode one beacon datagram.
///
/// `sender` is the source address of the datagram and becomes
/// [`BeaconData::host`]. Returns [`Error::BeaconDecode`] for anything that
/// is not a beacon packet, and the distinct
/// [`Error::BeaconVersionUnsupported`] when the packet is a well-formed
/// beacon from a protocol revision this client does not speak.
pub fn decode_beacon(packet: &[u8], sender: IpAddr) -> Result<BeaconData, Error> {
    if packet.len() < FIXED_LEN {
        return Err(Error::BeaconDecode {
            reason: format!("packet too short ({} bytes)", packet.len()),
        });
    }
    if &packet[..5] != BEACON_MAGIC {
        return Err(Error::BeaconDecode {
            reason: "bad magic header".into(),
        });
    }

    let mut buf = &packet[5..FIXED_LEN];
    let major = buf.get_u8();
    let minor = buf.get_u8();
    let host_id = buf.get_i32_le();
    let version = buf.get_i32_le();
    let role = buf.get_u32_le();
    let port = buf.get_u16_le();

    if major != SUPPORTED_MAJOR || minor > SUPPORTED_MINOR_MAX || host_id != SIMULATOR_HOST_ID {
        return Err(Error::BeaconVersionUnsupported {
            major,
            minor,
            host_id,
        });
    }

    let rest = &packet[FIXED_LEN..];
    let Some(nul) = rest.iter().position(|b| *b == 0) else {
        return Err(Error::BeaconDecode {
            reason: "hostname not NUL-terminated".into(),
        });
    };
    let hostname = String::from_utf8_lossy(&rest[..nul]).into_owned();

    Ok(BeaconData {
        host: sender,
        port,
        hostname,
        version,
        role,
    })
}

/// Encode a beacon datagram.
///
/// The counterpart of [`decode_beacon`]; used by tests and diagnostic
/// tooling. `major`/`minor`/`host_id` are taken explicitly so callers can
/// produce packets from revisions the decoder rejects.
pub fn encode_beacon(data: &BeaconData, major: u8, minor: u8, host_id: i32) -> Bytes {
    let mut buf = BytesMut::with_capacity(FIXED_LEN + data.hostname.len() + 1);
    buf.put_slice(BEACON_MAGIC);
    buf.put_u8(major);
    buf.put_u8(minor);
    buf.put_i32_le(host_id);
    buf.put_i32_le(data.version);
    buf.put_u32_le(data.role);
    buf.put_u16_le(data.port);
    buf.put_slice(data.hostname.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

// ── BeaconSocket ─────────────────────────────────────────────────────

/// A UDP socket joined to the beacon multicast group.
///
/// Opened fresh for each probe attempt; dropping it leaves the group.
/// Must be created from within a Tokio runtime.
pub struct BeaconSocket {
    socket: UdpSocket,
}

impl BeaconSocket {
    /// Bind the multicast listener socket.
    ///
    /// `SO_REUSEADDR` is set so several clients on the same machine can
    /// listen for the beacon concurrently.
    pub fn open() -> Result<Self, Error> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        raw.set_reuse_address(true)?;
        raw.set_nonblocking(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, BEACON_PORT));
        raw.bind(&bind_addr.into())?;

        let socket = UdpSocket::from_std(raw.into())?;
        socket.join_multicast_v4(BEACON_MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED)?;
        Ok(Self { socket })
    }

    /// Receive and decode one beacon packet, waiting at most `timeout`.
    ///
    /// Datagrams that fail to decode are surfaced as errors, not skipped:
    /// the caller's probe loop decides how to react to foreign traffic on
    /// the multicast group.
    pub async fn recv_beacon(&self, timeout: Duration) -> Result<BeaconData, Error> {
        let mut buf = [0u8; MAX_PACKET];
        let received = tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await;
        match received {
            Ok(Ok((len, sender))) => decode_beacon(&buf[..len], sender.ip()),
            Ok(Err(e)) => Err(Error::Socket(e)),
            Err(_) => Err(Error::BeaconTimeout {
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
