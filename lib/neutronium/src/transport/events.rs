//! Closed event sets delivered by the transport. Tagged variants rather
//! than interface dispatch (spec §9 "Runtime polymorphism" — "prefer
//! tagged variants for the small closed sets").

use crate::codec::ChannelType;
use std::net::SocketAddr;

pub type ConnectionId = u64;

/// First connection id handed out by a server (spec §4.3).
pub const FIRST_CONNECTION_ID: ConnectionId = 1000;

#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Server-side: a new client completed the handshake.
    ClientConnected { connection_id: ConnectionId, endpoint: SocketAddr },
    /// Either side: a connection was torn down.
    ClientDisconnected { connection_id: ConnectionId, reason: String },
    /// Client-side: the local handshake completed.
    Connected { connection_id: ConnectionId },
    /// A non-fatal transport error (spec §7 "Transport I/O errors").
    Error { message: String },
    /// Application payload delivered on a channel, in the order the
    /// channel's delivery discipline guarantees (spec §4.3).
    Data {
        connection_id: ConnectionId,
        channel: ChannelType,
        payload: Vec<u8>,
    },
}
