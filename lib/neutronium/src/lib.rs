#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

//! Pool Layer, Packet Codec and Datagram Transport (spec §4.1–§4.3):
//! the networking core shared by the game client and the authoritative
//! game server.

pub mod codec;
pub mod pool;
pub mod transport;
