//! Connection-oriented UDP transport: handshake, heartbeat/liveness,
//! and the three delivery channels built on top of `codec::Packet`
//! (spec §4.3). The receive task only decodes and enqueues; all
//! connection bookkeeping happens on the single task that calls
//! [`Transport::process_incoming`], grounded on the tokio task/queue
//! shape of `jakobhuuse-Netcode-in-Rust`'s server loop and the
//! endpoint-map concept of `lib/neutronium/src/net/endpoint.rs`.

pub mod connection;
pub mod events;

pub use connection::{Connection, ConnectionState};
pub use events::{ConnectionId, TransportEvent, FIRST_CONNECTION_ID};

use crate::codec::{ChannelType, CodecError, Packet, PacketType};
use crate::pool::BufferPool;
use byteorder::{ByteOrder, LittleEndian};
use slog::{debug, info, o, warn, Logger};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);
pub const CLIENT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Packets drained from the inbound queue per `process_incoming` call
/// (spec §4.3 "drains the queue up to a bounded batch (e.g. 100 packets)").
pub const INBOUND_BATCH: usize = 100;
const INBOUND_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("not connected")]
    NotConnected,
}

/// Verifies an auth-token blob presented at handshake (spec §4.4
/// boundary). Kept as a trait here so `neutronium` never depends on
/// `authenticator` directly — the game server binary supplies the real
/// implementation.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &[u8]) -> bool;
}

/// A validator that accepts any non-empty token. Useful for local
/// testing and for the client role, which never validates inbound
/// tokens.
pub struct AcceptAny;

impl TokenValidator for AcceptAny {
    fn validate(&self, token: &[u8]) -> bool {
        !token.is_empty()
    }
}

enum RawEvent {
    Inbound { addr: SocketAddr, packet: Packet },
    Malformed { addr: SocketAddr },
    Tick,
}

enum Role {
    Server {
        max_clients: usize,
        validator: Arc<dyn TokenValidator>,
    },
    Client {
        handshake_started: Option<Instant>,
        server_addr: Option<SocketAddr>,
    },
}

/// Connection-oriented UDP endpoint. One `Transport` per socket, used in
/// either server or client role.
pub struct Transport {
    socket: Arc<UdpSocket>,
    pool: Arc<BufferPool>,
    connections: HashMap<SocketAddr, Connection>,
    next_id: ConnectionId,
    role: Role,
    inbound_rx: mpsc::Receiver<RawEvent>,
    shutdown: Arc<AtomicBool>,
    logger: Logger,
}

impl Transport {
    async fn bind_inner(
        bind_addr: SocketAddr,
        role: Role,
        pool: Arc<BufferPool>,
        logger: Logger,
    ) -> io::Result<Transport> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let shutdown = Arc::new(AtomicBool::new(false));

        spawn_receive_task(Arc::clone(&socket), Arc::clone(&pool), tx.clone(), Arc::clone(&shutdown), logger.clone());
        spawn_heartbeat_task(tx, Arc::clone(&shutdown));

        Ok(Transport {
            socket,
            pool,
            connections: HashMap::new(),
            next_id: FIRST_CONNECTION_ID,
            role,
            inbound_rx: rx,
            shutdown,
            logger,
        })
    }

    /// Start a server-role transport bound to `bind_addr`, accepting up to
    /// `max_clients` concurrent connections and validating handshake
    /// tokens with `validator`.
    pub async fn bind_server(
        bind_addr: SocketAddr,
        max_clients: usize,
        validator: Arc<dyn TokenValidator>,
        pool: Arc<BufferPool>,
        logger: Logger,
    ) -> io::Result<Transport> {
        let logger = logger.new(o!("role" => "server"));
        Transport::bind_inner(
            bind_addr,
            Role::Server { max_clients, validator },
            pool,
            logger,
        )
        .await
    }

    /// Start a client-role transport on an ephemeral local port.
    pub async fn bind_client(pool: Arc<BufferPool>, logger: Logger) -> io::Result<Transport> {
        let logger = logger.new(o!("role" => "client"));
        Transport::bind_inner(
            "0.0.0.0:0".parse().unwrap(),
            Role::Client {
                handshake_started: None,
                server_addr: None,
            },
            pool,
            logger,
        )
        .await
    }

    /// Client-side: send a `Handshake` to `server_addr` carrying the
    /// bearer token. The resulting `Connected`/`Error("handshake
    /// timeout")` event arrives from a later `process_incoming` call.
    pub async fn connect(&mut self, server_addr: SocketAddr, token: &[u8]) -> Result<(), TransportError> {
        let Role::Client { handshake_started, server_addr: stored_addr } = &mut self.role else {
            return Err(TransportError::NotConnected);
        };

        let mut payload = Vec::with_capacity(4 + 2 + token.len());
        payload.extend_from_slice(&flux::PROTOCOL_MAGIC.to_le_bytes());
        payload.extend_from_slice(&flux::PROTOCOL_VERSION.to_le_bytes());
        payload.extend_from_slice(token);

        let packet = Packet {
            packet_type: PacketType::Handshake,
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            channel: ChannelType::Unreliable,
            payload: crate::pool::PooledBuffer::unpooled(payload),
        };
        self.send_raw(server_addr, &packet).await?;

        *handshake_started = Some(Instant::now());
        *stored_addr = Some(server_addr);
        Ok(())
    }

    async fn send_raw(&self, addr: SocketAddr, packet: &Packet) -> Result<(), TransportError> {
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        self.socket.send_to(&buf, addr).await?;
        Ok(())
    }

    /// Send application payload to an established connection on the
    /// given channel.
    pub async fn send(
        &mut self,
        connection_id: ConnectionId,
        channel: ChannelType,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let addr = self
            .connections
            .iter()
            .find(|(_, c)| c.id == connection_id)
            .map(|(addr, _)| *addr)
            .ok_or(TransportError::NotConnected)?;

        let conn = self.connections.get_mut(&addr).unwrap();
        let sequence = conn.next_sequence(channel);
        let packet = Packet {
            packet_type: PacketType::Data,
            sequence,
            ack: conn.inbound_ack.ack,
            ack_bits: conn.inbound_ack.ack_bits,
            channel,
            payload: crate::pool::PooledBuffer::unpooled(payload.clone()),
        };

        let mut buf = Vec::new();
        packet.encode(&mut buf);
        self.socket.send_to(&buf, addr).await?;

        let conn = self.connections.get_mut(&addr).unwrap();
        conn.last_send = Instant::now();
        if channel == ChannelType::Reliable {
            conn.track_reliable_send(sequence, payload, Instant::now());
        }
        Ok(())
    }

    /// Send `payload` on `channel` to every connected peer, optionally
    /// skipping those for which `except` returns true. The payload body
    /// is written into the wire buffer once; each recipient only gets a
    /// fresh header (its own sequence/ack state differs per connection)
    /// before the per-datagram socket send (spec §4.3 "Broadcast").
    pub async fn broadcast(
        &mut self,
        channel: ChannelType,
        payload: Vec<u8>,
        except: Option<&dyn Fn(ConnectionId) -> bool>,
    ) -> Vec<(ConnectionId, TransportError)> {
        let mut buf = Vec::with_capacity(crate::codec::HEADER_SIZE + payload.len());
        buf.resize(crate::codec::HEADER_SIZE, 0);
        buf.extend_from_slice(&payload);
        buf[0] = PacketType::Data as u8;
        buf[9] = channel as u8;
        LittleEndian::write_u32(&mut buf[10..14], payload.len() as u32);

        let recipients: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, c)| !except.map_or(false, |pred| pred(c.id)))
            .map(|(addr, _)| *addr)
            .collect();

        let mut errors = Vec::new();
        for addr in recipients {
            let (sequence, ack, ack_bits, connection_id) = {
                let conn = self.connections.get_mut(&addr).unwrap();
                (conn.next_sequence(channel), conn.inbound_ack.ack, conn.inbound_ack.ack_bits, conn.id)
            };

            LittleEndian::write_u16(&mut buf[1..3], sequence);
            LittleEndian::write_u16(&mut buf[3..5], ack);
            LittleEndian::write_u32(&mut buf[5..9], ack_bits);

            match self.socket.send_to(&buf, addr).await {
                Ok(_) => {
                    let conn = self.connections.get_mut(&addr).unwrap();
                    conn.last_send = Instant::now();
                    if channel == ChannelType::Reliable {
                        conn.track_reliable_send(sequence, payload.clone(), Instant::now());
                    }
                }
                Err(err) => errors.push((connection_id, TransportError::Io(err))),
            }
        }
        errors
    }

    /// Drain up to [`INBOUND_BATCH`] queued items and return the events
    /// the application should react to (spec §4.3 "ProcessIncoming").
    pub async fn process_incoming(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();

        for _ in 0..INBOUND_BATCH {
            let item = match self.inbound_rx.try_recv() {
                Ok(item) => item,
                Err(_) => break,
            };

            match item {
                RawEvent::Tick => self.on_tick(&mut events).await,
                RawEvent::Malformed { addr } => {
                    warn!(self.logger, "malformed packet"; "peer" => %addr);
                }
                RawEvent::Inbound { addr, packet } => self.on_inbound(addr, packet, &mut events).await,
            }
        }

        events
    }

    async fn on_inbound(&mut self, addr: SocketAddr, packet: Packet, events: &mut Vec<TransportEvent>) {
        if let Some(conn) = self.connections.get_mut(&addr) {
            conn.last_recv = Instant::now();
            self.dispatch_known(addr, packet, events).await;
            return;
        }

        match &self.role {
            Role::Server { max_clients, validator } => {
                if packet.packet_type != PacketType::Handshake {
                    // Any non-handshake packet from an unknown endpoint is dropped.
                    return;
                }
                if self.connections.len() >= *max_clients {
                    return;
                }
                if !accept_handshake(&packet, validator.as_ref()) {
                    return;
                }

                let connection_id = self.next_id;
                self.next_id += 1;
                let now = Instant::now();
                let mut conn = Connection::new(connection_id, addr, now);
                conn.state = ConnectionState::Connected;
                self.connections.insert(addr, conn);

                let ack_packet = Packet {
                    packet_type: PacketType::HandshakeAck,
                    sequence: 0,
                    ack: 0,
                    ack_bits: 0,
                    channel: ChannelType::Unreliable,
                    payload: crate::pool::PooledBuffer::unpooled(connection_id.to_le_bytes().to_vec()),
                };
                if self.send_raw(addr, &ack_packet).await.is_ok() {
                    info!(self.logger, "client connected"; "connection_id" => connection_id, "peer" => %addr);
                    events.push(TransportEvent::ClientConnected { connection_id, endpoint: addr });
                }
            }
            Role::Client { .. } => {
                if packet.packet_type != PacketType::HandshakeAck {
                    return;
                }
                self.accept_handshake_ack(addr, &packet, events);
            }
        }
    }

    fn accept_handshake_ack(&mut self, addr: SocketAddr, packet: &Packet, events: &mut Vec<TransportEvent>) {
        let Role::Client { handshake_started, server_addr } = &mut self.role else {
            return;
        };
        if *server_addr != Some(addr) || handshake_started.is_none() {
            return;
        }
        if packet.payload.len() < 8 {
            return;
        }
        let connection_id = LittleEndian::read_u64(&packet.payload[0..8]);

        let now = Instant::now();
        let mut conn = Connection::new(connection_id, addr, now);
        conn.state = ConnectionState::Connected;
        self.connections.insert(addr, conn);
        *handshake_started = None;

        info!(self.logger, "handshake acknowledged"; "connection_id" => connection_id);
        events.push(TransportEvent::Connected { connection_id });
    }

    async fn dispatch_known(&mut self, addr: SocketAddr, packet: Packet, events: &mut Vec<TransportEvent>) {
        let connection_id = self.connections.get(&addr).unwrap().id;

        {
            let conn = self.connections.get_mut(&addr).unwrap();
            // `inbound_ack` tracks only the Reliable channel's sequence
            // space (spec §4.3); the other channels keep independent
            // counters that would otherwise collide with it.
            if packet.packet_type == PacketType::Data && packet.channel == ChannelType::Reliable {
                conn.inbound_ack.observe(packet.sequence);
            }
            conn.apply_peer_ack(packet.ack, packet.ack_bits);
        }

        match packet.packet_type {
            PacketType::Ping => {
                let pong = Packet {
                    packet_type: PacketType::Pong,
                    sequence: 0,
                    ack: 0,
                    ack_bits: 0,
                    channel: ChannelType::Unreliable,
                    payload: crate::pool::PooledBuffer::unpooled(packet.payload.to_vec()),
                };
                let _ = self.send_raw(addr, &pong).await;
            }
            PacketType::Pong => {
                if packet.payload.len() >= 8 {
                    let sent_at = LittleEndian::read_u64(&packet.payload[0..8]);
                    let now = flux::time::timestamp_millis();
                    let conn = self.connections.get_mut(&addr).unwrap();
                    conn.smoothed_rtt = Duration::from_millis(now.saturating_sub(sent_at));
                }
            }
            PacketType::Data => {
                let delivered = match packet.channel {
                    ChannelType::Reliable => {
                        let conn = self.connections.get_mut(&addr).unwrap();
                        conn.receive_reliable(packet.sequence, packet.payload.to_vec())
                    }
                    ChannelType::Sequenced => {
                        let conn = self.connections.get_mut(&addr).unwrap();
                        if conn.receive_sequenced(packet.sequence) {
                            vec![packet.payload.to_vec()]
                        } else {
                            Vec::new()
                        }
                    }
                    ChannelType::Unreliable => vec![packet.payload.to_vec()],
                };
                for payload in delivered {
                    events.push(TransportEvent::Data { connection_id, channel: packet.channel, payload });
                }
            }
            PacketType::Disconnect => {
                self.connections.remove(&addr);
                info!(self.logger, "peer disconnected"; "connection_id" => connection_id);
                events.push(TransportEvent::ClientDisconnected {
                    connection_id,
                    reason: "Peer disconnect".to_string(),
                });
            }
            PacketType::Handshake | PacketType::HandshakeAck => {
                debug!(self.logger, "ignoring handshake packet from established peer"; "peer" => %addr);
            }
        }
    }

    async fn on_tick(&mut self, events: &mut Vec<TransportEvent>) {
        let now = Instant::now();

        if let Role::Client { handshake_started: Some(started), server_addr: Some(_) } = &self.role {
            if now.duration_since(*started) >= CLIENT_HANDSHAKE_TIMEOUT {
                events.push(TransportEvent::Error { message: "handshake timeout".to_string() });
                if let Role::Client { handshake_started, .. } = &mut self.role {
                    *handshake_started = None;
                }
            }
        }

        let dead: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_recv) >= HEARTBEAT_TIMEOUT)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in dead {
            if let Some(conn) = self.connections.remove(&addr) {
                warn!(self.logger, "heartbeat timeout"; "connection_id" => conn.id, "peer" => %addr);
                events.push(TransportEvent::ClientDisconnected {
                    connection_id: conn.id,
                    reason: "Heartbeat timeout".to_string(),
                });
            }
        }

        let idle: Vec<SocketAddr> = self
            .connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_send) >= HEARTBEAT_INTERVAL)
            .map(|(addr, _)| *addr)
            .collect();

        for addr in idle {
            let payload = flux::time::timestamp_millis().to_le_bytes().to_vec();
            let ping = Packet {
                packet_type: PacketType::Ping,
                sequence: 0,
                ack: 0,
                ack_bits: 0,
                channel: ChannelType::Unreliable,
                payload: crate::pool::PooledBuffer::unpooled(payload),
            };
            if self.send_raw(addr, &ping).await.is_ok() {
                if let Some(conn) = self.connections.get_mut(&addr) {
                    conn.last_send = now;
                }
            }
        }

        let mut retransmits: Vec<(SocketAddr, ConnectionId, Vec<(u16, Vec<u8>)>)> = Vec::new();
        let mut stalled: Vec<SocketAddr> = Vec::new();

        for (addr, conn) in self.connections.iter_mut() {
            match conn.due_retransmits(now) {
                Ok(due) if !due.is_empty() => retransmits.push((*addr, conn.id, due)),
                Ok(_) => {}
                Err(()) => stalled.push(*addr),
            }
        }

        for addr in stalled {
            if let Some(conn) = self.connections.remove(&addr) {
                warn!(self.logger, "reliable channel stalled"; "connection_id" => conn.id, "peer" => %addr);
                events.push(TransportEvent::ClientDisconnected {
                    connection_id: conn.id,
                    reason: "Reliable channel stalled".to_string(),
                });
            }
        }

        for (addr, connection_id, due) in retransmits {
            let (ack, ack_bits) = self
                .connections
                .get(&addr)
                .map(|c| (c.inbound_ack.ack, c.inbound_ack.ack_bits))
                .unwrap_or((0, 0));
            for (sequence, payload) in due {
                let packet = Packet {
                    packet_type: PacketType::Data,
                    sequence,
                    ack,
                    ack_bits,
                    channel: ChannelType::Reliable,
                    payload: crate::pool::PooledBuffer::unpooled(payload),
                };
                let _ = self.send_raw(addr, &packet).await;
            }
            debug!(self.logger, "retransmitted reliable backlog"; "connection_id" => connection_id);
        }
    }

    /// Cascade shutdown: stop the background tasks, emit a disconnect
    /// event for every live connection, and drop the connection table
    /// (spec §5 "Cancellation and shutdown").
    pub fn shutdown(&mut self) -> Vec<TransportEvent> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.connections
            .drain()
            .map(|(_, conn)| TransportEvent::ClientDisconnected {
                connection_id: conn.id,
                reason: "Server shutdown".to_string(),
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

fn accept_handshake(packet: &Packet, validator: &dyn TokenValidator) -> bool {
    if packet.payload.len() < 6 {
        return false;
    }
    let magic = LittleEndian::read_u32(&packet.payload[0..4]);
    if magic != flux::PROTOCOL_MAGIC {
        return false;
    }
    let version = LittleEndian::read_u16(&packet.payload[4..6]);
    if version != flux::PROTOCOL_VERSION {
        return false;
    }
    validator.validate(&packet.payload[6..])
}

fn spawn_receive_task(
    socket: Arc<UdpSocket>,
    pool: Arc<BufferPool>,
    tx: mpsc::Sender<RawEvent>,
    shutdown: Arc<AtomicBool>,
    logger: Logger,
) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 2048];
        loop {
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => match Packet::decode(&buf[..len], &pool) {
                    Ok(packet) => {
                        if tx.send(RawEvent::Inbound { addr, packet }).await.is_err() {
                            break;
                        }
                    }
                    Err(CodecError::MalformedPacket) => {
                        let _ = tx.send(RawEvent::Malformed { addr }).await;
                    }
                },
                Err(err) => {
                    warn!(logger, "socket receive error"; "error" => %err);
                }
            }
        }
    });
}

fn spawn_heartbeat_task(tx: mpsc::Sender<RawEvent>, shutdown: Arc<AtomicBool>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            if shutdown.load(Ordering::SeqCst) {
                break;
            }
            if tx.send(RawEvent::Tick).await.is_err() {
                break;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket as StdTokioUdpSocket;

    fn logger() -> Logger {
        flux::logging::discard()
    }

    async fn server() -> Transport {
        Transport::bind_server(
            "127.0.0.1:0".parse().unwrap(),
            16,
            Arc::new(AcceptAny),
            Arc::new(BufferPool::new()),
            logger(),
        )
        .await
        .unwrap()
    }

    async fn client() -> Transport {
        Transport::bind_client(Arc::new(BufferPool::new()), logger()).await.unwrap()
    }

    async fn drain_until<F>(transport: &mut Transport, mut found: F) -> Vec<TransportEvent>
    where
        F: FnMut(&[TransportEvent]) -> bool,
    {
        let mut collected = Vec::new();
        for _ in 0..200 {
            let events = transport.process_incoming().await;
            collected.extend(events);
            if found(&collected) {
                return collected;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        collected
    }

    #[tokio::test]
    async fn handshake_happy_path_connects_both_sides() {
        let mut srv = server().await;
        let mut cli = client().await;
        let srv_addr = srv.local_addr().unwrap();

        cli.connect(srv_addr, b"demo-token").await.unwrap();

        let srv_events = drain_until(&mut srv, |e| e.iter().any(|ev| matches!(ev, TransportEvent::ClientConnected { .. }))).await;
        assert!(srv_events.iter().any(|ev| matches!(ev, TransportEvent::ClientConnected { .. })));
        assert_eq!(srv.connection_count(), 1);

        let cli_events = drain_until(&mut cli, |e| e.iter().any(|ev| matches!(ev, TransportEvent::Connected { .. }))).await;
        assert!(cli_events.iter().any(|ev| matches!(ev, TransportEvent::Connected { .. })));
    }

    #[tokio::test]
    async fn handshake_rejected_for_bad_magic() {
        let mut srv = server().await;
        let srv_addr = srv.local_addr().unwrap();

        let raw = StdTokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        // Wrong magic, correct version, non-empty token: should be silently dropped.
        let mut payload = Vec::new();
        payload.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        payload.extend_from_slice(&flux::PROTOCOL_VERSION.to_le_bytes());
        payload.extend_from_slice(b"token");

        let packet = Packet {
            packet_type: PacketType::Handshake,
            sequence: 0,
            ack: 0,
            ack_bits: 0,
            channel: ChannelType::Unreliable,
            payload: crate::pool::PooledBuffer::unpooled(payload),
        };
        let mut buf = Vec::new();
        packet.encode(&mut buf);
        raw.send_to(&buf, srv_addr).await.unwrap();

        let mut events = Vec::new();
        for _ in 0..20 {
            events.extend(srv.process_incoming().await);
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(events.is_empty());
        assert_eq!(srv.connection_count(), 0);
    }

    #[tokio::test]
    async fn data_exchanged_after_handshake_on_unreliable_channel() {
        let mut srv = server().await;
        let mut cli = client().await;
        let srv_addr = srv.local_addr().unwrap();

        cli.connect(srv_addr, b"demo-token").await.unwrap();
        let srv_events = drain_until(&mut srv, |e| e.iter().any(|ev| matches!(ev, TransportEvent::ClientConnected { .. }))).await;
        let server_connection_id = srv_events
            .iter()
            .find_map(|ev| match ev {
                TransportEvent::ClientConnected { connection_id, .. } => Some(*connection_id),
                _ => None,
            })
            .unwrap();

        let cli_events = drain_until(&mut cli, |e| e.iter().any(|ev| matches!(ev, TransportEvent::Connected { .. }))).await;
        let client_connection_id = cli_events
            .iter()
            .find_map(|ev| match ev {
                TransportEvent::Connected { connection_id } => Some(*connection_id),
                _ => None,
            })
            .unwrap();

        cli.send(client_connection_id, ChannelType::Unreliable, b"hello server".to_vec())
            .await
            .unwrap();

        let srv_events = drain_until(&mut srv, |e| e.iter().any(|ev| matches!(ev, TransportEvent::Data { .. }))).await;
        let payload = srv_events.iter().find_map(|ev| match ev {
            TransportEvent::Data { connection_id, payload, .. } if *connection_id == server_connection_id => {
                Some(payload.clone())
            }
            _ => None,
        });
        assert_eq!(payload.as_deref(), Some(b"hello server".as_slice()));
    }

    #[tokio::test]
    async fn heartbeat_timeout_disconnects_silent_peer() {
        let mut srv = server().await;

        // Inject a connection whose bookkeeping already looks stale,
        // rather than waiting out the real `HEARTBEAT_TIMEOUT` — the
        // heartbeat ticker only needs to fire once for `on_tick` to
        // reap it.
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let ancient = Instant::now()
            .checked_sub(HEARTBEAT_TIMEOUT + Duration::from_secs(1))
            .unwrap();
        let mut conn = Connection::new(4242, addr, ancient);
        conn.state = ConnectionState::Connected;
        srv.connections.insert(addr, conn);
        assert_eq!(srv.connection_count(), 1);

        let events = drain_until(&mut srv, |e| e.iter().any(|ev| matches!(ev, TransportEvent::ClientDisconnected { .. }))).await;
        assert!(events.iter().any(|ev| matches!(ev, TransportEvent::ClientDisconnected { reason, .. } if reason == "Heartbeat timeout")));
        assert_eq!(srv.connection_count(), 0);
    }

    /// A lossy relay sitting between client and server: the first
    /// Reliable Data packet it sees from the client is swallowed once,
    /// forcing the sender's retransmit backoff to kick in (spec §8
    /// scenario "reliable delivery under loss").
    async fn spawn_lossy_relay(srv_addr: SocketAddr) -> SocketAddr {
        let proxy = StdTokioUdpSocket::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        let dropped_once = Arc::new(AtomicBool::new(false));
        let client_addr: Arc<std::sync::Mutex<Option<SocketAddr>>> = Arc::new(std::sync::Mutex::new(None));

        tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                let (len, from) = match proxy.recv_from(&mut buf).await {
                    Ok(v) => v,
                    Err(_) => break,
                };
                if from == srv_addr {
                    let target = *client_addr.lock().unwrap();
                    if let Some(target) = target {
                        let _ = proxy.send_to(&buf[..len], target).await;
                    }
                    continue;
                }

                *client_addr.lock().unwrap() = Some(from);
                let is_reliable_data =
                    len >= crate::codec::HEADER_SIZE && buf[0] == PacketType::Data as u8 && buf[9] == ChannelType::Reliable as u8;
                if is_reliable_data && !dropped_once.swap(true, Ordering::SeqCst) {
                    continue;
                }
                let _ = proxy.send_to(&buf[..len], srv_addr).await;
            }
        });

        proxy_addr
    }

    #[tokio::test]
    async fn reliable_delivery_survives_simulated_packet_loss() {
        let mut srv = server().await;
        let mut cli = client().await;
        let srv_addr = srv.local_addr().unwrap();
        let proxy_addr = spawn_lossy_relay(srv_addr).await;

        cli.connect(proxy_addr, b"demo-token").await.unwrap();

        let srv_events = drain_until(&mut srv, |e| e.iter().any(|ev| matches!(ev, TransportEvent::ClientConnected { .. }))).await;
        let server_connection_id = srv_events
            .iter()
            .find_map(|ev| match ev {
                TransportEvent::ClientConnected { connection_id, .. } => Some(*connection_id),
                _ => None,
            })
            .unwrap();

        let cli_events = drain_until(&mut cli, |e| e.iter().any(|ev| matches!(ev, TransportEvent::Connected { .. }))).await;
        let client_connection_id = cli_events
            .iter()
            .find_map(|ev| match ev {
                TransportEvent::Connected { connection_id } => Some(*connection_id),
                _ => None,
            })
            .unwrap();

        cli.send(client_connection_id, ChannelType::Reliable, b"reliable payload".to_vec())
            .await
            .unwrap();

        // The relay drops the first attempt; the sender's retransmit
        // backoff (100ms initial) must eventually redeliver it, so poll
        // longer than a single `drain_until` window.
        let mut collected = Vec::new();
        for _ in 0..100 {
            collected.extend(srv.process_incoming().await);
            collected.extend(cli.process_incoming().await);
            if collected.iter().any(|ev| matches!(ev, TransportEvent::Data { .. })) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let payload = collected.iter().find_map(|ev| match ev {
            TransportEvent::Data { connection_id, channel, payload } if *connection_id == server_connection_id && *channel == ChannelType::Reliable => {
                Some(payload.clone())
            }
            _ => None,
        });
        assert_eq!(payload.as_deref(), Some(b"reliable payload".as_slice()));
    }
}
