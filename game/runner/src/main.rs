mod session;
mod validator;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Arg, Command};
use flux::token::TokenSecret;
use gamecore::config::GameConfig;
use gamecore::wire::{decode_input_command, encode_state_snapshot};
use neutronium::codec::ChannelType;
use neutronium::pool::BufferPool;
use neutronium::transport::{Transport, TransportEvent};
use session::PlayerSession;
use slog::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use validator::SharedSecretValidator;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let matches = Command::new("Game Server")
        .version("1.0")
        .about("Runs the authoritative XL4Net game server.")
        .arg(Arg::new("CONFIG_FILE").help("Path to the config file").required(true))
        .get_matches();

    let config_path = matches.get_one::<String>("CONFIG_FILE").unwrap();
    let config = GameConfig::load(config_path)?;

    let logger = flux::logging::init(sloggers::types::Severity::Info);
    info!(logger, "starting game server"; "bind_address" => &config.server.bind_address);

    let secret_bytes = STANDARD.decode(&config.server.token_secret_base64)?;
    let secret = TokenSecret::new(secret_bytes);
    let validator = Arc::new(SharedSecretValidator::new(secret));
    let pool = Arc::new(BufferPool::new());

    let bind_addr = config.server.bind_address.parse()?;
    let mut transport = Transport::bind_server(bind_addr, config.server.max_clients, validator, pool, logger.clone()).await?;

    let mut sessions: HashMap<u64, PlayerSession> = HashMap::new();
    let mut tick: u32 = 0;
    let mut ticker = tokio::time::interval(Duration::from_secs_f32(config.prediction.tick_delta()));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tick = tick.wrapping_add(1);
                let events = transport.process_incoming().await;
                for event in events {
                    handle_event(&mut transport, &mut sessions, &config, tick, event, &logger).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(logger, "shutdown signal received");
                break;
            }
        }
    }

    for event in transport.shutdown() {
        if let TransportEvent::ClientDisconnected { connection_id, reason } = event {
            info!(logger, "closing connection on shutdown"; "connection_id" => connection_id, "reason" => reason);
        }
    }

    Ok(())
}

async fn handle_event(
    transport: &mut Transport,
    sessions: &mut HashMap<u64, PlayerSession>,
    config: &GameConfig,
    tick: u32,
    event: TransportEvent,
    logger: &slog::Logger,
) {
    match event {
        TransportEvent::ClientConnected { connection_id, endpoint } => {
            sessions.insert(connection_id, PlayerSession::new(tick));
            info!(logger, "player joined"; "connection_id" => connection_id, "peer" => %endpoint);
        }
        TransportEvent::ClientDisconnected { connection_id, reason } => {
            sessions.remove(&connection_id);
            info!(logger, "player left"; "connection_id" => connection_id, "reason" => reason);
        }
        TransportEvent::Connected { .. } => {
            // Server transports never emit the client-side `Connected` event.
        }
        TransportEvent::Error { message } => {
            warn!(logger, "transport error"; "message" => message);
        }
        TransportEvent::Data { connection_id, channel: _, payload } => {
            let Some(session) = sessions.get_mut(&connection_id) else {
                return;
            };
            let cmd = match decode_input_command(&payload) {
                Ok(cmd) => cmd,
                Err(_) => {
                    warn!(logger, "malformed input command"; "connection_id" => connection_id);
                    return;
                }
            };
            if cmd.sequence_number <= session.last_input_sequence && session.last_input_sequence != 0 {
                return;
            }
            session.last_input_sequence = cmd.sequence_number;

            let dt = config.prediction.tick_delta();
            let mut next_state = gamecore::execute(&session.state, &cmd, &config.movement, dt);
            next_state.tick = tick;
            next_state.last_processed_input = cmd.sequence_number;
            session.state = next_state;

            let mut buf = Vec::new();
            encode_state_snapshot(&session.state, &mut buf);
            let _ = transport.send(connection_id, ChannelType::Sequenced, buf).await;
        }
    }
}
