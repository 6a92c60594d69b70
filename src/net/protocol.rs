use serde::{Deserialize, Serialize};

use crate::arena::player::is_valid_nickname;
use crate::arena::{ArenaDelta, ArenaInit, PlayerDelta};
use crate::constants::net::{MAX_CHAT_LEN, MAX_MESSAGE_SIZE, MAX_RCON_LEN};
use crate::sky::plane::Action;
use crate::sky::{ParticipationInput, SkyDelta, SkyInit};
use crate::util::{Pid, Time, VerifyStructure};

/// Packets from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientPacket {
    /// Latency measurement, answered with `ServerPacket::Pong`
    Ping { time: Time },
    /// Join the arena under the requested nickname
    ReqJoin(String),
    /// Change own nickname or team
    ReqPlayerDelta(PlayerDelta),
    ReqAction { action: Action, state: bool },
    /// Client-authoritative state of the own participation
    ReqInput(ParticipationInput),
    ReqSpawn,
    ReqKill,
    Chat(String),
    RCon(String),
    /// Answer to a server ping
    Pong { ping_time: Time, pong_time: Time },
}

/// Packets from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerPacket {
    Ping { time: Time },
    Pong { ping_time: Time, pong_time: Time },
    /// Full snapshot sent to a client once it has joined
    Init {
        pid: Pid,
        arena: ArenaInit,
        sky: SkyInit,
    },
    DeltaArena(ArenaDelta),
    DeltaSky(SkyDelta),
    /// Chat relayed from player `pid`
    Chat { pid: Pid, message: String },
    Broadcast(String),
    /// RCon output for the requesting client
    RCon(String),
}

fn is_valid_text(text: &str, max_len: usize) -> bool {
    !text.trim().is_empty() && text.chars().count() <= max_len
}

impl VerifyStructure for ClientPacket {
    fn verify_structure(&self) -> bool {
        match self {
            ClientPacket::Ping { time } => time.is_finite(),
            ClientPacket::Pong { ping_time, pong_time } => ping_time.is_finite() && pong_time.is_finite(),
            ClientPacket::ReqJoin(nickname) => is_valid_nickname(nickname),
            ClientPacket::ReqPlayerDelta(delta) => delta.verify_structure(),
            ClientPacket::ReqInput(input) => input.verify_structure(),
            ClientPacket::Chat(message) => is_valid_text(message, MAX_CHAT_LEN),
            ClientPacket::RCon(command) => is_valid_text(command, MAX_RCON_LEN),
            ClientPacket::ReqAction { .. } | ClientPacket::ReqSpawn | ClientPacket::ReqKill => true,
        }
    }
}

impl VerifyStructure for ServerPacket {
    fn verify_structure(&self) -> bool {
        match self {
            ServerPacket::Ping { time } => time.is_finite(),
            ServerPacket::Pong { ping_time, pong_time } => ping_time.is_finite() && pong_time.is_finite(),
            ServerPacket::Init { pid, arena, sky } => {
                arena.players.contains_key(pid) && arena.verify_structure() && sky.verify_structure()
            }
            ServerPacket::DeltaArena(delta) => delta.verify_structure(),
            ServerPacket::DeltaSky(delta) => delta.verify_structure(),
            ServerPacket::Chat { message, .. } => is_valid_text(message, MAX_CHAT_LEN),
            ServerPacket::Broadcast(_) | ServerPacket::RCon(_) => true,
        }
    }
}

/// Encode a packet using bincode
/// Uses legacy config for fixed-size integers
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a packet using bincode
/// Uses legacy config for fixed-size integers. Length prefixes are checked
/// against `MAX_MESSAGE_SIZE` before anything is allocated.
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    let config = bincode::config::legacy().with_limit::<{ MAX_MESSAGE_SIZE }>();
    bincode::serde::decode_from_slice(data, config)
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
