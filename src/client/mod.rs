//! Headless replicating client.
//!
//! Mirrors the server's arena and sky from `Init` and the delta stream,
//! simulates its own plane locally and reports it back as input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::arena::{Arena, PlayerDelta, Team};
use crate::net::{ClientPacket, ClientTelegraph, Delivery, Host, HostEvent, PeerId, ServerPacket, TelegraphError};
use crate::sky::plane::Action;
use crate::sky::SkyHandle;
use crate::util::{Networked, Pid, Time, TimeDiff};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Not connected to a server")]
    NotConnected,
    #[error("Not joined to the arena")]
    NotJoined,
    #[error(transparent)]
    Telegraph(#[from] TelegraphError),
}

/// Text received from the server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Chat { pid: Pid, message: String },
    Broadcast(String),
    RCon(String),
}

/// State mirrored once the server accepted the join
struct Joined {
    pid: Pid,
    arena: Arena,
    sky: Arc<Mutex<SkyHandle>>,
}

pub struct Client {
    host: Host,
    server: Option<PeerId>,
    telegraph: ClientTelegraph,
    joined: Option<Joined>,
    messages: Vec<ClientMessage>,
    clock: Instant,
    round_trip: Option<Time>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            host: Host::new(),
            server: None,
            telegraph: ClientTelegraph::new(),
            joined: None,
            messages: Vec::new(),
            clock: Instant::now(),
            round_trip: None,
        }
    }

    /// Connect to an in-process server host
    pub fn connect_to(&mut self, server: &mut Host) {
        let (_, server_peer) = Host::connect_loopback(server, &mut self.host);
        self.server = Some(server_peer);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn is_connected(&self) -> bool {
        self.server.is_some()
    }

    pub fn is_joined(&self) -> bool {
        self.joined.is_some()
    }

    pub fn pid(&self) -> Option<Pid> {
        self.joined.as_ref().map(|j| j.pid)
    }

    pub fn arena(&self) -> Option<&Arena> {
        self.joined.as_ref().map(|j| &j.arena)
    }

    pub fn sky(&self) -> Option<MutexGuard<'_, SkyHandle>> {
        self.joined.as_ref().map(|j| j.sky.lock())
    }

    pub fn messages(&self) -> &[ClientMessage] {
        &self.messages
    }

    pub fn take_messages(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.messages)
    }

    /// Last measured round trip to the server, in seconds
    pub fn round_trip(&self) -> Option<Time> {
        self.round_trip
    }

    fn now(&self) -> Time {
        self.clock.elapsed().as_secs_f64()
    }

    // ========================================================================
    // Requests
    // ========================================================================

    fn send(&self, packet: &ClientPacket, delivery: Delivery) -> Result<(), ClientError> {
        let server = self.server.ok_or(ClientError::NotConnected)?;
        self.telegraph.transmit(&self.host, server, packet, delivery)?;
        Ok(())
    }

    pub fn join(&self, nickname: &str) -> Result<(), ClientError> {
        self.send(&ClientPacket::ReqJoin(nickname.to_string()), Delivery::Reliable)
    }

    pub fn ping(&self) -> Result<(), ClientError> {
        self.send(&ClientPacket::Ping { time: self.now() }, Delivery::Unreliable)
    }

    pub fn request_spawn(&self) -> Result<(), ClientError> {
        self.send(&ClientPacket::ReqSpawn, Delivery::Reliable)
    }

    pub fn request_kill(&self) -> Result<(), ClientError> {
        self.send(&ClientPacket::ReqKill, Delivery::Reliable)
    }

    /// Press or release an action locally and on the server
    pub fn do_action(&mut self, action: Action, state: bool) -> Result<(), ClientError> {
        let joined = self.joined.as_mut().ok_or(ClientError::NotJoined)?;
        joined.arena.do_action(joined.pid, action, state);
        self.send(&ClientPacket::ReqAction { action, state }, Delivery::Reliable)
    }

    pub fn request_nickname(&self, nickname: &str) -> Result<(), ClientError> {
        let delta = self.own_delta()?.with_nickname(nickname);
        self.send(&ClientPacket::ReqPlayerDelta(delta), Delivery::Reliable)
    }

    pub fn request_team(&self, team: Team) -> Result<(), ClientError> {
        let delta = self.own_delta()?.with_team(team);
        self.send(&ClientPacket::ReqPlayerDelta(delta), Delivery::Reliable)
    }

    fn own_delta(&self) -> Result<PlayerDelta, ClientError> {
        let joined = self.joined.as_ref().ok_or(ClientError::NotJoined)?;
        let player = joined.arena.get_player(joined.pid).ok_or(ClientError::NotJoined)?;
        Ok(PlayerDelta::zero(player))
    }

    pub fn chat(&self, message: &str) -> Result<(), ClientError> {
        self.send(&ClientPacket::Chat(message.to_string()), Delivery::Reliable)
    }

    pub fn rcon(&self, command: &str) -> Result<(), ClientError> {
        self.send(&ClientPacket::RCon(command.to_string()), Delivery::Reliable)
    }

    // ========================================================================
    // Event loop
    // ========================================================================

    /// Handle every event already queued, waiting at most `timeout` for the first
    pub fn poll(&mut self, timeout: Duration) {
        let mut wait = timeout;
        while let Some(event) = self.host.poll(wait) {
            wait = Duration::ZERO;
            match event {
                HostEvent::Connect(peer) => debug!("Connected to server peer {}", peer),
                HostEvent::Disconnect(peer) => {
                    if self.server == Some(peer) {
                        info!("Disconnected from server");
                        self.server = None;
                        self.joined = None;
                    }
                }
                HostEvent::Receive { data, .. } => match self.telegraph.receive(&data) {
                    Ok(packet) => self.handle_packet(packet),
                    Err(e) => debug!("Dropping server packet: {}", e),
                },
            }
        }
    }

    fn handle_packet(&mut self, packet: ServerPacket) {
        match packet {
            ServerPacket::Init { pid, arena, sky } => {
                let mut arena = Arena::new(&arena);
                let sky = SkyHandle::attach(&mut arena, Some(&sky));
                info!("Joined arena '{}' as player {}", arena.name(), pid);
                self.joined = Some(Joined { pid, arena, sky });
            }
            ServerPacket::DeltaArena(delta) => {
                if let Some(joined) = self.joined.as_mut() {
                    joined.arena.apply_delta(&delta);
                }
            }
            ServerPacket::DeltaSky(delta) => {
                if let Some(joined) = self.joined.as_ref() {
                    joined.sky.lock().apply_delta(&delta);
                }
            }
            ServerPacket::Ping { time } => {
                let pong = ClientPacket::Pong {
                    ping_time: time,
                    pong_time: self.now(),
                };
                if let Err(e) = self.send(&pong, Delivery::Unreliable) {
                    debug!("Failed to answer ping: {}", e);
                }
            }
            ServerPacket::Pong { ping_time, .. } => {
                self.round_trip = Some(self.now() - ping_time);
            }
            ServerPacket::Chat { pid, message } => self.messages.push(ClientMessage::Chat { pid, message }),
            ServerPacket::Broadcast(message) => self.messages.push(ClientMessage::Broadcast(message)),
            ServerPacket::RCon(message) => self.messages.push(ClientMessage::RCon(message)),
        }
    }

    /// Simulate locally and report the own plane to the server
    pub fn tick(&mut self, delta: TimeDiff) -> Result<(), ClientError> {
        let Some(joined) = self.joined.as_mut() else {
            return Ok(());
        };
        joined.arena.tick(delta);

        let Some(player) = joined.arena.get_player(joined.pid) else {
            return Ok(());
        };
        let input = joined
            .sky
            .lock()
            .sky_mut()
            .and_then(|sky| sky.collect_input(player));
        if let Some(input) = input {
            self.send(&ClientPacket::ReqInput(input), Delivery::Unreliable)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ArenaMode;
    use crate::config::ServerConfig;
    use crate::metrics::Metrics;
    use crate::server::Server;

    const WAIT: Duration = Duration::from_millis(20);

    fn pump(server: &mut Server, clients: &mut [&mut Client]) {
        for _ in 0..3 {
            server.poll(WAIT);
            for client in clients.iter_mut() {
                client.poll(WAIT);
            }
        }
    }

    fn setup() -> (Server, Client) {
        let mut server = Server::new(ServerConfig::default(), Host::new(), Arc::new(Metrics::new()));
        let mut client = Client::new();
        client.connect_to(server.host_mut());
        pump(&mut server, &mut [&mut client]);
        (server, client)
    }

    #[test]
    fn test_requests_need_connection() {
        let client = Client::new();
        assert!(matches!(client.join("x"), Err(ClientError::NotConnected)));
        assert!(matches!(client.request_team(1), Err(ClientError::NotJoined)));
    }

    #[test]
    fn test_join_mirrors_arena() {
        let (mut server, mut client) = setup();
        client.join("pilot").unwrap();
        pump(&mut server, &mut [&mut client]);

        assert_eq!(client.pid(), Some(0));
        assert_eq!(
            client.arena().unwrap().capture_initializer(),
            server.arena().capture_initializer()
        );
    }

    #[test]
    fn test_game_start_creates_sky() {
        let (mut server, mut client) = setup();
        client.join("pilot").unwrap();
        pump(&mut server, &mut [&mut client]);

        server.set_mode(ArenaMode::Game);
        server.tick(0.01);
        pump(&mut server, &mut [&mut client]);

        let handle = client.sky().unwrap();
        let sky = handle.sky().unwrap();
        assert_eq!(sky.home_bases().len(), 2);
    }

    #[test]
    fn test_ping_round_trip() {
        let (mut server, mut client) = setup();
        client.ping().unwrap();
        pump(&mut server, &mut [&mut client]);
        assert!(client.round_trip().unwrap() >= 0.0);
    }

    #[test]
    fn test_chat_reaches_sender() {
        let (mut server, mut client) = setup();
        client.join("pilot").unwrap();
        pump(&mut server, &mut [&mut client]);

        client.chat("hello").unwrap();
        pump(&mut server, &mut [&mut client]);
        assert_eq!(
            client.take_messages(),
            vec![ClientMessage::Chat {
                pid: 0,
                message: "hello".into()
            }]
        );
    }

    #[test]
    fn test_server_drop_disconnects() {
        let (server, mut client) = setup();
        drop(server);
        client.poll(WAIT);
        assert!(!client.is_connected());
    }
}
