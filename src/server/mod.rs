//! Authoritative game server.
//!
//! The server owns the arena, the sky handle and the packet host on a
//! single simulation thread. Each cycle polls the host until the next tick
//! deadline, then advances the simulation and replicates the changes.

pub mod latency;
pub mod rcon;
pub mod validator;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use rand::Rng;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::arena::player::team;
use crate::arena::{Arena, ArenaDelta, ArenaEvent, ArenaInit, ArenaMode, PlayerDelta, TracingLogger};
use crate::config::ServerConfig;
use crate::constants::{combat, entity, explosion, timing, world};
use crate::metrics::Metrics;
use crate::net::{ClientPacket, Delivery, Host, HostEvent, PeerId, ServerPacket, ServerTelegraph};
use crate::sky::entity::EntityState;
use crate::sky::home_base::HomeBaseState;
use crate::sky::physics::{BodyTag, Contact, ContactKind, PhysicalState};
use crate::sky::plane::{Action, PlaneTuning};
use crate::sky::{ParticipationInput, Sky, SkyHandle};
use crate::util::{Networked, Pid, Time, TimeDiff, Vec2};

use latency::LatencyTracker;
use rcon::{RconCommand, RconError, HELP};
use validator::InputValidator;

pub struct Server {
    config: ServerConfig,
    arena: Arena,
    sky: Arc<Mutex<SkyHandle>>,
    latency: Arc<Mutex<LatencyTracker>>,
    host: Host,
    telegraph: ServerTelegraph,
    /// Every connected peer, with its player once joined
    clients: FxHashMap<PeerId, Option<Pid>>,
    validator: InputValidator,
    metrics: Arc<Metrics>,
    tuning: PlaneTuning,
    clock: Instant,
    ping_timer: TimeDiff,
    latency_timer: TimeDiff,
}

impl Server {
    pub fn new(config: ServerConfig, host: Host, metrics: Arc<Metrics>) -> Self {
        let mut init = ArenaInit::new(config.arena_name.clone(), config.arena_environment.clone());
        init.motd = config.arena_motd.clone();

        let mut arena = Arena::new(&init);
        arena.add_logger(Box::new(TracingLogger::new(config.arena_name.clone())));
        let sky = SkyHandle::attach(&mut arena, None);
        let latency = Arc::new(Mutex::new(LatencyTracker::new()));
        arena.attach(Arc::clone(&latency));

        Self {
            config,
            arena,
            sky,
            latency,
            host,
            telegraph: ServerTelegraph::new(),
            clients: FxHashMap::default(),
            validator: InputValidator::default(),
            metrics,
            tuning: PlaneTuning::default(),
            clock: Instant::now(),
            ping_timer: 0.0,
            latency_timer: 0.0,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn sky(&self) -> MutexGuard<'_, SkyHandle> {
        self.sky.lock()
    }

    pub fn host_mut(&mut self) -> &mut Host {
        &mut self.host
    }

    pub fn tuning(&self) -> &PlaneTuning {
        &self.tuning
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Seconds since the server started
    pub fn now(&self) -> Time {
        self.clock.elapsed().as_secs_f64()
    }

    fn joined_peers(&self) -> Vec<PeerId> {
        self.clients
            .iter()
            .filter_map(|(peer, pid)| pid.map(|_| *peer))
            .collect()
    }

    fn peer_of(&self, pid: Pid) -> Option<PeerId> {
        self.clients
            .iter()
            .find_map(|(peer, p)| (*p == Some(pid)).then_some(*peer))
    }

    // ========================================================================
    // Sending
    // ========================================================================

    fn send(&self, peer: PeerId, packet: &ServerPacket, delivery: Delivery) {
        match self.telegraph.transmit(&self.host, peer, packet, delivery) {
            Ok(size) => self.metrics.record_sent(size),
            Err(e) => debug!("Failed to send to peer {}: {}", peer, e),
        }
    }

    /// Send to every joined player
    fn broadcast(&self, packet: &ServerPacket, delivery: Delivery) {
        match self
            .telegraph
            .transmit_to(&self.host, self.joined_peers(), packet, delivery)
        {
            Ok(sent) => {
                for _ in 0..sent.peers {
                    self.metrics.record_sent(sent.size);
                }
            }
            Err(e) => warn!("Failed to encode broadcast: {}", e),
        }
    }

    /// Apply an arena delta locally and replicate it
    fn apply_and_broadcast(&mut self, delta: ArenaDelta) {
        self.arena.apply_delta(&delta);
        self.broadcast(&ServerPacket::DeltaArena(delta), Delivery::Reliable);
    }

    fn announce(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.arena.log_event(ArenaEvent::Broadcast(message.clone()));
        self.broadcast(&ServerPacket::Broadcast(message), Delivery::Reliable);
    }

    // ========================================================================
    // Polling
    // ========================================================================

    /// Handle host events for at most `timeout`
    pub fn poll(&mut self, timeout: Duration) {
        self.poll_until(Instant::now() + timeout);
    }

    /// Handle host events until `deadline`
    pub fn poll_until(&mut self, deadline: Instant) {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let Some(event) = self.host.poll(remaining) else {
                break;
            };
            self.handle_event(event);
            if remaining.is_zero() {
                break;
            }
        }
    }

    fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Connect(peer) => {
                debug!("Peer {} connected", peer);
                self.clients.insert(peer, None);
            }
            HostEvent::Disconnect(peer) => {
                debug!("Peer {} disconnected", peer);
                if let Some(Some(pid)) = self.clients.remove(&peer) {
                    self.apply_and_broadcast(ArenaDelta::Quit(pid));
                }
            }
            HostEvent::Receive { peer, data } => {
                self.metrics.record_received(data.len());
                match self.telegraph.receive(&data) {
                    Ok(packet) => self.handle_packet(peer, packet),
                    Err(e) => {
                        debug!("Dropping packet from peer {}: {}", peer, e);
                        self.metrics.record_malformed();
                    }
                }
            }
        }
    }

    fn handle_packet(&mut self, peer: PeerId, packet: ClientPacket) {
        let Some(joined) = self.clients.get(&peer).copied() else {
            return;
        };

        match (packet, joined) {
            (ClientPacket::Ping { time }, _) => {
                let pong = ServerPacket::Pong {
                    ping_time: time,
                    pong_time: self.now(),
                };
                self.send(peer, &pong, Delivery::Unreliable);
            }
            (ClientPacket::ReqJoin(nickname), None) => self.join(peer, &nickname),
            (ClientPacket::ReqJoin(_), Some(pid)) => {
                debug!("Player {} asked to join twice", pid);
            }
            (packet, Some(pid)) => self.handle_player_packet(peer, pid, packet),
            (packet, None) => {
                debug!("Ignoring {:?} from peer {} before join", packet, peer);
            }
        }
    }

    fn join(&mut self, peer: PeerId, nickname: &str) {
        if self.arena.player_count() >= self.config.max_players {
            info!("Rejecting peer {}: arena full", peer);
            self.send(peer, &ServerPacket::Broadcast("The arena is full".into()), Delivery::Reliable);
            self.host.disconnect(peer);
            return;
        }

        let delta = self.arena.connect_player(nickname);
        let ArenaDelta::Join(init) = &delta else {
            return;
        };
        let pid = init.pid;
        info!("Peer {} joined as player {} ({})", peer, pid, init.nickname);

        self.broadcast(&ServerPacket::DeltaArena(delta), Delivery::Reliable);
        self.clients.insert(peer, Some(pid));

        let init = ServerPacket::Init {
            pid,
            arena: self.arena.capture_initializer(),
            sky: self.sky.lock().capture_initializer(),
        };
        self.send(peer, &init, Delivery::Reliable);
    }

    fn handle_player_packet(&mut self, peer: PeerId, pid: Pid, packet: ClientPacket) {
        match packet {
            ClientPacket::Pong { ping_time, pong_time } => {
                let now = self.now();
                self.latency.lock().register_pong(pid, ping_time, pong_time, now);
            }
            ClientPacket::ReqPlayerDelta(requested) => self.change_player(pid, &requested),
            ClientPacket::ReqAction { action, state } => {
                if action == Action::Suicide && state {
                    self.kill(pid);
                } else {
                    self.arena.do_action(pid, action, state);
                }
            }
            ClientPacket::ReqInput(input) => self.apply_input(pid, &input),
            ClientPacket::ReqSpawn => self.spawn(pid),
            ClientPacket::ReqKill => self.kill(pid),
            ClientPacket::Chat(message) => {
                if let Some(player) = self.arena.get_player(pid) {
                    let event = ArenaEvent::Chat {
                        nickname: player.nickname().to_string(),
                        message: message.clone(),
                    };
                    self.arena.log_event(event);
                }
                self.broadcast(&ServerPacket::Chat { pid, message }, Delivery::Reliable);
            }
            ClientPacket::RCon(line) => {
                let reply = match self.rcon(pid, &line) {
                    Ok(output) => output,
                    Err(e) => e.to_string(),
                };
                self.send(peer, &ServerPacket::RCon(reply), Delivery::Reliable);
            }
            ClientPacket::Ping { .. } | ClientPacket::ReqJoin(_) => {}
        }
    }

    // ========================================================================
    // Player requests
    // ========================================================================

    /// Only nickname and team are client-changeable
    fn change_player(&mut self, pid: Pid, requested: &PlayerDelta) {
        let Some(player) = self.arena.get_player(pid) else {
            return;
        };
        let mut delta = PlayerDelta::zero(player);
        if let Some(nickname) = &requested.nickname {
            let nickname = self.arena.alloc_new_nickname(pid, nickname);
            if nickname != player.nickname() {
                delta.nickname = Some(nickname);
            }
        }
        if let Some(team) = requested.team {
            if team != player.team() {
                delta.team = Some(team);
            }
        }
        if delta.nickname.is_some() || delta.team.is_some() {
            self.apply_and_broadcast(ArenaDelta::player(pid, delta));
        }
    }

    fn apply_input(&mut self, pid: Pid, input: &ParticipationInput) {
        let Some(player) = self.arena.get_player(pid) else {
            return;
        };
        let mut handle = self.sky.lock();
        let Some(sky) = handle.sky_mut() else {
            return;
        };
        let current = sky
            .participation(player)
            .and_then(|p| p.plane())
            .map(|plane| *plane.state());

        match self.validator.validate_input(input, current.as_ref()) {
            Ok(()) => sky.apply_input(player, input),
            Err(violation) => {
                warn!("Rejected input from player {}: {}", pid, violation);
                self.metrics.record_input_violation();
            }
        }
    }

    fn spawn(&mut self, pid: Pid) {
        if self.arena.mode() != ArenaMode::Game {
            debug!("Player {} cannot spawn outside a game", pid);
            return;
        }
        let Some(player) = self.arena.get_player(pid) else {
            return;
        };
        let spawned = self
            .sky
            .lock()
            .sky()
            .and_then(|sky| sky.participation(player))
            .map_or(false, |p| p.is_spawned());
        if spawned {
            return;
        }

        let (pos, rot) = random_spawn();
        self.arena.spawn(pid, &self.tuning, pos, rot);
        debug!("Player {} spawned at ({:.0}, {:.0})", pid, pos.x, pos.y);
    }

    fn kill(&mut self, pid: Pid) {
        let Some(player) = self.arena.get_player(pid) else {
            return;
        };
        if let Some(sky) = self.sky.lock().sky_mut() {
            if sky.kill(player) {
                debug!("Player {} was destroyed", pid);
            }
        }
    }

    // ========================================================================
    // Arena control
    // ========================================================================

    /// Switch the arena mode; a new game gets a home base per team
    pub fn set_mode(&mut self, mode: ArenaMode) {
        if self.arena.mode() == mode {
            return;
        }
        self.apply_and_broadcast(ArenaDelta::Mode(mode));
        if mode == ArenaMode::Game {
            if let Some(sky) = self.sky.lock().sky_mut() {
                place_home_bases(sky);
            }
        }
    }

    fn rcon(&mut self, pid: Pid, line: &str) -> Result<String, RconError> {
        let command = RconCommand::parse(line)?;
        let admin = self.arena.get_player(pid).map_or(false, |p| p.is_admin());
        if !command.is_public() && !admin {
            return Err(RconError::NotAdmin);
        }
        info!("RCon from player {}: {}", pid, line.split_whitespace().next().unwrap_or(""));

        match command {
            RconCommand::Help => Ok(HELP.to_string()),
            RconCommand::Password(password) => {
                if self.config.rcon_password.as_deref() != Some(password.as_str()) {
                    return Err(RconError::WrongPassword);
                }
                if !admin {
                    if let Some(player) = self.arena.get_player(pid) {
                        let delta = PlayerDelta::zero(player).with_admin(true);
                        self.apply_and_broadcast(ArenaDelta::player(pid, delta));
                    }
                }
                Ok("Authenticated".to_string())
            }
            RconCommand::Start => {
                self.set_mode(ArenaMode::Game);
                self.announce("The game has started");
                Ok("Game started".to_string())
            }
            RconCommand::Stop => {
                self.set_mode(ArenaMode::Lobby);
                self.announce("The game has ended");
                Ok("Game stopped".to_string())
            }
            RconCommand::Score => {
                self.set_mode(ArenaMode::Scoring);
                Ok("Scoring".to_string())
            }
            RconCommand::Motd(motd) => {
                self.apply_and_broadcast(ArenaDelta::Motd(motd));
                Ok("Motd changed".to_string())
            }
            RconCommand::Env(environment) => {
                let reply = format!("Next environment: {}", environment);
                self.apply_and_broadcast(ArenaDelta::EnvChange(environment));
                Ok(reply)
            }
            RconCommand::Kick(target) => {
                let peer = self.peer_of(target).ok_or(RconError::UnknownPlayer(target))?;
                self.host.disconnect(peer);
                Ok(format!("Kicked player {}", target))
            }
            RconCommand::Entity { x, y } => {
                let mut handle = self.sky.lock();
                let sky = handle.sky_mut().ok_or(RconError::NoGame)?;
                let state = EntityState::new(entity::DIMENSIONS, PhysicalState::at(Vec2::new(x, y)), false);
                let id = sky.spawn_entity(state);
                Ok(format!("Spawned entity {}", id))
            }
            RconCommand::Tune { param, value } => {
                let slot = self
                    .tuning
                    .param_mut(&param)
                    .ok_or_else(|| RconError::UnknownParam(param.clone()))?;
                *slot = value;
                Ok(format!("{} = {}", param, value))
            }
            RconCommand::Tuning => Ok(self
                .tuning
                .to_json()
                .unwrap_or_else(|e| format!("Failed to serialize tuning: {}", e))),
        }
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance the simulation by `delta` seconds and replicate the result
    pub fn tick(&mut self, delta: TimeDiff) {
        self.arena.poll(delta);
        self.arena.tick(delta);
        self.resolve_contacts();

        if let Some(changes) = self.arena.collect_delta() {
            self.broadcast(&ServerPacket::DeltaArena(changes), Delivery::Reliable);
        }
        self.replicate_sky();

        self.ping_timer += delta;
        if self.ping_timer >= self.config.ping_interval {
            self.ping_timer = 0.0;
            let ping = ServerPacket::Ping { time: self.now() };
            self.broadcast(&ping, Delivery::Unreliable);
        }

        self.latency_timer += delta;
        if self.latency_timer >= self.config.latency_update_interval {
            self.latency_timer = 0.0;
            let update = self.latency.lock().make_update(&self.arena);
            if let Some(update) = update {
                self.apply_and_broadcast(update);
            }
        }

        self.update_gauges();
    }

    /// Turn contacts from the last step into damage
    fn resolve_contacts(&mut self) {
        let mut handle = self.sky.lock();
        let Some(sky) = handle.sky_mut() else {
            return;
        };
        let contacts = sky.take_contacts();
        let hits: Vec<(Pid, f32)> = contacts
            .iter()
            .filter_map(|contact| contact_damage(contact, sky, &self.arena))
            .collect();

        for (pid, amount) in hits {
            let Some(player) = self.arena.get_player(pid) else {
                continue;
            };
            if sky.damage(player, amount) {
                info!("{} was shot down", player.nickname());
            }
        }
    }

    /// One delta per tick, filtered per recipient
    fn replicate_sky(&mut self) {
        let Some(delta) = self.sky.lock().collect_delta() else {
            return;
        };
        for (peer, pid) in &self.clients {
            let Some(pid) = pid else {
                continue;
            };
            let filtered = delta.respect_authority(*pid);
            if !filtered.is_empty() {
                self.send(*peer, &ServerPacket::DeltaSky(filtered), Delivery::Reliable);
            }
        }
    }

    fn update_gauges(&self) {
        let (planes, components) = self
            .sky
            .lock()
            .sky()
            .map_or((0, 0), |sky| (sky.spawned_count(), sky.component_count()));
        self.metrics
            .peers_connected
            .store(self.host.peer_count() as u64, Ordering::Relaxed);
        self.metrics
            .players_joined
            .store(self.arena.player_count() as u64, Ordering::Relaxed);
        self.metrics.planes_spawned.store(planes as u64, Ordering::Relaxed);
        self.metrics.components.store(components as u64, Ordering::Relaxed);
    }

    /// Fixed-rate loop until `shutdown` is set
    pub fn run(mut self, shutdown: Arc<AtomicBool>) {
        let period = Duration::from_secs_f32(self.config.tick_delta());
        let mut last_tick = Instant::now();
        let mut next_tick = last_tick + period;

        info!(
            "Simulation running at {} Hz for arena '{}'",
            self.config.tick_rate,
            self.arena.name()
        );

        while !shutdown.load(Ordering::Relaxed) {
            self.poll_until(next_tick);

            let start = Instant::now();
            let delta = (start - last_tick).as_secs_f32().min(timing::MAX_TICK_DELTA);
            last_tick = start;
            self.tick(delta);
            self.metrics.record_tick_time(start.elapsed());

            next_tick += period;
            let now = Instant::now();
            if next_tick < now {
                debug!("Simulation fell behind by {:?}", now - next_tick);
                next_tick = now + period;
            }
        }

        info!("Simulation stopped");
    }

    /// Run the simulation on its own thread
    pub fn spawn_simulation(self, shutdown: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("simulation".into())
            .spawn(move || self.run(shutdown))
    }
}

fn contact_damage(contact: &Contact, sky: &Sky, arena: &Arena) -> Option<(Pid, f32)> {
    if contact.kind != ContactKind::Begin {
        return None;
    }
    let (plane, other) = contact.other_than(|tag| matches!(tag, BodyTag::Plane(_)))?;
    let BodyTag::Plane(pid) = plane else {
        return None;
    };

    let amount = match other {
        BodyTag::Explosion(_) => explosion::DAMAGE,
        BodyTag::HomeBase(id) => {
            let team = arena.get_player(pid)?.team();
            let base = sky.home_bases().get(id)?;
            if base.is_friendly(team) {
                return None;
            }
            base.state().damage
        }
        BodyTag::Prop { owner, .. } if owner != pid => combat::PROP_DAMAGE,
        _ => return None,
    };
    Some((pid, amount))
}

fn place_home_bases(sky: &mut Sky) {
    let y = world::DIMENSIONS.y - world::BOUNDARY_THICKNESS;
    for (x, team) in [(0.15, team::RED), (0.85, team::BLUE)] {
        let pos = Vec2::new(world::DIMENSIONS.x * x, y);
        sky.spawn_home_base(HomeBaseState::new(pos, team));
    }
}

/// Random point in the upper half of the world, facing left or right
fn random_spawn() -> (Vec2, f32) {
    let mut rng = rand::thread_rng();
    let margin = world::SPAWN_MARGIN;
    let pos = Vec2::new(
        rng.gen_range(margin..world::DIMENSIONS.x - margin),
        rng.gen_range(margin..world::DIMENSIONS.y / 2.0),
    );
    let rot = if rng.gen_bool(0.5) { 0.0 } else { 180.0 };
    (pos, rot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ClientTelegraph;

    const WAIT: Duration = Duration::from_millis(20);

    fn server() -> Server {
        let config = ServerConfig {
            rcon_password: Some("secret".into()),
            ..ServerConfig::default()
        };
        Server::new(config, Host::new(), Arc::new(Metrics::new()))
    }

    /// Raw client endpoint speaking the wire protocol
    struct Peer {
        host: Host,
        server_peer: PeerId,
        telegraph: ClientTelegraph,
    }

    impl Peer {
        fn connect(server: &mut Server) -> Self {
            let mut host = Host::new();
            let (_, server_peer) = Host::connect_loopback(server.host_mut(), &mut host);
            host.poll(WAIT);
            server.poll(WAIT);
            Self {
                host,
                server_peer,
                telegraph: ClientTelegraph::new(),
            }
        }

        fn send(&self, packet: ClientPacket) {
            self.telegraph
                .transmit(&self.host, self.server_peer, &packet, Delivery::Reliable)
                .unwrap();
        }

        fn received(&mut self) -> Vec<ServerPacket> {
            let mut packets = Vec::new();
            while let Some(event) = self.host.poll(Duration::ZERO) {
                if let HostEvent::Receive { data, .. } = event {
                    packets.push(self.telegraph.receive(&data).unwrap());
                }
            }
            packets
        }
    }

    fn join(server: &mut Server, nickname: &str) -> Peer {
        let mut peer = Peer::connect(server);
        peer.send(ClientPacket::ReqJoin(nickname.into()));
        server.poll(WAIT);
        peer.received();
        peer
    }

    #[test]
    fn test_join_sends_init() {
        let mut server = server();
        let mut peer = Peer::connect(&mut server);
        peer.send(ClientPacket::ReqJoin("pilot".into()));
        server.poll(WAIT);

        let packets = peer.received();
        let Some(ServerPacket::Init { pid, arena, .. }) = packets.last() else {
            panic!("Wrong message type");
        };
        assert_eq!(*pid, 0);
        assert_eq!(arena.players[&0].nickname, "pilot");
        assert_eq!(server.arena().player_count(), 1);
    }

    #[test]
    fn test_join_broadcast_to_others() {
        let mut server = server();
        let mut first = join(&mut server, "first");
        let _second = join(&mut server, "second");

        let packets = first.received();
        assert!(packets
            .iter()
            .any(|p| matches!(p, ServerPacket::DeltaArena(ArenaDelta::Join(init)) if init.pid == 1)));
    }

    #[test]
    fn test_packets_before_join_ignored() {
        let mut server = server();
        let peer = Peer::connect(&mut server);
        peer.send(ClientPacket::Chat("hello".into()));
        peer.send(ClientPacket::ReqSpawn);
        server.poll(WAIT);
        assert_eq!(server.arena().player_count(), 0);
    }

    #[test]
    fn test_malformed_packet_counted() {
        let mut server = server();
        let peer = Peer::connect(&mut server);
        peer.host.transmit(peer.server_peer, &[1, 0, 0, 0], Delivery::Reliable).unwrap();
        server.poll(WAIT);
        assert_eq!(server.metrics().packets_malformed.load(Ordering::Relaxed), 1);
        assert_eq!(server.arena().player_count(), 0);
    }

    #[test]
    fn test_disconnect_quits_player() {
        let mut server = server();
        let mut first = join(&mut server, "first");
        let second = join(&mut server, "second");
        first.received();

        drop(second);
        server.poll(WAIT);
        assert_eq!(server.arena().player_count(), 1);
        assert!(first
            .received()
            .contains(&ServerPacket::DeltaArena(ArenaDelta::Quit(1))));
    }

    #[test]
    fn test_arena_full() {
        let mut server = Server::new(
            ServerConfig {
                max_players: 1,
                ..ServerConfig::default()
            },
            Host::new(),
            Arc::new(Metrics::new()),
        );
        let _first = join(&mut server, "first");
        let mut second = Peer::connect(&mut server);
        second.send(ClientPacket::ReqJoin("second".into()));
        server.poll(WAIT);
        assert_eq!(server.arena().player_count(), 1);
        assert!(second
            .received()
            .contains(&ServerPacket::Broadcast("The arena is full".into())));
    }

    #[test]
    fn test_rcon_requires_admin() {
        let mut server = server();
        let mut peer = join(&mut server, "pilot");

        peer.send(ClientPacket::RCon("start".into()));
        server.poll(WAIT);
        assert_eq!(server.arena().mode(), ArenaMode::Lobby);
        assert!(peer
            .received()
            .contains(&ServerPacket::RCon(RconError::NotAdmin.to_string())));

        peer.send(ClientPacket::RCon("password wrong".into()));
        peer.send(ClientPacket::RCon("password secret".into()));
        peer.send(ClientPacket::RCon("start".into()));
        server.poll(WAIT);
        assert!(server.arena().get_player(0).unwrap().is_admin());
        assert_eq!(server.arena().mode(), ArenaMode::Game);
        assert_eq!(server.sky().sky().unwrap().home_bases().len(), 2);
    }

    #[test]
    fn test_rcon_tune() {
        let mut server = server();
        let peer = join(&mut server, "pilot");
        peer.send(ClientPacket::RCon("password secret".into()));
        peer.send(ClientPacket::RCon("tune flight.threshold 42".into()));
        server.poll(WAIT);
        assert_eq!(server.tuning().flight.threshold, 42.0);
    }

    #[test]
    fn test_spawn_only_in_game() {
        let mut server = server();
        let peer = join(&mut server, "pilot");
        peer.send(ClientPacket::ReqSpawn);
        server.poll(WAIT);
        assert!(server.sky().sky().is_none());

        server.set_mode(ArenaMode::Game);
        peer.send(ClientPacket::ReqSpawn);
        server.poll(WAIT);
        assert_eq!(server.sky().sky().unwrap().spawned_count(), 1);

        peer.send(ClientPacket::ReqKill);
        server.poll(WAIT);
        let handle = server.sky();
        let sky = handle.sky().unwrap();
        assert_eq!(sky.spawned_count(), 0);
        assert_eq!(sky.explosions().len(), 1);
    }

    #[test]
    fn test_nickname_change_disambiguated() {
        let mut server = server();
        let _a = join(&mut server, "ace");
        let b = join(&mut server, "bee");
        let player = server.arena().get_player(1).unwrap();
        let delta = PlayerDelta::zero(player).with_nickname("ace").with_admin(true);
        b.send(ClientPacket::ReqPlayerDelta(delta));
        server.poll(WAIT);

        let player = server.arena().get_player(1).unwrap();
        assert_eq!(player.nickname(), "ace(1)");
        assert!(!player.is_admin());
    }

    #[test]
    fn test_tick_replicates_sky_and_pings() {
        let mut server = server();
        let mut peer = join(&mut server, "pilot");
        server.set_mode(ArenaMode::Game);
        peer.received();

        server.tick(1.5);
        let packets = peer.received();
        assert!(packets.iter().any(|p| matches!(p, ServerPacket::DeltaSky(d) if d.home_bases.is_some())));
        assert!(packets.iter().any(|p| matches!(p, ServerPacket::Ping { .. })));
    }

    #[test]
    fn test_contact_damage_rules() {
        let mut arena = Arena::new(&ArenaInit::new("a", "env.json"));
        arena.connect_player("red");
        let delta = PlayerDelta::zero(arena.get_player(0).unwrap()).with_team(team::RED);
        arena.apply_delta(&ArenaDelta::player(0, delta));

        let mut sky = Sky::new(&Default::default());
        let red_base = sky.spawn_home_base(HomeBaseState::new(Vec2::new(100.0, 100.0), team::RED));
        let blue_base = sky.spawn_home_base(HomeBaseState::new(Vec2::new(900.0, 100.0), team::BLUE));

        let hit = |other| Contact {
            kind: ContactKind::Begin,
            a: other,
            b: BodyTag::Plane(0),
        };
        assert_eq!(contact_damage(&hit(BodyTag::HomeBase(red_base)), &sky, &arena), None);
        assert_eq!(
            contact_damage(&hit(BodyTag::HomeBase(blue_base)), &sky, &arena),
            Some((0, crate::constants::home_base::DAMAGE))
        );
        assert_eq!(
            contact_damage(&hit(BodyTag::Explosion(0)), &sky, &arena),
            Some((0, explosion::DAMAGE))
        );
        assert_eq!(contact_damage(&hit(BodyTag::Prop { owner: 0, id: 0 }), &sky, &arena), None);
        assert_eq!(
            contact_damage(&hit(BodyTag::Prop { owner: 1, id: 0 }), &sky, &arena),
            Some((0, combat::PROP_DAMAGE))
        );

        let ended = Contact {
            kind: ContactKind::End,
            ..hit(BodyTag::Explosion(0))
        };
        assert_eq!(contact_damage(&ended, &sky, &arena), None);
    }
}
