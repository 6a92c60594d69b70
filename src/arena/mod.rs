//! Arena: the authoritative player registry shared by server and clients.
//!
//! The server produces `ArenaDelta`s (usually through `connect_player` or by
//! building them explicitly), applies them locally and broadcasts them;
//! clients build an `Arena` from an `ArenaInit` and apply the same deltas.

pub mod event;
pub mod nickname;
pub mod player;
pub mod subsystem;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::sky::plane::{Action, PlaneTuning};
use crate::util::{smallest_unused, Networked, Pid, Time, TimeDiff, Vec2, VerifyStructure};

pub use event::{ArenaEvent, ArenaLogger, EventBuffer, TracingLogger};
pub use player::{LatencyStats, Player, PlayerDelta, PlayerInit, Team};
pub use subsystem::{PlayerData, Roster, SharedSubsystem, Subsystem, SubsystemId};

use subsystem::{dispatch, Attached};

/// Whole-arena state machine, driven externally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArenaMode {
    #[default]
    Lobby,
    Game,
    Scoring,
}

/// Full snapshot of an arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaInit {
    pub name: String,
    pub motd: String,
    pub environment: String,
    pub mode: ArenaMode,
    pub players: BTreeMap<Pid, PlayerInit>,
}

impl ArenaInit {
    pub fn new(name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            motd: String::new(),
            environment: environment.into(),
            mode: ArenaMode::Lobby,
            players: BTreeMap::new(),
        }
    }
}

impl VerifyStructure for ArenaInit {
    fn verify_structure(&self) -> bool {
        self.players
            .iter()
            .all(|(pid, init)| *pid == init.pid && init.verify_structure())
    }
}

/// Incremental arena update; exactly one change per value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArenaDelta {
    Quit(Pid),
    Join(PlayerInit),
    PlayerDeltas(BTreeMap<Pid, PlayerDelta>),
    EnvLoadState(bool),
    Motd(String),
    Mode(ArenaMode),
    EnvChange(String),
}

impl ArenaDelta {
    /// Delta updating a single player
    pub fn player(pid: Pid, delta: PlayerDelta) -> Self {
        ArenaDelta::PlayerDeltas(BTreeMap::from([(pid, delta)]))
    }
}

impl VerifyStructure for ArenaDelta {
    fn verify_structure(&self) -> bool {
        match self {
            ArenaDelta::Join(init) => init.verify_structure(),
            ArenaDelta::PlayerDeltas(deltas) => {
                !deltas.is_empty() && deltas.values().all(VerifyStructure::verify_structure)
            }
            ArenaDelta::Quit(_)
            | ArenaDelta::EnvLoadState(_)
            | ArenaDelta::Motd(_)
            | ArenaDelta::Mode(_)
            | ArenaDelta::EnvChange(_) => true,
        }
    }
}

/// Registry of connected players plus attached subsystems
pub struct Arena {
    name: String,
    motd: String,
    next_env: String,
    mode: ArenaMode,
    uptime: Time,
    players: BTreeMap<Pid, Player>,
    subsystems: Vec<Attached>,
    next_subsystem: u32,
    loggers: Vec<Box<dyn ArenaLogger>>,
}

impl Arena {
    pub fn new(init: &ArenaInit) -> Self {
        let players = init
            .players
            .values()
            .map(|p| (p.pid, Player::new(p)))
            .collect();

        Self {
            name: init.name.clone(),
            motd: init.motd.clone(),
            next_env: init.environment.clone(),
            mode: init.mode,
            uptime: 0.0,
            players,
            subsystems: Vec::new(),
            next_subsystem: 0,
            loggers: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn motd(&self) -> &str {
        &self.motd
    }

    pub fn next_env(&self) -> &str {
        &self.next_env
    }

    pub fn mode(&self) -> ArenaMode {
        self.mode
    }

    pub fn uptime(&self) -> Time {
        self.uptime
    }

    pub fn get_player(&self, pid: Pid) -> Option<&Player> {
        self.players.get(&pid)
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Visit every player, in PID order
    pub fn for_players(&self, mut f: impl FnMut(&Player)) {
        self.players.values().for_each(|p| f(p));
    }

    /// Mutate every player. Changes made here skip subsystem dispatch and
    /// event logging; they surface through `collect_delta`.
    pub fn for_players_mut(&mut self, mut f: impl FnMut(&mut Player)) {
        self.players.values_mut().for_each(|p| f(p));
    }

    pub fn roster(&self) -> Roster<'_> {
        Roster::new(&self.players)
    }

    // ========================================================================
    // Subsystems and loggers
    // ========================================================================

    /// Attach a subsystem; every current player is registered with it
    pub fn attach<S: Subsystem + 'static>(&mut self, system: Arc<Mutex<S>>) -> SubsystemId {
        let id = SubsystemId(self.next_subsystem);
        self.next_subsystem += 1;

        {
            let mut guard = system.lock();
            for player in self.players.values() {
                guard.register_player(player);
            }
        }

        let system: SharedSubsystem = system;
        self.subsystems.push(Attached { id, system });
        id
    }

    /// Detach a subsystem, unregistering every current player from it
    pub fn detach(&mut self, id: SubsystemId) -> bool {
        let Some(index) = self.subsystems.iter().position(|a| a.id == id) else {
            return false;
        };
        let attached = self.subsystems.remove(index);
        let mut guard = attached.system.lock();
        for player in self.players.values() {
            guard.unregister_player(player);
        }
        true
    }

    pub fn subsystem_count(&self) -> usize {
        self.subsystems.len()
    }

    pub fn add_logger(&mut self, logger: Box<dyn ArenaLogger>) {
        self.loggers.push(logger);
    }

    /// Record an event with every logger
    pub fn log_event(&mut self, event: ArenaEvent) {
        for logger in &mut self.loggers {
            logger.on_event(&event);
        }
    }

    // ========================================================================
    // Connection and nicknames
    // ========================================================================

    /// Join a new player under the smallest free PID. The returned delta
    /// has already been applied and can be replayed on remote copies.
    pub fn connect_player(&mut self, requested_nickname: &str) -> ArenaDelta {
        let pid = smallest_unused(self.players.keys().copied());
        let nickname = self.alloc_nickname(requested_nickname, None);
        let delta = ArenaDelta::Join(PlayerInit::new(pid, nickname));
        self.apply_delta(&delta);
        delta
    }

    /// Disambiguate `requested` against live nicknames, ignoring `ignore`
    pub fn alloc_nickname(&self, requested: &str, ignore: Option<Pid>) -> String {
        let others = self
            .players
            .values()
            .filter(|p| Some(p.pid()) != ignore)
            .map(Player::nickname);
        nickname::disambiguate(requested, others)
    }

    /// Nickname for an existing player asking to be renamed
    pub fn alloc_new_nickname(&self, pid: Pid, requested: &str) -> String {
        self.alloc_nickname(requested, Some(pid))
    }

    // ========================================================================
    // Player lifecycle
    // ========================================================================

    fn join_player(&mut self, init: &PlayerInit) {
        if self.players.contains_key(&init.pid) {
            self.quit_player(init.pid);
        }

        let player = Player::new(init);
        dispatch(&self.subsystems, |s| {
            s.register_player(&player);
            s.on_join(&player);
        });
        let nickname = player.nickname().to_string();
        self.players.insert(init.pid, player);
        self.log_event(ArenaEvent::Join { nickname });
    }

    fn quit_player(&mut self, pid: Pid) {
        let Some(player) = self.players.remove(&pid) else {
            return;
        };
        dispatch(&self.subsystems, |s| {
            s.on_quit(&player);
            s.unregister_player(&player);
        });
        self.log_event(ArenaEvent::Quit {
            nickname: player.nickname().to_string(),
        });
    }

    fn apply_player_delta(&mut self, pid: Pid, delta: &PlayerDelta) {
        let Some(player) = self.players.get_mut(&pid) else {
            return;
        };
        let old_nickname = player.nickname().to_string();
        let old_team = player.team();
        player.apply_delta(delta);

        let mut events = Vec::new();
        if player.nickname() != old_nickname {
            events.push(ArenaEvent::NickChange {
                old: old_nickname,
                new: player.nickname().to_string(),
            });
        }
        if player.team() != old_team {
            events.push(ArenaEvent::TeamChange {
                nickname: player.nickname().to_string(),
                old: old_team,
                new: player.team(),
            });
        }

        let player = &self.players[&pid];
        dispatch(&self.subsystems, |s| s.on_delta(player, delta));
        for event in events {
            self.log_event(event);
        }
    }

    // ========================================================================
    // Simulation hooks
    // ========================================================================

    /// Route a control action to the subsystems; unknown PIDs are ignored
    pub fn do_action(&mut self, pid: Pid, action: Action, state: bool) {
        if let Some(player) = self.players.get(&pid) {
            dispatch(&self.subsystems, |s| s.on_action(player, action, state));
        }
    }

    /// Ask the subsystems to spawn a plane for `pid`
    pub fn spawn(&mut self, pid: Pid, tuning: &PlaneTuning, pos: Vec2, rot: f32) {
        if let Some(player) = self.players.get(&pid) {
            dispatch(&self.subsystems, |s| s.on_spawn(player, tuning, pos, rot));
        }
    }

    pub fn tick(&mut self, delta: TimeDiff) {
        self.uptime += delta as Time;
        dispatch(&self.subsystems, |s| s.on_tick(delta));
    }

    pub fn poll(&mut self, delta: TimeDiff) {
        dispatch(&self.subsystems, |s| s.on_poll(delta));
    }
}

impl Networked for Arena {
    type Init = ArenaInit;
    type Delta = ArenaDelta;

    fn capture_initializer(&self) -> ArenaInit {
        ArenaInit {
            name: self.name.clone(),
            motd: self.motd.clone(),
            environment: self.next_env.clone(),
            mode: self.mode,
            players: self
                .players
                .iter()
                .map(|(pid, p)| (*pid, p.capture_initializer()))
                .collect(),
        }
    }

    fn apply_delta(&mut self, delta: &ArenaDelta) {
        match delta {
            ArenaDelta::Quit(pid) => self.quit_player(*pid),
            ArenaDelta::Join(init) => self.join_player(init),
            ArenaDelta::PlayerDeltas(deltas) => {
                for (pid, player_delta) in deltas {
                    self.apply_player_delta(*pid, player_delta);
                }
            }
            ArenaDelta::EnvLoadState(loading) => {
                for player in self.players.values_mut() {
                    let mut delta = PlayerDelta::zero(player);
                    delta.loading_env = *loading;
                    player.apply_delta(&delta);
                }
            }
            ArenaDelta::Motd(motd) => {
                self.motd = motd.clone();
            }
            ArenaDelta::Mode(mode) => {
                if *mode != self.mode {
                    self.mode = *mode;
                    self.log_event(ArenaEvent::ModeChange(*mode));
                    let roster = Roster::new(&self.players);
                    dispatch(&self.subsystems, |s| s.on_mode(*mode, roster));
                }
            }
            ArenaDelta::EnvChange(env) => {
                self.next_env = env.clone();
                self.log_event(ArenaEvent::EnvChoose(env.clone()));
                dispatch(&self.subsystems, |s| s.on_map_change(env));
            }
        }
    }

    /// Changes made through `for_players_mut`, as one `PlayerDeltas`
    fn collect_delta(&mut self) -> Option<ArenaDelta> {
        let deltas: BTreeMap<Pid, PlayerDelta> = self
            .players
            .iter_mut()
            .filter_map(|(pid, p)| p.collect_delta().map(|d| (*pid, d)))
            .collect();
        (!deltas.is_empty()).then_some(ArenaDelta::PlayerDeltas(deltas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arena() -> Arena {
        Arena::new(&ArenaInit::new("test arena", "test1.json"))
    }

    fn nickname(arena: &Arena, pid: Pid) -> String {
        arena.get_player(pid).unwrap().nickname().to_string()
    }

    /// Counts callbacks; used to check dispatch order and arity
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        registered: PlayerData<()>,
    }

    impl Subsystem for Recorder {
        fn register_player(&mut self, player: &Player) {
            self.registered.insert(player, ());
            self.calls.push(format!("register {}", player.pid()));
        }
        fn unregister_player(&mut self, player: &Player) {
            self.registered.remove(player);
            self.calls.push(format!("unregister {}", player.pid()));
        }
        fn on_join(&mut self, player: &Player) {
            self.calls.push(format!("join {}", player.pid()));
        }
        fn on_quit(&mut self, player: &Player) {
            self.calls.push(format!("quit {}", player.pid()));
        }
        fn on_delta(&mut self, player: &Player, _delta: &PlayerDelta) {
            self.calls.push(format!("delta {} {}", player.pid(), player.nickname()));
        }
        fn on_mode(&mut self, mode: ArenaMode, roster: Roster<'_>) {
            self.calls.push(format!("mode {:?} {}", mode, roster.len()));
        }
        fn on_action(&mut self, player: &Player, action: Action, state: bool) {
            self.calls.push(format!("action {} {} {}", player.pid(), action, state));
        }
        fn on_map_change(&mut self, environment: &str) {
            self.calls.push(format!("map {}", environment));
        }
        fn on_tick(&mut self, _delta: TimeDiff) {
            self.calls.push("tick".to_string());
        }
    }

    #[test]
    fn test_connection_nicknames() {
        let mut arena = arena();
        arena.connect_player("nameless plane");
        arena.connect_player("nameless somebody");
        arena.connect_player("nameless plane");
        assert_eq!(nickname(&arena, 0), "nameless plane");
        assert_eq!(nickname(&arena, 1), "nameless somebody");
        assert_eq!(nickname(&arena, 2), "nameless plane(1)");

        arena.apply_delta(&ArenaDelta::Quit(0));
        assert!(arena.get_player(0).is_none());

        arena.connect_player("nameless plane");
        assert_eq!(nickname(&arena, 0), "nameless plane");

        arena.connect_player("nameless plane");
        assert_eq!(nickname(&arena, 3), "nameless plane(2)");
    }

    #[test]
    fn test_three_same_names() {
        let mut arena = arena();
        for _ in 0..3 {
            arena.connect_player("X");
        }
        assert_eq!(nickname(&arena, 0), "X");
        assert_eq!(nickname(&arena, 1), "X(1)");
        assert_eq!(nickname(&arena, 2), "X(2)");

        arena.apply_delta(&ArenaDelta::Quit(0));
        arena.connect_player("X");
        assert_eq!(nickname(&arena, 0), "X");
    }

    #[test]
    fn test_nick_change_ignores_own_name() {
        let mut arena = arena();
        arena.connect_player("ace");
        assert_eq!(arena.alloc_new_nickname(0, "ace"), "ace");
        assert_eq!(arena.alloc_nickname("ace", None), "ace(1)");
    }

    #[test]
    fn test_remote_arena_follows_deltas() {
        let mut server = arena();
        server.connect_player("first");
        let mut client = Arena::new(&server.capture_initializer());

        let deltas = vec![
            server.connect_player("second"),
            ArenaDelta::Motd("be nice".into()),
            ArenaDelta::Mode(ArenaMode::Game),
            ArenaDelta::EnvChange("other.json".into()),
            ArenaDelta::player(1, PlayerDelta::zero(server.get_player(1).unwrap()).with_team(2)),
        ];
        for delta in &deltas {
            server.apply_delta(delta);
            client.apply_delta(delta);
        }

        assert_eq!(client.capture_initializer(), server.capture_initializer());
        assert_eq!(client.motd(), "be nice");
        assert_eq!(client.mode(), ArenaMode::Game);
        assert_eq!(client.next_env(), "other.json");
        assert_eq!(client.get_player(1).unwrap().team(), 2);
    }

    #[test]
    fn test_player_delta_latency_and_admin() {
        let mut arena = arena();
        arena.connect_player("somebody");
        let player = arena.get_player(0).unwrap();
        let delta = PlayerDelta::zero(player)
            .with_admin(true)
            .with_latency(LatencyStats {
                latency: 50.0,
                clock_offset: 60.0,
            });
        arena.apply_delta(&ArenaDelta::player(0, delta));

        let player = arena.get_player(0).unwrap();
        assert!(player.is_admin());
        assert_eq!(player.latency().unwrap().latency, 50.0);
        assert_eq!(player.latency().unwrap().clock_offset, 60.0);
    }

    #[test]
    fn test_delta_for_missing_pid_is_noop() {
        let mut arena = arena();
        arena.connect_player("somebody");
        let before = arena.capture_initializer();

        let delta = PlayerDelta::zero(arena.get_player(0).unwrap()).with_nickname("ghost");
        arena.apply_delta(&ArenaDelta::player(7, delta));
        arena.apply_delta(&ArenaDelta::Quit(42));

        assert_eq!(arena.capture_initializer(), before);
    }

    #[test]
    fn test_multi_player_team_deltas() {
        let mut arena = arena();
        for _ in 0..3 {
            arena.connect_player("p");
        }
        let mut deltas = BTreeMap::new();
        for pid in [0, 2] {
            let player = arena.get_player(pid).unwrap();
            deltas.insert(pid, PlayerDelta::zero(player).with_team(1));
        }
        arena.apply_delta(&ArenaDelta::PlayerDeltas(deltas));
        assert_eq!(arena.get_player(0).unwrap().team(), 1);
        assert_eq!(arena.get_player(1).unwrap().team(), 0);
        assert_eq!(arena.get_player(2).unwrap().team(), 1);
    }

    #[test]
    fn test_events_logged_only_on_change() {
        let mut arena = arena();
        let log = EventBuffer::new();
        arena.add_logger(Box::new(log.clone()));
        arena.connect_player("a");

        let zero = PlayerDelta::zero(arena.get_player(0).unwrap());
        arena.apply_delta(&ArenaDelta::player(0, zero.clone()));
        arena.apply_delta(&ArenaDelta::player(0, zero.clone().with_nickname("b")));
        arena.apply_delta(&ArenaDelta::player(0, zero.with_team(1)));
        arena.apply_delta(&ArenaDelta::Mode(ArenaMode::Lobby));
        arena.apply_delta(&ArenaDelta::Mode(ArenaMode::Game));

        assert_eq!(
            log.drain(),
            vec![
                ArenaEvent::Join { nickname: "a".into() },
                ArenaEvent::NickChange { old: "a".into(), new: "b".into() },
                ArenaEvent::TeamChange { nickname: "b".into(), old: 0, new: 1 },
                ArenaEvent::ModeChange(ArenaMode::Game),
            ]
        );
    }

    #[test]
    fn test_env_load_state_sets_every_player() {
        let mut arena = arena();
        arena.connect_player("a");
        arena.connect_player("b");
        arena.apply_delta(&ArenaDelta::EnvLoadState(true));
        arena.for_players(|p| assert!(p.is_loading_env()));
        arena.apply_delta(&ArenaDelta::EnvLoadState(false));
        arena.for_players(|p| assert!(!p.is_loading_env()));
    }

    #[test]
    fn test_subsystem_callbacks_once_in_order() {
        let mut arena = arena();
        arena.connect_player("early");
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        arena.attach(recorder.clone());

        arena.connect_player("late");
        arena.do_action(1, Action::Thrust, true);
        arena.do_action(9, Action::Thrust, true);
        arena.apply_delta(&ArenaDelta::Mode(ArenaMode::Game));
        arena.apply_delta(&ArenaDelta::EnvChange("map.json".into()));
        arena.tick(0.5);
        arena.apply_delta(&ArenaDelta::Quit(1));

        let calls = recorder.lock().calls.clone();
        assert_eq!(
            calls,
            vec![
                "register 0",
                "register 1",
                "join 1",
                "action 1 thrust true",
                "mode Game 2",
                "map map.json",
                "tick",
                "quit 1",
                "unregister 1",
            ]
        );
        assert_eq!(arena.uptime(), 0.5);
        assert_eq!(recorder.lock().registered.len(), 1);
    }

    #[test]
    fn test_rejoin_same_pid_quits_first() {
        let mut arena = arena();
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        arena.attach(recorder.clone());
        arena.apply_delta(&ArenaDelta::Join(PlayerInit::new(0, "a")));
        arena.apply_delta(&ArenaDelta::Join(PlayerInit::new(0, "b")));

        assert_eq!(arena.player_count(), 1);
        assert_eq!(nickname(&arena, 0), "b");
        assert_eq!(recorder.lock().registered.len(), 1);
    }

    #[test]
    fn test_detach_unregisters() {
        let mut arena = arena();
        arena.connect_player("a");
        let recorder = Arc::new(Mutex::new(Recorder::default()));
        let id = arena.attach(recorder.clone());
        assert!(arena.detach(id));
        assert!(!arena.detach(id));
        assert!(recorder.lock().registered.is_empty());
        assert_eq!(arena.subsystem_count(), 0);
    }

    #[test]
    fn test_collect_delta_from_direct_mutation() {
        let mut arena = arena();
        arena.connect_player("a");
        arena.connect_player("b");
        let mut remote = Arena::new(&arena.capture_initializer());

        arena.for_players_mut(|p| {
            if p.pid() == 1 {
                p.set_team(2);
            }
        });
        let delta = arena.collect_delta().unwrap();
        match &delta {
            ArenaDelta::PlayerDeltas(deltas) => assert_eq!(deltas.keys().copied().collect::<Vec<_>>(), vec![1]),
            _ => panic!("Wrong delta type"),
        }
        remote.apply_delta(&delta);
        assert_eq!(remote.capture_initializer(), arena.capture_initializer());
        assert!(arena.collect_delta().is_none());
    }

    #[test]
    fn test_verify_structure() {
        assert!(!ArenaDelta::PlayerDeltas(BTreeMap::new()).verify_structure());
        assert!(!ArenaDelta::Join(PlayerInit::new(0, "")).verify_structure());
        assert!(ArenaDelta::Join(PlayerInit::new(0, "x")).verify_structure());
        assert!(ArenaDelta::Quit(3).verify_structure());
    }

    proptest! {
        #[test]
        fn prop_join_takes_smallest_free_pid(ops in proptest::collection::vec(any::<Option<u8>>(), 1..40)) {
            let mut arena = arena();
            for op in ops {
                match op {
                    Some(n) => {
                        let live: Vec<Pid> = {
                            let mut v = Vec::new();
                            arena.for_players(|p| v.push(p.pid()));
                            v
                        };
                        if !live.is_empty() {
                            let pid = live[n as usize % live.len()];
                            arena.apply_delta(&ArenaDelta::Quit(pid));
                        }
                    }
                    None => {
                        let mut live = Vec::new();
                        arena.for_players(|p| live.push(p.pid()));
                        let expected = smallest_unused(live);
                        match arena.connect_player("p") {
                            ArenaDelta::Join(init) => prop_assert_eq!(init.pid, expected),
                            _ => prop_assert!(false, "connect_player must return a join"),
                        }
                    }
                }
            }
        }
    }
}
