//! Per-connection identity replicated through the arena.

use serde::{Deserialize, Serialize};

use crate::constants::net::MAX_NICKNAME_LEN;
use crate::util::{Networked, Pid, Time, TimeDiff, VerifyStructure};

/// Team identifier
pub type Team = u8;

/// Well-known teams
pub mod team {
    use super::Team;

    pub const SPECTATOR: Team = 0;
    pub const RED: Team = 1;
    pub const BLUE: Team = 2;
}

/// Latency statistics measured by the server
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    /// Round-trip latency in seconds
    pub latency: TimeDiff,
    /// Estimated offset of the client clock relative to the server clock
    pub clock_offset: Time,
}

/// Full snapshot of a player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerInit {
    pub pid: Pid,
    pub nickname: String,
    pub admin: bool,
    pub team: Team,
    pub loading_env: bool,
    pub latency: Option<LatencyStats>,
}

impl PlayerInit {
    pub fn new(pid: Pid, nickname: impl Into<String>) -> Self {
        Self {
            pid,
            nickname: nickname.into(),
            admin: false,
            team: team::SPECTATOR,
            loading_env: false,
            latency: None,
        }
    }
}

impl VerifyStructure for PlayerInit {
    fn verify_structure(&self) -> bool {
        is_valid_nickname(&self.nickname)
    }
}

/// Partial update of a player.
///
/// `admin` and `loading_env` are always carried; the optional fields mean
/// "unchanged" when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDelta {
    pub nickname: Option<String>,
    pub admin: bool,
    pub loading_env: bool,
    pub team: Option<Team>,
    pub latency: Option<LatencyStats>,
}

impl PlayerDelta {
    /// Delta that changes nothing when applied to `player`
    pub fn zero(player: &Player) -> Self {
        Self {
            nickname: None,
            admin: player.admin,
            loading_env: player.loading_env,
            team: None,
            latency: None,
        }
    }

    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = Some(nickname.into());
        self
    }

    pub fn with_team(mut self, team: Team) -> Self {
        self.team = Some(team);
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_latency(mut self, latency: LatencyStats) -> Self {
        self.latency = Some(latency);
        self
    }
}

impl VerifyStructure for PlayerDelta {
    fn verify_structure(&self) -> bool {
        self.nickname.as_deref().map_or(true, is_valid_nickname)
            && self
                .latency
                .map_or(true, |l| l.latency.is_finite() && l.clock_offset.is_finite())
    }
}

/// Nickname acceptable on the wire: non-blank, bounded, no control characters
pub fn is_valid_nickname(nickname: &str) -> bool {
    let trimmed = nickname.trim();
    !trimmed.is_empty()
        && trimmed.chars().count() <= MAX_NICKNAME_LEN
        && !trimmed.chars().any(char::is_control)
}

/// A connected player, owned by the `Arena`
#[derive(Debug, Clone)]
pub struct Player {
    pid: Pid,
    nickname: String,
    admin: bool,
    team: Team,
    loading_env: bool,
    latency: Option<LatencyStats>,
    synced: PlayerInit,
}

impl Player {
    pub fn new(init: &PlayerInit) -> Self {
        Self {
            pid: init.pid,
            nickname: init.nickname.clone(),
            admin: init.admin,
            team: init.team,
            loading_env: init.loading_env,
            latency: init.latency,
            synced: init.clone(),
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn is_loading_env(&self) -> bool {
        self.loading_env
    }

    pub fn latency(&self) -> Option<LatencyStats> {
        self.latency
    }

    // Direct mutators bypass subsystem dispatch; the change surfaces
    // through `collect_delta`.

    pub fn set_nickname(&mut self, nickname: impl Into<String>) {
        self.nickname = nickname.into();
    }

    pub fn set_team(&mut self, team: Team) {
        self.team = team;
    }

    pub fn set_admin(&mut self, admin: bool) {
        self.admin = admin;
    }

    pub fn set_loading_env(&mut self, loading_env: bool) {
        self.loading_env = loading_env;
    }

    pub fn set_latency(&mut self, latency: LatencyStats) {
        self.latency = Some(latency);
    }
}

impl Networked for Player {
    type Init = PlayerInit;
    type Delta = PlayerDelta;

    fn capture_initializer(&self) -> PlayerInit {
        PlayerInit {
            pid: self.pid,
            nickname: self.nickname.clone(),
            admin: self.admin,
            team: self.team,
            loading_env: self.loading_env,
            latency: self.latency,
        }
    }

    /// Applied changes are also folded into the baseline: whoever produced
    /// the delta already knows about them.
    fn apply_delta(&mut self, delta: &PlayerDelta) {
        if let Some(nickname) = &delta.nickname {
            self.nickname = nickname.clone();
        }
        self.admin = delta.admin;
        self.loading_env = delta.loading_env;
        if let Some(team) = delta.team {
            self.team = team;
        }
        if let Some(latency) = delta.latency {
            self.latency = Some(latency);
        }
        self.synced = self.capture_initializer();
    }

    fn collect_delta(&mut self) -> Option<PlayerDelta> {
        let current = self.capture_initializer();
        if current == self.synced {
            return None;
        }

        let delta = PlayerDelta {
            nickname: (current.nickname != self.synced.nickname).then(|| current.nickname.clone()),
            admin: current.admin,
            loading_env: current.loading_env,
            team: (current.team != self.synced.team).then_some(current.team),
            latency: if current.latency != self.synced.latency {
                current.latency
            } else {
                None
            },
        };
        self.synced = current;
        Some(delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player() -> Player {
        Player::new(&PlayerInit::new(3, "ace"))
    }

    #[test]
    fn test_init_defaults() {
        let init = PlayerInit::new(0, "nameless plane");
        assert!(!init.admin);
        assert!(!init.loading_env);
        assert_eq!(init.team, team::SPECTATOR);
        assert!(init.latency.is_none());
    }

    #[test]
    fn test_zero_delta_changes_nothing() {
        let mut p = player();
        p.set_admin(true);
        let before = p.capture_initializer();
        let zero = PlayerDelta::zero(&p);
        p.apply_delta(&zero);
        assert_eq!(p.capture_initializer(), before);
    }

    #[test]
    fn test_delta_round_trip() {
        let mut original = player();
        original.collect_delta();
        let mut remote = Player::new(&original.capture_initializer());

        original.set_team(team::RED);
        original.set_latency(LatencyStats {
            latency: 0.05,
            clock_offset: 0.06,
        });
        original.set_admin(true);

        let delta = original.collect_delta().expect("changes produce a delta");
        assert!(delta.nickname.is_none());
        remote.apply_delta(&delta);
        assert_eq!(remote.capture_initializer(), original.capture_initializer());
    }

    #[test]
    fn test_collect_twice_is_none() {
        let mut p = player();
        p.set_nickname("ace2");
        assert!(p.collect_delta().is_some());
        assert!(p.collect_delta().is_none());
    }

    #[test]
    fn test_applied_delta_is_not_recollected() {
        let mut p = player();
        let delta = PlayerDelta::zero(&p).with_team(team::BLUE);
        p.apply_delta(&delta);
        assert_eq!(p.team(), team::BLUE);
        assert!(p.collect_delta().is_none());
    }

    #[test]
    fn test_flags_always_carried() {
        let mut p = player();
        p.set_loading_env(true);
        let delta = p.collect_delta().unwrap();
        assert!(delta.loading_env);
        assert!(!delta.admin);
        assert!(delta.team.is_none());
    }

    #[test]
    fn test_verify_nickname() {
        let p = player();
        assert!(PlayerDelta::zero(&p).with_nickname("ok").verify_structure());
        assert!(!PlayerDelta::zero(&p).with_nickname("   ").verify_structure());
        assert!(!PlayerDelta::zero(&p).with_nickname("a\u{7}b").verify_structure());
        assert!(!PlayerDelta::zero(&p)
            .with_nickname("x".repeat(MAX_NICKNAME_LEN + 1))
            .verify_structure());
    }
}
