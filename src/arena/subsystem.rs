//! Pluggable modules attached to an `Arena`.
//!
//! A subsystem keeps its own per-player state (see [`PlayerData`]) and is
//! driven by arena callbacks, delivered synchronously in attach order.
//! Callbacks receive read-only views of the arena's players; mutating the
//! arena from inside a callback is not possible through these signatures,
//! and re-entrant dispatch into the same subsystem is caught at runtime.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::player::{Player, PlayerDelta};
use super::ArenaMode;
use crate::sky::plane::{Action, PlaneTuning};
use crate::util::{Pid, TimeDiff, Vec2};

/// Handle returned by `Arena::attach`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsystemId(pub(crate) u32);

/// Shared handle through which the arena reaches a subsystem
pub type SharedSubsystem = Arc<Mutex<dyn Subsystem>>;

/// Arena lifecycle callbacks. Every method defaults to a no-op.
pub trait Subsystem: Send {
    /// Create per-player state. Called before `on_join`, and for every
    /// existing player when the subsystem is attached.
    fn register_player(&mut self, _player: &Player) {}

    /// Destroy per-player state. Called after `on_quit`, and for every
    /// player when the subsystem is detached.
    fn unregister_player(&mut self, _player: &Player) {}

    fn on_join(&mut self, _player: &Player) {}

    fn on_quit(&mut self, _player: &Player) {}

    /// `player` already reflects `delta`
    fn on_delta(&mut self, _player: &Player, _delta: &PlayerDelta) {}

    fn on_tick(&mut self, _delta: TimeDiff) {}

    fn on_poll(&mut self, _delta: TimeDiff) {}

    fn on_action(&mut self, _player: &Player, _action: Action, _state: bool) {}

    fn on_spawn(&mut self, _player: &Player, _tuning: &PlaneTuning, _pos: Vec2, _rot: f32) {}

    fn on_mode(&mut self, _mode: ArenaMode, _roster: Roster<'_>) {}

    fn on_map_change(&mut self, _environment: &str) {}
}

/// Read-only view of the arena's players
#[derive(Clone, Copy)]
pub struct Roster<'a> {
    players: &'a BTreeMap<Pid, Player>,
}

impl<'a> Roster<'a> {
    pub(crate) fn new(players: &'a BTreeMap<Pid, Player>) -> Self {
        Self { players }
    }

    pub fn get(&self, pid: Pid) -> Option<&'a Player> {
        self.players.get(&pid)
    }

    pub fn iter(&self) -> btree_map::Values<'a, Pid, Player> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Typed per-player payload owned by a subsystem.
///
/// Entries are keyed by the player's identity; insert in `register_player`
/// and remove in `unregister_player` so the payload never outlives the
/// player.
#[derive(Debug, Clone)]
pub struct PlayerData<T> {
    entries: BTreeMap<Pid, T>,
}

impl<T> Default for PlayerData<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<T> PlayerData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, player: &Player, value: T) -> Option<T> {
        self.entries.insert(player.pid(), value)
    }

    pub fn remove(&mut self, player: &Player) -> Option<T> {
        self.entries.remove(&player.pid())
    }

    pub fn get(&self, player: &Player) -> Option<&T> {
        self.entries.get(&player.pid())
    }

    pub fn get_mut(&mut self, player: &Player) -> Option<&mut T> {
        self.entries.get_mut(&player.pid())
    }

    pub(crate) fn get_by_pid(&self, pid: Pid) -> Option<&T> {
        self.entries.get(&pid)
    }

    pub(crate) fn get_by_pid_mut(&mut self, pid: Pid) -> Option<&mut T> {
        self.entries.get_mut(&pid)
    }

    pub(crate) fn insert_by_pid(&mut self, pid: Pid, value: T) -> Option<T> {
        self.entries.insert(pid, value)
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.entries.contains_key(&pid)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Pid, T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> btree_map::IterMut<'_, Pid, T> {
        self.entries.iter_mut()
    }

    pub fn pids(&self) -> impl Iterator<Item = Pid> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry, handing ownership to the caller
    pub fn drain(&mut self) -> impl Iterator<Item = (Pid, T)> {
        std::mem::take(&mut self.entries).into_iter()
    }
}

/// A subsystem attached to an arena
pub(crate) struct Attached {
    pub(crate) id: SubsystemId,
    pub(crate) system: SharedSubsystem,
}

/// Invoke `f` on every attached subsystem in attach order
pub(crate) fn dispatch(subsystems: &[Attached], mut f: impl FnMut(&mut dyn Subsystem)) {
    for attached in subsystems {
        match attached.system.try_lock() {
            Some(mut guard) => f(&mut *guard),
            None => {
                tracing::error!(
                    "Subsystem {:?} is busy; re-entrant arena dispatch skipped",
                    attached.id
                );
                debug_assert!(false, "re-entrant dispatch into subsystem {:?}", attached.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::PlayerInit;

    fn player(pid: Pid) -> Player {
        Player::new(&PlayerInit::new(pid, format!("p{pid}")))
    }

    #[test]
    fn test_player_data_follows_registration() {
        let (a, b) = (player(0), player(4));
        let mut data: PlayerData<u32> = PlayerData::new();
        assert!(data.insert(&a, 1).is_none());
        assert!(data.insert(&b, 2).is_none());
        assert_eq!(data.insert(&a, 3), Some(1));

        *data.get_mut(&b).unwrap() += 10;
        assert_eq!(data.get_by_pid(4), Some(&12));
        assert_eq!(data.pids().collect::<Vec<_>>(), [0, 4]);

        assert_eq!(data.remove(&a), Some(3));
        assert!(!data.contains(0));
        assert!(data.get(&a).is_none());

        let drained: Vec<_> = data.drain().collect();
        assert_eq!(drained, [(4, 12)]);
        assert!(data.is_empty());
    }
}
