//! Arena subsystem that owns the sky while a game is running.

use std::sync::Arc;

use parking_lot::Mutex;

use super::plane::{Action, PlaneTuning};
use super::{Sky, SkyDelta, SkyInit};
use crate::arena::{Arena, ArenaMode, Player, Roster, Subsystem};
use crate::util::{Networked, TimeDiff, Vec2};

/// Holds `Some(Sky)` exactly while the arena is in `ArenaMode::Game`
#[derive(Debug, Default)]
pub struct SkyHandle {
    sky: Option<Sky>,
}

impl SkyHandle {
    /// `init` restores a received snapshot when `mode` is `Game`
    pub fn new(mode: ArenaMode, init: Option<&SkyInit>) -> Self {
        let sky = (mode == ArenaMode::Game).then(|| Sky::new(init.unwrap_or(&SkyInit::default())));
        Self { sky }
    }

    /// Build a handle matching the arena's mode and attach it
    pub fn attach(arena: &mut Arena, init: Option<&SkyInit>) -> Arc<Mutex<SkyHandle>> {
        let handle = Arc::new(Mutex::new(SkyHandle::new(arena.mode(), init)));
        arena.attach(Arc::clone(&handle));
        handle
    }

    pub fn sky(&self) -> Option<&Sky> {
        self.sky.as_ref()
    }

    pub fn sky_mut(&mut self) -> Option<&mut Sky> {
        self.sky.as_mut()
    }

    pub fn is_active(&self) -> bool {
        self.sky.is_some()
    }

    /// Snapshot for a joining client; empty when no game is running
    pub fn capture_initializer(&self) -> SkyInit {
        self.sky
            .as_ref()
            .map(Networked::capture_initializer)
            .unwrap_or_default()
    }

    pub fn collect_delta(&mut self) -> Option<SkyDelta> {
        self.sky.as_mut()?.collect_delta()
    }

    /// Deltas arriving while no game runs are dropped
    pub fn apply_delta(&mut self, delta: &SkyDelta) {
        if let Some(sky) = self.sky.as_mut() {
            sky.apply_delta(delta);
        }
    }
}

impl Subsystem for SkyHandle {
    fn register_player(&mut self, player: &Player) {
        if let Some(sky) = self.sky.as_mut() {
            sky.register_player(player);
        }
    }

    fn unregister_player(&mut self, player: &Player) {
        if let Some(sky) = self.sky.as_mut() {
            sky.unregister_player(player);
        }
    }

    fn on_action(&mut self, player: &Player, action: Action, state: bool) {
        if let Some(sky) = self.sky.as_mut() {
            sky.do_action(player, action, state);
        }
    }

    fn on_spawn(&mut self, player: &Player, tuning: &PlaneTuning, pos: Vec2, rot: f32) {
        if let Some(sky) = self.sky.as_mut() {
            sky.spawn(player, tuning, pos, rot);
        }
    }

    fn on_tick(&mut self, delta: TimeDiff) {
        if let Some(sky) = self.sky.as_mut() {
            sky.tick(delta);
        }
    }

    fn on_mode(&mut self, mode: ArenaMode, roster: Roster<'_>) {
        if mode == ArenaMode::Game {
            if self.sky.is_none() {
                let mut sky = Sky::new(&SkyInit::default());
                for player in roster.iter() {
                    sky.register_player(player);
                }
                tracing::debug!("Sky created for {} players", roster.len());
                self.sky = Some(sky);
            }
        } else if let Some(sky) = self.sky.take() {
            sky.release();
            tracing::debug!("Sky released");
        }
    }
}
