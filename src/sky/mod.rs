//! Sky: the physical game world bound to an arena while a game runs.
//!
//! A `Sky` owns the physics world, one `Participation` per arena player and
//! a `ComponentSet` per free component kind. Every body in the world is
//! created and released through these owners.

pub mod component;
pub mod entity;
pub mod explosion;
pub mod handle;
pub mod home_base;
pub mod participation;
pub mod physics;
pub mod plane;
pub mod prop;
pub mod settings;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::arena::{Player, PlayerData};
use crate::constants::world::DIMENSIONS;
use crate::util::{Networked, Pid, TimeDiff, Vec2, VerifyStructure};

use component::{ComponentSet, ComponentSetDelta, ComponentSetInit};
use entity::{Entity, EntityDelta, EntityState};
use explosion::{Explosion, ExplosionDelta, ExplosionState};
use home_base::{HomeBase, HomeBaseDelta, HomeBaseState};
use physics::{Contact, Physics};
use plane::{Action, PlaneTuning};

pub use handle::SkyHandle;
pub use participation::{Participation, ParticipationDelta, ParticipationInit, ParticipationInput};
pub use settings::{SkySettings, SkySettingsDelta};

/// Full snapshot of a sky
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyInit {
    pub settings: SkySettings,
    pub participations: BTreeMap<Pid, ParticipationInit>,
    pub entities: ComponentSetInit<EntityState>,
    pub explosions: ComponentSetInit<ExplosionState>,
    pub home_bases: ComponentSetInit<HomeBaseState>,
}

impl VerifyStructure for SkyInit {
    fn verify_structure(&self) -> bool {
        self.settings.verify_structure()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkyDelta {
    pub settings: Option<SkySettingsDelta>,
    pub participations: BTreeMap<Pid, ParticipationDelta>,
    pub entities: Option<ComponentSetDelta<EntityState, EntityDelta>>,
    pub explosions: Option<ComponentSetDelta<ExplosionState, ExplosionDelta>>,
    pub home_bases: Option<ComponentSetDelta<HomeBaseState, HomeBaseDelta>>,
}

impl SkyDelta {
    pub fn is_empty(&self) -> bool {
        self.settings.is_none()
            && self.participations.is_empty()
            && self.entities.is_none()
            && self.explosions.is_none()
            && self.home_bases.is_none()
    }

    /// The delta as it should reach `pid`: fields of its own participation
    /// it is authoritative over are stripped, everything else passes through.
    pub fn respect_authority(&self, pid: Pid) -> SkyDelta {
        let mut delta = self.clone();
        if let Some(own) = delta.participations.remove(&pid) {
            let own = own.for_owner();
            if !own.is_empty() {
                delta.participations.insert(pid, own);
            }
        }
        delta
    }
}

impl VerifyStructure for SkyDelta {
    fn verify_structure(&self) -> bool {
        self.settings.verify_structure()
            && self.participations.values().all(VerifyStructure::verify_structure)
    }
}

#[derive(Debug)]
pub struct Sky {
    physics: Physics,
    settings: SkySettings,
    synced_settings: SkySettings,
    participations: PlayerData<Participation>,
    entities: ComponentSet<Entity>,
    explosions: ComponentSet<Explosion>,
    home_bases: ComponentSet<HomeBase>,
    contacts: Vec<Contact>,
}

impl Sky {
    pub fn new(init: &SkyInit) -> Self {
        let mut physics = Physics::new(DIMENSIONS, init.settings.gravity);

        let mut participations = PlayerData::new();
        for (pid, p) in &init.participations {
            participations.insert_by_pid(*pid, Participation::new(&mut physics, *pid, p));
        }
        let entities = ComponentSet::new(&mut physics, &init.entities);
        let explosions = ComponentSet::new(&mut physics, &init.explosions);
        let home_bases = ComponentSet::new(&mut physics, &init.home_bases);

        Self {
            physics,
            settings: init.settings,
            synced_settings: init.settings,
            participations,
            entities,
            explosions,
            home_bases,
            contacts: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SkySettings {
        &self.settings
    }

    pub fn change_settings(&mut self, settings: SkySettings) {
        self.settings = settings;
        self.physics.set_gravity(settings.gravity);
    }

    pub fn physics(&self) -> &Physics {
        &self.physics
    }

    // ========================================================================
    // Participations
    // ========================================================================

    /// Create an unspawned participation; existing ones are kept
    pub fn register_player(&mut self, player: &Player) {
        if !self.participations.contains(player.pid()) {
            let participation = Participation::new(&mut self.physics, player.pid(), &ParticipationInit::default());
            self.participations.insert(player, participation);
        }
    }

    pub fn unregister_player(&mut self, player: &Player) {
        if let Some(participation) = self.participations.remove(player) {
            participation.release(&mut self.physics);
        }
    }

    pub fn participation(&self, player: &Player) -> Option<&Participation> {
        self.participations.get(player)
    }

    pub fn participations(&self) -> impl Iterator<Item = (Pid, &Participation)> {
        self.participations.iter().map(|(pid, p)| (*pid, p))
    }

    pub fn spawned_count(&self) -> usize {
        self.participations.iter().filter(|(_, p)| p.is_spawned()).count()
    }

    pub fn do_action(&mut self, player: &Player, action: Action, state: bool) {
        if let Some(p) = self.participations.get_mut(player) {
            p.do_action(action, state);
        }
    }

    pub fn spawn(&mut self, player: &Player, tuning: &PlaneTuning, pos: Vec2, rot: f32) {
        if let Some(p) = self.participations.get_mut(player) {
            p.spawn(&mut self.physics, tuning, pos, rot);
        }
    }

    /// Destroy the player's plane, leaving an explosion behind
    pub fn kill(&mut self, player: &Player) -> bool {
        let Some(p) = self.participations.get_mut(player) else {
            return false;
        };
        match p.kill(&mut self.physics) {
            Some(pos) => {
                self.spawn_explosion(pos);
                true
            }
            None => false,
        }
    }

    /// Damage the player's plane; kills it once health runs out
    pub fn damage(&mut self, player: &Player, amount: f32) -> bool {
        let dead = self
            .participations
            .get_mut(player)
            .map_or(false, |p| p.damage(amount));
        dead && self.kill(player)
    }

    /// Accept the owner's client-authoritative state
    pub fn apply_input(&mut self, player: &Player, input: &ParticipationInput) {
        if let Some(p) = self.participations.get_mut(player) {
            p.apply_input(input);
        }
    }

    pub fn collect_input(&mut self, player: &Player) -> Option<ParticipationInput> {
        self.participations.get_mut(player)?.collect_input()
    }

    // ========================================================================
    // Components
    // ========================================================================

    pub fn spawn_entity(&mut self, state: EntityState) -> Pid {
        self.entities.create(&mut self.physics, &state)
    }

    pub fn destroy_entity(&mut self, pid: Pid) -> bool {
        self.entities.mark_destroy(pid)
    }

    pub fn spawn_explosion(&mut self, pos: Vec2) -> Pid {
        self.explosions.create(&mut self.physics, &ExplosionState::new(pos))
    }

    pub fn spawn_home_base(&mut self, state: HomeBaseState) -> Pid {
        self.home_bases.create(&mut self.physics, &state)
    }

    pub fn entities(&self) -> &ComponentSet<Entity> {
        &self.entities
    }

    pub fn explosions(&self) -> &ComponentSet<Explosion> {
        &self.explosions
    }

    pub fn home_bases(&self) -> &ComponentSet<HomeBase> {
        &self.home_bases
    }

    pub fn component_count(&self) -> usize {
        self.entities.len() + self.explosions.len() + self.home_bases.len()
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    pub fn tick(&mut self, delta: TimeDiff) {
        for (_, p) in self.participations.iter_mut() {
            p.pre_physics(&mut self.physics);
        }
        self.entities.pre_physics(&mut self.physics);
        self.explosions.pre_physics(&mut self.physics);
        self.home_bases.pre_physics(&mut self.physics);

        self.physics.step(delta);

        let gravity = self.settings.gravity;
        for (_, p) in self.participations.iter_mut() {
            p.post_physics(&mut self.physics, gravity, delta);
        }
        self.entities.post_physics(&self.physics, delta);
        self.explosions.post_physics(&self.physics, delta);
        self.home_bases.post_physics(&self.physics, delta);

        self.contacts.clear();
        self.contacts.extend(self.physics.drain_contacts());

        self.entities.flush(&mut self.physics);
        self.explosions.flush(&mut self.physics);
        self.home_bases.flush(&mut self.physics);
    }

    /// Contact transitions of the most recent tick
    pub fn take_contacts(&mut self) -> Vec<Contact> {
        std::mem::take(&mut self.contacts)
    }

    /// Release every body in the world
    pub fn release(mut self) {
        for (_, p) in self.participations.drain() {
            p.release(&mut self.physics);
        }
        self.entities.release_all(&mut self.physics);
        self.explosions.release_all(&mut self.physics);
        self.home_bases.release_all(&mut self.physics);
        debug_assert_eq!(self.physics.body_count(), 0);
    }
}

impl Networked for Sky {
    type Init = SkyInit;
    type Delta = SkyDelta;

    fn capture_initializer(&self) -> SkyInit {
        SkyInit {
            settings: self.settings,
            participations: self
                .participations
                .iter()
                .map(|(pid, p)| (*pid, p.capture_initializer()))
                .collect(),
            entities: self.entities.capture_initializer(),
            explosions: self.explosions.capture_initializer(),
            home_bases: self.home_bases.capture_initializer(),
        }
    }

    fn apply_delta(&mut self, delta: &SkyDelta) {
        if let Some(settings) = &delta.settings {
            let mut next = self.settings;
            next.apply(settings);
            self.change_settings(next);
            self.synced_settings = next;
        }
        for (pid, d) in &delta.participations {
            if let Some(p) = self.participations.get_by_pid_mut(*pid) {
                p.apply_delta(&mut self.physics, d);
            }
        }
        if let Some(d) = &delta.entities {
            self.entities.apply_delta(&mut self.physics, d);
        }
        if let Some(d) = &delta.explosions {
            self.explosions.apply_delta(&mut self.physics, d);
        }
        if let Some(d) = &delta.home_bases {
            self.home_bases.apply_delta(&mut self.physics, d);
        }
    }

    fn collect_delta(&mut self) -> Option<SkyDelta> {
        let settings = self.settings.diff(&self.synced_settings);
        self.synced_settings = self.settings;

        let delta = SkyDelta {
            settings,
            participations: self
                .participations
                .iter_mut()
                .filter_map(|(pid, p)| p.collect_delta().map(|d| (*pid, d)))
                .collect(),
            entities: self.entities.collect_delta(),
            explosions: self.explosions.collect_delta(),
            home_bases: self.home_bases.collect_delta(),
        };
        (!delta.is_empty()).then_some(delta)
    }
}
