//! Team home bases. Static bodies that damage enemy planes on contact.

use serde::{Deserialize, Serialize};

use super::component::Component;
use super::physics::{BodyHandle, BodyTag, Physics, Shape};
use crate::arena::player::Team;
use crate::constants::home_base;
use crate::util::{Networked, Pid, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeBaseState {
    pub dimensions: Vec2,
    pub pos: Vec2,
    pub rot: f32,
    /// Health removed from an enemy plane on contact
    pub damage: f32,
    pub friendly_team: Team,
}

impl HomeBaseState {
    pub fn new(pos: Vec2, friendly_team: Team) -> Self {
        Self {
            dimensions: home_base::DIMENSIONS,
            pos,
            rot: 0.0,
            damage: home_base::DAMAGE,
            friendly_team,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HomeBaseDelta {
    pub damage: f32,
}

#[derive(Debug)]
pub struct HomeBase {
    state: HomeBaseState,
    synced_damage: f32,
    body: BodyHandle,
    destroyable: bool,
}

impl HomeBase {
    pub fn state(&self) -> &HomeBaseState {
        &self.state
    }

    pub fn set_damage(&mut self, damage: f32) {
        self.state.damage = damage;
    }

    pub fn is_friendly(&self, team: Team) -> bool {
        self.state.friendly_team == team
    }
}

impl Networked for HomeBase {
    type Init = HomeBaseState;
    type Delta = HomeBaseDelta;

    fn capture_initializer(&self) -> HomeBaseState {
        self.state
    }

    fn apply_delta(&mut self, delta: &HomeBaseDelta) {
        self.state.damage = delta.damage;
        self.synced_damage = delta.damage;
    }

    fn collect_delta(&mut self) -> Option<HomeBaseDelta> {
        if self.state.damage == self.synced_damage {
            return None;
        }
        self.synced_damage = self.state.damage;
        Some(HomeBaseDelta {
            damage: self.state.damage,
        })
    }
}

impl Component for HomeBase {
    fn create(physics: &mut Physics, pid: Pid, init: &HomeBaseState) -> Self {
        let body = physics.create_body(&Shape::rectangle(init.dimensions), BodyTag::HomeBase(pid), true);
        physics.set_transform(body, init.pos, init.rot);
        Self {
            state: *init,
            synced_damage: init.damage,
            body,
            destroyable: false,
        }
    }

    fn is_destroyable(&self) -> bool {
        self.destroyable
    }

    fn mark_destroy(&mut self) {
        self.destroyable = true;
    }

    fn release(self, physics: &mut Physics) {
        physics.destroy_body(self.body);
    }
}
