//! Props: short-lived projectiles owned by a participation.

use serde::{Deserialize, Serialize};

use super::physics::{BodyHandle, BodyTag, PhysicalState, Physics, Shape};
use crate::constants::prop::{LIFETIME, RADIUS};
use crate::util::{Pid, TimeDiff};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropState {
    pub physical: PhysicalState,
    /// Seconds since the prop was fired
    pub lifetime: f32,
}

#[derive(Debug)]
pub struct Prop {
    state: PropState,
    body: BodyHandle,
}

impl Prop {
    pub(crate) fn new(physics: &mut Physics, owner: Pid, id: Pid, state: PropState) -> Self {
        let body = physics.create_body(&Shape::circle(RADIUS), BodyTag::Prop { owner, id }, false);
        physics.set_gravity_scale(body, 0.0);
        state.physical.hard_write_to_body(physics, body);
        Self { state, body }
    }

    pub fn state(&self) -> &PropState {
        &self.state
    }

    pub(crate) fn set_state(&mut self, state: PropState) {
        self.state = state;
    }

    pub(crate) fn pre_physics(&mut self, physics: &mut Physics) {
        self.state.physical.hard_write_to_body(physics, self.body);
    }

    pub(crate) fn post_physics(&mut self, physics: &Physics, delta: TimeDiff) {
        if let Some(physical) = PhysicalState::read_from_body(physics, self.body) {
            self.state.physical = physical;
        }
        self.state.lifetime += delta;
    }

    pub fn is_expired(&self) -> bool {
        self.state.lifetime >= LIFETIME
    }

    pub(crate) fn release(self, physics: &mut Physics) {
        physics.destroy_body(self.body);
    }
}
