//! Free-floating entities (crates, debris, ...).

use serde::{Deserialize, Serialize};

use super::component::Component;
use super::physics::{BodyHandle, BodyTag, PhysicalState, Physics, Shape};
use crate::util::{Networked, Pid, TimeDiff, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub dimensions: Vec2,
    /// Fixed entities get a static body
    pub fixed: bool,
    pub physical: PhysicalState,
    pub lifetime: f32,
}

impl EntityState {
    pub fn new(dimensions: Vec2, physical: PhysicalState, fixed: bool) -> Self {
        Self {
            dimensions,
            fixed,
            physical,
            lifetime: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntityDelta {
    pub physical: PhysicalState,
    pub lifetime: f32,
}

#[derive(Debug)]
pub struct Entity {
    state: EntityState,
    synced: EntityDelta,
    body: BodyHandle,
    destroyable: bool,
}

impl Entity {
    pub fn state(&self) -> &EntityState {
        &self.state
    }

    fn snapshot(&self) -> EntityDelta {
        EntityDelta {
            physical: self.state.physical,
            lifetime: self.state.lifetime,
        }
    }
}

impl Networked for Entity {
    type Init = EntityState;
    type Delta = EntityDelta;

    fn capture_initializer(&self) -> EntityState {
        self.state
    }

    fn apply_delta(&mut self, delta: &EntityDelta) {
        self.state.physical = delta.physical;
        self.state.lifetime = delta.lifetime;
        self.synced = *delta;
    }

    fn collect_delta(&mut self) -> Option<EntityDelta> {
        let current = self.snapshot();
        if current == self.synced {
            return None;
        }
        self.synced = current;
        Some(current)
    }
}

impl Component for Entity {
    fn create(physics: &mut Physics, pid: Pid, init: &EntityState) -> Self {
        let body = physics.create_body(&Shape::rectangle(init.dimensions), BodyTag::Entity(pid), init.fixed);
        physics.set_gravity_scale(body, 0.0);
        init.physical.hard_write_to_body(physics, body);
        Self {
            state: *init,
            synced: EntityDelta {
                physical: init.physical,
                lifetime: init.lifetime,
            },
            body,
            destroyable: false,
        }
    }

    fn pre_physics(&mut self, physics: &mut Physics) {
        self.state.physical.write_to_body(physics, self.body);
    }

    fn post_physics(&mut self, physics: &Physics, delta: TimeDiff) {
        if let Some(physical) = PhysicalState::read_from_body(physics, self.body) {
            self.state.physical = physical;
        }
        self.state.lifetime += delta;
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
