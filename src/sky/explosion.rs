//! Explosions left behind by destroyed planes. They destroy themselves once
//! their lifetime runs out.

use serde::{Deserialize, Serialize};

use super::component::Component;
use super::physics::{BodyHandle, BodyTag, Physics, Shape};
use crate::constants::explosion;
use crate::util::{Networked, Pid, TimeDiff, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplosionState {
    pub pos: Vec2,
    pub radius: f32,
    pub lifetime: f32,
    pub max_lifetime: f32,
}

impl ExplosionState {
    pub fn new(pos: Vec2) -> Self {
        Self {
            pos,
            radius: explosion::RADIUS,
            lifetime: 0.0,
            max_lifetime: explosion::LIFETIME,
        }
    }

    /// 0 when fresh, 1 when spent
    pub fn progress(&self) -> f32 {
        if self.max_lifetime <= 0.0 {
            1.0
        } else {
            (self.lifetime / self.max_lifetime).min(1.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExplosionDelta {
    pub lifetime: f32,
}

#[derive(Debug)]
pub struct Explosion {
    state: ExplosionState,
    synced_lifetime: f32,
    body: BodyHandle,
    destroyable: bool,
}

impl Explosion {
    pub fn state(&self) -> &ExplosionState {
        &self.state
    }
}

impl Networked for Explosion {
    type Init = ExplosionState;
    type Delta = ExplosionDelta;

    fn capture_initializer(&self) -> ExplosionState {
        self.state
    }

    fn apply_delta(&mut self, delta: &ExplosionDelta) {
        self.state.lifetime = delta.lifetime;
        self.synced_lifetime = delta.lifetime;
    }

    fn collect_delta(&mut self) -> Option<ExplosionDelta> {
        if self.state.lifetime == self.synced_lifetime {
            return None;
        }
        self.synced_lifetime = self.state.lifetime;
        Some(ExplosionDelta {
            lifetime: self.state.lifetime,
        })
    }
}

impl Component for Explosion {
    fn create(physics: &mut Physics, pid: Pid, init: &ExplosionState) -> Self {
        let body = physics.create_body(&Shape::circle(init.radius), BodyTag::Explosion(pid), true);
        physics.set_transform(body, init.pos, 0.0);
        Self {
            state: *init,
            synced_lifetime: init.lifetime,
            body,
            destroyable: false,
        }
    }

    fn post_physics(&mut self, _physics: &Physics, delta: TimeDiff) {
        self.state.lifetime += delta;
        if self.state.lifetime >= self.state.max_lifetime {
            self.destroyable = true;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::component::{ComponentSet, ComponentSetInit};

    #[test]
    fn test_explosion_expires() {
        let mut physics = Physics::new(Vec2::new(1000.0, 1000.0), 0.0);
        let mut set: ComponentSet<Explosion> = ComponentSet::new(&mut physics, &ComponentSetInit::default());
        set.create(&mut physics, &ExplosionState::new(Vec2::new(100.0, 100.0)));

        set.post_physics(&physics, 1.0);
        assert_eq!(set.flush(&mut physics), 0);
        set.post_physics(&physics, 1.0);
        assert_eq!(set.flush(&mut physics), 1);
        assert!(set.is_empty());
        assert_eq!(physics.body_count(), 0);
    }

    #[test]
    fn test_lifetime_delta() {
        let mut physics = Physics::new(Vec2::new(1000.0, 1000.0), 0.0);
        let mut local = Explosion::create(&mut physics, 0, &ExplosionState::new(Vec2::ZERO));
        let mut remote = Explosion::create(&mut physics, 0, &local.capture_initializer());
        assert!(local.collect_delta().is_none());

        local.post_physics(&physics, 0.5);
        remote.apply_delta(&local.collect_delta().unwrap());
        assert_eq!(remote.state(), local.state());
        assert!((local.state().progress() - 0.5 / explosion::LIFETIME).abs() < 1e-6);
    }
}
