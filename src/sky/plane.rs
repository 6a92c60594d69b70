//! Planes: controls, tuning, state and the flight model.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::physics::{BodyHandle, BodyTag, PhysicalState, Physics, Shape};
use super::prop::PropState;
use crate::constants::prop;
use crate::util::{Pid, TimeDiff, Vec2, VerifyStructure};

// ============================================================================
// Actions and controls
// ============================================================================

/// Player-controllable action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Thrust,
    Reverse,
    Left,
    Right,
    Primary,
    Secondary,
    Special,
    Suicide,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Thrust,
        Action::Reverse,
        Action::Left,
        Action::Right,
        Action::Primary,
        Action::Secondary,
        Action::Special,
        Action::Suicide,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::Thrust => "thrust",
            Action::Reverse => "reverse",
            Action::Left => "left",
            Action::Right => "right",
            Action::Primary => "primary",
            Action::Secondary => "secondary",
            Action::Special => "special",
            Action::Suicide => "suicide",
        }
    }

    pub fn from_name(name: &str) -> Option<Action> {
        Action::ALL.into_iter().find(|a| a.name() == name)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Held-state of every action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneControls {
    bits: u16,
}

impl PlaneControls {
    pub fn do_action(&mut self, action: Action, state: bool) {
        if state {
            self.bits |= action.bit();
        } else {
            self.bits &= !action.bit();
        }
    }

    pub fn get_state(&self, action: Action) -> bool {
        self.bits & action.bit() != 0
    }

    /// -1 turning left, 1 turning right, 0 for neither or both
    pub fn rot_movement(&self) -> f32 {
        match (self.get_state(Action::Left), self.get_state(Action::Right)) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

// ============================================================================
// Tuning
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyTuning {
    /// Energy per second spent by the afterburner
    pub thrust_drain: f32,
    /// Energy per second regained while not burning
    pub recharge: f32,
    /// Energy per primary shot
    pub laser_gun: f32,
    /// Primary cooldown recovered per second
    pub primary_recharge: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StallTuning {
    pub max_rot_vel: f32,
    pub max_vel: f32,
    pub thrust: f32,
    pub damping: f32,
    /// Forward speed at which a stalled plane recovers
    pub threshold: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightTuning {
    pub max_rot_vel: f32,
    /// Pixels per second at airspeed 1
    pub airspeed_factor: f32,
    pub throttle_influence: f32,
    pub throttle_effect: f32,
    pub throttle_brake_effect: f32,
    pub throttle_glide_damper: f32,
    pub gravity_effect: f32,
    pub afterburn_drive: f32,
    pub leftover_damping: f32,
    /// Speed below which a flying plane stalls
    pub threshold: f32,
}

/// Static parameters of a plane, fixed at spawn
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneTuning {
    pub hitbox: Vec2,
    pub max_health: f32,
    pub throttle_speed: f32,
    pub energy: EnergyTuning,
    pub stall: StallTuning,
    pub flight: FlightTuning,
}

impl Default for PlaneTuning {
    fn default() -> Self {
        Self {
            hitbox: Vec2::new(75.0, 30.0),
            max_health: 10.0,
            throttle_speed: 1.5,
            energy: EnergyTuning {
                thrust_drain: 1.0,
                recharge: 0.5,
                laser_gun: 0.3,
                primary_recharge: 4.0,
            },
            stall: StallTuning {
                max_rot_vel: 200.0,
                max_vel: 300.0,
                thrust: 250.0,
                damping: 0.8,
                threshold: 130.0,
            },
            flight: FlightTuning {
                max_rot_vel: 190.0,
                airspeed_factor: 350.0,
                throttle_influence: 0.65,
                throttle_effect: 0.3,
                throttle_brake_effect: 0.6,
                throttle_glide_damper: 0.5,
                gravity_effect: 0.6,
                afterburn_drive: 0.8,
                leftover_damping: 0.3,
                threshold: 100.0,
            },
        }
    }
}

impl PlaneTuning {
    /// Mutable access to a parameter by dotted name, e.g. `flight.threshold`
    pub fn param_mut(&mut self, name: &str) -> Option<&mut f32> {
        Some(match name {
            "hitbox.x" => &mut self.hitbox.x,
            "hitbox.y" => &mut self.hitbox.y,
            "maxHealth" => &mut self.max_health,
            "throttleSpeed" => &mut self.throttle_speed,

            "energy.thrustDrain" => &mut self.energy.thrust_drain,
            "energy.recharge" => &mut self.energy.recharge,
            "energy.laserGun" => &mut self.energy.laser_gun,
            "energy.primaryRecharge" => &mut self.energy.primary_recharge,

            "stall.maxRotVel" => &mut self.stall.max_rot_vel,
            "stall.maxVel" => &mut self.stall.max_vel,
            "stall.thrust" => &mut self.stall.thrust,
            "stall.damping" => &mut self.stall.damping,
            "stall.threshold" => &mut self.stall.threshold,

            "flight.maxRotVel" => &mut self.flight.max_rot_vel,
            "flight.airspeedFactor" => &mut self.flight.airspeed_factor,
            "flight.throttleInfluence" => &mut self.flight.throttle_influence,
            "flight.throttleEffect" => &mut self.flight.throttle_effect,
            "flight.throttleBrakeEffect" => &mut self.flight.throttle_brake_effect,
            "flight.throttleGlideDamper" => &mut self.flight.throttle_glide_damper,
            "flight.gravityEffect" => &mut self.flight.gravity_effect,
            "flight.afterburnDrive" => &mut self.flight.afterburn_drive,
            "flight.leftoverDamping" => &mut self.flight.leftover_damping,
            "flight.threshold" => &mut self.flight.threshold,
            _ => return None,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// ============================================================================
// State
// ============================================================================

/// Full dynamic state of a plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneState {
    pub physical: PhysicalState,
    pub stalled: bool,
    /// 0..1, how hard the afterburner fired last tick
    pub afterburner: f32,
    /// Velocity left over from leaving a stall, damped over time
    pub leftover_vel: Vec2,
    pub airspeed: f32,
    pub throttle: f32,
    /// 0..1
    pub energy: f32,
    /// 0..1
    pub health: f32,
    /// 0..1, primary can fire at 0
    pub primary_cooldown: f32,
}

impl PlaneState {
    /// Fresh plane flying along `rot` at cruising airspeed
    pub fn new(tuning: &PlaneTuning, pos: Vec2, rot: f32) -> Self {
        Self {
            physical: PhysicalState::new(
                pos,
                Vec2::from_degrees(rot) * tuning.flight.airspeed_factor,
                rot,
                0.0,
            ),
            stalled: false,
            afterburner: 0.0,
            leftover_vel: Vec2::ZERO,
            airspeed: tuning.flight.throttle_influence,
            throttle: 1.0,
            energy: 1.0,
            health: 1.0,
            primary_cooldown: 0.0,
        }
    }

    /// Speed along the nose
    pub fn forward_velocity(&self) -> f32 {
        self.physical.vel.dot(Vec2::from_degrees(self.physical.rot))
    }

    pub fn velocity(&self) -> f32 {
        self.physical.vel.length()
    }

    /// Spend `amount` energy if available
    pub fn request_energy(&mut self, amount: f32) -> bool {
        if self.energy >= amount {
            self.energy -= amount;
            true
        } else {
            false
        }
    }

    pub fn apply_client(&mut self, client: &PlaneStateClient) {
        self.physical = client.physical;
        self.airspeed = client.airspeed;
        self.throttle = client.throttle;
        self.stalled = client.stalled;
    }

    pub fn apply_server(&mut self, server: &PlaneStateServer) {
        self.energy = server.energy;
        self.health = server.health;
        self.primary_cooldown = server.primary_cooldown;
    }
}

/// Fields the owning client is authoritative over
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneStateClient {
    pub physical: PhysicalState,
    pub airspeed: f32,
    pub throttle: f32,
    pub stalled: bool,
}

impl From<&PlaneState> for PlaneStateClient {
    fn from(state: &PlaneState) -> Self {
        Self {
            physical: state.physical,
            airspeed: state.airspeed,
            throttle: state.throttle,
            stalled: state.stalled,
        }
    }
}

impl VerifyStructure for PlaneStateClient {
    fn verify_structure(&self) -> bool {
        self.physical.is_finite()
            && self.airspeed.is_finite()
            && (0.0..=1.0).contains(&self.throttle)
    }
}

/// Fields only the server may change
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneStateServer {
    pub energy: f32,
    pub health: f32,
    pub primary_cooldown: f32,
}

impl From<&PlaneState> for PlaneStateServer {
    fn from(state: &PlaneState) -> Self {
        Self {
            energy: state.energy,
            health: state.health,
            primary_cooldown: state.primary_cooldown,
        }
    }
}

// ============================================================================
// Plane
// ============================================================================

/// A spawned plane bound to a physics body
#[derive(Debug)]
pub struct Plane {
    tuning: PlaneTuning,
    state: PlaneState,
    body: BodyHandle,
}

impl Plane {
    pub(crate) fn new(physics: &mut Physics, pid: Pid, tuning: PlaneTuning, state: PlaneState) -> Self {
        let body = physics.create_body(&Shape::rectangle(tuning.hitbox), BodyTag::Plane(pid), false);
        // the flight model applies gravity itself
        physics.set_gravity_scale(body, 0.0);
        state.physical.hard_write_to_body(physics, body);
        Self { tuning, state, body }
    }

    pub fn tuning(&self) -> &PlaneTuning {
        &self.tuning
    }

    pub fn state(&self) -> &PlaneState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut PlaneState {
        &mut self.state
    }

    pub fn body(&self) -> BodyHandle {
        self.body
    }

    pub(crate) fn pre_physics(&mut self, physics: &mut Physics) {
        self.state.physical.write_to_body(physics, self.body);
    }

    /// Read back the body and run the flight model; returns a prop to fire
    pub(crate) fn post_physics(
        &mut self,
        physics: &Physics,
        controls: &PlaneControls,
        gravity: f32,
        delta: TimeDiff,
    ) -> Option<PropState> {
        if let Some(physical) = PhysicalState::read_from_body(physics, self.body) {
            self.state.physical = physical;
        }
        self.tick_flight(controls, gravity, delta);
        self.tick_weapons(controls, delta)
    }

    fn tick_flight(&mut self, controls: &PlaneControls, gravity: f32, delta: TimeDiff) {
        let tuning = &self.tuning;
        let state = &mut self.state;

        // throttle
        if controls.get_state(Action::Thrust) {
            state.throttle += tuning.throttle_speed * delta;
        }
        if controls.get_state(Action::Reverse) {
            state.throttle -= tuning.throttle_speed * delta;
        }
        state.throttle = state.throttle.clamp(0.0, 1.0);

        let max_rot_vel = if state.stalled {
            tuning.stall.max_rot_vel
        } else {
            tuning.flight.max_rot_vel
        };
        state.physical.rotvel = controls.rot_movement() * max_rot_vel;

        let burning = controls.get_state(Action::Thrust)
            && state.request_energy(tuning.energy.thrust_drain * delta);
        state.afterburner = if burning { 1.0 } else { 0.0 };

        let forward = Vec2::from_degrees(state.physical.rot);

        if state.stalled {
            state.physical.vel += Vec2::new(0.0, gravity * delta);
            if burning {
                state.physical.vel += forward * (tuning.stall.thrust * delta);
            }
            let speed = state.physical.vel.length();
            if speed > tuning.stall.max_vel {
                let excess = (speed - tuning.stall.max_vel) * tuning.stall.damping;
                state.physical.vel = state.physical.vel.clamp_length(speed - excess);
            }

            let forward_velocity = state.forward_velocity();
            if forward_velocity > tuning.stall.threshold {
                state.stalled = false;
                state.airspeed = forward_velocity / tuning.flight.airspeed_factor;
                state.leftover_vel = state.physical.vel - forward * forward_velocity;
            }
        } else {
            let target = state.throttle * tuning.flight.throttle_influence;
            let effect = if target < state.airspeed {
                tuning.flight.throttle_brake_effect
            } else {
                tuning.flight.throttle_effect
            };
            let mut change = (target - state.airspeed) * effect;
            // diving (nose down, +y) gains airspeed, climbing loses it
            let gravity_pull = forward.y * tuning.flight.gravity_effect;
            change += if state.throttle > 0.0 {
                gravity_pull
            } else {
                gravity_pull * tuning.flight.throttle_glide_damper
            };
            if burning {
                change += tuning.flight.afterburn_drive;
            }
            state.airspeed = (state.airspeed + change * delta).max(0.0);

            let damping = (1.0 - tuning.flight.leftover_damping * delta).max(0.0);
            state.leftover_vel *= damping;
            state.physical.vel = forward * (state.airspeed * tuning.flight.airspeed_factor)
                + state.leftover_vel;

            if state.airspeed * tuning.flight.airspeed_factor < tuning.flight.threshold {
                state.stalled = true;
                state.leftover_vel = Vec2::ZERO;
            }
        }

        if !burning {
            state.energy = (state.energy + tuning.energy.recharge * delta).min(1.0);
        }
    }

    fn tick_weapons(&mut self, controls: &PlaneControls, delta: TimeDiff) -> Option<PropState> {
        let tuning = &self.tuning;
        let state = &mut self.state;

        state.primary_cooldown =
            (state.primary_cooldown - tuning.energy.primary_recharge * delta).max(0.0);

        if !controls.get_state(Action::Primary)
            || state.primary_cooldown > 0.0
            || !state.request_energy(tuning.energy.laser_gun)
        {
            return None;
        }
        state.primary_cooldown = 1.0;

        let forward = Vec2::from_degrees(state.physical.rot);
        Some(PropState {
            physical: PhysicalState::new(
                state.physical.pos + forward * (tuning.hitbox.x * 0.5),
                state.physical.vel + forward * prop::SPEED,
                state.physical.rot,
                0.0,
            ),
            lifetime: 0.0,
        })
    }

    pub(crate) fn release(self, physics: &mut Physics) {
        physics.destroy_body(self.body);
    }
}
