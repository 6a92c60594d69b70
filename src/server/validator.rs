use crate::constants::world;
use crate::sky::plane::{PlaneState, PlaneStateClient};
use crate::sky::ParticipationInput;
use crate::util::Vec2;

/// Reasons a client input is refused
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputViolation {
    #[error("NaN or Infinity in input values")]
    InvalidFloats,
    #[error("Throttle out of range: {0}")]
    ThrottleRange(f32),
    #[error("Plane state sent without a spawned plane")]
    NotSpawned,
    #[error("Position outside the world: ({0}, {1})")]
    OutOfBounds(f32, f32),
    #[error("Velocity too high: {0}")]
    Overspeed(f32),
    #[error("Position jumped {0} from the last known state")]
    Teleport(f32),
}

/// Configuration for input validation
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// World rectangle the reported position must lie in
    pub world_dimensions: Vec2,
    /// Slack around the world rectangle
    pub bounds_margin: f32,
    /// Maximum reported speed in pixels per second
    pub max_speed: f32,
    /// Maximum distance between the server's copy and a reported position
    pub max_position_jump: f32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            world_dimensions: world::DIMENSIONS,
            bounds_margin: 50.0,
            max_speed: 1500.0,
            max_position_jump: 400.0,
        }
    }
}

/// Checks client-authoritative input before it reaches the sky
#[derive(Debug, Clone, Default)]
pub struct InputValidator {
    config: ValidationConfig,
}

impl InputValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate `input` against the server's copy of the sender's plane
    pub fn validate_input(
        &self,
        input: &ParticipationInput,
        current: Option<&PlaneState>,
    ) -> Result<(), InputViolation> {
        let Some(reported) = &input.plane_state else {
            return Ok(());
        };
        let Some(current) = current else {
            return Err(InputViolation::NotSpawned);
        };

        self.validate_values(reported)?;
        self.validate_bounds(reported.physical.pos)?;
        self.validate_speed(reported.physical.vel)?;
        self.validate_jump(current.physical.pos, reported.physical.pos)?;
        Ok(())
    }

    fn validate_values(&self, state: &PlaneStateClient) -> Result<(), InputViolation> {
        if !state.physical.is_finite() || !state.airspeed.is_finite() || !state.throttle.is_finite() {
            return Err(InputViolation::InvalidFloats);
        }
        if !(0.0..=1.0).contains(&state.throttle) {
            return Err(InputViolation::ThrottleRange(state.throttle));
        }
        Ok(())
    }

    fn validate_bounds(&self, pos: Vec2) -> Result<(), InputViolation> {
        let margin = self.config.bounds_margin;
        let dims = self.config.world_dimensions;
        let inside = (-margin..=dims.x + margin).contains(&pos.x) && (-margin..=dims.y + margin).contains(&pos.y);
        if !inside {
            return Err(InputViolation::OutOfBounds(pos.x, pos.y));
        }
        Ok(())
    }

    fn validate_speed(&self, vel: Vec2) -> Result<(), InputViolation> {
        let speed = vel.length();
        if speed > self.config.max_speed {
            return Err(InputViolation::Overspeed(speed));
        }
        Ok(())
    }

    fn validate_jump(&self, known: Vec2, reported: Vec2) -> Result<(), InputViolation> {
        let distance = known.distance_to(reported);
        if distance > self.config.max_position_jump {
            return Err(InputViolation::Teleport(distance));
        }
        Ok(())
    }
}
