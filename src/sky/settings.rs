//! World-wide sky settings.

use serde::{Deserialize, Serialize};

use crate::constants::world::{GRAVITY, VIEW_SCALE};
use crate::util::VerifyStructure;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkySettings {
    /// Downward acceleration applied by the flight model and free bodies
    pub gravity: f32,
    pub view_scale: f32,
}

impl Default for SkySettings {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            view_scale: VIEW_SCALE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SkySettingsDelta {
    pub gravity: Option<f32>,
    pub view_scale: Option<f32>,
}

impl SkySettings {
    /// Fields differing from `baseline`
    pub fn diff(&self, baseline: &SkySettings) -> Option<SkySettingsDelta> {
        let delta = SkySettingsDelta {
            gravity: (self.gravity != baseline.gravity).then_some(self.gravity),
            view_scale: (self.view_scale != baseline.view_scale).then_some(self.view_scale),
        };
        (delta.gravity.is_some() || delta.view_scale.is_some()).then_some(delta)
    }

    pub fn apply(&mut self, delta: &SkySettingsDelta) {
        if let Some(gravity) = delta.gravity {
            self.gravity = gravity;
        }
        if let Some(view_scale) = delta.view_scale {
            self.view_scale = view_scale;
        }
    }
}

impl VerifyStructure for SkySettings {
    fn verify_structure(&self) -> bool {
        self.gravity.is_finite() && self.view_scale.is_finite() && self.view_scale > 0.0
    }
}

impl VerifyStructure for SkySettingsDelta {
    fn verify_structure(&self) -> bool {
        self.gravity.map_or(true, f32::is_finite)
            && self.view_scale.map_or(true, |s| s.is_finite() && s > 0.0)
    }
}
