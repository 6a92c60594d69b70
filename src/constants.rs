//! Game and protocol constants grouped by concern.

/// Network constants
pub mod net {
    /// Maximum reliable message size in bytes (64 KB)
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Maximum datagram size before falling back to the reliable stream
    pub const MAX_DATAGRAM_SIZE: usize = 1200;
    /// Maximum nickname length in characters
    pub const MAX_NICKNAME_LEN: usize = 24;
    /// Maximum chat / broadcast message length in characters
    pub const MAX_CHAT_LEN: usize = 256;
    /// Maximum RCon command length in characters
    pub const MAX_RCON_LEN: usize = 512;
}

/// Simulation timing
pub mod timing {
    /// Default server tick rate in Hz
    pub const TICK_RATE: u32 = 60;
    /// Longest step a single tick may integrate (seconds)
    pub const MAX_TICK_DELTA: f32 = 0.1;
}

/// World geometry and physics
pub mod world {
    use crate::util::Vec2;

    /// Playable area in pixels
    pub const DIMENSIONS: Vec2 = Vec2::new(3200.0, 900.0);
    /// Default gravity (pixels / s^2, positive is downward)
    pub const GRAVITY: f32 = 200.0;
    /// Default view scale
    pub const VIEW_SCALE: f32 = 1.0;
    /// Thickness of the static boundary walls
    pub const BOUNDARY_THICKNESS: f32 = 20.0;
    /// Body density used to derive mass from shape area
    pub const DENSITY: f32 = 0.01;
    /// Margin kept from the walls when choosing spawn points
    pub const SPAWN_MARGIN: f32 = 200.0;
}

/// Projectiles fired by planes
pub mod prop {
    /// Muzzle speed added to the plane's velocity (pixels / s)
    pub const SPEED: f32 = 600.0;
    /// Seconds until a prop expires
    pub const LIFETIME: f32 = 1.0;
    /// Collision radius
    pub const RADIUS: f32 = 4.0;
}

/// Explosions left behind by destroyed planes
pub mod explosion {
    pub const RADIUS: f32 = 80.0;
    pub const LIFETIME: f32 = 1.5;
    /// Health removed from a plane caught in the blast
    pub const DAMAGE: f32 = 0.3;
}

/// Free entities
pub mod entity {
    use crate::util::Vec2;

    pub const DIMENSIONS: Vec2 = Vec2::new(10.0, 10.0);
}

/// Home bases spawned at game start
pub mod home_base {
    use crate::util::Vec2;

    pub const DIMENSIONS: Vec2 = Vec2::new(120.0, 40.0);
    /// Health removed from an enemy plane touching the base
    pub const DAMAGE: f32 = 0.5;
}

/// Damage dealt by a prop hit
pub mod combat {
    pub const PROP_DAMAGE: f32 = 0.1;
}

/// Latency tracking
pub mod latency {
    /// Samples kept by the rolling latency / clock-offset means
    pub const SAMPLE_WINDOW: usize = 30;
}
