//! Rigid-body world owned by a `Sky`.
//!
//! Bodies live in a handle-keyed store; planes, props and components only
//! keep the `BodyHandle` and release it exactly once through
//! [`Physics::destroy_body`]. Integration is explicit Euler with per-body
//! gravity scale, bodies are kept inside the world rectangle, and contacts
//! are detected on bounding circles. A uniform grid limits the exact test to
//! bodies sharing a cell.
//!
//! Angles are in degrees throughout.

use hashbrown::HashMap;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::world::DENSITY;
use crate::util::{Pid, TimeDiff, Vec2, VerifyStructure};

/// Side of a contact grid cell in world units
const CONTACT_CELL_SIZE: f32 = 128.0;

/// Grid cell coordinates
type CellKey = (i32, i32);

fn cell_of(pos: Vec2) -> CellKey {
    (
        (pos.x / CONTACT_CELL_SIZE).floor() as i32,
        (pos.y / CONTACT_CELL_SIZE).floor() as i32,
    )
}

/// Opaque handle to a body in a `Physics` world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BodyHandle(u32);

/// What a body belongs to; reported with contacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyTag {
    Plane(Pid),
    Prop { owner: Pid, id: Pid },
    Entity(Pid),
    Explosion(Pid),
    HomeBase(Pid),
}

/// Collision shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Circle { radius: f32 },
    Rectangle { dimensions: Vec2 },
    Polygon { vertices: Vec<Vec2> },
}

impl Shape {
    pub fn rectangle(dimensions: Vec2) -> Self {
        Shape::Rectangle { dimensions }
    }

    pub fn circle(radius: f32) -> Self {
        Shape::Circle { radius }
    }

    /// Radius of the smallest origin-centered circle enclosing the shape
    pub fn bounding_radius(&self) -> f32 {
        match self {
            Shape::Circle { radius } => *radius,
            Shape::Rectangle { dimensions } => (*dimensions * 0.5).length(),
            Shape::Polygon { vertices } => vertices
                .iter()
                .map(Vec2::length)
                .fold(0.0, f32::max),
        }
    }

    pub fn area(&self) -> f32 {
        match self {
            Shape::Circle { radius } => std::f32::consts::PI * radius * radius,
            Shape::Rectangle { dimensions } => dimensions.x * dimensions.y,
            Shape::Polygon { vertices } => {
                // shoelace
                let n = vertices.len();
                let twice: f32 = (0..n)
                    .map(|i| {
                        let a = vertices[i];
                        let b = vertices[(i + 1) % n];
                        a.x * b.y - b.x * a.y
                    })
                    .sum();
                (twice * 0.5).abs()
            }
        }
    }
}

impl VerifyStructure for Shape {
    fn verify_structure(&self) -> bool {
        match self {
            Shape::Circle { radius } => radius.is_finite() && *radius > 0.0,
            Shape::Rectangle { dimensions } => {
                dimensions.is_finite() && dimensions.x > 0.0 && dimensions.y > 0.0
            }
            Shape::Polygon { vertices } => {
                vertices.len() >= 3 && vertices.iter().all(Vec2::is_finite)
            }
        }
    }
}

/// Kinematic state shared by everything that has a body
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalState {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Rotation in degrees
    pub rot: f32,
    /// Angular velocity in degrees per second
    pub rotvel: f32,
}

impl PhysicalState {
    pub fn new(pos: Vec2, vel: Vec2, rot: f32, rotvel: f32) -> Self {
        Self {
            pos,
            vel,
            rot,
            rotvel,
        }
    }

    pub fn at(pos: Vec2) -> Self {
        Self {
            pos,
            ..Default::default()
        }
    }

    /// Overwrite the body's transform and velocities
    pub fn hard_write_to_body(&self, physics: &mut Physics, body: BodyHandle) {
        physics.set_transform(body, self.pos, self.rot);
        physics.set_velocity(body, self.vel);
        physics.set_angular_velocity(body, self.rotvel);
    }

    /// Move the body to this state, reaching the velocities through impulses
    pub fn write_to_body(&self, physics: &mut Physics, body: BodyHandle) {
        physics.set_transform(body, self.pos, self.rot);
        physics.approach_vel(body, self.vel);
        physics.approach_rot_vel(body, self.rotvel);
    }

    /// Read the body's state; `None` if the handle is stale
    pub fn read_from_body(physics: &Physics, body: BodyHandle) -> Option<Self> {
        let b = physics.bodies.get(&body)?;
        Some(Self {
            pos: b.pos,
            vel: b.vel,
            rot: b.rot,
            rotvel: b.rotvel,
        })
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite() && self.rot.is_finite() && self.rotvel.is_finite()
    }
}

/// Whether two bodies started or stopped touching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactKind {
    Begin,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Contact {
    pub kind: ContactKind,
    pub a: BodyTag,
    pub b: BodyTag,
}

impl Contact {
    /// The tag paired with a body matching `pred`, if either side matches
    pub fn other_than(&self, pred: impl Fn(&BodyTag) -> bool) -> Option<(BodyTag, BodyTag)> {
        if pred(&self.a) {
            Some((self.a, self.b))
        } else if pred(&self.b) {
            Some((self.b, self.a))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
struct Body {
    tag: BodyTag,
    is_static: bool,
    radius: f32,
    mass: f32,
    gravity_scale: f32,
    pos: Vec2,
    vel: Vec2,
    rot: f32,
    rotvel: f32,
}

/// The physics world
#[derive(Debug)]
pub struct Physics {
    bodies: HashMap<BodyHandle, Body>,
    next_handle: u32,
    dimensions: Vec2,
    gravity: f32,
    touching: FxHashSet<(BodyHandle, BodyHandle)>,
    contacts: SmallVec<[Contact; 8]>,
    /// Bodies overlapping each cell, rebuilt every step
    cells: HashMap<CellKey, Vec<BodyHandle>>,
}

impl Physics {
    pub fn new(dimensions: Vec2, gravity: f32) -> Self {
        Self {
            bodies: HashMap::new(),
            next_handle: 0,
            dimensions,
            gravity,
            touching: FxHashSet::default(),
            contacts: SmallVec::new(),
            cells: HashMap::new(),
        }
    }

    pub fn dimensions(&self) -> Vec2 {
        self.dimensions
    }

    pub fn gravity(&self) -> f32 {
        self.gravity
    }

    pub fn set_gravity(&mut self, gravity: f32) {
        self.gravity = gravity;
    }

    // ========================================================================
    // Body lifecycle
    // ========================================================================

    pub fn create_body(&mut self, shape: &Shape, tag: BodyTag, is_static: bool) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);

        let mass = if is_static {
            0.0
        } else {
            (shape.area() * DENSITY).max(f32::EPSILON)
        };
        self.bodies.insert(
            handle,
            Body {
                tag,
                is_static,
                radius: shape.bounding_radius(),
                mass,
                gravity_scale: 1.0,
                pos: Vec2::ZERO,
                vel: Vec2::ZERO,
                rot: 0.0,
                rotvel: 0.0,
            },
        );
        handle
    }

    /// Remove a body; returns false for an unknown or already destroyed handle
    pub fn destroy_body(&mut self, handle: BodyHandle) -> bool {
        if self.bodies.remove(&handle).is_none() {
            return false;
        }
        self.touching.retain(|(a, b)| *a != handle && *b != handle);
        true
    }

    pub fn contains(&self, handle: BodyHandle) -> bool {
        self.bodies.contains_key(&handle)
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    pub fn tag(&self, handle: BodyHandle) -> Option<BodyTag> {
        self.bodies.get(&handle).map(|b| b.tag)
    }

    // ========================================================================
    // State access
    // ========================================================================

    pub fn set_gravity_scale(&mut self, handle: BodyHandle, scale: f32) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.gravity_scale = scale;
        }
    }

    pub fn set_transform(&mut self, handle: BodyHandle, pos: Vec2, rot: f32) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.pos = pos;
            body.rot = rot;
        }
    }

    pub fn set_velocity(&mut self, handle: BodyHandle, vel: Vec2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.vel = vel;
        }
    }

    pub fn set_angular_velocity(&mut self, handle: BodyHandle, rotvel: f32) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.rotvel = rotvel;
        }
    }

    pub fn position(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(&handle).map(|b| b.pos)
    }

    pub fn velocity(&self, handle: BodyHandle) -> Option<Vec2> {
        self.bodies.get(&handle).map(|b| b.vel)
    }

    pub fn rotation(&self, handle: BodyHandle) -> Option<f32> {
        self.bodies.get(&handle).map(|b| b.rot)
    }

    pub fn angular_velocity(&self, handle: BodyHandle) -> Option<f32> {
        self.bodies.get(&handle).map(|b| b.rotvel)
    }

    /// Apply a linear impulse; static bodies ignore it
    pub fn apply_impulse(&mut self, handle: BodyHandle, impulse: Vec2) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            if !body.is_static {
                body.vel += impulse * (1.0 / body.mass);
            }
        }
    }

    /// Apply the impulse that brings the body's velocity to `target`
    pub fn approach_vel(&mut self, handle: BodyHandle, target: Vec2) {
        let Some(body) = self.bodies.get(&handle) else {
            return;
        };
        let impulse = (target - body.vel) * body.mass;
        self.apply_impulse(handle, impulse);
    }

    /// Bring the angular velocity to `target` degrees per second
    pub fn approach_rot_vel(&mut self, handle: BodyHandle, target: f32) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            if !body.is_static {
                body.rotvel = target;
            }
        }
    }

    // ========================================================================
    // Simulation
    // ========================================================================

    /// Advance the world by `delta` seconds and queue contact events
    pub fn step(&mut self, delta: TimeDiff) {
        let gravity = Vec2::new(0.0, self.gravity);
        let bounds = self.dimensions;

        self.bodies
            .par_values_mut()
            .filter(|body| !body.is_static)
            .for_each(|body| {
                body.vel += gravity * (body.gravity_scale * delta);
                body.pos += body.vel * delta;
                body.rot += body.rotvel * delta;

                // Keep inside the world rectangle
                if body.pos.x < 0.0 {
                    body.pos.x = 0.0;
                    body.vel.x = body.vel.x.max(0.0);
                } else if body.pos.x > bounds.x {
                    body.pos.x = bounds.x;
                    body.vel.x = body.vel.x.min(0.0);
                }
                if body.pos.y < 0.0 {
                    body.pos.y = 0.0;
                    body.vel.y = body.vel.y.max(0.0);
                } else if body.pos.y > bounds.y {
                    body.pos.y = bounds.y;
                    body.vel.y = body.vel.y.min(0.0);
                }
            });

        self.detect_contacts();
    }

    /// Bucket every body into the cells its bounding circle overlaps.
    /// Cells are clamped to the world grid so bodies past the edge share
    /// the border cells.
    fn fill_cells(&mut self) {
        for members in self.cells.values_mut() {
            members.clear();
        }
        let (last_x, last_y) = cell_of(self.dimensions);
        for (handle, body) in &self.bodies {
            let reach = Vec2::new(body.radius, body.radius);
            let (x0, y0) = cell_of(body.pos - reach);
            let (x1, y1) = cell_of(body.pos + reach);
            for x in x0.clamp(0, last_x)..=x1.clamp(0, last_x) {
                for y in y0.clamp(0, last_y)..=y1.clamp(0, last_y) {
                    self.cells.entry((x, y)).or_default().push(*handle);
                }
            }
        }
    }

    fn detect_contacts(&mut self) {
        self.fill_cells();

        let mut now_touching: FxHashSet<(BodyHandle, BodyHandle)> = FxHashSet::default();
        for members in self.cells.values() {
            for (i, a) in members.iter().enumerate() {
                let body_a = &self.bodies[a];
                for b in &members[i + 1..] {
                    let body_b = &self.bodies[b];
                    if body_a.is_static && body_b.is_static {
                        continue;
                    }
                    let reach = body_a.radius + body_b.radius;
                    if body_a.pos.distance_to(body_b.pos) < reach {
                        now_touching.insert((*a.min(b), *a.max(b)));
                    }
                }
            }
        }

        let mut begun: Vec<&(BodyHandle, BodyHandle)> =
            now_touching.difference(&self.touching).collect();
        begun.sort_unstable();
        let mut ended: Vec<&(BodyHandle, BodyHandle)> =
            self.touching.difference(&now_touching).collect();
        ended.sort_unstable();

        for (kind, pairs) in [(ContactKind::Begin, begun), (ContactKind::End, ended)] {
            for (a, b) in pairs {
                if let (Some(ta), Some(tb)) = (self.tag(*a), self.tag(*b)) {
                    self.contacts.push(Contact { kind, a: ta, b: tb });
                }
            }
        }
        self.touching = now_touching;
    }

    /// Contact events queued since the last drain
    pub fn drain_contacts(&mut self) -> SmallVec<[Contact; 8]> {
        std::mem::take(&mut self.contacts)
    }
}
