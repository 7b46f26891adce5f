//! Boundary to the rigid-body engine.
//!
//! The relay never integrates bodies itself. It drives an engine through
//! [`PhysicsEngine`]: add bodies and joints by name, step, move kinematic
//! pointer bodies, and read back a flat `f32` export buffer.

use crate::vec3::Vec3;

/// Quaternion as `[x, y, z, w]`.
pub type Quat = [f32; 4];

pub const IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Box { half_extents: Vec3 },
    Sphere { radius: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildShape {
    pub shape: Shape,
    pub position: Vec3,
    pub quaternion: Quat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Single(Shape),
    Compound(Vec<ChildShape>),
    /// Kinematic point body moved only through `set_position`.
    Pointer,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RigidSpec {
    pub name: String,
    pub geometry: Geometry,
    pub position: Vec3,
    pub quaternion: Quat,
    /// Zero makes the body static.
    pub density: f32,
    pub auto_sleep: bool,
}

impl RigidSpec {
    pub fn is_static(&self) -> bool {
        self.density <= 0.0 && self.geometry != Geometry::Pointer
    }
}

/// Spherical spring joint between two bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSpec {
    pub name: String,
    pub body1: String,
    pub body2: String,
    /// Attach `body1` at this world point instead of its centre.
    pub world_anchor: Option<Vec3>,
    /// Spring frequency (Hz) and damping ratio.
    pub spring_damper: (f32, f32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodySpec {
    Rigid(RigidSpec),
    Joint(JointSpec),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    pub position: Vec3,
    pub linear_velocity: Vec3,
    pub mass: f32,
    /// Number of joints attached to this body.
    pub joint_links: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Entity {
    Body(BodyState),
    Joint,
}

/// A body touched something during the last step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSample {
    /// Index of the rigid body in `add` order (joints are not counted).
    pub body: usize,
    pub linear_velocity: Vec3,
    pub mass: f32,
}

pub trait PhysicsEngine {
    /// Advance the world by the engine's own fixed timestep.
    fn step(&mut self);

    fn add(&mut self, spec: BodySpec);

    /// Remove a joint by name. Rigid bodies are permanent: the export buffer
    /// layout is fixed once the scene is defined.
    fn remove(&mut self, name: &str) -> bool;

    fn get(&self, name: &str) -> Option<Entity>;

    fn set_position(&mut self, name: &str, position: Vec3);

    /// One record of [`blocks_shared::protocol::FLOATS_PER_BODY`] floats per
    /// non-static rigid body, in `add` order: position, quaternion, sleep flag.
    fn buffer(&self) -> &[f32];

    /// Move contact samples gathered during the last step into `out`.
    fn drain_contacts(&mut self, out: &mut Vec<ContactSample>);
}
