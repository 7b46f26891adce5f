//! Minimal built-in engine so the relay runs without an external solver.
//!
//! Bodies are treated as axis-aligned boxes that never rotate. Dynamic bodies
//! fall under gravity, bounce off static bodies and are pulled by spring
//! joints. That is enough to exercise every relay path; it is not a
//! rigid-body solver.
//!
//! Not modelled: contact between two dynamic blocks (they pass through each
//! other and only collide with static bodies), angular motion of any kind
//! (quaternions stay as added), and torque from off-centre joint anchors.

use crate::physics::{
    BodySpec, BodyState, ContactSample, Entity, Geometry, JointSpec, PhysicsEngine, Quat,
    RigidSpec, Shape,
};
use crate::vec3::{self, vec3, Vec3};
use blocks_shared::protocol::FLOATS_PER_BODY;
use std::collections::HashMap;
use std::f32::consts::PI;

const GRAVITY: Vec3 = vec3(0.0, -9.8, 0.0);
const RESTITUTION: f32 = 0.2;
const FRICTION: f32 = 0.9;
const LINEAR_DAMPING: f32 = 0.995;
const SLEEP_SPEED: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Static,
    Dynamic,
    Kinematic,
}

#[derive(Debug, Clone)]
struct Body {
    kind: Kind,
    position: Vec3,
    quaternion: Quat,
    velocity: Vec3,
    mass: f32,
    half_extents: Vec3,
    auto_sleep: bool,
    sleeping: bool,
    joint_links: usize,
    /// Record index in the export buffer.
    export: Option<usize>,
}

#[derive(Debug, Clone)]
struct Joint {
    body1: usize,
    body2: usize,
    /// Offset of the anchor from `body1`'s centre.
    anchor: Vec3,
    omega: f32,
    damping_ratio: f32,
}

pub struct SceneWorld {
    dt: f32,
    bodies: Vec<Body>,
    body_names: HashMap<String, usize>,
    joints: HashMap<String, Joint>,
    buffer: Vec<f32>,
    contacts: Vec<ContactSample>,
    accel: Vec<Vec3>,
}

impl SceneWorld {
    pub fn new(tick_rate_hz: f64) -> Self {
        Self {
            dt: (1.0 / tick_rate_hz) as f32,
            bodies: Vec::new(),
            body_names: HashMap::new(),
            joints: HashMap::new(),
            buffer: Vec::new(),
            contacts: Vec::new(),
            accel: Vec::new(),
        }
    }

    fn add_rigid(&mut self, spec: RigidSpec) {
        let kind = match spec.geometry {
            Geometry::Pointer => Kind::Kinematic,
            _ if spec.density <= 0.0 => Kind::Static,
            _ => Kind::Dynamic,
        };
        let (half_extents, volume) = bounds(&spec.geometry);
        let export = (kind != Kind::Static).then(|| {
            let index = self.buffer.len() / FLOATS_PER_BODY;
            self.buffer.resize(self.buffer.len() + FLOATS_PER_BODY, 0.0);
            index
        });

        let body = Body {
            kind,
            position: spec.position,
            quaternion: spec.quaternion,
            velocity: Vec3::ZERO,
            mass: spec.density * volume,
            half_extents,
            auto_sleep: spec.auto_sleep,
            sleeping: false,
            joint_links: 0,
            export,
        };
        self.body_names.insert(spec.name, self.bodies.len());
        self.bodies.push(body);
        self.write_record(self.bodies.len() - 1);
    }

    fn add_joint(&mut self, spec: JointSpec) {
        let (Some(&body1), Some(&body2)) = (
            self.body_names.get(&spec.body1),
            self.body_names.get(&spec.body2),
        ) else {
            tracing::debug!("Joint {} references an unknown body", spec.name);
            return;
        };
        let anchor = spec
            .world_anchor
            .map(|p| vec3::sub(p, self.bodies[body1].position))
            .unwrap_or(Vec3::ZERO);
        let (frequency, damping_ratio) = spec.spring_damper;

        self.remove(&spec.name);
        self.bodies[body1].joint_links += 1;
        self.bodies[body2].joint_links += 1;
        self.bodies[body1].sleeping = false;
        self.joints.insert(
            spec.name,
            Joint {
                body1,
                body2,
                anchor,
                omega: 2.0 * PI * frequency,
                damping_ratio,
            },
        );
    }

    fn write_record(&mut self, index: usize) {
        let body = &self.bodies[index];
        let Some(export) = body.export else {
            return;
        };
        let record = &mut self.buffer[export * FLOATS_PER_BODY..(export + 1) * FLOATS_PER_BODY];
        record[0] = body.position.x;
        record[1] = body.position.y;
        record[2] = body.position.z;
        record[3..7].copy_from_slice(&body.quaternion);
        record[7] = if body.sleeping { 1.0 } else { 0.0 };
    }

    fn solve_joints(&mut self) {
        self.accel.clear();
        self.accel.resize(self.bodies.len(), Vec3::ZERO);

        for joint in self.joints.values() {
            let body = &self.bodies[joint.body1];
            if body.kind != Kind::Dynamic {
                continue;
            }
            let anchor = vec3::add(body.position, joint.anchor);
            let stretch = vec3::sub(self.bodies[joint.body2].position, anchor);
            let spring = vec3::scale(stretch, joint.omega * joint.omega);
            let damper = vec3::scale(body.velocity, -2.0 * joint.damping_ratio * joint.omega);
            self.accel[joint.body1] = vec3::add(self.accel[joint.body1], vec3::add(spring, damper));
        }
    }

    fn collide(&mut self, index: usize) {
        for other in 0..self.bodies.len() {
            if self.bodies[other].kind != Kind::Static {
                continue;
            }
            let (wall_pos, wall_half) = (self.bodies[other].position, self.bodies[other].half_extents);
            let body = &mut self.bodies[index];

            let delta = vec3::sub(body.position, wall_pos);
            let overlap = vec3(
                body.half_extents.x + wall_half.x - delta.x.abs(),
                body.half_extents.y + wall_half.y - delta.y.abs(),
                body.half_extents.z + wall_half.z - delta.z.abs(),
            );
            if overlap.x <= 0.0 || overlap.y <= 0.0 || overlap.z <= 0.0 {
                continue;
            }

            let impact_velocity = body.velocity;

            // Push out along the axis of least penetration.
            if overlap.x <= overlap.y && overlap.x <= overlap.z {
                let dir = delta.x.signum();
                body.position.x += dir * overlap.x;
                if body.velocity.x * dir < 0.0 {
                    body.velocity.x = -body.velocity.x * RESTITUTION;
                }
            } else if overlap.y <= overlap.z {
                let dir = delta.y.signum();
                body.position.y += dir * overlap.y;
                if body.velocity.y * dir < 0.0 {
                    body.velocity.y = -body.velocity.y * RESTITUTION;
                }
                body.velocity.x *= FRICTION;
                body.velocity.z *= FRICTION;
            } else {
                let dir = delta.z.signum();
                body.position.z += dir * overlap.z;
                if body.velocity.z * dir < 0.0 {
                    body.velocity.z = -body.velocity.z * RESTITUTION;
                }
            }

            self.contacts.push(ContactSample {
                body: index,
                linear_velocity: impact_velocity,
                mass: body.mass,
            });
        }
    }
}

/// Axis-aligned half extents and volume of a geometry. Rotation is ignored.
fn bounds(geometry: &Geometry) -> (Vec3, f32) {
    fn shape_bounds(shape: &Shape) -> (Vec3, f32) {
        match *shape {
            Shape::Box { half_extents: h } => (h, 8.0 * h.x * h.y * h.z),
            Shape::Sphere { radius: r } => (vec3(r, r, r), 4.0 / 3.0 * PI * r * r * r),
        }
    }

    match geometry {
        Geometry::Single(shape) => shape_bounds(shape),
        Geometry::Compound(children) => {
            children
                .iter()
                .fold((Vec3::ZERO, 0.0), |(extent, volume), child| {
                    let (h, v) = shape_bounds(&child.shape);
                    let reach = vec3(
                        child.position.x.abs() + h.x,
                        child.position.y.abs() + h.y,
                        child.position.z.abs() + h.z,
                    );
                    (
                        vec3(
                            extent.x.max(reach.x),
                            extent.y.max(reach.y),
                            extent.z.max(reach.z),
                        ),
                        volume + v,
                    )
                })
        }
        Geometry::Pointer => (Vec3::ZERO, 0.0),
    }
}

impl PhysicsEngine for SceneWorld {
    fn step(&mut self) {
        self.solve_joints();

        for index in 0..self.bodies.len() {
            let body = &mut self.bodies[index];
            if body.kind != Kind::Dynamic || body.sleeping {
                continue;
            }
            let accel = vec3::add(GRAVITY, self.accel[index]);
            body.velocity = vec3::scale(vec3::add_scaled(body.velocity, accel, self.dt), LINEAR_DAMPING);
            body.position = vec3::add_scaled(body.position, body.velocity, self.dt);

            self.collide(index);

            let body = &mut self.bodies[index];
            if body.auto_sleep && body.joint_links == 0 && vec3::length(body.velocity) < SLEEP_SPEED {
                body.sleeping = true;
                body.velocity = Vec3::ZERO;
            }
        }

        for index in 0..self.bodies.len() {
            self.write_record(index);
        }
    }

    fn add(&mut self, spec: BodySpec) {
        match spec {
            BodySpec::Rigid(spec) => self.add_rigid(spec),
            BodySpec::Joint(spec) => self.add_joint(spec),
        }
    }

    fn remove(&mut self, name: &str) -> bool {
        match self.joints.remove(name) {
            Some(joint) => {
                self.bodies[joint.body1].joint_links -= 1;
                self.bodies[joint.body2].joint_links -= 1;
                true
            }
            None => false,
        }
    }

    fn get(&self, name: &str) -> Option<Entity> {
        if self.joints.contains_key(name) {
            return Some(Entity::Joint);
        }
        let body = &self.bodies[*self.body_names.get(name)?];
        Some(Entity::Body(BodyState {
            position: body.position,
            linear_velocity: body.velocity,
            mass: body.mass,
            joint_links: body.joint_links,
        }))
    }

    fn set_position(&mut self, name: &str, position: Vec3) {
        let Some(&index) = self.body_names.get(name) else {
            return;
        };
        let body = &mut self.bodies[index];
        body.position = position;
        if body.kind == Kind::Dynamic {
            body.velocity = Vec3::ZERO;
            body.sleeping = false;
        }
        self.write_record(index);
    }

    fn buffer(&self) -> &[f32] {
        &self.buffer
    }

    fn drain_contacts(&mut self, out: &mut Vec<ContactSample>) {
        out.append(&mut self.contacts);
    }
}
