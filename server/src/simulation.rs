use crate::contact::{ContactEvent, ContactMonitor};
use crate::physics::{BodySpec, ContactSample, Entity, JointSpec, PhysicsEngine};
use crate::scene::{grab_name, pointer_name, Role, Scene};
use crate::vec3::Vec3;
use blocks_shared::config::SessionConfig;
use blocks_shared::protocol::{PointerMotion, EXTRA_SCALAR, FLOATS_PER_BODY};

/// Spring frequency (Hz) and damping ratio of a grab joint.
const GRAB_SPRING: (f32, f32) = (4.0, 1.0);

/// Façade over the physics engine: owns the scene table, pointer and grab
/// naming, contact debouncing and the outbound copy of the export buffer.
pub struct Simulation<E> {
    engine: E,
    scene: Scene,
    contacts: ContactMonitor,
    samples: Vec<ContactSample>,
    /// Copy of the engine buffer with pointer flags applied.
    frame: Vec<f32>,
    pointer_names: Vec<String>,
    grab_names: Vec<String>,
    /// Export record index of each pointer body.
    pointer_records: Vec<usize>,
}

impl<E: PhysicsEngine> Simulation<E> {
    pub fn new(mut engine: E, scene: Scene, config: &SessionConfig) -> Self {
        let mut contacts = ContactMonitor::new(config.settle_ms, config.contact_cooldown_ms);

        for (index, body) in scene.bodies.iter().enumerate() {
            if let Role::Block { id, tuning, .. } = body.role {
                contacts.watch(index, id, tuning);
            }
            engine.add(BodySpec::Rigid(body.spec.clone()));
        }

        let pointers = scene.pointer_count();
        let pointer_records = (0..pointers)
            .filter_map(|i| scene.pointer_buffer_index(i))
            .collect();
        let frame_len = scene.exported_count() * FLOATS_PER_BODY;

        Self {
            engine,
            scene,
            contacts,
            samples: Vec::new(),
            frame: Vec::with_capacity(frame_len),
            pointer_names: (0..pointers).map(pointer_name).collect(),
            grab_names: (0..pointers).map(grab_name).collect(),
            pointer_records,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn pointer_count(&self) -> usize {
        self.pointer_names.len()
    }

    /// Forget contact history. The simulation clock is about to restart at zero.
    pub fn reset_clock(&mut self) {
        self.contacts.reset();
    }

    /// Step the engine once and return the debounced contact events it produced.
    pub fn step(&mut self, elapsed_ms: f64) -> Vec<ContactEvent> {
        self.engine.step();

        self.samples.clear();
        self.engine.drain_contacts(&mut self.samples);

        self.samples
            .iter()
            .filter_map(|sample| self.contacts.on_contact(sample, elapsed_ms))
            .collect()
    }

    /// Copy the export buffer and stamp each listed pointer's movement flag.
    ///
    /// The engine buffer itself is never modified.
    pub fn snapshot<I>(&mut self, pointers: I) -> &[f32]
    where
        I: IntoIterator<Item = (usize, PointerMotion)>,
    {
        self.frame.clear();
        self.frame.extend_from_slice(self.engine.buffer());

        for (pointer, motion) in pointers {
            let Some(&record) = self.pointer_records.get(pointer) else {
                continue;
            };
            if let Some(slot) = self.frame.get_mut(record * FLOATS_PER_BODY + EXTRA_SCALAR) {
                *slot = motion.as_scalar();
            }
        }

        &self.frame
    }

    pub fn place_pointer(&mut self, pointer: usize, position: Vec3) {
        if let Some(name) = self.pointer_names.get(pointer) {
            self.engine.set_position(name, position);
        }
    }

    /// Attach the body at `shape` (scene table index) to `pointer` at world point `point`.
    ///
    /// Any previous grab of this pointer is dropped. Returns false when the
    /// index does not name a wall or block.
    pub fn grab(&mut self, pointer: usize, shape: usize, point: Vec3) -> bool {
        let Some(body) = self.scene.bodies.get(shape) else {
            return false;
        };
        let always_anchor = match body.role {
            Role::Pointer(_) => return false,
            Role::Block { world_anchor, .. } => world_anchor,
            Role::Wall => false,
        };
        let (Some(pointer_body), Some(joint)) = (
            self.pointer_names.get(pointer),
            self.grab_names.get(pointer),
        ) else {
            return false;
        };
        let target = body.spec.name.clone();

        self.engine.set_position(pointer_body, point);

        if self.engine.get(joint).is_some() {
            self.engine.remove(joint);
        }

        let linked = matches!(
            self.engine.get(&target),
            Some(Entity::Body(state)) if state.joint_links > 0
        );

        self.engine.add(BodySpec::Joint(JointSpec {
            name: joint.clone(),
            body1: target,
            body2: pointer_body.clone(),
            world_anchor: (always_anchor || linked).then_some(point),
            spring_damper: GRAB_SPRING,
        }));
        true
    }

    /// Remove the grab joint of `pointer` if one exists.
    pub fn release_grab(&mut self, pointer: usize) -> bool {
        match self.grab_names.get(pointer) {
            Some(joint) if self.engine.get(joint).is_some() => self.engine.remove(joint),
            _ => false,
        }
    }

    pub fn is_grabbing(&self, pointer: usize) -> bool {
        self.grab_names
            .get(pointer)
            .is_some_and(|joint| self.engine.get(joint).is_some())
    }
}
