//! Definition of the shared room: walls, blocks and pointer bodies.
//!
//! Table order matters twice. PICK frames address bodies by their index in
//! this table, and the export buffer lists every non-static body in this order
//! (63 blocks, then the pointer bodies).

use crate::contact::ContactTuning;
use crate::physics::{ChildShape, Geometry, Quat, RigidSpec, Shape, IDENTITY};
use crate::vec3::{vec3, Vec3};

/// Number of movable blocks.
pub const BLOCK_COUNT: usize = 63;

/// Pointer body name for pool index `i`.
pub fn pointer_name(i: usize) -> String {
    format!("pointer_{i}")
}

/// Grab joint name for pool index `i`.
pub fn grab_name(i: usize) -> String {
    format!("grab_{i}")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Role {
    Wall,
    Block {
        id: u8,
        tuning: ContactTuning,
        /// Always grabbed at the pick point rather than the body centre.
        world_anchor: bool,
    },
    Pointer(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneBody {
    pub spec: RigidSpec,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct Scene {
    pub bodies: Vec<SceneBody>,
}

type Part = ([f32; 3], Quat, [f32; 3]);

const TILT: f32 = 0.130_526_19;
const TILT_W: f32 = 0.991_444_86;
const SLANT: f32 = 0.526_213_9;
const SLANT_W: f32 = 0.850_352_2;

const LOGO_PARTS: [Part; 12] = [
    ([-0.704, 0.0, 0.0], IDENTITY, [0.265, 0.0445, 0.125]),
    ([-0.747, 0.0, 0.0], IDENTITY, [0.0445, 0.2195, 0.125]),
    ([-0.56, 0.1755, 0.0], IDENTITY, [0.15625, 0.0445, 0.125]),
    ([-0.308, 0.0, 0.0], [0.0, 0.0, -SLANT, SLANT_W], [0.2195, 0.0445, 0.125]),
    ([-0.132, 0.0, 0.0], [0.0, 0.0, SLANT, SLANT_W], [0.2195, 0.0445, 0.125]),
    ([0.044, 0.0, 0.0], [0.0, 0.0, -SLANT, SLANT_W], [0.2195, 0.0445, 0.125]),
    ([0.22, 0.0, 0.0], [0.0, 0.0, SLANT, SLANT_W], [0.2195, 0.0445, 0.125]),
    ([0.55, 0.1755, 0.0], IDENTITY, [0.24, 0.0445, 0.125]),
    ([0.7465, 0.0, 0.0], IDENTITY, [0.0445, 0.2195, 0.125]),
    ([0.531, -0.176, 0.0], IDENTITY, [0.18, 0.0445, 0.125]),
    ([0.395, -0.045, 0.0], IDENTITY, [0.0445, 0.089, 0.125]),
    ([0.704, 0.0, 0.0], IDENTITY, [0.265, 0.0445, 0.125]),
];

const WIDE: f32 = 0.589_407_87;
const WIDE_W: f32 = 0.807_835_6;
const NARROW: f32 = 0.601_815_03;
const NARROW_W: f32 = 0.798_635_5;

const CHEVRON_PARTS: [Part; 6] = [
    ([-0.2123, 0.0, 0.0], [0.0, 0.0, -WIDE, WIDE_W], [0.2455, 0.055, 0.125]),
    ([-0.07, 0.0, 0.0], [0.0, 0.0, NARROW, NARROW_W], [0.2455, 0.0475, 0.125]),
    ([0.072, 0.0, 0.0], [0.0, 0.0, -NARROW, NARROW_W], [0.2455, 0.0475, 0.125]),
    ([0.2118, 0.0, 0.0], [0.0, 0.0, WIDE, WIDE_W], [0.2455, 0.055, 0.125]),
    ([-0.3305, 0.234, 0.0], [0.0, 0.0, -WIDE, WIDE_W], [0.01375, 0.01375, 0.125]),
    ([0.33, 0.234, 0.0], [0.0, 0.0, WIDE, WIDE_W], [0.01375, 0.01375, 0.125]),
];

fn cuboid(h: [f32; 3]) -> Shape {
    Shape::Box {
        half_extents: vec3(h[0], h[1], h[2]),
    }
}

fn compound(parts: &[Part]) -> Geometry {
    Geometry::Compound(
        parts
            .iter()
            .map(|&(p, q, h)| ChildShape {
                shape: cuboid(h),
                position: vec3(p[0], p[1], p[2]),
                quaternion: q,
            })
            .collect(),
    )
}

fn rigid(name: String, geometry: Geometry, position: Vec3, quaternion: Quat, density: f32) -> RigidSpec {
    RigidSpec {
        name,
        geometry,
        position,
        quaternion,
        density,
        auto_sleep: false,
    }
}

impl Scene {
    /// The shared room with `num_pointers` pointer bodies.
    pub fn room(num_pointers: usize) -> Self {
        let mut bodies = Vec::with_capacity(6 + BLOCK_COUNT + num_pointers);

        let walls: [(Vec3, Quat, [f32; 3]); 6] = [
            (vec3(-7.0, 0.0, 0.0), [0.0, TILT, 0.0, TILT_W], [2.5, 12.0, 12.0]),
            (vec3(7.0, 0.0, 0.0), [0.0, -TILT, 0.0, TILT_W], [2.5, 12.0, 12.0]),
            (vec3(0.0, -2.5, 0.0), IDENTITY, [50.0, 2.5, 50.0]),
            (vec3(0.0, 12.0, 0.0), IDENTITY, [12.0, 2.5, 12.0]),
            (vec3(0.0, 0.0, -7.0), IDENTITY, [12.0, 12.0, 2.5]),
            (vec3(0.0, 0.0, 5.0), IDENTITY, [12.0, 12.0, 2.5]),
        ];
        for (i, (position, quaternion, half)) in walls.into_iter().enumerate() {
            bodies.push(SceneBody {
                spec: rigid(
                    format!("room_{i}"),
                    Geometry::Single(cuboid(half)),
                    position,
                    quaternion,
                    0.0,
                ),
                role: Role::Wall,
            });
        }

        for id in 0..BLOCK_COUNT {
            let (geometry, position) = block_geometry(id);
            let small = id == 2 || id >= 33;
            bodies.push(SceneBody {
                spec: rigid(format!("block_{id}"), geometry, position, IDENTITY, 1.0),
                role: Role::Block {
                    id: id as u8,
                    tuning: if small {
                        ContactTuning::SMALL
                    } else {
                        ContactTuning::LARGE
                    },
                    world_anchor: id < 2,
                },
            });
        }

        for i in 0..num_pointers {
            bodies.push(SceneBody {
                spec: rigid(pointer_name(i), Geometry::Pointer, Vec3::ZERO, IDENTITY, 0.0),
                role: Role::Pointer(i),
            });
        }

        Self { bodies }
    }

    pub fn pointer_count(&self) -> usize {
        self.bodies
            .iter()
            .filter(|b| matches!(b.role, Role::Pointer(_)))
            .count()
    }

    /// Position of pointer `i` among the exported (non-static) bodies.
    pub fn pointer_buffer_index(&self, i: usize) -> Option<usize> {
        self.bodies
            .iter()
            .filter(|b| !b.spec.is_static())
            .position(|b| b.role == Role::Pointer(i))
    }

    /// Number of bodies in the export buffer.
    pub fn exported_count(&self) -> usize {
        self.bodies.iter().filter(|b| !b.spec.is_static()).count()
    }
}

/// Blocks 0 and 1 are compound logos, 2 is a sphere, 3..=32 are 0.5 cubes
/// stacked in three rows of ten, 33..=62 are 0.25 cubes in three rows of ten.
fn block_geometry(id: usize) -> (Geometry, Vec3) {
    match id {
        0 => (compound(&LOGO_PARTS), vec3(0.0, 0.2175, -1.0)),
        1 => (compound(&CHEVRON_PARTS), vec3(-0.209, 0.2435, 1.0)),
        2 => (
            Geometry::Single(Shape::Sphere { radius: 0.085 }),
            vec3(0.208, 0.083, 1.125),
        ),
        3..=32 => {
            let n = id - 3;
            let (row, col) = (n / 10, n % 10);
            (
                Geometry::Single(cuboid([0.25, 0.25, 0.25])),
                vec3(-2.25 + 0.5 * col as f32, 2.25 + 0.5 * row as f32, 0.0),
            )
        }
        _ => {
            let n = id - 33;
            let (row, col) = (n / 10, n % 10);
            (
                Geometry::Single(cuboid([0.125, 0.125, 0.125])),
                vec3(-1.125 + 0.25 * col as f32, 3.75 + 0.25 * row as f32, 0.0),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_layout() {
        let scene = Scene::room(22);
        assert_eq!(scene.bodies.len(), 6 + 63 + 22);
        assert_eq!(scene.bodies[6].spec.name, "block_0");
        assert_eq!(scene.bodies[68].spec.name, "block_62");
        assert_eq!(scene.bodies[69].spec.name, "pointer_0");
        assert_eq!(scene.pointer_count(), 22);
    }

    #[test]
    fn export_buffer_skips_walls() {
        let scene = Scene::room(22);
        assert_eq!(scene.exported_count(), 63 + 22);
        assert_eq!(scene.pointer_buffer_index(0), Some(63));
        assert_eq!(scene.pointer_buffer_index(21), Some(84));
        assert_eq!(scene.pointer_buffer_index(22), None);
    }

    #[test]
    fn block_grid_positions() {
        assert_eq!(block_geometry(3).1, vec3(-2.25, 2.25, 0.0));
        assert_eq!(block_geometry(32).1, vec3(2.25, 3.25, 0.0));
        assert_eq!(block_geometry(33).1, vec3(-1.125, 3.75, 0.0));
        assert_eq!(block_geometry(62).1, vec3(1.125, 4.25, 0.0));
    }

    #[test]
    fn small_blocks_use_small_tuning() {
        let scene = Scene::room(1);
        let tuning = |index: usize| match scene.bodies[index].role {
            Role::Block { tuning, .. } => tuning,
            other => panic!("Expected block, got {:?}", other),
        };
        assert_eq!(tuning(6 + 2), ContactTuning::SMALL);
        assert_eq!(tuning(6 + 3), ContactTuning::LARGE);
        assert_eq!(tuning(6 + 33), ContactTuning::SMALL);
    }

    #[test]
    fn logos_use_world_anchor() {
        let scene = Scene::room(1);
        assert!(matches!(
            scene.bodies[6].role,
            Role::Block {
                world_anchor: true,
                ..
            }
        ));
        assert!(matches!(
            scene.bodies[8].role,
            Role::Block {
                world_anchor: false,
                ..
            }
        ));
    }
}
