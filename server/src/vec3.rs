/// 3D vector utilities for the scene simulation.

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn from_array(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Shorthand constructor
pub const fn vec3(x: f32, y: f32, z: f32) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Dot product
pub fn dot(a: Vec3, b: Vec3) -> f32 {
    a.x * b.x + a.y * b.y + a.z * b.z
}

/// Vector length
pub fn length(v: Vec3) -> f32 {
    dot(v, v).sqrt()
}

/// Scale vector by scalar
pub fn scale(v: Vec3, s: f32) -> Vec3 {
    Vec3::new(v.x * s, v.y * s, v.z * s)
}

/// Add two vectors
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x + b.x, a.y + b.y, a.z + b.z)
}

/// Subtract vectors (a - b)
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    Vec3::new(a.x - b.x, a.y - b.y, a.z - b.z)
}

/// a + b * s, the accumulate step used by integrators.
pub fn add_scaled(a: Vec3, b: Vec3, s: f32) -> Vec3 {
    Vec3::new(a.x + b.x * s, a.y + b.y * s, a.z + b.z * s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_of_345() {
        assert!((length(vec3(3.0, 4.0, 0.0)) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn add_scaled_matches_add_and_scale() {
        let a = vec3(1.0, 2.0, 3.0);
        let b = vec3(-1.0, 0.5, 2.0);
        assert_eq!(add_scaled(a, b, 2.0), add(a, scale(b, 2.0)));
    }

    #[test]
    fn sub_inverts_add() {
        let a = vec3(0.25, -4.0, 9.0);
        let b = vec3(1.0, 1.0, 1.0);
        assert_eq!(sub(add(a, b), b), a);
    }
}
