use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance_sq(self, other: Vector3) -> f32 {
        let d = self - other;
        d.x * d.x + d.y * d.y + d.z * d.z
    }

    pub fn distance(self, other: Vector3) -> f32 {
        self.distance_sq(other).sqrt()
    }

    pub fn distance_2d_sq(self, other: Vector3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    pub fn lerp(self, other: Vector3, t: f32) -> Vector3 {
        let t = t.clamp(0.0, 1.0);
        self + (other - self) * t
    }

    /// Facing angle from `self` towards `other`, normalized to [0, 2pi).
    pub fn angle_to(self, other: Vector3) -> f32 {
        normalize_orientation((other.y - self.y).atan2(other.x - self.x))
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vector3 {
    type Output = Vector3;

    fn mul(self, rhs: f32) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Position plus facing.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub o: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32, o: f32) -> Self {
        Self { x, y, z, o }
    }

    pub fn from_location(location: Vector3, o: f32) -> Self {
        Self::new(location.x, location.y, location.z, o)
    }

    pub fn location(self) -> Vector3 {
        Vector3::new(self.x, self.y, self.z)
    }

    pub fn with_location(self, location: Vector3) -> Self {
        Self {
            x: location.x,
            y: location.y,
            z: location.z,
            o: self.o,
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.o.is_finite()
    }
}

pub fn normalize_orientation(o: f32) -> f32 {
    let tau = std::f32::consts::TAU;
    let r = o % tau;
    if r < 0.0 {
        r + tau
    } else {
        r
    }
}

pub fn nearly_equal(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() <= epsilon
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_clamps_factor() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(10.0, 0.0, 4.0);
        assert_eq!(a.lerp(b, 0.5), Vector3::new(5.0, 0.0, 2.0));
        assert_eq!(a.lerp(b, 2.0), b);
        assert_eq!(a.lerp(b, -1.0), a);
    }

    #[test]
    fn planar_distance_ignores_height() {
        let a = Vector3::new(0.0, 0.0, 0.0);
        let b = Vector3::new(3.0, 4.0, 100.0);
        assert_eq!(a.distance_2d_sq(b), 25.0);
        assert!(a.distance(b) > 100.0);
    }

    #[test]
    fn orientation_wraps_into_positive_range() {
        let tau = std::f32::consts::TAU;
        assert!(nearly_equal(normalize_orientation(-0.5), tau - 0.5, 1e-5));
        assert!(nearly_equal(normalize_orientation(tau + 1.0), 1.0, 1e-5));
        let angle = Vector3::ZERO.angle_to(Vector3::new(0.0, -1.0, 0.0));
        assert!(nearly_equal(angle, 1.5 * std::f32::consts::PI, 1e-5));
    }
}
