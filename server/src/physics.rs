use std::ops::{Add, Sub};

///Represents a vector in 2D arena space.
/// Screen coordinates: x grows to the right, y grows downward.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    pub const fn zero() -> Self {
        Vector2 { x: 0.0, y: 0.0 }
    }

    ///Unit vector pointing along `angle` (radians).
    pub fn from_angle(angle: f32) -> Vector2 {
        Vector2 {
            x: angle.cos(),
            y: angle.sin(),
        }
    }

    ///Returns the magnitude of the vector.
    /// Uses `hypot` so large finite components do not overflow.
    pub fn magnitude(&self) -> f32 {
        self.x.hypot(self.y)
    }

    ///Returns the normalized vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 || !mag.is_finite() {
            Vector2::zero()
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Shortens the vector to `max` if it is longer, keeping its direction.
    pub fn clamp_magnitude(&self, max: f32) -> Vector2 {
        if self.magnitude() > max {
            self.normalize().scale(max)
        } else {
            *self
        }
    }

    pub fn distance(&self, other: &Vector2) -> f32 {
        (*self - *other).magnitude()
    }

    ///Angle of the vector in radians, `None` when it has no direction.
    pub fn angle(&self) -> Option<f32> {
        if self.is_finite() && self.magnitude() > f32::EPSILON {
            Some(self.y.atan2(self.x))
        } else {
            None
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vector2 {
    type Output = Vector2;

    fn add(self, other: Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }
}

impl Sub for Vector2 {
    type Output = Vector2;

    fn sub(self, other: Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }
}

impl From<[f32; 2]> for Vector2 {
    fn from([x, y]: [f32; 2]) -> Self {
        Vector2 { x, y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_normalize() {
        let v = Vector2::new(3.0, 4.0).normalize();
        assert_approx_eq!(v.x, 0.6);
        assert_approx_eq!(v.y, 0.8);
        assert_eq!(Vector2::zero().normalize(), Vector2::zero());
    }

    #[test]
    fn test_clamp_magnitude() {
        let v = Vector2::new(30.0, 40.0).clamp_magnitude(5.0);
        assert_approx_eq!(v.x, 3.0, 1e-4);
        assert_approx_eq!(v.y, 4.0, 1e-4);

        let short = Vector2::new(0.1, 0.1);
        assert_eq!(short.clamp_magnitude(5.0), short);
    }

    #[test]
    fn test_clamp_magnitude_huge_components() {
        let v = Vector2::new(1e30, -1e30).clamp_magnitude(1.0);
        assert_approx_eq!(v.magnitude(), 1.0, 1e-5);
        assert!(v.x > 0.0 && v.y < 0.0);
    }

    #[test]
    fn test_angle_roundtrip() {
        let angle = Vector2::new(0.0, 2.0).angle().unwrap();
        assert_approx_eq!(angle, FRAC_PI_2);

        let v = Vector2::from_angle(angle);
        assert_approx_eq!(v.x, 0.0);
        assert_approx_eq!(v.y, 1.0);
    }

    #[test]
    fn test_angle_undefined() {
        assert_eq!(Vector2::zero().angle(), None);
        assert_eq!(Vector2::new(f32::NAN, 1.0).angle(), None);
        assert_eq!(Vector2::new(f32::INFINITY, 0.0).angle(), None);
    }

    #[test]
    fn test_distance() {
        let a = Vector2::new(1.0, 1.0);
        let b = Vector2::new(4.0, 5.0);
        assert_approx_eq!(a.distance(&b), 5.0);
    }
}
