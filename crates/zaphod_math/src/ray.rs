use crate::{Mat4, Vec3};

/// A ray in 3D space with an origin and a unit direction.
///
/// The direction is normalized on construction and again after every
/// transform, so distances along a ray are always metric in the space the
/// ray lives in.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray. A zero direction stays zero and hits nothing.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Create a ray whose origin is pushed `epsilon` along `direction`.
    ///
    /// Secondary rays start this way so they do not re-hit the surface
    /// they leave from.
    pub fn offset(origin: Vec3, direction: Vec3, epsilon: f32) -> Self {
        let direction = direction.normalize_or_zero();
        Self {
            origin: origin + direction * epsilon,
            direction,
        }
    }

    /// Get the point along the ray at parameter t.
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Transform the ray by a matrix and renormalize the direction.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self::new(
            matrix.transform_point3(self.origin),
            matrix.transform_vector3(self.direction),
        )
    }
}
