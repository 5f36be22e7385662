//! Ray/triangle intersection.
//!
//! Uses the Möller-Trumbore algorithm. Shared by the octree and the BVH
//! backend so both report identical distances and barycentrics.

use zaphod_math::{Ray, Vec3};

/// Hits closer than this along the ray are ignored, so secondary rays do
/// not re-hit the triangle they start on.
pub const HIT_EPSILON: f32 = 1e-4;

/// Distance and barycentric coordinates of a ray/triangle hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleHit {
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// Möller-Trumbore ray-triangle intersection. Accepts hits in
/// `(HIT_EPSILON, t_max)`; both faces are hit.
#[inline]
pub fn intersect_triangle(ray: &Ray, [v0, v1, v2]: [Vec3; 3], t_max: f32) -> Option<TriangleHit> {
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;

    let h = ray.direction.cross(edge2);
    let a = edge1.dot(h);

    // Ray is parallel to triangle
    if a.abs() < 1e-12 {
        return None;
    }

    let f = 1.0 / a;
    let s = ray.origin - v0;
    let u = f * s.dot(h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = f * ray.direction.dot(q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(q);
    if t <= HIT_EPSILON || t >= t_max {
        return None;
    }

    Some(TriangleHit { t, u, v })
}
