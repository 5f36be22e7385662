//! Random sampling helpers shared by materials, shapes, lights and cameras.
//!
//! Every function takes the caller's random engine explicitly; there is no
//! global random state anywhere in the renderer.

use rand::{Rng, RngCore};
use std::f32::consts::PI;
use zaphod_math::{Vec2, Vec3};

/// Uniform float in [0, 1).
#[inline]
pub fn gen_f32(rng: &mut dyn RngCore) -> f32 {
    rng.gen::<f32>()
}

/// Build an orthonormal basis (t, b) around a unit vector `n`.
pub fn orthonormal_basis(n: Vec3) -> (Vec3, Vec3) {
    let helper = if n.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    let tangent = helper.cross(n).normalize();
    let bitangent = n.cross(tangent);
    (tangent, bitangent)
}

/// Express a local-frame direction (z = axis) in world space.
#[inline]
pub fn to_world(local: Vec3, axis: Vec3) -> Vec3 {
    let (t, b) = orthonormal_basis(axis);
    (t * local.x + b * local.y + axis * local.z).normalize_or_zero()
}

/// Cosine-weighted direction on the hemisphere around `axis`.
pub fn cosine_hemisphere(axis: Vec3, rng: &mut dyn RngCore) -> Vec3 {
    let r1 = gen_f32(rng);
    let r2 = gen_f32(rng);
    let phi = 2.0 * PI * r1;
    let r = r2.sqrt();
    let z = (1.0 - r2).max(0.0).sqrt();
    to_world(Vec3::new(r * phi.cos(), r * phi.sin(), z), axis)
}

/// Direction distributed proportionally to cos^exponent around `axis`.
pub fn cosine_power_lobe(axis: Vec3, exponent: f32, rng: &mut dyn RngCore) -> Vec3 {
    let r1 = gen_f32(rng);
    let r2 = gen_f32(rng);
    let phi = 2.0 * PI * r1;
    let cos_theta = (1.0 - r2).powf(1.0 / (exponent + 1.0));
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    to_world(
        Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta),
        axis,
    )
}

/// Value of the normalized cosine-power lobe in the π-scaled measure
/// (π times the solid-angle density).
#[inline]
pub fn cosine_power_density(axis: Vec3, direction: Vec3, exponent: f32) -> f32 {
    let c = axis.dot(direction);
    if c <= 0.0 {
        0.0
    } else {
        0.5 * (exponent + 1.0) * c.powf(exponent)
    }
}

/// Uniform point on the unit disk (concentric mapping).
pub fn concentric_disk(rng: &mut dyn RngCore) -> Vec2 {
    let u = Vec2::new(gen_f32(rng), gen_f32(rng)) * 2.0 - Vec2::ONE;
    if u.x == 0.0 && u.y == 0.0 {
        return Vec2::ZERO;
    }

    let (r, theta) = if u.x.abs() > u.y.abs() {
        (u.x, (PI / 4.0) * (u.y / u.x))
    } else {
        (u.y, (PI / 2.0) - (PI / 4.0) * (u.x / u.y))
    };
    Vec2::new(theta.cos(), theta.sin()) * r
}

/// Uniform direction on the unit sphere.
pub fn uniform_sphere(rng: &mut dyn RngCore) -> Vec3 {
    let z = 1.0 - 2.0 * gen_f32(rng);
    let r = (1.0 - z * z).max(0.0).sqrt();
    let phi = 2.0 * PI * gen_f32(rng);
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Uniform barycentric coordinates (u, v) over a triangle.
pub fn uniform_triangle(rng: &mut dyn RngCore) -> (f32, f32) {
    let su = gen_f32(rng).sqrt();
    let v = gen_f32(rng);
    (1.0 - su, v * su)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_basis_is_orthonormal() {
        for n in [Vec3::X, Vec3::Y, -Vec3::Z, Vec3::new(1.0, 2.0, -3.0).normalize()] {
            let (t, b) = orthonormal_basis(n);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(b.dot(n).abs() < 1e-5);
            assert!(t.dot(b).abs() < 1e-5);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!((b.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_cosine_hemisphere_stays_on_axis_side() {
        let mut rng = StdRng::seed_from_u64(42);
        let axis = Vec3::new(0.3, -1.0, 0.2).normalize();
        for _ in 0..1000 {
            let d = cosine_hemisphere(axis, &mut rng);
            assert!(d.dot(axis) >= -1e-5);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_cosine_power_lobe_concentrates() {
        let mut rng = StdRng::seed_from_u64(7);
        let mean: f32 = (0..2000)
            .map(|_| cosine_power_lobe(Vec3::Z, 200.0, &mut rng).z)
            .sum::<f32>()
            / 2000.0;
        assert!(mean > 0.98);
    }

    #[test]
    fn test_concentric_disk_inside_unit_circle() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert!(concentric_disk(&mut rng).length() <= 1.0 + 1e-5);
        }
    }

    #[test]
    fn test_uniform_sphere_mean_is_centered() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = 20_000;
        let mean = (0..n).map(|_| uniform_sphere(&mut rng)).sum::<Vec3>() / n as f32;
        assert!(mean.length() < 0.03);
    }

    #[test]
    fn test_uniform_triangle_barycentrics_valid() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            let (u, v) = uniform_triangle(&mut rng);
            assert!(u >= 0.0 && v >= 0.0 && u + v <= 1.0 + 1e-6);
        }
    }
}
