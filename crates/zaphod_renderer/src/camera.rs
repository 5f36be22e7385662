//! Cameras: film coordinates to primary rays.

use rand::RngCore;
use std::fmt::Debug;
use zaphod_math::{Ray, Vec3};

use crate::sampling::concentric_disk;

/// Generates primary rays.
///
/// `x` and `y` are continuous film coordinates in pixels (the integer part
/// picks the pixel, the fraction is the sub-pixel position), with `y`
/// growing downward. The returned weight lets a lens model attenuate a
/// sample without the integrator knowing about it.
pub trait Camera: Send + Sync + Debug {
    fn generate_ray(&self, x: f32, y: f32, width: u32, height: u32, rng: &mut dyn RngCore) -> (Ray, f32);
}

/// Orthonormal camera frame: `forward` looks at the target, `right` and
/// `up` span the film plane.
#[derive(Debug, Clone, Copy)]
struct Frame {
    origin: Vec3,
    forward: Vec3,
    right: Vec3,
    up: Vec3,
}

impl Frame {
    fn look_at(look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        let forward = (look_at - look_from).normalize_or_zero();
        let right = forward.cross(vup).normalize_or_zero();
        let up = right.cross(forward);
        Self {
            origin: look_from,
            forward,
            right,
            up,
        }
    }

    /// Direction through a film point on the plane at unit distance.
    fn film_direction(&self, x: f32, y: f32, width: u32, height: u32, tan_half_fov: f32) -> Vec3 {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let half_width = tan_half_fov;
        let half_height = tan_half_fov * height / width;

        let ndc_x = 2.0 * x / width - 1.0;
        let ndc_y = 1.0 - 2.0 * y / height;
        self.forward + self.right * (ndc_x * half_width) + self.up * (ndc_y * half_height)
    }
}

/// Ideal pinhole camera with a horizontal field of view.
#[derive(Debug, Clone)]
pub struct PinholeCamera {
    look_from: Vec3,
    look_at: Vec3,
    vup: Vec3,
    hfov: f32, // degrees
    frame: Frame,
}

impl Default for PinholeCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl PinholeCamera {
    /// Camera at the origin looking down -Z with a 60° field of view.
    pub fn new() -> Self {
        let look_from = Vec3::ZERO;
        let look_at = Vec3::NEG_Z;
        let vup = Vec3::Y;
        Self {
            look_from,
            look_at,
            vup,
            hfov: 60.0,
            frame: Frame::look_at(look_from, look_at, vup),
        }
    }

    /// Set camera position.
    pub fn with_position(mut self, look_from: Vec3, look_at: Vec3, vup: Vec3) -> Self {
        self.look_from = look_from;
        self.look_at = look_at;
        self.vup = vup;
        self.frame = Frame::look_at(look_from, look_at, vup);
        self
    }

    /// Set the horizontal field of view in degrees.
    pub fn with_fov(mut self, hfov: f32) -> Self {
        self.hfov = hfov;
        self
    }

    pub fn position(&self) -> Vec3 {
        self.look_from
    }
}

impl Camera for PinholeCamera {
    fn generate_ray(&self, x: f32, y: f32, width: u32, height: u32, _rng: &mut dyn RngCore) -> (Ray, f32) {
        let tan_half = (self.hfov.to_radians() * 0.5).tan();
        let direction = self.frame.film_direction(x, y, width, height, tan_half);
        (Ray::new(self.frame.origin, direction), 1.0)
    }
}

/// Thin-lens camera with depth of field.
#[derive(Debug, Clone)]
pub struct ThinLensCamera {
    pinhole: PinholeCamera,
    aperture_radius: f32,
    focus_distance: f32,
}

impl ThinLensCamera {
    pub fn new(pinhole: PinholeCamera) -> Self {
        let focus_distance = (pinhole.look_at - pinhole.look_from).length().max(1e-3);
        Self {
            pinhole,
            aperture_radius: 0.0,
            focus_distance,
        }
    }

    /// Set lens settings. The focus distance is measured along the view axis.
    pub fn with_lens(mut self, aperture_radius: f32, focus_distance: f32) -> Self {
        self.aperture_radius = aperture_radius.max(0.0);
        self.focus_distance = focus_distance.max(1e-3);
        self
    }
}

impl Camera for ThinLensCamera {
    fn generate_ray(&self, x: f32, y: f32, width: u32, height: u32, rng: &mut dyn RngCore) -> (Ray, f32) {
        let frame = &self.pinhole.frame;
        let tan_half = (self.pinhole.hfov.to_radians() * 0.5).tan();
        let film = frame.film_direction(x, y, width, height, tan_half);

        // Every lens point maps a film point onto the same focus-plane point.
        let focus_point = frame.origin + film * self.focus_distance;
        let lens = concentric_disk(rng) * self.aperture_radius;
        let origin = frame.origin + frame.right * lens.x + frame.up * lens.y;

        let ray = Ray::new(origin, focus_point - origin);
        let weight = ray.direction.dot(frame.forward).abs();
        (ray, weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn camera() -> PinholeCamera {
        PinholeCamera::new()
            .with_position(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y)
            .with_fov(60.0)
    }

    #[test]
    fn test_center_ray_looks_at_target() {
        let mut rng = StdRng::seed_from_u64(42);
        let (ray, weight) = camera().generate_ray(50.0, 50.0, 100, 100, &mut rng);
        assert_eq!(weight, 1.0);
        assert!((ray.origin - Vec3::new(0.0, 0.0, 5.0)).length() < 1e-6);
        assert!((ray.direction - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_horizontal_fov() {
        let mut rng = StdRng::seed_from_u64(42);
        let (ray, _) = camera().generate_ray(100.0, 25.0, 100, 50, &mut rng);
        // Right film edge at mid height is 30° off axis.
        let angle = ray.direction.dot(Vec3::NEG_Z).acos().to_degrees();
        assert!((angle - 30.0).abs() < 1e-3);
        assert!(ray.direction.x > 0.0);

        // Top of the film points up.
        let (ray, _) = camera().generate_ray(50.0, 0.0, 100, 50, &mut rng);
        assert!(ray.direction.y > 0.0);
    }

    #[test]
    fn test_thin_lens_focuses_on_plane() {
        let lens = ThinLensCamera::new(camera()).with_lens(0.5, 5.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (ray, weight) = lens.generate_ray(30.0, 70.0, 100, 100, &mut rng);
            assert!(weight > 0.0 && weight <= 1.0);
            // Every ray through this film point passes the same focus-plane point.
            let t = (0.0 - ray.origin.z) / ray.direction.z;
            let p = ray.at(t);
            let (pin, _) = camera().generate_ray(30.0, 70.0, 100, 100, &mut rng);
            let expected = pin.at(5.0 / -pin.direction.z);
            assert!((p - expected).length() < 1e-3, "{:?} vs {:?}", p, expected);
        }
    }

    #[test]
    fn test_zero_aperture_matches_pinhole() {
        let lens = ThinLensCamera::new(camera());
        let mut rng = StdRng::seed_from_u64(3);
        let (a, _) = lens.generate_ray(10.0, 20.0, 64, 64, &mut rng);
        let (b, _) = camera().generate_ray(10.0, 20.0, 64, 64, &mut rng);
        assert!((a.origin - b.origin).length() < 1e-6);
        assert!((a.direction - b.direction).length() < 1e-5);
    }
}
