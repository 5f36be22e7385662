//! Debug view of first-hit normals.

use rand::RngCore;
use zaphod_math::Ray;

use super::Integrator;
use crate::material::Color;
use crate::scene::Scene;

/// Maps the first-hit normal to `0.5 + 0.5 * n`; black on a miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalView;

impl Integrator for NormalView {
    fn name(&self) -> &'static str {
        "normals"
    }

    fn radiance(&self, scene: &Scene, ray: &Ray, _rng: &mut dyn RngCore) -> Color {
        match scene.trace(ray) {
            Some(hit) => hit.normal * 0.5 + Color::splat(0.5),
            None => Color::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::material::Diffuse;
    use crate::object::SceneObject;
    use crate::shape::Shape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use zaphod_math::Vec3;

    #[test]
    fn test_normal_colors() {
        let objects = vec![SceneObject::new("ball", Shape::sphere(1.0), Diffuse::new(Color::ONE))];
        let scene = Scene::new(objects, Arc::new(PinholeCamera::new()), None).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        let facing = NormalView.radiance(&scene, &Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::NEG_Z), &mut rng);
        assert!((facing - Color::new(0.5, 0.5, 1.0)).length() < 1e-4);

        let miss = NormalView.radiance(&scene, &Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z), &mut rng);
        assert_eq!(miss, Color::ZERO);
    }
}
