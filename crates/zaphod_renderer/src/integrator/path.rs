//! Unidirectional path tracing.

use rand::RngCore;
use zaphod_math::Ray;

use super::{Integrator, IntegratorConfig, RAY_EPSILON};
use crate::material::{scatter_weight, Color, InteractionKind};
use crate::scene::Scene;

/// Forward path tracer: follows sampled bounces until a light is hit.
#[derive(Debug, Clone, Default)]
pub struct PathTracer {
    config: IntegratorConfig,
}

impl PathTracer {
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntegratorConfig {
        &self.config
    }
}

impl Integrator for PathTracer {
    fn name(&self) -> &'static str {
        "pt"
    }

    fn radiance(&self, scene: &Scene, ray: &Ray, rng: &mut dyn RngCore) -> Color {
        let mut ray = *ray;
        let mut throughput = Color::ONE;

        for bounce in 0..self.config.max_bounces {
            let Some(hit) = scene.trace(&ray) else {
                return Color::ZERO;
            };

            if hit.material.is_light() {
                return throughput * hit.material.color(hit.uv, InteractionKind::Diffuse);
            }

            let Some(sample) = hit.material.sample(&hit, ray.direction, rng) else {
                return Color::ZERO;
            };
            throughput *= scatter_weight(hit.material, ray.direction, hit.normal, hit.uv, &sample);

            match self.config.roulette(bounce + 1, rng) {
                Some(compensation) => throughput *= compensation,
                None => return Color::ZERO,
            }
            if self.config.negligible(throughput) {
                return Color::ZERO;
            }

            ray = Ray::offset(hit.position, sample.direction, RAY_EPSILON);
        }

        Color::ZERO
    }
}
