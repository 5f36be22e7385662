//! Importance sampling of emissive objects by surface area.

use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;
use zaphod_math::Ray;

use crate::object::SceneObject;
use crate::scene::Scene;

/// A point drawn on a light.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSample {
    /// Origin on the light surface, direction along its outward normal.
    pub ray: Ray,
    pub object: usize,
    /// Probability of having picked this light.
    pub mass: f32,
    /// Area density of the point over all lights (`1 / total area`).
    pub area_density: f32,
}

/// Discrete distribution over the emissive objects, proportional to their
/// world-space surface area.
#[derive(Debug, Clone, Default)]
pub struct LightSampler {
    lights: Vec<usize>,
    weights: Vec<f32>,
    distribution: Option<WeightedIndex<f32>>,
    total: f32,
}

impl LightSampler {
    /// Collect every light with a positive weight.
    pub fn new(objects: &[SceneObject]) -> Self {
        let (lights, weights): (Vec<usize>, Vec<f32>) = objects
            .iter()
            .enumerate()
            .filter(|(_, object)| object.is_light() && object.weight() > 0.0)
            .map(|(index, object)| (index, object.weight()))
            .unzip();

        let total = weights.iter().sum();
        let distribution = WeightedIndex::new(&weights).ok();
        Self {
            lights,
            weights,
            distribution,
            total,
        }
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Sum of all light weights.
    pub fn total_weight(&self) -> f32 {
        self.total
    }

    /// Pick a light, then a uniform point on it.
    pub fn sample(&self, scene: &Scene, rng: &mut dyn RngCore) -> Option<LightSample> {
        let distribution = self.distribution.as_ref()?;
        let slot = distribution.sample(rng);
        let object = self.lights[slot];
        let point = scene.object(object)?.sample(rng)?;

        Some(LightSample {
            ray: Ray::new(point.position, point.normal),
            object,
            mass: self.weights[slot] / self.total,
            area_density: 1.0 / self.total,
        })
    }

    /// Probability of picking `object`; zero for non-lights.
    pub fn mass(&self, object: usize) -> f32 {
        self.lights
            .iter()
            .position(|&l| l == object)
            .map_or(0.0, |slot| self.weights[slot] / self.total)
    }

    /// Area density with which `sample` produces a point on `object`.
    pub fn area_density(&self, object: usize) -> f32 {
        if self.lights.contains(&object) {
            1.0 / self.total
        } else {
            0.0
        }
    }
}
