//! Monte Carlo light transport estimators.
//!
//! An integrator turns one camera sample into a radiance estimate. All of
//! them share the same bounce rule (trace, sample the material, update the
//! throughput with [`scatter_weight`](crate::material::scatter_weight),
//! Russian roulette after a few bounces) and differ in how they combine
//! the paths they build.

mod bidirectional;
mod gradient;
mod normals;
mod path;
mod path_vertex;

pub use bidirectional::BidirectionalPathTracer;
pub use gradient::{GradientDomainPathTracer, ShiftResult};
pub use normals::NormalView;
pub use path::PathTracer;
pub use path_vertex::{PathVertex, VertexKind};

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use zaphod_math::Ray;

use crate::material::Color;
use crate::sampling::gen_f32;
use crate::scene::Scene;

/// Offset used when spawning secondary rays off a surface.
pub const RAY_EPSILON: f32 = 1e-3;

/// Finite-difference gradient toward one neighbouring pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientSample {
    /// `f(neighbour) - f(pixel)` for this sample.
    pub value: Color,
    /// Combination weight of the shift outcome.
    pub weight: f32,
}

/// Neighbour order used by gradient samples and buffers.
pub const GRADIENT_OFFSETS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Everything one camera sample produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSample {
    pub radiance: Color,
    /// Gradients toward (+x, +y, -x, -y), for gradient-domain integrators.
    pub gradients: Option<[GradientSample; 4]>,
}

impl PixelSample {
    pub fn new(radiance: Color) -> Self {
        Self {
            radiance,
            gradients: None,
        }
    }
}

pub trait Integrator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Radiance arriving along `ray` (toward its origin).
    fn radiance(&self, scene: &Scene, ray: &Ray, rng: &mut dyn RngCore) -> Color;

    /// One jittered sample of pixel `(x, y)`, weighted by the camera.
    fn sample(&self, scene: &Scene, x: u32, y: u32, width: u32, height: u32, rng: &mut dyn RngCore) -> PixelSample {
        let fx = x as f32 + gen_f32(rng);
        let fy = y as f32 + gen_f32(rng);
        let (ray, weight) = scene.camera().generate_ray(fx, fy, width, height, rng);
        if weight <= 0.0 {
            return PixelSample::new(Color::ZERO);
        }
        PixelSample::new(self.radiance(scene, &ray, rng) * weight)
    }

    /// Whether `sample` fills in gradients.
    fn produces_gradients(&self) -> bool {
        false
    }
}

/// Path termination settings shared by every integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    /// Maximum number of surface interactions per (sub)path.
    pub max_bounces: u32,
    /// Bounce index from which Russian roulette applies.
    pub roulette_start: u32,
    /// Probability of continuing past a roulette test.
    pub roulette_continue: f32,
    /// Paths whose largest throughput component falls below this stop.
    pub throughput_floor: f32,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            max_bounces: 20,
            roulette_start: 5,
            roulette_continue: 0.9,
            throughput_floor: 1e-6,
        }
    }
}

impl IntegratorConfig {
    /// Russian roulette for the bounce that just happened. Returns the
    /// compensation factor to apply on survival, or `None` to stop.
    pub fn roulette(&self, bounce: u32, rng: &mut dyn RngCore) -> Option<f32> {
        if bounce < self.roulette_start {
            return Some(1.0);
        }
        let p = self.roulette_continue.clamp(0.0, 1.0);
        if p <= 0.0 || gen_f32(rng) >= p {
            return None;
        }
        Some(1.0 / p)
    }

    /// True once the throughput is too small to matter.
    pub fn negligible(&self, throughput: Color) -> bool {
        throughput.max_element() < self.throughput_floor
    }
}

/// Selectable integrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratorKind {
    #[default]
    Pt,
    Bdpt,
    Gdpt,
    Normals,
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IntegratorKind::Pt => "pt",
            IntegratorKind::Bdpt => "bdpt",
            IntegratorKind::Gdpt => "gdpt",
            IntegratorKind::Normals => "normals",
        };
        f.write_str(name)
    }
}

impl FromStr for IntegratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pt" | "path" => Ok(IntegratorKind::Pt),
            "bdpt" | "bidirectional" => Ok(IntegratorKind::Bdpt),
            "gdpt" | "gradient" => Ok(IntegratorKind::Gdpt),
            "normals" => Ok(IntegratorKind::Normals),
            other => Err(format!("unknown integrator '{}' (expected pt, bdpt, gdpt or normals)", other)),
        }
    }
}

/// Instantiate the integrator for `kind`.
pub fn create_integrator(kind: IntegratorKind, config: IntegratorConfig) -> Box<dyn Integrator> {
    match kind {
        IntegratorKind::Pt => Box::new(PathTracer::new(config)),
        IntegratorKind::Bdpt => Box::new(BidirectionalPathTracer::new(config)),
        IntegratorKind::Gdpt => Box::new(GradientDomainPathTracer::new(config)),
        IntegratorKind::Normals => Box::new(NormalView),
    }
}
