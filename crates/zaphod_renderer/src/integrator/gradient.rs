//! Gradient-domain path tracing with half-vector shift mapping.
//!
//! Every sample traces a base path and, for each of the four neighbouring
//! pixels, maps it onto an offset path through the neighbour with the same
//! sub-pixel position. The offset path reconnects to the base path at the
//! first diffuse vertex followed by a diffuse or emitting one. A diffuse
//! vertex followed by a specular one is crossed by copying its half-vector.
//! Any specular base vertex (ideal, transmissive or rough glossy) ends the
//! shift as not invertible, and the neighbour is estimated with an
//! independent path. The throughput of the offset path is evaluated with
//! the base path's densities and corrected by the Jacobian of the
//! reconnection.

use rand::RngCore;
use zaphod_math::{Ray, Vec3};

use super::path::PathTracer;
use super::path_vertex::{random_walk, PathVertex, VertexKind};
use super::{GradientSample, Integrator, IntegratorConfig, PixelSample, GRADIENT_OFFSETS, RAY_EPSILON};
use crate::material::{reflect, Color};
use crate::sampling::gen_f32;
use crate::scene::Scene;

/// Outcome of shifting a base path onto a neighbouring pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShiftResult {
    /// Reconnected with the same vertex kinds as the base path. Carries
    /// the offset path's contribution.
    Invertible(Color),
    /// Reconnected, but the offset path's vertex kinds differ from the base.
    NotSymmetric(Color),
    /// No reconnection. The neighbour is estimated by an independent path.
    NotInvertible,
}

impl ShiftResult {
    /// Weight of a gradient produced by this outcome.
    pub fn weight(&self) -> f32 {
        match self {
            ShiftResult::Invertible(_) => 0.5,
            ShiftResult::NotSymmetric(_) | ShiftResult::NotInvertible => 1.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GradientDomainPathTracer {
    config: IntegratorConfig,
    tracer: PathTracer,
}

impl GradientDomainPathTracer {
    pub fn new(config: IntegratorConfig) -> Self {
        Self {
            config,
            tracer: PathTracer::new(config),
        }
    }

    /// Camera vertex followed by the forward-traced vertices, ending on a light if one was hit.
    pub fn base_path<'a>(&self, scene: &'a Scene, ray: &Ray, rng: &mut dyn RngCore) -> Vec<PathVertex<'a>> {
        let mut path = Vec::with_capacity(self.config.max_bounces as usize + 1);
        path.push(PathVertex::camera(ray));
        random_walk(scene, *ray, Color::ONE, 1.0, true, &self.config, &mut path, rng);
        path
    }

    /// Map `base` onto a path starting with `offset_ray`.
    pub fn shift(&self, scene: &Scene, base: &[PathVertex], offset_ray: &Ray) -> ShiftResult {
        let mut ray = *offset_ray;
        let mut throughput = Color::ONE;
        let mut symmetric = true;

        for i in 1..base.len() {
            let b = &base[i];
            if b.is_light() || b.kind == VertexKind::Specular {
                return ShiftResult::NotInvertible;
            }
            let Some(next) = base.get(i + 1) else {
                return ShiftResult::NotInvertible;
            };
            let Some(hit) = scene.trace(&ray) else {
                return ShiftResult::NotInvertible;
            };
            if hit.material.is_light() {
                return ShiftResult::NotInvertible;
            }
            if !hit.material.supports(b.lobe) {
                symmetric = false;
            }

            let mut offset = PathVertex::surface(&hit, ray.direction, throughput);
            offset.density = b.density;
            offset.lobe = b.lobe;
            offset.delta = b.delta;
            offset.rr_weight = b.rr_weight;

            if b.kind == VertexKind::Diffuse && matches!(next.kind, VertexKind::Diffuse | VertexKind::Light) {
                let Some(value) = self.reconnect(scene, base, i, &offset, throughput) else {
                    return ShiftResult::NotInvertible;
                };
                return if symmetric {
                    ShiftResult::Invertible(value)
                } else {
                    ShiftResult::NotSymmetric(value)
                };
            }

            let half = (b.outgoing - b.incoming).normalize_or_zero();
            if half == Vec3::ZERO {
                return ShiftResult::NotInvertible;
            }
            let outgoing = reflect(ray.direction, half);
            throughput *= offset.transfer(ray.direction, outgoing);
            ray = Ray::offset(hit.position, outgoing, RAY_EPSILON);
        }

        ShiftResult::NotInvertible
    }

    /// Join the offset vertex to `base[i + 1]` and reuse the rest of the base path.
    fn reconnect(&self, scene: &Scene, base: &[PathVertex], i: usize, offset: &PathVertex, throughput: Color) -> Option<Color> {
        let b = &base[i];
        let next = base.get(i + 1)?;

        let to_next = next.position - offset.position;
        let offset_dist2 = to_next.length_squared();
        let base_dist2 = (next.position - b.position).length_squared();
        if offset_dist2 <= 0.0 || base_dist2 <= 0.0 {
            return None;
        }
        let direction = to_next / offset_dist2.sqrt();

        let cos_offset = next.normal.dot(direction).abs();
        let cos_base = next.normal.dot(b.outgoing).abs();
        if cos_base <= 1e-6 {
            return None;
        }
        if !scene.visible(offset.position, next.position) {
            return None;
        }
        let jacobian = (cos_offset * base_dist2) / (cos_base * offset_dist2);

        let mut value = throughput * offset.transfer(offset.incoming, direction) * jacobian;
        if next.is_light() {
            return Some(value * next.emission());
        }

        value *= next.transfer(direction, next.outgoing);
        for v in &base[i + 2..] {
            if v.is_light() {
                return Some(value * v.emission());
            }
            value *= v.transfer(v.incoming, v.outgoing);
        }
        // The base path never reached a light.
        Some(Color::ZERO)
    }
}

/// Contribution of a forward-traced path, recomputed from its vertices.
pub fn path_value(path: &[PathVertex]) -> Color {
    let Some(last) = path.last() else {
        return Color::ZERO;
    };
    if !last.is_light() {
        return Color::ZERO;
    }
    path[1..path.len() - 1]
        .iter()
        .fold(last.emission(), |value, v| value * v.transfer(v.incoming, v.outgoing))
}

impl Integrator for GradientDomainPathTracer {
    fn name(&self) -> &'static str {
        "gdpt"
    }

    fn radiance(&self, scene: &Scene, ray: &Ray, rng: &mut dyn RngCore) -> Color {
        path_value(&self.base_path(scene, ray, rng))
    }

    fn sample(&self, scene: &Scene, x: u32, y: u32, width: u32, height: u32, rng: &mut dyn RngCore) -> PixelSample {
        // One jitter for the base and all offset rays.
        let fx = x as f32 + gen_f32(rng);
        let fy = y as f32 + gen_f32(rng);
        let camera = scene.camera();

        let (base_ray, base_weight) = camera.generate_ray(fx, fy, width, height, rng);
        let base = self.base_path(scene, &base_ray, rng);
        let base_value = path_value(&base) * base_weight;

        let mut gradients = [GradientSample {
            value: Color::ZERO,
            weight: 0.0,
        }; 4];
        for (gradient, (dx, dy)) in gradients.iter_mut().zip(GRADIENT_OFFSETS) {
            let (offset_ray, offset_weight) = camera.generate_ray(fx + dx as f32, fy + dy as f32, width, height, rng);
            let shift = self.shift(scene, &base, &offset_ray);
            let offset_value = match shift {
                ShiftResult::Invertible(value) | ShiftResult::NotSymmetric(value) => value,
                ShiftResult::NotInvertible => self.tracer.radiance(scene, &offset_ray, rng),
            } * offset_weight;

            *gradient = GradientSample {
                value: offset_value - base_value,
                weight: shift.weight(),
            };
        }

        PixelSample {
            radiance: base_value,
            gradients: Some(gradients),
        }
    }

    fn produces_gradients(&self) -> bool {
        true
    }
}
