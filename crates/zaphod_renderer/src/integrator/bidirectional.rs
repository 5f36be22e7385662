//! Bidirectional path tracing with balance-heuristic MIS.
//!
//! Each sample builds an eye subpath (camera vertex first) and a light
//! subpath (light vertex first) and evaluates every connection strategy
//! `(s, t)` that has at least one eye surface vertex: `s` light vertices
//! joined to `t` eye vertices. Strategies that would splat onto other
//! pixels (`t = 1`) are not sampled and take no part in the weights.
//!
//! Densities on the vertices are area densities in true units, which is
//! what the balance heuristic ratios need.

use rand::RngCore;
use std::f32::consts::PI;
use zaphod_math::{Ray, Vec2, Vec3};

use super::path_vertex::{geometry_term, random_walk, PathVertex, VertexKind};
use super::{Integrator, IntegratorConfig, RAY_EPSILON};
use crate::material::{Color, InteractionKind};
use crate::sampling::{cosine_hemisphere, gen_f32};
use crate::scene::Scene;

#[derive(Debug, Clone, Default)]
pub struct BidirectionalPathTracer {
    config: IntegratorConfig,
}

impl BidirectionalPathTracer {
    pub fn new(config: IntegratorConfig) -> Self {
        Self { config }
    }

    /// Camera vertex followed by the vertices found from `ray`.
    pub fn eye_subpath<'a>(&self, scene: &'a Scene, ray: &Ray, rng: &mut dyn RngCore) -> Vec<PathVertex<'a>> {
        let mut path = Vec::with_capacity(self.config.max_bounces as usize + 1);
        path.push(PathVertex::camera(ray));
        random_walk(scene, *ray, Color::ONE, 1.0, true, &self.config, &mut path, rng);
        path
    }

    /// Light vertex followed by the vertices found by the emitted ray.
    /// Empty when the scene has no lights.
    pub fn light_subpath<'a>(&self, scene: &'a Scene, rng: &mut dyn RngCore) -> Vec<PathVertex<'a>> {
        let Some(sample) = scene.sample_light(rng) else {
            return Vec::new();
        };
        let Some(object) = scene.object(sample.object) else {
            return Vec::new();
        };

        let normal = sample.ray.direction;
        let emittance = object.material().color(Vec2::ZERO, InteractionKind::Diffuse);
        let mut origin = PathVertex {
            position: sample.ray.origin,
            normal,
            uv: Vec2::ZERO,
            incoming: Vec3::ZERO,
            outgoing: Vec3::ZERO,
            material: Some(object.material()),
            object: sample.object,
            density: 0.0,
            rr_weight: 1.0,
            kind: VertexKind::Light,
            lobe: InteractionKind::Diffuse,
            delta: false,
            beta: emittance,
            pdf_fwd: sample.area_density,
            pdf_rev: 0.0,
        };

        // Cosine-weighted emission on a uniformly chosen side.
        let side = if gen_f32(rng) < 0.5 { normal } else { -normal };
        let direction = cosine_hemisphere(side, rng);
        let cos = direction.dot(normal).abs();
        let pdf_dir = cos / (2.0 * PI);
        origin.outgoing = direction;
        origin.density = pdf_dir * PI;

        let mut path = Vec::with_capacity(self.config.max_bounces as usize + 1);
        path.push(origin);
        if pdf_dir <= 0.0 || sample.area_density <= 0.0 {
            return path;
        }

        let beta = emittance * (cos / (sample.area_density * pdf_dir));
        let ray = Ray::offset(sample.ray.origin, direction, RAY_EPSILON);
        random_walk(scene, ray, beta, pdf_dir, false, &self.config, &mut path, rng);
        path
    }

    /// Unweighted contribution of joining the first `t` eye vertices with
    /// the first `s` light vertices. Exactly zero when the connecting
    /// segment is occluded.
    pub fn eval_connection(&self, scene: &Scene, eye: &[PathVertex], t: usize, light: &[PathVertex], s: usize) -> Color {
        if t < 2 || t > eye.len() || s > light.len() {
            return Color::ZERO;
        }
        let pt = &eye[t - 1];

        if s == 0 {
            return if pt.is_light() { pt.beta * pt.emission() } else { Color::ZERO };
        }
        if !pt.is_connectible() {
            return Color::ZERO;
        }

        let qs = &light[s - 1];
        let to_light = (qs.position - pt.position).normalize_or_zero();
        if to_light == Vec3::ZERO {
            return Color::ZERO;
        }

        let light_term = if s == 1 {
            if !qs.is_light() || qs.pdf_fwd <= 0.0 {
                return Color::ZERO;
            }
            qs.emission() / qs.pdf_fwd
        } else {
            if !qs.is_connectible() {
                return Color::ZERO;
            }
            qs.beta * qs.brdf(qs.incoming, -to_light)
        };

        let contribution = pt.beta * pt.brdf(pt.incoming, to_light) * geometry_term(pt, qs) * light_term;
        if contribution.max_element() <= 0.0 {
            return Color::ZERO;
        }
        if !scene.visible(pt.position, qs.position) {
            return Color::ZERO;
        }
        contribution
    }

    /// Balance-heuristic weight of strategy `(s, t)` among all sampled strategies.
    pub fn mis_weight(&self, scene: &Scene, eye: &[PathVertex], t: usize, light: &[PathVertex], s: usize) -> f32 {
        if s + t == 2 {
            return 1.0;
        }

        let mut eye: Vec<PathVertex> = eye[..t].to_vec();
        let mut light: Vec<PathVertex> = light[..s].to_vec();

        // Reverse densities at the connection change with the strategy.
        let pt = eye[t - 1];
        if s > 0 {
            let qs = light[s - 1];
            let to_pt = (pt.position - qs.position).normalize_or_zero();

            eye[t - 1].pdf_rev = qs.to_area(qs.direction_pdf(qs.incoming, to_pt), &pt);
            let pt_minus = eye[t - 2];
            eye[t - 2].pdf_rev = pt.to_area(pt.direction_pdf(to_pt, -pt.incoming), &pt_minus);

            light[s - 1].pdf_rev = pt.to_area(pt.direction_pdf(pt.incoming, -to_pt), &qs);
            if s > 1 {
                let qs_minus = light[s - 2];
                light[s - 2].pdf_rev = qs.to_area(qs.direction_pdf(-to_pt, -qs.incoming), &qs_minus);
            }
        } else {
            eye[t - 1].pdf_rev = scene.lights().area_density(pt.object);
            let pt_minus = eye[t - 2];
            let to_prev = (pt_minus.position - pt.position).normalize_or_zero();
            eye[t - 2].pdf_rev = pt.to_area(pt.direction_pdf(Vec3::ZERO, to_prev), &pt_minus);
        }

        let remap = |pdf: f32| if pdf != 0.0 { pdf } else { 1.0 };
        let mut sum = 0.0;

        // Move eye vertices to the light side, down to one eye surface vertex.
        let mut ratio = 1.0;
        for i in (2..t).rev() {
            ratio *= remap(eye[i].pdf_rev) / remap(eye[i].pdf_fwd);
            if !eye[i].delta && !eye[i - 1].delta {
                sum += ratio;
            }
        }

        // Move light vertices to the eye side.
        let mut ratio = 1.0;
        for i in (0..s).rev() {
            ratio *= remap(light[i].pdf_rev) / remap(light[i].pdf_fwd);
            let delta_before = i > 0 && light[i - 1].delta;
            if !light[i].delta && !delta_before {
                sum += ratio;
            }
        }

        1.0 / (1.0 + sum)
    }
}

impl Integrator for BidirectionalPathTracer {
    fn name(&self) -> &'static str {
        "bdpt"
    }

    fn radiance(&self, scene: &Scene, ray: &Ray, rng: &mut dyn RngCore) -> Color {
        let eye = self.eye_subpath(scene, ray, rng);
        let light = self.light_subpath(scene, rng);
        let max_depth = self.config.max_bounces as usize;

        let mut total = Color::ZERO;
        for t in 2..=eye.len() {
            for s in 0..=light.len() {
                if s + t - 2 > max_depth {
                    break;
                }
                let contribution = self.eval_connection(scene, &eye, t, &light, s);
                if contribution == Color::ZERO {
                    continue;
                }
                total += contribution * self.mis_weight(scene, &eye, t, &light, s);
            }
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::PinholeCamera;
    use crate::material::{Diffuse, Emission};
    use crate::object::SceneObject;
    use crate::shape::Shape;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use zaphod_core::Transform;

    fn floor_and_lamp(blocker: bool) -> Scene {
        let mut objects = vec![
            SceneObject::new("floor", Shape::cuboid(Vec3::new(50.0, 0.5, 50.0)), Diffuse::new(Color::splat(0.5)))
                .with_transform(Transform::from_translation(Vec3::new(0.0, -0.5, 0.0))),
            SceneObject::new("lamp", Shape::sphere(1.0), Emission::new(Color::ONE))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 3.0, 0.0))),
        ];
        if blocker {
            objects.push(
                SceneObject::new("blocker", Shape::cuboid(Vec3::new(1.0, 0.1, 1.0)), Diffuse::new(Color::ONE))
                    .with_transform(Transform::from_translation(Vec3::new(0.0, 1.0, 0.0))),
            );
        }
        Scene::new(objects, Arc::new(PinholeCamera::new()), None).unwrap()
    }

    fn floor_ray() -> Ray {
        Ray::new(Vec3::new(3.0, 1.0, 0.0), Vec3::new(-3.0, -1.0, 0.0))
    }

    /// Eye path ending at the floor point and a light path holding the
    /// bottom of the lamp.
    fn connection<'a>(scene: &'a Scene) -> (Vec<PathVertex<'a>>, Vec<PathVertex<'a>>) {
        let ray = floor_ray();
        let hit = scene.trace(&ray).unwrap();
        assert_eq!(hit.object, 0);
        let eye = vec![PathVertex::camera(&ray), PathVertex::surface(&hit, ray.direction, Color::ONE)];

        let up = Ray::new(Vec3::new(0.0, 1.5, 0.0), Vec3::Y);
        let lamp = scene.trace(&up).unwrap();
        assert_eq!(lamp.object, 1);
        let mut y0 = PathVertex::surface(&lamp, up.direction, Color::ONE);
        y0.pdf_fwd = scene.lights().area_density(1);
        (eye, vec![y0])
    }

    #[test]
    fn test_occluded_connection_is_zero() {
        let tracer = BidirectionalPathTracer::default();

        let open = floor_and_lamp(false);
        let (eye, light) = connection(&open);
        let unblocked = tracer.eval_connection(&open, &eye, 2, &light, 1);
        assert!(unblocked.min_element() > 0.0);

        let blocked_scene = floor_and_lamp(true);
        let (eye, light) = connection(&blocked_scene);
        // The BRDF product and geometry are the same; only visibility differs.
        let pt = &eye[1];
        let to_light = (light[0].position - pt.position).normalize();
        assert!(pt.brdf(pt.incoming, to_light).min_element() > 0.0);
        assert_eq!(tracer.eval_connection(&blocked_scene, &eye, 2, &light, 1), Color::ZERO);
    }

    #[test]
    fn test_direct_light_hit_is_exact() {
        let scene = floor_and_lamp(false);
        let tracer = BidirectionalPathTracer::default();
        let mut rng = StdRng::seed_from_u64(42);
        let ray = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y);
        for _ in 0..10 {
            assert_eq!(tracer.radiance(&scene, &ray, &mut rng), Color::ONE);
        }
    }

    #[test]
    fn test_light_subpath_starts_on_light() {
        let scene = floor_and_lamp(false);
        let tracer = BidirectionalPathTracer::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let path = tracer.light_subpath(&scene, &mut rng);
            let y0 = &path[0];
            assert!(y0.is_light());
            assert!(((y0.position - Vec3::new(0.0, 3.0, 0.0)).length() - 1.0).abs() < 1e-3);
            assert!((y0.pdf_fwd - 1.0 / (4.0 * PI)).abs() < 1e-5);
            assert!(path[1..].iter().all(|v| !v.is_light()));
        }
    }

    #[test]
    fn test_mis_weights_of_two_strategies_sum_to_one() {
        // A floor point lit by the lamp is reachable by exactly two sampled
        // strategies: (s=0, t=3) and (s=1, t=2).
        let scene = floor_and_lamp(false);
        let tracer = BidirectionalPathTracer::default();
        let ray = floor_ray();
        let floor_hit = scene.trace(&ray).unwrap();

        let mut x1 = PathVertex::surface(&floor_hit, ray.direction, Color::ONE);
        let camera = PathVertex::camera(&ray);
        x1.pdf_fwd = 1.0;

        let lamp_point = Vec3::new(0.3, 3.0 - (1.0f32 - 0.09).sqrt(), 0.0);
        let to_lamp = (lamp_point - x1.position).normalize();
        let lamp_hit = scene.trace(&Ray::offset(x1.position, to_lamp, RAY_EPSILON)).unwrap();
        assert_eq!(lamp_hit.object, 1);

        // Unidirectional: the eye path scatters at x1 and hits the lamp.
        let mut eye_x1 = x1;
        eye_x1.outgoing = to_lamp;
        eye_x1.density = x1.material.unwrap().density(ray.direction, to_lamp, x1.normal, x1.uv);
        let mut x2 = PathVertex::surface(&lamp_hit, to_lamp, Color::ONE);
        x2.pdf_fwd = eye_x1.to_area(eye_x1.density / PI, &x2);
        let eye = vec![camera, eye_x1, x2];
        let w_unidirectional = tracer.mis_weight(&scene, &eye, 3, &[], 0);

        // Light sampling: the same lamp point is y0.
        let mut y0 = x2;
        y0.pdf_fwd = scene.lights().area_density(1);
        let eye = vec![camera, x1];
        let w_light = tracer.mis_weight(&scene, &eye, 2, &[y0], 1);

        assert!(w_unidirectional > 0.0 && w_light > 0.0);
        assert!((w_unidirectional + w_light - 1.0).abs() < 1e-4, "{} + {}", w_unidirectional, w_light);
    }

    #[test]
    fn test_floor_under_sphere_light() {
        let scene = floor_and_lamp(false);
        let tracer = BidirectionalPathTracer::default();
        let mut rng = StdRng::seed_from_u64(42);
        let ray = floor_ray();

        let n = 20_000;
        let mean = (0..n).map(|_| tracer.radiance(&scene, &ray, &mut rng).x).sum::<f32>() / n as f32;
        let expected = 0.5 / 9.0;
        assert!((mean - expected).abs() < 0.05 * expected, "mean {} expected {}", mean, expected);
    }
}
