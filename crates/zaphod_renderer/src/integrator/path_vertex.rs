//! Path vertices shared by the bidirectional and gradient-domain tracers.

use rand::RngCore;
use std::f32::consts::PI;
use zaphod_math::{Ray, Vec2, Vec3};

use super::{IntegratorConfig, RAY_EPSILON};
use crate::material::{scatter_weight, BrdfSample, Color, InteractionKind, Material};
use crate::scene::{Intersection, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexKind {
    Camera,
    Diffuse,
    Specular,
    Light,
}

#[derive(Debug, Clone, Copy)]
pub struct PathVertex<'a> {
    pub position: Vec3,
    /// Outward surface normal (the view axis for the camera vertex).
    pub normal: Vec3,
    pub uv: Vec2,
    /// Direction travelled to arrive here.
    pub incoming: Vec3,
    /// Direction sampled to leave; zero on the last vertex.
    pub outgoing: Vec3,
    pub material: Option<&'a dyn Material>,
    pub object: usize,
    /// π-scaled density of `outgoing` (lobe probability for delta samples).
    pub density: f32,
    /// Russian-roulette compensation applied after this vertex.
    pub rr_weight: f32,
    pub kind: VertexKind,
    /// Lobe that produced `outgoing`.
    pub lobe: InteractionKind,
    /// `outgoing` came from an ideal (delta) lobe.
    pub delta: bool,
    /// Path throughput arriving at this vertex.
    pub beta: Color,
    /// Area density of this vertex when sampled from its predecessor.
    pub pdf_fwd: f32,
    /// Area density of this vertex when sampled from its successor.
    pub pdf_rev: f32,
}

impl<'a> PathVertex<'a> {
    pub fn camera(ray: &Ray) -> Self {
        Self {
            position: ray.origin,
            normal: ray.direction,
            uv: Vec2::ZERO,
            incoming: Vec3::ZERO,
            outgoing: ray.direction,
            material: None,
            object: usize::MAX,
            density: 1.0,
            rr_weight: 1.0,
            kind: VertexKind::Camera,
            lobe: InteractionKind::Diffuse,
            delta: false,
            beta: Color::ONE,
            pdf_fwd: 1.0,
            pdf_rev: 0.0,
        }
    }

    /// Vertex at a surface hit, before its outgoing direction is sampled.
    pub fn surface(hit: &Intersection<'a>, incoming: Vec3, beta: Color) -> Self {
        let kind = if hit.material.is_light() {
            VertexKind::Light
        } else {
            VertexKind::Diffuse
        };
        Self {
            position: hit.position,
            normal: hit.normal,
            uv: hit.uv,
            incoming,
            outgoing: Vec3::ZERO,
            material: Some(hit.material),
            object: hit.object,
            density: 0.0,
            rr_weight: 1.0,
            kind,
            lobe: InteractionKind::Diffuse,
            delta: false,
            beta,
            pdf_fwd: 0.0,
            pdf_rev: 0.0,
        }
    }

    pub fn is_light(&self) -> bool {
        self.kind == VertexKind::Light
    }

    /// Whether an explicit connection can be made through this vertex.
    pub fn is_connectible(&self) -> bool {
        !self.delta && matches!(self.kind, VertexKind::Diffuse | VertexKind::Specular)
    }

    /// Rebuild the hit record this vertex came from.
    pub fn intersection(&self) -> Option<Intersection<'a>> {
        Some(Intersection {
            position: self.position,
            normal: self.normal,
            uv: self.uv,
            distance: 0.0,
            material: self.material?,
            object: self.object,
        })
    }

    /// Emitted radiance, seen from either side.
    pub fn emission(&self) -> Color {
        match self.material {
            Some(material) if material.is_light() => material.color(self.uv, InteractionKind::Diffuse),
            _ => Color::ZERO,
        }
    }

    /// Throughput factor of leaving this vertex along `outgoing` after
    /// arriving along `incoming`, judged with this vertex's own sampling
    /// density and Russian-roulette decision.
    pub fn transfer(&self, incoming: Vec3, outgoing: Vec3) -> Color {
        let Some(material) = self.material else {
            return Color::ZERO;
        };
        let sample = BrdfSample {
            direction: outgoing,
            density: self.density,
            kind: self.lobe,
            delta: self.delta,
        };
        scatter_weight(material, incoming, self.normal, self.uv, &sample) * self.rr_weight
    }

    /// True-units BRDF value (1/sr) toward `outgoing`.
    pub fn brdf(&self, incoming: Vec3, outgoing: Vec3) -> Color {
        match self.material {
            Some(material) => material.eval(incoming, outgoing, self.normal, self.uv) / PI,
            None => Color::ZERO,
        }
    }

    /// Solid-angle density (true units) of sampling `outgoing` here.
    pub fn direction_pdf(&self, incoming: Vec3, outgoing: Vec3) -> f32 {
        match (self.kind, self.material) {
            // Emission leaves cosine-weighted on a uniformly chosen side.
            (VertexKind::Light, _) => outgoing.dot(self.normal).abs() / (2.0 * PI),
            (_, Some(material)) => material.density(incoming, outgoing, self.normal, self.uv) / PI,
            _ => 0.0,
        }
    }

    /// Convert a solid-angle density at this vertex into an area density at `next`.
    pub fn to_area(&self, pdf_dir: f32, next: &PathVertex) -> f32 {
        let w = next.position - self.position;
        let dist2 = w.length_squared();
        if dist2 == 0.0 {
            return 0.0;
        }
        let cos = if next.kind == VertexKind::Camera {
            1.0
        } else {
            next.normal.dot(w / dist2.sqrt()).abs()
        };
        pdf_dir * cos / dist2
    }
}

/// Geometric term between two vertices (cosines at both ends over squared distance).
pub fn geometry_term(a: &PathVertex, b: &PathVertex) -> f32 {
    let w = b.position - a.position;
    let dist2 = w.length_squared();
    if dist2 == 0.0 {
        return 0.0;
    }
    let w = w / dist2.sqrt();
    a.normal.dot(w).abs() * b.normal.dot(w).abs() / dist2
}

/// Extend `path` by sampling bounces from `ray`.
///
/// `beta` is the throughput carried by the ray and `pdf_dir` the true
/// solid-angle density with which its direction was chosen at the last
/// vertex of `path`. Lights end the walk: on an eye path the light vertex
/// is kept, on a light path it is dropped.
pub fn random_walk<'a>(
    scene: &'a Scene,
    mut ray: Ray,
    mut beta: Color,
    mut pdf_dir: f32,
    keep_lights: bool,
    config: &IntegratorConfig,
    path: &mut Vec<PathVertex<'a>>,
    rng: &mut dyn RngCore,
) {
    let mut bounces = 0;
    while bounces < config.max_bounces {
        let Some(hit) = scene.trace(&ray) else {
            break;
        };
        let Some(prev) = path.last() else {
            break;
        };

        let mut vertex = PathVertex::surface(&hit, ray.direction, beta);
        vertex.pdf_fwd = prev.to_area(pdf_dir, &vertex);

        if vertex.is_light() {
            if keep_lights {
                path.push(vertex);
            }
            break;
        }

        let Some(sample) = hit.material.sample(&hit, ray.direction, rng) else {
            path.push(vertex);
            break;
        };

        let weight = scatter_weight(hit.material, ray.direction, hit.normal, hit.uv, &sample);
        vertex.outgoing = sample.direction;
        vertex.density = sample.density;
        vertex.lobe = sample.kind;
        vertex.delta = sample.delta;
        if sample.kind != InteractionKind::Diffuse {
            vertex.kind = VertexKind::Specular;
        }

        // Delta lobes have no density the other strategies could match.
        let pdf_rev = if sample.delta {
            pdf_dir = 0.0;
            0.0
        } else {
            pdf_dir = sample.density / PI;
            hit.material.density(-sample.direction, -ray.direction, hit.normal, hit.uv) / PI
        };
        let index = path.len();
        path.push(vertex);
        let rev = path[index].to_area(pdf_rev, &path[index - 1]);
        path[index - 1].pdf_rev = rev;

        beta *= weight;
        bounces += 1;

        match config.roulette(bounces, rng) {
            Some(compensation) => {
                path[index].rr_weight = compensation;
                beta *= compensation;
            }
            None => break,
        }
        if config.negligible(beta) {
            break;
        }

        ray = Ray::offset(hit.position, sample.direction, RAY_EPSILON);
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

    fn scene() -> Scene {
        let objects = vec![
            SceneObject::new("floor", Shape::cuboid(Vec3::new(50.0, 0.5, 50.0)), Diffuse::new(Color::splat(0.5)))
                .with_transform(Transform::from_translation(Vec3::new(0.0, -0.5, 0.0))),
            SceneObject::new("lamp", Shape::sphere(1.0), Emission::new(Color::ONE))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 3.0, 0.0))),
        ];
        Scene::new(objects, Arc::new(PinholeCamera::new()), None).unwrap()
    }

    #[test]
    fn test_walk_records_densities() {
        let scene = scene();
        let config = IntegratorConfig::default();
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..200 {
            let ray = Ray::new(Vec3::new(3.0, 1.0, 0.0), Vec3::new(-3.0, -1.0, 0.0));
            let mut path = vec![PathVertex::camera(&ray)];
            random_walk(&scene, ray, Color::ONE, 1.0, true, &config, &mut path, &mut rng);

            assert!(path.len() >= 2);
            assert_eq!(path[1].object, 0);
            assert!(path[1].pdf_fwd > 0.0);
            for pair in path.windows(2).skip(1) {
                // Consecutive scattering vertices know each other's densities.
                assert!(pair[1].pdf_fwd > 0.0);
                if pair[1].outgoing != Vec3::ZERO {
                    assert!(pair[0].pdf_rev > 0.0);
                }
            }
            if let Some(last) = path.last() {
                if last.is_light() {
                    assert_eq!(last.emission(), Color::ONE);
                }
            }
        }
    }

    #[test]
    fn test_geometry_term() {
        let scene = scene();
        let ray = Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::NEG_Y);
        let hit = scene.trace(&ray).unwrap();
        let a = PathVertex::surface(&hit, ray.direction, Color::ONE);
        let mut b = a;
        b.position = a.position - Vec3::Y * 2.0;
        b.normal = Vec3::Y;
        assert!((geometry_term(&a, &b) - 0.25).abs() < 1e-5);
    }
}
