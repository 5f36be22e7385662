//! Scene objects: a shape, an owned material and a transform.

use rand::distributions::{Distribution, WeightedIndex};
use rand::RngCore;
use std::f32::consts::PI;
use zaphod_core::{AnimatedTransform, Transform};
use zaphod_math::{Mat4, Mat4Ext, Ray, Vec2, Vec3};

use crate::material::Material;
use crate::sampling::{gen_f32, uniform_sphere, uniform_triangle};
use crate::shape::Shape;

/// A world-space hit on one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectHit {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub distance: f32,
}

/// A point drawn uniformly (by world-space area) on an object's surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfacePoint {
    pub position: Vec3,
    /// Outward unit normal.
    pub normal: Vec3,
}

/// Area distribution used to sample points on the surface.
#[derive(Debug, Clone)]
enum SurfaceDistribution {
    Empty,
    Sphere,
    /// Over the six box faces (-x, +x, -y, +y, -z, +z) or over mesh triangles.
    Weighted(WeightedIndex<f32>),
}

pub struct SceneObject {
    name: String,
    shape: Shape,
    material: Box<dyn Material>,
    transform: Transform,
    parent: Option<usize>,
    animation: Option<AnimatedTransform>,

    // Resolved by the scene before each pass.
    world: Mat4,
    inverse: Mat4,
    weight: f32,
    distribution: SurfaceDistribution,
}

impl std::fmt::Debug for SceneObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneObject")
            .field("name", &self.name)
            .field("material", &self.material)
            .field("parent", &self.parent)
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

impl SceneObject {
    pub fn new(name: impl Into<String>, shape: Shape, material: impl Material + 'static) -> Self {
        Self::with_boxed_material(name, shape, Box::new(material))
    }

    pub fn with_boxed_material(name: impl Into<String>, shape: Shape, material: Box<dyn Material>) -> Self {
        let mut object = Self {
            name: name.into(),
            shape,
            material,
            transform: Transform::default(),
            parent: None,
            animation: None,
            world: Mat4::IDENTITY,
            inverse: Mat4::IDENTITY,
            weight: 0.0,
            distribution: SurfaceDistribution::Empty,
        };
        object.set_world(Mat4::IDENTITY);
        object
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Attach to a parent object (by index in the scene's object list).
    pub fn with_parent(mut self, parent: usize) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_animation(mut self, animation: AnimatedTransform) -> Self {
        self.animation = Some(animation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub(crate) fn shape_mut(&mut self) -> &mut Shape {
        &mut self.shape
    }

    pub fn material(&self) -> &dyn Material {
        self.material.as_ref()
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Local transform at `time`: the animation if there is one, the
    /// static transform otherwise.
    pub fn local_transform_at(&self, time: f32) -> Transform {
        match &self.animation {
            Some(animation) => animation.evaluate(time, &self.transform),
            None => self.transform,
        }
    }

    pub fn world(&self) -> Mat4 {
        self.world
    }

    /// Sampling weight: the world-space surface area.
    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub fn is_light(&self) -> bool {
        self.material.is_light()
    }

    /// Install a new local-to-world matrix and refresh everything derived
    /// from it (inverse, area weight, surface distribution).
    pub(crate) fn set_world(&mut self, world: Mat4) {
        self.world = world;
        self.inverse = world.inverse();

        let (weight, distribution) = match &self.shape {
            Shape::Sphere { radius } => {
                // Exact for uniform scale.
                let scale = world.determinant().abs().cbrt();
                let r = radius * scale;
                (4.0 * PI * r * r, SurfaceDistribution::Sphere)
            }
            Shape::Cuboid { half_extents } => {
                let areas = cuboid_face_areas(&world, *half_extents);
                (areas.iter().sum(), weighted(areas))
            }
            Shape::Mesh(shape) => {
                let mesh = shape.mesh();
                let areas: Vec<f32> = (0..mesh.triangle_count())
                    .map(|i| {
                        let [a, b, c] = mesh.triangle(i).map(|p| world.transform_point3(p));
                        0.5 * (b - a).cross(c - a).length()
                    })
                    .collect();
                (areas.iter().sum(), weighted(areas))
            }
        };

        self.weight = weight;
        self.distribution = distribution;
    }

    /// World-space intersection.
    pub fn intersect(&self, ray: &Ray) -> Option<ObjectHit> {
        let local_ray = ray.transformed(&self.inverse);
        let hit = self.shape.intersect(&local_ray)?;

        let position = self.world.transform_point3(hit.position);
        Some(ObjectHit {
            position,
            normal: self.world.transform_normal(hit.normal),
            uv: hit.uv,
            distance: (position - ray.origin).length(),
        })
    }

    /// Uniform point on the surface by world-space area. `None` for
    /// zero-area objects.
    pub fn sample(&self, rng: &mut dyn RngCore) -> Option<SurfacePoint> {
        let (local_position, local_normal) = match (&self.distribution, &self.shape) {
            (SurfaceDistribution::Sphere, Shape::Sphere { radius }) => {
                let n = uniform_sphere(rng);
                (n * *radius, n)
            }
            (SurfaceDistribution::Weighted(faces), Shape::Cuboid { half_extents }) => {
                let face = faces.sample(rng);
                let axis = face / 2;
                let sign = if face % 2 == 0 { -1.0 } else { 1.0 };
                let mut p = Vec3::new(
                    gen_f32(rng) * 2.0 - 1.0,
                    gen_f32(rng) * 2.0 - 1.0,
                    gen_f32(rng) * 2.0 - 1.0,
                ) * *half_extents;
                p[axis] = sign * half_extents[axis];
                let mut n = Vec3::ZERO;
                n[axis] = sign;
                (p, n)
            }
            (SurfaceDistribution::Weighted(triangles), Shape::Mesh(shape)) => {
                let index = triangles.sample(rng);
                let [a, b, c] = shape.mesh().triangle(index);
                let (u, v) = uniform_triangle(rng);
                let p = a * (1.0 - u - v) + b * u + c * v;
                (p, shape.mesh().face_normal(index))
            }
            _ => return None,
        };

        Some(SurfacePoint {
            position: self.world.transform_point3(local_position),
            normal: self.world.transform_normal(local_normal),
        })
    }
}

fn weighted(areas: Vec<f32>) -> SurfaceDistribution {
    WeightedIndex::new(areas)
        .map(SurfaceDistribution::Weighted)
        .unwrap_or(SurfaceDistribution::Empty)
}

/// World-space areas of the six box faces, ordered -x, +x, -y, +y, -z, +z.
fn cuboid_face_areas(world: &Mat4, half: Vec3) -> Vec<f32> {
    let axes = [
        world.transform_vector3(Vec3::X),
        world.transform_vector3(Vec3::Y),
        world.transform_vector3(Vec3::Z),
    ];
    (0..6)
        .map(|face| {
            let axis = face / 2;
            let (a, b) = ((axis + 1) % 3, (axis + 2) % 3);
            4.0 * half[a] * half[b] * axes[a].cross(axes[b]).length()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::{Diffuse, Emission};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;
    use zaphod_core::TriangleMesh;
    use zaphod_math::Quat;

    #[test]
    fn test_sphere_weight_is_area() {
        let mut object = SceneObject::new("light", Shape::sphere(1.0), Emission::new(Vec3::ONE));
        assert!((object.weight() - 4.0 * PI).abs() < 1e-4);

        object.set_world(Mat4::from_scale(Vec3::splat(2.0)));
        assert!((object.weight() - 16.0 * PI).abs() < 1e-3);
    }

    #[test]
    fn test_cuboid_weight_and_samples() {
        let mut object = SceneObject::new("box", Shape::cuboid(Vec3::new(1.0, 0.5, 0.25)), Diffuse::new(Vec3::ONE));
        object.set_world(Mat4::from_rotation_translation(
            Quat::from_rotation_y(0.7),
            Vec3::new(3.0, 0.0, 0.0),
        ));
        // 2 * (2*1 + 2*0.5 + 1*0.5) = 2 * 3.5
        assert!((object.weight() - 7.0).abs() < 1e-4);

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let p = object.sample(&mut rng).unwrap();
            let local = object.inverse.transform_point3(p.position);
            let on_face = (local.x.abs() - 1.0).abs() < 1e-4
                || (local.y.abs() - 0.5).abs() < 1e-4
                || (local.z.abs() - 0.25).abs() < 1e-4;
            assert!(on_face, "{:?} not on a face", local);
            assert!((p.normal.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_mesh_weight_and_sample() {
        let mesh = TriangleMesh::new(
            vec![Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y],
            vec![0, 1, 2, 0, 2, 3],
        )
        .unwrap();
        let mut object = SceneObject::new("quad", Shape::mesh(Arc::new(mesh)), Emission::new(Vec3::ONE));
        object.set_world(Mat4::from_scale(Vec3::new(2.0, 3.0, 1.0)));
        assert!((object.weight() - 6.0).abs() < 1e-4);

        let mut rng = StdRng::seed_from_u64(1);
        let p = object.sample(&mut rng).unwrap();
        assert!(p.position.z.abs() < 1e-5);
        assert!(p.position.x >= 0.0 && p.position.x <= 2.0);
        assert!((p.normal - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_world_intersection_distance() {
        let mut object = SceneObject::new("ball", Shape::sphere(1.0), Diffuse::new(Vec3::ONE));
        object.set_world(Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::IDENTITY,
            Vec3::new(0.0, 0.0, -10.0),
        ));

        let hit = object.intersect(&Ray::new(Vec3::ZERO, -Vec3::Z)).unwrap();
        // Radius 2 after scaling, centered at z = -10.
        assert!((hit.distance - 8.0).abs() < 1e-4);
        assert!((hit.position - Vec3::new(0.0, 0.0, -8.0)).length() < 1e-4);
        assert!((hit.normal - Vec3::Z).length() < 1e-4);
    }

    #[test]
    fn test_sphere_samples_lie_on_surface() {
        let object = SceneObject::new("light", Shape::sphere(1.5), Emission::new(Vec3::ONE));
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let p = object.sample(&mut rng).unwrap();
            assert!((p.position.length() - 1.5).abs() < 1e-4);
            assert!((p.normal - p.position / 1.5).length() < 1e-4);
        }
    }
}
