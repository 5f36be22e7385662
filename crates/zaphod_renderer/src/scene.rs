//! Scene graph: object list, nearest-hit queries and visibility.

use rayon::prelude::*;
use std::sync::Arc;
use zaphod_core::TransformHierarchy;
use zaphod_math::{Mat4Ext, Ray, Vec2, Vec3};

use crate::backend::{BackendHit, IntersectionBackend};
use crate::camera::Camera;
use crate::error::SceneError;
use crate::light::{LightSample, LightSampler};
use crate::material::Material;
use crate::object::SceneObject;
use crate::octree::Octree;
use crate::shape::Shape;
use rand::RngCore;

/// Offset applied to both ends of a visibility segment.
pub const VISIBILITY_EPSILON: f32 = 1e-3;

/// A surface hit.
#[derive(Debug, Clone, Copy)]
pub struct Intersection<'a> {
    pub position: Vec3,
    /// Outward unit normal (interpolated for meshes with vertex normals).
    pub normal: Vec3,
    pub uv: Vec2,
    /// Distance from the ray origin.
    pub distance: f32,
    pub material: &'a dyn Material,
    /// Index of the hit object in the scene.
    pub object: usize,
}

pub struct Scene {
    objects: Vec<SceneObject>,
    camera: Arc<dyn Camera>,
    hierarchy: TransformHierarchy,
    backend: Option<Box<dyn IntersectionBackend>>,
    /// Objects intersected by the scene itself rather than the backend.
    custom: Vec<usize>,
    lights: LightSampler,
    time: f32,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("objects", &self.objects.len())
            .field("lights", &self.lights.len())
            .field("backend", &self.backend.is_some())
            .field("time", &self.time)
            .finish()
    }
}

impl Scene {
    /// Assemble a scene. Parents must precede their children in `objects`.
    ///
    /// Mesh octrees are built in parallel; world matrices, light weights
    /// and the backend are resolved for time 0.
    pub fn new(
        mut objects: Vec<SceneObject>,
        camera: Arc<dyn Camera>,
        backend: Option<Box<dyn IntersectionBackend>>,
    ) -> Result<Self, SceneError> {
        let mut hierarchy = TransformHierarchy::new();
        for (index, object) in objects.iter().enumerate() {
            hierarchy
                .add(object.local_transform_at(0.0), object.parent())
                .map_err(|source| SceneError::InvalidParent {
                    index,
                    name: object.name().to_string(),
                    source,
                })?;
        }

        objects.par_iter_mut().for_each(|object| {
            if let Shape::Mesh(shape) = object.shape_mut() {
                if shape.octree().is_none() {
                    let octree = Octree::build(Arc::clone(shape.mesh()));
                    shape.set_octree(Arc::new(octree));
                }
            }
        });

        let mut scene = Self {
            objects,
            camera,
            hierarchy,
            backend,
            custom: Vec::new(),
            lights: LightSampler::default(),
            time: 0.0,
        };
        scene.resolve();

        log::info!(
            "Scene built: {} objects, {} lights, {} custom-intersected",
            scene.objects.len(),
            scene.lights.len(),
            scene.custom.len()
        );
        Ok(scene)
    }

    /// Evaluate animations at `time` and refresh everything derived from
    /// object placement.
    pub fn set_time(&mut self, time: f32) -> Result<(), SceneError> {
        for (id, object) in self.objects.iter().enumerate() {
            self.hierarchy.set_local(id, object.local_transform_at(time))?;
        }
        self.time = time;
        self.resolve();
        Ok(())
    }

    fn resolve(&mut self) {
        let changed = self.hierarchy.update();
        for &id in &changed {
            self.objects[id].set_world(self.hierarchy.world(id));
        }
        if changed.is_empty() && !self.objects.is_empty() {
            return;
        }

        self.custom.clear();
        match self.backend.as_mut() {
            Some(backend) => {
                backend.clear();
                for (index, object) in self.objects.iter().enumerate() {
                    let registered = match object.shape() {
                        Shape::Mesh(shape) => backend.register(index, shape.mesh(), &object.world()),
                        _ => false,
                    };
                    if !registered {
                        self.custom.push(index);
                    }
                }
                backend.commit();
            }
            None => self.custom.extend(0..self.objects.len()),
        }

        self.lights = LightSampler::new(&self.objects);
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn object(&self, index: usize) -> Option<&SceneObject> {
        self.objects.get(index)
    }

    pub fn camera(&self) -> &dyn Camera {
        self.camera.as_ref()
    }

    pub fn lights(&self) -> &LightSampler {
        &self.lights
    }

    /// Draw a point on a light. `None` if the scene has no lights.
    pub fn sample_light(&self, rng: &mut dyn RngCore) -> Option<LightSample> {
        self.lights.sample(self, rng)
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Nearest hit along the ray.
    pub fn trace(&self, ray: &Ray) -> Option<Intersection<'_>> {
        let mut best = self
            .backend
            .as_ref()
            .and_then(|backend| backend.intersect(ray))
            .and_then(|hit| self.backend_intersection(ray, hit));

        for &index in &self.custom {
            let object = &self.objects[index];
            if let Some(hit) = object.intersect(ray) {
                if best.map_or(true, |b| hit.distance < b.distance) {
                    best = Some(Intersection {
                        position: hit.position,
                        normal: hit.normal,
                        uv: hit.uv,
                        distance: hit.distance,
                        material: object.material(),
                        object: index,
                    });
                }
            }
        }

        best
    }

    fn backend_intersection(&self, ray: &Ray, hit: BackendHit) -> Option<Intersection<'_>> {
        let object = self.objects.get(hit.object)?;
        let Shape::Mesh(shape) = object.shape() else {
            return None;
        };
        let mesh = shape.mesh();
        let local_normal = mesh.shading_normal(hit.triangle, hit.u, hit.v);
        Some(Intersection {
            position: ray.at(hit.t),
            normal: object.world().transform_normal(local_normal),
            uv: mesh.texture_coordinate(hit.triangle, hit.u, hit.v),
            distance: hit.t,
            material: object.material(),
            object: hit.object,
        })
    }

    /// True when the segment between two points is unoccluded.
    pub fn visible(&self, p1: Vec3, p2: Vec3) -> bool {
        let delta = p2 - p1;
        let distance = delta.length();
        if distance <= 2.0 * VISIBILITY_EPSILON {
            return true;
        }

        let ray = Ray::offset(p1, delta, VISIBILITY_EPSILON);
        match self.trace(&ray) {
            Some(hit) => hit.distance >= distance - 2.0 * VISIBILITY_EPSILON,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BvhBackend;
    use crate::camera::PinholeCamera;
    use crate::material::{Diffuse, Emission};
    use crate::sampling::{gen_f32, uniform_sphere};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use zaphod_core::{AnimatedTransform, Timeline, Transform, TriangleMesh};

    fn camera() -> Arc<dyn Camera> {
        Arc::new(PinholeCamera::new())
    }

    fn quad(size: f32) -> Arc<TriangleMesh> {
        let s = size;
        Arc::new(
            TriangleMesh::new(
                vec![
                    Vec3::new(-s, -s, 0.0),
                    Vec3::new(s, -s, 0.0),
                    Vec3::new(s, s, 0.0),
                    Vec3::new(-s, s, 0.0),
                ],
                vec![0, 1, 2, 0, 2, 3],
            )
            .unwrap(),
        )
    }

    fn blockers(backend: bool) -> Scene {
        let objects = vec![
            SceneObject::new("ball", Shape::sphere(1.0), Diffuse::new(Vec3::ONE)),
            SceneObject::new("wall", Shape::mesh(quad(2.0)), Diffuse::new(Vec3::ONE))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, -4.0))),
            SceneObject::new("crate", Shape::cuboid(Vec3::splat(0.5)), Diffuse::new(Vec3::ONE))
                .with_transform(Transform::from_translation(Vec3::new(3.0, 0.0, 0.0))),
        ];
        let backend: Option<Box<dyn IntersectionBackend>> = if backend {
            Some(Box::new(BvhBackend::new()))
        } else {
            None
        };
        Scene::new(objects, camera(), backend).unwrap()
    }

    #[test]
    fn test_trace_returns_nearest() {
        let scene = blockers(false);
        let hit = scene.trace(&Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z)).unwrap();
        assert_eq!(hit.object, 0);
        assert!((hit.distance - 9.0).abs() < 1e-4);
        assert!((hit.normal - Vec3::Z).length() < 1e-4);

        let hit = scene.trace(&Ray::new(Vec3::new(1.5, 1.5, 10.0), Vec3::NEG_Z)).unwrap();
        assert_eq!(hit.object, 1);
        assert!((hit.distance - 14.0).abs() < 1e-3);

        assert!(scene.trace(&Ray::new(Vec3::new(0.0, 10.0, 0.0), Vec3::Y)).is_none());
    }

    #[test]
    fn test_backend_and_custom_agree() {
        let plain = blockers(false);
        let accelerated = blockers(true);
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..500 {
            let origin = uniform_sphere(&mut rng) * 12.0;
            let target = Vec3::new(gen_f32(&mut rng), gen_f32(&mut rng), gen_f32(&mut rng)) * 8.0 - 4.0;
            let ray = Ray::new(origin, target - origin);
            match (plain.trace(&ray), accelerated.trace(&ray)) {
                (None, None) => {}
                (Some(a), Some(b)) => {
                    assert_eq!(a.object, b.object);
                    assert!((a.distance - b.distance).abs() < 1e-3);
                }
                (a, b) => panic!("mismatch {:?} vs {:?}", a.map(|h| h.object), b.map(|h| h.object)),
            }
        }
    }

    #[test]
    fn test_visibility_is_symmetric() {
        let scene = blockers(true);
        let mut rng = StdRng::seed_from_u64(7);

        let (mut open, mut blocked) = (0, 0);
        for _ in 0..500 {
            let a = uniform_sphere(&mut rng) * (2.0 + 6.0 * gen_f32(&mut rng));
            let b = uniform_sphere(&mut rng) * (2.0 + 6.0 * gen_f32(&mut rng));
            let forward = scene.visible(a, b);
            assert_eq!(forward, scene.visible(b, a), "{:?} <-> {:?}", a, b);
            if forward {
                open += 1;
            } else {
                blocked += 1;
            }
        }
        assert!(open > 0 && blocked > 0);
    }

    #[test]
    fn test_visible_endpoints_on_surfaces() {
        let scene = blockers(false);
        // Front of the sphere to the wall, and across the sphere.
        assert!(scene.visible(Vec3::new(0.0, 0.0, -1.0), Vec3::new(0.0, 0.0, -4.0)));
        assert!(!scene.visible(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, -4.0)));
        assert!(scene.visible(Vec3::ZERO, Vec3::ZERO));
    }

    #[test]
    fn test_empty_scene() {
        let scene = Scene::new(Vec::new(), camera(), None).unwrap();
        assert!(scene.is_empty());
        assert!(scene.trace(&Ray::new(Vec3::ZERO, Vec3::X)).is_none());
        assert!(scene.visible(Vec3::ZERO, Vec3::X));
        let mut rng = StdRng::seed_from_u64(1);
        assert!(scene.sample_light(&mut rng).is_none());
    }

    #[test]
    fn test_invalid_parent_is_rejected() {
        let objects = vec![SceneObject::new("orphan", Shape::sphere(1.0), Diffuse::new(Vec3::ONE)).with_parent(3)];
        let err = Scene::new(objects, camera(), None).unwrap_err();
        assert!(matches!(err, SceneError::InvalidParent { index: 0, .. }));
    }

    #[test]
    fn test_set_time_moves_children_and_lights() {
        let slide = AnimatedTransform {
            translation: Timeline::new()
                .with_key(0.0, Vec3::ZERO)
                .with_key(1.0, Vec3::new(10.0, 0.0, 0.0)),
            ..Default::default()
        };
        let objects = vec![
            SceneObject::new("root", Shape::sphere(0.5), Diffuse::new(Vec3::ONE)).with_animation(slide),
            SceneObject::new("lamp", Shape::sphere(1.0), Emission::new(Vec3::ONE))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 5.0, 0.0)).with_scale(Vec3::splat(2.0)))
                .with_parent(0),
        ];
        let mut scene = Scene::new(objects, camera(), Some(Box::new(BvhBackend::new()))).unwrap();

        let down = Ray::new(Vec3::new(10.0, 20.0, 0.0), Vec3::NEG_Y);
        assert!(scene.trace(&down).is_none());

        scene.set_time(1.0).unwrap();
        let hit = scene.trace(&down).unwrap();
        assert_eq!(hit.object, 1);
        assert!((hit.position - Vec3::new(10.0, 7.0, 0.0)).length() < 1e-3);

        // Light weight follows the world scale.
        let mut rng = StdRng::seed_from_u64(3);
        let sample = scene.sample_light(&mut rng).unwrap();
        assert_eq!(sample.object, 1);
        assert!((sample.area_density - 1.0 / (16.0 * std::f32::consts::PI)).abs() < 1e-5);
        assert!(((sample.ray.origin - Vec3::new(10.0, 5.0, 0.0)).length() - 2.0).abs() < 1e-3);
    }
}
