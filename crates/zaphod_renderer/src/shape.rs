//! Object-space geometry: spheres, boxes and triangle meshes.
//!
//! Shapes are intersected in their own local space; `SceneObject` moves
//! rays in and hits out. Meshes carry the octree built over them.

use std::f32::consts::PI;
use std::sync::Arc;
use zaphod_core::TriangleMesh;
use zaphod_math::{Ray, Vec2, Vec3};

use crate::octree::Octree;
use crate::triangle::HIT_EPSILON;

/// A hit in the shape's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalHit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// Triangle mesh together with its spatial index.
#[derive(Debug, Clone)]
pub struct MeshShape {
    mesh: Arc<TriangleMesh>,
    octree: Option<Arc<Octree>>,
}

impl MeshShape {
    pub fn mesh(&self) -> &Arc<TriangleMesh> {
        &self.mesh
    }

    pub fn octree(&self) -> Option<&Arc<Octree>> {
        self.octree.as_ref()
    }

    pub(crate) fn set_octree(&mut self, octree: Arc<Octree>) {
        self.octree = Some(octree);
    }
}

#[derive(Debug, Clone)]
pub enum Shape {
    /// Sphere of the given radius centered at the local origin.
    Sphere { radius: f32 },
    /// Box centered at the local origin.
    Cuboid { half_extents: Vec3 },
    Mesh(MeshShape),
}

impl Shape {
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere {
            radius: radius.max(0.0),
        }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Shape::Cuboid {
            half_extents: half_extents.abs(),
        }
    }

    /// Mesh shape; the octree is built when the scene is assembled.
    pub fn mesh(mesh: Arc<TriangleMesh>) -> Self {
        Shape::Mesh(MeshShape { mesh, octree: None })
    }

    /// Closest local-space hit beyond the hit epsilon.
    pub fn intersect(&self, ray: &Ray) -> Option<LocalHit> {
        match self {
            Shape::Sphere { radius } => intersect_sphere(ray, *radius),
            Shape::Cuboid { half_extents } => intersect_cuboid(ray, *half_extents),
            Shape::Mesh(shape) => {
                let octree = shape.octree.as_ref()?;
                let hit = octree.intersect(ray)?;
                Some(LocalHit {
                    t: hit.t,
                    position: ray.at(hit.t),
                    normal: shape.mesh.shading_normal(hit.triangle, hit.u, hit.v),
                    uv: shape.mesh.texture_coordinate(hit.triangle, hit.u, hit.v),
                })
            }
        }
    }
}

fn intersect_sphere(ray: &Ray, radius: f32) -> Option<LocalHit> {
    let oc = -ray.origin;
    let h = ray.direction.dot(oc);
    let c = oc.length_squared() - radius * radius;

    let discriminant = h * h - c;
    if discriminant < 0.0 {
        return None;
    }

    let sqrtd = discriminant.sqrt();

    // Find the nearest root beyond the epsilon
    let mut t = h - sqrtd;
    if t <= HIT_EPSILON {
        t = h + sqrtd;
        if t <= HIT_EPSILON {
            return None;
        }
    }

    let position = ray.at(t);
    let normal = position / radius;
    Some(LocalHit {
        t,
        position,
        normal,
        uv: sphere_uv(normal),
    })
}

/// Spherical (u, v) of a point on the unit sphere.
fn sphere_uv(p: Vec3) -> Vec2 {
    let theta = (-p.y).clamp(-1.0, 1.0).acos();
    let phi = (-p.z).atan2(p.x) + PI;
    Vec2::new(phi / (2.0 * PI), theta / PI)
}

fn intersect_cuboid(ray: &Ray, half: Vec3) -> Option<LocalHit> {
    let mut t_near = f32::NEG_INFINITY;
    let mut t_far = f32::INFINITY;

    for axis in 0..3 {
        let inv = 1.0 / ray.direction[axis];
        let mut t0 = (-half[axis] - ray.origin[axis]) * inv;
        let mut t1 = (half[axis] - ray.origin[axis]) * inv;
        if inv < 0.0 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_near = t_near.max(t0);
        t_far = t_far.min(t1);
        if t_far < t_near {
            return None;
        }
    }

    let t = if t_near > HIT_EPSILON {
        t_near
    } else if t_far > HIT_EPSILON {
        t_far
    } else {
        return None;
    };

    let position = ray.at(t);
    // The face hit is the axis where the point sits closest to the extent.
    let relative = position / half.max(Vec3::splat(1e-8));
    let axis = if relative.x.abs() >= relative.y.abs() && relative.x.abs() >= relative.z.abs() {
        0
    } else if relative.y.abs() >= relative.z.abs() {
        1
    } else {
        2
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = relative[axis].signum();

    let (a, b) = ((axis + 1) % 3, (axis + 2) % 3);
    let uv = Vec2::new(relative[a] * 0.5 + 0.5, relative[b] * 0.5 + 0.5);

    Some(LocalHit {
        t,
        position,
        normal,
        uv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sphere_hit_from_outside() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        let hit = Shape::sphere(1.0).intersect(&ray).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_sphere_hit_from_inside() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hit = Shape::sphere(2.0).intersect(&ray).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-5);
        // Normals stay outward.
        assert!((hit.normal - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_sphere_miss() {
        let ray = Ray::new(Vec3::new(0.0, 3.0, 5.0), -Vec3::Z);
        assert!(Shape::sphere(1.0).intersect(&ray).is_none());
    }

    #[test]
    fn test_cuboid_hit_faces() {
        let shape = Shape::cuboid(Vec3::new(1.0, 2.0, 3.0));

        let hit = shape.intersect(&Ray::new(Vec3::new(-5.0, 0.5, 0.5), Vec3::X)).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-5);
        assert_eq!(hit.normal, -Vec3::X);

        let hit = shape.intersect(&Ray::new(Vec3::new(0.2, 10.0, 0.3), -Vec3::Y)).unwrap();
        assert!((hit.t - 8.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Y);

        // From inside, the exit face.
        let hit = shape.intersect(&Ray::new(Vec3::ZERO, Vec3::Z)).unwrap();
        assert!((hit.t - 3.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Z);
    }

    #[test]
    fn test_mesh_without_octree_never_hits() {
        let mesh = TriangleMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]).unwrap();
        let shape = Shape::mesh(Arc::new(mesh));
        let ray = Ray::new(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z);
        assert!(shape.intersect(&ray).is_none());
    }

    #[test]
    fn test_mesh_hit_through_octree() {
        let mesh = Arc::new(TriangleMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2]).unwrap());
        let mut shape = Shape::mesh(mesh.clone());
        if let Shape::Mesh(m) = &mut shape {
            m.set_octree(Arc::new(Octree::build(mesh)));
        }

        let ray = Ray::new(Vec3::new(0.2, 0.2, 1.0), -Vec3::Z);
        let hit = shape.intersect(&ray).unwrap();
        assert!((hit.t - 1.0).abs() < 1e-5);
        assert!((hit.normal - Vec3::Z).length() < 1e-5);
    }
}
