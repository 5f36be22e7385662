//! Pluggable intersection backends.
//!
//! A backend takes over ray queries for the mesh objects it accepts.
//! Objects it declines (or every object, when no backend is installed)
//! are intersected by the scene itself through their octrees.

use zaphod_core::TriangleMesh;
use zaphod_math::{Aabb, Interval, Mat4, Ray, Vec3};

use crate::triangle::intersect_triangle;

/// Maximum triangles per leaf node before splitting.
const LEAF_MAX_SIZE: usize = 4;

/// Closest hit reported by a backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackendHit {
    /// Scene object index passed to `register`.
    pub object: usize,
    pub triangle: usize,
    /// World-space ray parameter (rays are unit length, so also the distance).
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// External ray-query engine for triangle meshes.
pub trait IntersectionBackend: Send + Sync {
    /// Offer a mesh object in world space. Returns `false` if the backend
    /// does not take it, in which case the scene intersects it itself.
    fn register(&mut self, object: usize, mesh: &TriangleMesh, world: &Mat4) -> bool;

    /// Finish registration; queries are only valid after this.
    fn commit(&mut self);

    fn intersect(&self, ray: &Ray) -> Option<BackendHit>;

    /// Drop all registered geometry.
    fn clear(&mut self);
}

#[derive(Debug, Clone, Copy)]
struct WorldTriangle {
    object: usize,
    triangle: usize,
    vertices: [Vec3; 3],
}

impl WorldTriangle {
    fn bounds(&self) -> Aabb {
        Aabb::from_point_cloud(self.vertices.iter())
    }
}

#[derive(Debug)]
enum BvhNode {
    Branch { left: Box<BvhNode>, right: Box<BvhNode>, bbox: Aabb },
    Leaf { triangles: Vec<WorldTriangle>, bbox: Aabb },
    Empty,
}

impl BvhNode {
    /// Median split on the longest centroid axis.
    fn build(mut triangles: Vec<WorldTriangle>) -> Self {
        if triangles.is_empty() {
            return BvhNode::Empty;
        }

        let bounds = triangles
            .iter()
            .fold(Aabb::EMPTY, |acc, t| Aabb::surrounding(&acc, &t.bounds()));

        if triangles.len() <= LEAF_MAX_SIZE {
            return BvhNode::Leaf { triangles, bbox: bounds };
        }

        let centroid_bounds = triangles.iter().fold(Aabb::EMPTY, |acc, t| {
            let c = t.bounds().centroid();
            Aabb::surrounding(&acc, &Aabb::from_points(c, c))
        });
        let axis = centroid_bounds.longest_axis();

        triangles.sort_unstable_by(|a, b| {
            let a_val = a.bounds().centroid()[axis];
            let b_val = b.bounds().centroid()[axis];
            a_val.total_cmp(&b_val)
        });

        let right = triangles.split_off(triangles.len() / 2);
        BvhNode::Branch {
            left: Box::new(Self::build(triangles)),
            right: Box::new(Self::build(right)),
            bbox: bounds,
        }
    }

    fn intersect(&self, ray: &Ray, best: &mut Option<BackendHit>) {
        let t_max = best.map_or(f32::INFINITY, |h| h.t);
        match self {
            BvhNode::Empty => {}
            BvhNode::Leaf { triangles, bbox } => {
                if !bbox.hit(ray, Interval::new(0.0, t_max)) {
                    return;
                }
                for tri in triangles {
                    let t_max = best.map_or(f32::INFINITY, |h| h.t);
                    if let Some(hit) = intersect_triangle(ray, tri.vertices, t_max) {
                        *best = Some(BackendHit {
                            object: tri.object,
                            triangle: tri.triangle,
                            t: hit.t,
                            u: hit.u,
                            v: hit.v,
                        });
                    }
                }
            }
            BvhNode::Branch { left, right, bbox } => {
                if !bbox.hit(ray, Interval::new(0.0, t_max)) {
                    return;
                }
                left.intersect(ray, best);
                // Only check right up to closest hit
                right.intersect(ray, best);
            }
        }
    }
}

/// World-space BVH over every registered mesh triangle.
#[derive(Debug)]
pub struct BvhBackend {
    pending: Vec<WorldTriangle>,
    root: BvhNode,
}

impl Default for BvhBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BvhBackend {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            root: BvhNode::Empty,
        }
    }
}

impl IntersectionBackend for BvhBackend {
    fn register(&mut self, object: usize, mesh: &TriangleMesh, world: &Mat4) -> bool {
        self.pending.extend((0..mesh.triangle_count()).map(|triangle| WorldTriangle {
            object,
            triangle,
            vertices: mesh.triangle(triangle).map(|p| world.transform_point3(p)),
        }));
        true
    }

    fn commit(&mut self) {
        let triangles = std::mem::take(&mut self.pending);
        log::debug!("BVH backend: committing {} triangles", triangles.len());
        self.root = BvhNode::build(triangles);
    }

    fn intersect(&self, ray: &Ray) -> Option<BackendHit> {
        let mut best = None;
        self.root.intersect(ray, &mut best);
        best
    }

    fn clear(&mut self) {
        self.pending.clear();
        self.root = BvhNode::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::{gen_f32, uniform_sphere};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn soup(rng: &mut StdRng, count: usize) -> TriangleMesh {
        let mut positions = Vec::new();
        for _ in 0..count {
            let center = Vec3::new(gen_f32(rng), gen_f32(rng), gen_f32(rng)) * 10.0 - 5.0;
            for _ in 0..3 {
                positions.push(center + uniform_sphere(rng) * 0.5);
            }
        }
        let indices = (0..positions.len() as u32).collect();
        TriangleMesh::new(positions, indices).unwrap()
    }

    #[test]
    fn test_bvh_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let mesh = soup(&mut rng, 300);
        let world = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));

        let mut backend = BvhBackend::new();
        assert!(backend.register(7, &mesh, &world));
        backend.commit();

        for _ in 0..1000 {
            let origin = uniform_sphere(&mut rng) * 20.0 + Vec3::new(1.0, 2.0, 3.0);
            let target = Vec3::new(gen_f32(&mut rng), gen_f32(&mut rng), gen_f32(&mut rng)) * 6.0 - 2.0;
            let ray = Ray::new(origin, target - origin);

            let mut expected: Option<f32> = None;
            for i in 0..mesh.triangle_count() {
                let vertices = mesh.triangle(i).map(|p| world.transform_point3(p));
                if let Some(hit) = intersect_triangle(&ray, vertices, expected.unwrap_or(f32::INFINITY)) {
                    expected = Some(hit.t);
                }
            }

            let found = backend.intersect(&ray);
            match (expected, found) {
                (None, None) => {}
                (Some(t), Some(hit)) => {
                    assert!((t - hit.t).abs() < 1e-4);
                    assert_eq!(hit.object, 7);
                }
                (e, f) => panic!("mismatch: {:?} vs {:?}", e, f),
            }
        }
    }

    #[test]
    fn test_clear_removes_geometry() {
        let mesh = TriangleMesh::new(vec![Vec3::new(-1.0, -1.0, 0.0), Vec3::new(1.0, -1.0, 0.0), Vec3::Y], vec![0, 1, 2])
            .unwrap();
        let mut backend = BvhBackend::new();
        backend.register(0, &mesh, &Mat4::IDENTITY);
        backend.commit();

        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), -Vec3::Z);
        assert!(backend.intersect(&ray).is_some());

        backend.clear();
        assert!(backend.intersect(&ray).is_none());
    }
}
