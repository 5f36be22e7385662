//! Octree spatial index over a triangle mesh.
//!
//! Nodes live in a flat arena with the root at index 0; the children of a
//! node occupy a contiguous index range. A triangle is pushed down into
//! every child octant that fully contains all three of its vertices.
//! Triangles that straddle an octant boundary stay on the internal node and
//! are tested there, so a query always returns the same closest hit as a
//! linear scan over the whole mesh.

use std::sync::Arc;
use zaphod_core::TriangleMesh;
use zaphod_math::{Aabb, Interval, Ray};

use crate::triangle::intersect_triangle;

/// Nodes at or below this volume are not subdivided.
pub const MIN_NODE_VOLUME: f32 = 0.01;

/// Maximum subdivision depth (the root is depth 0).
pub const MAX_DEPTH: u32 = 12;

/// Nodes holding this many triangles or fewer are not subdivided.
pub const MIN_LEAF_TRIANGLES: usize = 8;

#[derive(Debug, Clone)]
struct OctreeNode {
    bounds: Aabb,
    /// Triangles tested at this node (all of them for a leaf, the
    /// boundary-straddling ones for an internal node).
    triangles: Vec<u32>,
    first_child: u32,
    child_count: u8,
}

impl OctreeNode {
    fn new(bounds: Aabb, triangles: Vec<u32>) -> Self {
        Self {
            bounds,
            triangles,
            first_child: 0,
            child_count: 0,
        }
    }

    fn is_leaf(&self) -> bool {
        self.child_count == 0
    }
}

/// Closest triangle hit reported by the octree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OctreeHit {
    pub triangle: usize,
    pub t: f32,
    pub u: f32,
    pub v: f32,
}

/// Octree over one mesh. Shares ownership of the mesh with its shape.
#[derive(Debug, Clone)]
pub struct Octree {
    mesh: Arc<TriangleMesh>,
    nodes: Vec<OctreeNode>,
    depth: u32,
}

impl Octree {
    /// Build the octree for a mesh.
    pub fn build(mesh: Arc<TriangleMesh>) -> Self {
        let all: Vec<u32> = (0..mesh.triangle_count() as u32).collect();
        let root = OctreeNode::new(mesh.bounds(), all);

        let mut octree = Self {
            mesh,
            nodes: vec![root],
            depth: 0,
        };
        octree.subdivide(0, 0);

        log::debug!(
            "Octree built: {} triangles, {} nodes, depth {}",
            octree.mesh.triangle_count(),
            octree.nodes.len(),
            octree.depth
        );
        octree
    }

    fn subdivide(&mut self, index: usize, depth: u32) {
        self.depth = self.depth.max(depth);

        let node = &self.nodes[index];
        let splittable = node.bounds.volume() > MIN_NODE_VOLUME
            && depth < MAX_DEPTH
            && node.triangles.len() > MIN_LEAF_TRIANGLES;
        if !splittable {
            return;
        }

        let bounds = node.bounds;
        let triangles = std::mem::take(&mut self.nodes[index].triangles);

        let mut octants: Vec<(Aabb, Vec<u32>)> = (0..8).map(|i| (bounds.octant(i), Vec::new())).collect();
        let mut straddling = Vec::new();

        for &tri in &triangles {
            let corners = self.mesh.triangle(tri as usize);
            let mut placed = false;
            for (octant, list) in octants.iter_mut() {
                if corners.iter().all(|&p| octant.contains_point(p)) {
                    list.push(tri);
                    placed = true;
                }
            }
            if !placed {
                straddling.push(tri);
            }
        }

        octants.retain(|(_, list)| !list.is_empty());

        // Starvation: nothing fits in a child, keep the node as a leaf.
        if octants.is_empty() {
            self.nodes[index].triangles = triangles;
            return;
        }

        let first_child = self.nodes.len();
        let child_count = octants.len();
        {
            let node = &mut self.nodes[index];
            node.triangles = straddling;
            node.first_child = first_child as u32;
            node.child_count = child_count as u8;
        }
        self.nodes
            .extend(octants.into_iter().map(|(b, list)| OctreeNode::new(b, list)));

        for child in first_child..first_child + child_count {
            self.subdivide(child, depth + 1);
        }
    }

    /// Closest hit along the ray (beyond the triangle hit epsilon).
    pub fn intersect(&self, ray: &Ray) -> Option<OctreeHit> {
        let mut best = None;
        self.intersect_node(0, ray, &mut best);
        best
    }

    fn intersect_node(&self, index: usize, ray: &Ray, best: &mut Option<OctreeHit>) {
        let node = &self.nodes[index];
        let t_max = best.map_or(f32::INFINITY, |h| h.t);
        if !node.bounds.hit(ray, Interval::new(0.0, t_max)) {
            return;
        }

        for &tri in &node.triangles {
            let t_max = best.map_or(f32::INFINITY, |h| h.t);
            if let Some(hit) = intersect_triangle(ray, self.mesh.triangle(tri as usize), t_max) {
                *best = Some(OctreeHit {
                    triangle: tri as usize,
                    t: hit.t,
                    u: hit.u,
                    v: hit.v,
                });
            }
        }

        let first = node.first_child as usize;
        for child in first..first + node.child_count as usize {
            self.intersect_node(child, ray, best);
        }
    }

    pub fn mesh(&self) -> &Arc<TriangleMesh> {
        &self.mesh
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Deepest level reached during construction.
    pub fn depth(&self) -> u32 {
        self.depth
    }
}
