//! Triangle mesh geometry.
//!
//! A `TriangleMesh` is an index buffer into a vertex buffer with optional
//! per-vertex normals and texture coordinates. It is validated once on
//! construction and then shared (behind an `Arc`) between the renderer's
//! mesh shape and the octree built over it.

use glam::{Vec2, Vec3};
use zaphod_math::Aabb;

use crate::error::GeometryError;

/// Triangles whose doubled area falls below this are dropped on construction.
const DEGENERATE_AREA: f32 = 1e-12;

/// A validated triangle mesh.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
    triangles: Vec<[u32; 3]>,
    bounds: Aabb,
}

impl TriangleMesh {
    /// Create a mesh from positions and a flat index buffer (three indices per
    /// triangle, counter-clockwise winding gives the outward normal).
    ///
    /// Index errors are rejected. Zero-area triangles are dropped with a
    /// warning, since the renderer assumes non-degenerate geometry.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Result<Self, GeometryError> {
        if indices.len() % 3 != 0 {
            return Err(GeometryError::IndexCountNotMultipleOfThree(indices.len()));
        }
        if let Some(bad) = positions.iter().position(|p| !p.is_finite()) {
            return Err(GeometryError::NonFinitePosition(bad));
        }

        let mut triangles = Vec::with_capacity(indices.len() / 3);
        let mut dropped = 0usize;

        for (triangle, chunk) in indices.chunks_exact(3).enumerate() {
            for &index in chunk {
                if index as usize >= positions.len() {
                    return Err(GeometryError::IndexOutOfRange {
                        triangle,
                        index,
                        vertex_count: positions.len(),
                    });
                }
            }

            let [a, b, c] = [chunk[0], chunk[1], chunk[2]].map(|i| positions[i as usize]);
            if (b - a).cross(c - a).length_squared() < DEGENERATE_AREA * DEGENERATE_AREA {
                dropped += 1;
                continue;
            }
            triangles.push([chunk[0], chunk[1], chunk[2]]);
        }

        if dropped > 0 {
            log::warn!("Dropped {} degenerate triangles", dropped);
        }
        if triangles.is_empty() {
            return Err(GeometryError::EmptyMesh);
        }

        let bounds = Aabb::from_point_cloud(&positions);

        Ok(Self {
            positions,
            normals: None,
            uvs: None,
            triangles,
            bounds,
        })
    }

    /// Attach per-vertex normals for smooth shading.
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> Result<Self, GeometryError> {
        if normals.len() != self.positions.len() {
            return Err(GeometryError::AttributeCountMismatch {
                attribute: "normal",
                expected: self.positions.len(),
                found: normals.len(),
            });
        }
        self.normals = Some(normals.into_iter().map(|n| n.normalize_or_zero()).collect());
        Ok(self)
    }

    /// Attach per-vertex texture coordinates.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Result<Self, GeometryError> {
        if uvs.len() != self.positions.len() {
            return Err(GeometryError::AttributeCountMismatch {
                attribute: "uv",
                expected: self.positions.len(),
                found: uvs.len(),
            });
        }
        self.uvs = Some(uvs);
        Ok(self)
    }

    /// Compute smooth vertex normals by averaging area-weighted face normals.
    pub fn compute_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];

        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| self.positions[i as usize]);
            let face_normal = (b - a).cross(c - a);
            for &i in tri {
                normals[i as usize] += face_normal;
            }
        }

        for normal in &mut normals {
            *normal = normal.try_normalize().unwrap_or(Vec3::Y);
        }

        self.normals = Some(normals);
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    pub fn has_uvs(&self) -> bool {
        self.uvs.is_some()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// The three corner positions of a triangle.
    #[inline]
    pub fn triangle(&self, index: usize) -> [Vec3; 3] {
        self.triangles[index].map(|i| self.positions[i as usize])
    }

    /// Unit geometric normal of a triangle (counter-clockwise winding).
    pub fn face_normal(&self, index: usize) -> Vec3 {
        let [a, b, c] = self.triangle(index);
        (b - a).cross(c - a).normalize_or_zero()
    }

    pub fn triangle_area(&self, index: usize) -> f32 {
        let [a, b, c] = self.triangle(index);
        0.5 * (b - a).cross(c - a).length()
    }

    pub fn surface_area(&self) -> f32 {
        (0..self.triangle_count()).map(|i| self.triangle_area(i)).sum()
    }

    /// Shading normal at barycentric (u, v): interpolated vertex normals when
    /// present, the face normal otherwise.
    pub fn shading_normal(&self, index: usize, u: f32, v: f32) -> Vec3 {
        match &self.normals {
            Some(normals) => {
                let [a, b, c] = self.triangles[index].map(|i| normals[i as usize]);
                let n = a * (1.0 - u - v) + b * u + c * v;
                n.try_normalize().unwrap_or_else(|| self.face_normal(index))
            }
            None => self.face_normal(index),
        }
    }

    /// Texture coordinate at barycentric (u, v); the barycentrics themselves
    /// when the mesh has no uvs.
    pub fn texture_coordinate(&self, index: usize, u: f32, v: f32) -> Vec2 {
        match &self.uvs {
            Some(uvs) => {
                let [a, b, c] = self.triangles[index].map(|i| uvs[i as usize]);
                a * (1.0 - u - v) + b * u + c * v
            }
            None => Vec2::new(u, v),
        }
    }
}
