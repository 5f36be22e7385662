//! Zaphod Core - renderer-agnostic scene data.
//!
//! This crate provides:
//!
//! - **Geometry**: `TriangleMesh`, validated index/vertex buffers shared by
//!   the renderer's spatial index and its shapes
//! - **Transforms**: `Transform` (scale, rotation, translation) and the
//!   `TransformHierarchy` that caches composed world matrices
//! - **Animation**: keyframed `Timeline`s and `AnimatedTransform`
//! - **Textures**: constant or image colour sources looked up by uv
//!
//! Everything here is validated before it reaches the renderer, which
//! assumes well-formed input.

pub mod animation;
pub mod error;
pub mod hierarchy;
pub mod mesh;
pub mod texture;

// Re-export commonly used types
pub use animation::{AnimatedTransform, Interpolate, Keyframe, Timeline};
pub use error::{GeometryError, HierarchyError, TextureError};
pub use hierarchy::{NodeId, Transform, TransformHierarchy};
pub use mesh::TriangleMesh;
pub use texture::{FilterMode, ImageTexture, Texture, WrapMode};
