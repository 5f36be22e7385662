//! Error types for scene data validation.

use thiserror::Error;

/// Errors raised while validating mesh buffers.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("mesh has no triangles")]
    EmptyMesh,

    #[error("index buffer length {0} is not a multiple of three")]
    IndexCountNotMultipleOfThree(usize),

    #[error("triangle {triangle} references vertex {index} but the mesh has {vertex_count} vertices")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("{attribute} count {found} does not match vertex count {expected}")]
    AttributeCountMismatch {
        attribute: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("vertex {0} has a non-finite position")]
    NonFinitePosition(usize),
}

/// Errors raised while building a transform hierarchy.
#[derive(Debug, Error, PartialEq)]
pub enum HierarchyError {
    /// Parents must be inserted before their children, which also rules out cycles.
    #[error("parent node {parent} does not exist (hierarchy has {len} nodes)")]
    UnknownParent { parent: usize, len: usize },

    #[error("node {0} does not exist")]
    UnknownNode(usize),
}

/// Errors raised while building an image texture.
#[derive(Debug, Error, PartialEq)]
pub enum TextureError {
    #[error("texture has no texels")]
    EmptyImage,

    #[error("{width}x{height} texture was given {found} texels")]
    PixelCountMismatch { width: u32, height: u32, found: usize },

    #[error("expected {expected} bytes of RGBA data, got {found}")]
    ByteCountMismatch { expected: usize, found: usize },

    #[error("texel {0} is not finite")]
    NonFiniteTexel(usize),
}
