//! Zaphod Renderer - progressive Monte Carlo light transport on the CPU.
//!
//! A [`Scene`] holds objects (sphere, cuboid or octree-accelerated mesh
//! shapes with a [`Material`]), a transform hierarchy evaluated per frame
//! time, and a [`LightSampler`] over the emissive objects. Integrators
//! estimate radiance per camera sample:
//!
//! - [`PathTracer`]: unidirectional path tracing
//! - [`BidirectionalPathTracer`]: all eye/light connections, balance-heuristic MIS
//! - [`GradientDomainPathTracer`]: base radiance plus half-vector shifted pixel gradients
//!
//! [`TileScheduler`] drives an integrator over the image on worker threads
//! and accumulates running means in an [`AccumulationBuffer`].

pub mod backend;
pub mod buffer;
pub mod camera;
pub mod config;
pub mod error;
pub mod integrator;
pub mod light;
pub mod material;
pub mod object;
pub mod octree;
pub mod sampling;
pub mod scene;
pub mod scheduler;
pub mod shape;
pub mod tile;
pub mod triangle;

pub use backend::{BackendHit, BvhBackend, IntersectionBackend};
pub use buffer::{color_to_rgba, linear_to_gamma, AccumulationBuffer, GradientBuffer};
pub use camera::{Camera, PinholeCamera, ThinLensCamera};
pub use config::RenderConfig;
pub use error::{RenderError, SceneError};
pub use integrator::{
    create_integrator, BidirectionalPathTracer, GradientDomainPathTracer, GradientSample, Integrator,
    IntegratorConfig, IntegratorKind, NormalView, PathTracer, PixelSample,
};
pub use light::{LightSample, LightSampler};
pub use material::{BrdfSample, Color, Diffuse, Emission, Glossy, InteractionKind, Material, Transparent};
pub use object::SceneObject;
pub use octree::Octree;
pub use scene::{Intersection, Scene};
pub use scheduler::{RenderState, TileScheduler};
pub use shape::Shape;
pub use tile::{generate_tiles, Tile, DEFAULT_TILE_SIZE};

pub use zaphod_core::{FilterMode, ImageTexture, Texture, WrapMode};

/// Re-export math types from zaphod_math
pub use zaphod_math::{Mat4, Ray, Vec3};
