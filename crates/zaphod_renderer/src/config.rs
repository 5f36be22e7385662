//! Render configuration.

use serde::{Deserialize, Serialize};

use crate::error::RenderError;
use crate::integrator::{IntegratorConfig, IntegratorKind};
use crate::tile::DEFAULT_TILE_SIZE;

/// Render configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Total samples per pixel, preview included
    pub samples_per_pixel: u32,
    /// Samples per pixel of the coarse preview pass
    pub preview_samples: u32,
    /// Edge length of full-quality tiles (preview tiles are twice as large)
    pub tile_size: u32,
    /// Worker thread count
    pub threads: usize,
    pub integrator: IntegratorKind,
    pub integrator_config: IntegratorConfig,
    /// Fixed base seed; worker `i` uses `seed + i`. Entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            samples_per_pixel: 64,
            preview_samples: 5,
            tile_size: DEFAULT_TILE_SIZE,
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            integrator: IntegratorKind::default(),
            integrator_config: IntegratorConfig::default(),
            seed: None,
        }
    }
}

impl RenderConfig {
    pub fn validate(&self) -> Result<(), RenderError> {
        let invalid = |what: &str| Err(RenderError::InvalidConfig(format!("{} must be greater than zero", what)));
        if self.width == 0 || self.height == 0 {
            return invalid("image size");
        }
        if self.samples_per_pixel == 0 {
            return invalid("samples_per_pixel");
        }
        if self.tile_size == 0 {
            return invalid("tile_size");
        }
        if self.threads == 0 {
            return invalid("threads");
        }
        let roulette = self.integrator_config.roulette_continue;
        if !(roulette > 0.0 && roulette <= 1.0) {
            return Err(RenderError::InvalidConfig(format!(
                "roulette_continue must be in (0, 1], got {}",
                roulette
            )));
        }
        Ok(())
    }

    /// Samples per pixel of the preview and full-quality passes.
    pub fn pass_samples(&self) -> (u32, u32) {
        let preview = self.preview_samples.min(self.samples_per_pixel);
        (preview, self.samples_per_pixel - preview)
    }
}
