//! Textures: surface colours looked up by texture coordinate.
//!
//! A `Texture` is either a constant colour or a shared `ImageTexture`.
//! Image texels are stored in linear RGB; `from_srgb8` converts 8-bit
//! sRGB data on the way in. Texture coordinates have (0, 0) at the
//! bottom-left of the image.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::error::TextureError;

/// How coordinates outside [0, 1] are mapped back onto the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WrapMode {
    /// Repeat the image.
    #[default]
    Wrap,
    /// Stretch the edge texels.
    Clamp,
}

/// How texels are combined for a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Nearest texel.
    #[default]
    Point,
    /// Blend of the four surrounding texels.
    Bilinear,
}

/// A linear RGB image sampled by texture coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTexture {
    width: u32,
    height: u32,
    /// Row-major texels, top row first.
    pixels: Vec<Vec3>,
    wrap: WrapMode,
    filter: FilterMode,
}

impl ImageTexture {
    /// Create a texture from linear RGB texels (row-major, top row first).
    pub fn new(width: u32, height: u32, pixels: Vec<Vec3>) -> Result<Self, TextureError> {
        if width == 0 || height == 0 {
            return Err(TextureError::EmptyImage);
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(TextureError::PixelCountMismatch {
                width,
                height,
                found: pixels.len(),
            });
        }
        if let Some(index) = pixels.iter().position(|p| !p.is_finite()) {
            return Err(TextureError::NonFiniteTexel(index));
        }

        Ok(Self {
            width,
            height,
            pixels,
            wrap: WrapMode::default(),
            filter: FilterMode::default(),
        })
    }

    /// Create a texture from 8-bit sRGB RGBA data, as decoded by `image`.
    /// Alpha is ignored.
    pub fn from_srgb8(width: u32, height: u32, rgba: &[u8]) -> Result<Self, TextureError> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected {
            return Err(TextureError::ByteCountMismatch {
                expected,
                found: rgba.len(),
            });
        }
        let pixels = rgba
            .chunks_exact(4)
            .map(|p| {
                Vec3::new(
                    srgb_to_linear(p[0] as f32 / 255.0),
                    srgb_to_linear(p[1] as f32 / 255.0),
                    srgb_to_linear(p[2] as f32 / 255.0),
                )
            })
            .collect();
        Self::new(width, height, pixels)
    }

    /// A `cells` x `cells` checkerboard alternating between `a` and `b`,
    /// starting with `a` in the top-left corner.
    pub fn checker(cells: u32, a: Vec3, b: Vec3) -> Result<Self, TextureError> {
        let pixels = (0..cells * cells)
            .map(|i| if (i / cells + i % cells) % 2 == 0 { a } else { b })
            .collect();
        Self::new(cells, cells, pixels)
    }

    pub fn with_wrap(mut self, wrap: WrapMode) -> Self {
        self.wrap = wrap;
        self
    }

    pub fn with_filter(mut self, filter: FilterMode) -> Self {
        self.filter = filter;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Texel at integer coordinates, row 0 being the top of the image.
    pub fn texel(&self, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.width - 1);
        let y = y.min(self.height - 1);
        self.pixels[(y * self.width + x) as usize]
    }

    /// Look up the colour at `uv`.
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        let (u, v) = match self.wrap {
            WrapMode::Wrap => (uv.x.rem_euclid(1.0), uv.y.rem_euclid(1.0)),
            WrapMode::Clamp => (uv.x.clamp(0.0, 1.0), uv.y.clamp(0.0, 1.0)),
        };
        // NaN coordinates fall through both arms; pin them to the corner.
        let u = if u.is_nan() { 0.0 } else { u };
        let v = if v.is_nan() { 0.0 } else { v };

        match self.filter {
            FilterMode::Point => {
                let x = (u * self.width as f32) as u32;
                let y = ((1.0 - v) * self.height as f32) as u32;
                self.texel(x, y)
            }
            FilterMode::Bilinear => {
                let x = u * (self.width - 1) as f32;
                let y = (1.0 - v) * (self.height - 1) as f32;
                let (x0, y0) = (x.floor() as u32, y.floor() as u32);
                let (fx, fy) = (x.fract(), y.fract());

                let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), fx);
                let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), fx);
                top.lerp(bottom, fy)
            }
        }
    }
}

/// A colour source for material lobes.
#[derive(Debug, Clone, PartialEq)]
pub enum Texture {
    Constant(Vec3),
    Image(Arc<ImageTexture>),
}

impl Texture {
    pub fn sample(&self, uv: Vec2) -> Vec3 {
        match self {
            Texture::Constant(color) => *color,
            Texture::Image(image) => image.sample(uv),
        }
    }
}

impl From<Vec3> for Texture {
    fn from(color: Vec3) -> Self {
        Texture::Constant(color)
    }
}

impl From<ImageTexture> for Texture {
    fn from(image: ImageTexture) -> Self {
        Texture::Image(Arc::new(image))
    }
}

impl From<Arc<ImageTexture>> for Texture {
    fn from(image: Arc<ImageTexture>) -> Self {
        Texture::Image(image)
    }
}

/// Convert an sRGB-encoded channel to linear.
pub fn srgb_to_linear(c: f32) -> f32 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}
