//! Shared per-pixel accumulation buffers.
//!
//! Cells are `f32` bit patterns in relaxed atomics, so the image can be
//! read for preview while workers are still writing. Each pixel is written
//! by one worker at a time (tiles of a pass partition the image), which
//! makes the read-modify-write of a running mean safe without locks.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::integrator::{GradientSample, GRADIENT_OFFSETS};
use crate::material::Color;

#[derive(Debug)]
struct AtomicF32(AtomicU32);

impl AtomicF32 {
    fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// `mean += (sample - mean) / n`
    fn update_mean(&self, sample: f32, n: u32) {
        let mean = self.load();
        self.store(mean + (sample - mean) / n as f32);
    }
}

fn atomics(len: usize) -> Vec<AtomicF32> {
    (0..len).map(|_| AtomicF32::new(0.0)).collect()
}

/// Running mean colour and sample count per pixel.
#[derive(Debug)]
pub struct AccumulationBuffer {
    width: u32,
    height: u32,
    means: Vec<AtomicF32>,
    counts: Vec<AtomicU32>,
}

impl AccumulationBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            means: atomics(len * 3),
            counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn clear(&self) {
        self.means.iter().for_each(|m| m.store(0.0));
        self.counts.iter().for_each(|c| c.store(0, Ordering::Relaxed));
    }

    /// Fold one sample into the pixel's running mean.
    pub fn add_sample(&self, x: u32, y: u32, sample: Color) {
        let i = self.index(x, y);
        let n = self.counts[i].fetch_add(1, Ordering::Relaxed) + 1;
        for c in 0..3 {
            self.means[i * 3 + c].update_mean(sample[c], n);
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        let i = self.index(x, y) * 3;
        Color::new(self.means[i].load(), self.means[i + 1].load(), self.means[i + 2].load())
    }

    /// Samples accumulated at a pixel.
    pub fn count(&self, x: u32, y: u32) -> u32 {
        self.counts[self.index(x, y)].load(Ordering::Relaxed)
    }

    /// Snapshot of every pixel in row-major order.
    pub fn pixels(&self) -> Vec<Color> {
        self.means
            .chunks_exact(3)
            .map(|c| Color::new(c[0].load(), c[1].load(), c[2].load()))
            .collect()
    }

    /// Gamma-encoded 8-bit RGBA, row-major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        self.pixels().into_iter().flat_map(color_to_rgba).collect()
    }
}

/// Running means of the weighted gradients and of their weights, per
/// pixel and per neighbour direction (+x, +y, -x, -y).
#[derive(Debug)]
pub struct GradientBuffer {
    width: u32,
    height: u32,
    /// Per pixel, per direction: weighted gradient (3) and weight (1).
    cells: Vec<AtomicF32>,
    counts: Vec<AtomicU32>,
}

const CELL: usize = 4;
const DIRECTIONS: usize = GRADIENT_OFFSETS.len();

impl GradientBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            cells: atomics(len * DIRECTIONS * CELL),
            counts: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn clear(&self) {
        self.cells.iter().for_each(|c| c.store(0.0));
        self.counts.iter().for_each(|c| c.store(0, Ordering::Relaxed));
    }

    pub fn add_sample(&self, x: u32, y: u32, gradients: &[GradientSample; 4]) {
        let pixel = self.index(x, y);
        let n = self.counts[pixel].fetch_add(1, Ordering::Relaxed) + 1;
        for (dir, g) in gradients.iter().enumerate() {
            let base = (pixel * DIRECTIONS + dir) * CELL;
            let weighted = g.value * g.weight;
            for c in 0..3 {
                self.cells[base + c].update_mean(weighted[c], n);
            }
            self.cells[base + 3].update_mean(g.weight, n);
        }
    }

    /// Sums (not means) of the weighted gradient and weight toward `dir`.
    fn sums(&self, x: u32, y: u32, dir: usize) -> (Color, f32) {
        let pixel = self.index(x, y);
        let n = self.counts[pixel].load(Ordering::Relaxed) as f32;
        let base = (pixel * DIRECTIONS + dir) * CELL;
        let c = &self.cells[base..base + CELL];
        (Color::new(c[0].load(), c[1].load(), c[2].load()) * n, c[3].load() * n)
    }

    /// Estimate of `f(x + 1, y) - f(x, y)` for every pixel (zero in the last column).
    pub fn horizontal(&self) -> Vec<Color> {
        self.combined(0, 2, 1, 0)
    }

    /// Estimate of `f(x, y + 1) - f(x, y)` for every pixel (zero in the last row).
    pub fn vertical(&self) -> Vec<Color> {
        self.combined(1, 3, 0, 1)
    }

    /// Combine a pixel's forward estimate with the mirrored backward
    /// estimate of its neighbour, by weight.
    fn combined(&self, forward: usize, backward: usize, dx: u32, dy: u32) -> Vec<Color> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let (nx, ny) = (x + dx, y + dy);
                if nx >= self.width || ny >= self.height {
                    out.push(Color::ZERO);
                    continue;
                }
                let (fwd, w_fwd) = self.sums(x, y, forward);
                let (bwd, w_bwd) = self.sums(nx, ny, backward);
                let total = w_fwd + w_bwd;
                out.push(if total > 0.0 { (fwd - bwd) / total } else { Color::ZERO });
            }
        }
        out
    }
}

/// Apply gamma correction (gamma = 2.2).
#[inline]
pub fn linear_to_gamma(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.powf(1.0 / 2.2)
    } else {
        0.0
    }
}

/// Convert a color to 8-bit RGBA.
pub fn color_to_rgba(color: Color) -> [u8; 4] {
    let encode = |v: f32| (255.0 * linear_to_gamma(v).clamp(0.0, 1.0)).round() as u8;
    [encode(color.x), encode(color.y), encode(color.z), 255]
}
