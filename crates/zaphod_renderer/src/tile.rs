//! Image tiles: the unit of work handed to scheduler workers.

/// A rectangular region of the image, rendered with a fixed sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// X coordinate of the tile's top-left corner
    pub x: u32,
    /// Y coordinate of the tile's top-left corner
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Samples to take per pixel.
    pub samples: u32,
    /// Pass this tile belongs to (0 is the first pass rendered).
    pub pass: u32,
}

impl Tile {
    /// Get the total number of pixels in this tile.
    pub fn pixel_count(&self) -> u32 {
        self.width * self.height
    }

    /// Pixel coordinates covered by the tile, row by row.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.y..self.y + self.height).flat_map(move |y| (self.x..self.x + self.width).map(move |x| (x, y)))
    }
}

/// Default tile size in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 64;

/// Partition an image into tiles, sorted in spiral order from the center.
///
/// The tiles of one call never overlap and cover every pixel once.
pub fn generate_tiles(width: u32, height: u32, tile_size: u32, samples: u32, pass: u32) -> Vec<Tile> {
    let tile_size = tile_size.max(1);
    let mut tiles = Vec::new();

    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            tiles.push(Tile {
                x,
                y,
                width: tile_size.min(width - x),
                height: tile_size.min(height - y),
                samples,
                pass,
            });
            x += tile_size;
        }
        y += tile_size;
    }

    sort_spiral(&mut tiles, width, height);
    tiles
}

/// Sort tiles by distance from image center (spiral order).
fn sort_spiral(tiles: &mut [Tile], width: u32, height: u32) {
    let center_x = width as f32 / 2.0;
    let center_y = height as f32 / 2.0;
    let distance = |t: &Tile| {
        let dx = t.x as f32 + t.width as f32 / 2.0 - center_x;
        let dy = t.y as f32 + t.height as f32 / 2.0 - center_y;
        dx * dx + dy * dy
    };

    tiles.sort_by(|a, b| distance(a).total_cmp(&distance(b)));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage(tiles: &[Tile], width: u32, height: u32) -> Vec<u32> {
        let mut owners = vec![0u32; (width * height) as usize];
        for tile in tiles {
            for (x, y) in tile.pixels() {
                owners[(y * width + x) as usize] += 1;
            }
        }
        owners
    }

    #[test]
    fn test_generate_tiles_exact_fit() {
        let tiles = generate_tiles(128, 128, 64, 4, 0);
        assert_eq!(tiles.len(), 4); // 2x2 grid
        let total_pixels: u32 = tiles.iter().map(|t| t.pixel_count()).sum();
        assert_eq!(total_pixels, 128 * 128);
        assert!(tiles.iter().all(|t| t.samples == 4 && t.pass == 0));
    }

    #[test]
    fn test_tiles_partition_image() {
        for (w, h, size) in [(100, 100, 64), (37, 5, 8), (1, 1, 64), (200, 75, 16)] {
            let tiles = generate_tiles(w, h, size, 1, 0);
            assert!(coverage(&tiles, w, h).iter().all(|&n| n == 1), "{}x{} / {}", w, h, size);
        }
    }

    #[test]
    fn test_spiral_order() {
        let tiles = generate_tiles(192, 192, 64, 1, 0);
        assert_eq!(tiles.len(), 9); // 3x3 grid
        assert_eq!((tiles[0].x, tiles[0].y), (64, 64));
    }

    #[test]
    fn test_empty_image() {
        assert!(generate_tiles(0, 10, 8, 1, 0).is_empty());
    }
}
