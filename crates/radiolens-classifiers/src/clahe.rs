//! Contrast-limited adaptive histogram equalization on 8-bit planes
//!
//! The plane is split into a grid of tiles. Each tile gets its own
//! equalization lookup table built from a clipped histogram, with the clipped
//! excess spread evenly over all bins. Output pixels blend the tables of the
//! four nearest tile centers bilinearly so tile borders do not show.

const BINS: usize = 256;

/// CLAHE operator with a fixed clip limit and tile grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    clip_limit: f32,
    tiles_x: usize,
    tiles_y: usize,
}

impl Clahe {
    /// `clip_limit` is relative to a uniform histogram; `tiles` is `(columns, rows)`
    pub fn new(clip_limit: f32, tiles: (u32, u32)) -> Self {
        Self {
            clip_limit,
            tiles_x: tiles.0.max(1) as usize,
            tiles_y: tiles.1.max(1) as usize,
        }
    }

    pub fn clip_limit(&self) -> f32 {
        self.clip_limit
    }

    /// Equalize a row-major plane of `width * height` samples.
    ///
    /// Planes smaller than the tile grid use one tile per pixel along the
    /// short dimension. A plane whose length does not match is returned as is.
    pub fn apply(&self, plane: &[u8], width: usize, height: usize) -> Vec<u8> {
        if width == 0 || height == 0 || plane.len() != width * height {
            return plane.to_vec();
        }

        let tiles_x = self.tiles_x.min(width);
        let tiles_y = self.tiles_y.min(height);
        let x_bounds = tile_bounds(width, tiles_x);
        let y_bounds = tile_bounds(height, tiles_y);

        let mut luts = Vec::with_capacity(tiles_x * tiles_y);
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let (x0, x1) = (x_bounds[tx], x_bounds[tx + 1]);
                let (y0, y1) = (y_bounds[ty], y_bounds[ty + 1]);
                luts.push(self.tile_lut(plane, width, x0..x1, y0..y1));
            }
        }

        let tile_w = width as f32 / tiles_x as f32;
        let tile_h = height as f32 / tiles_y as f32;
        let mut out = vec![0u8; plane.len()];

        for y in 0..height {
            let (ty1, ty2, wy) = neighbours(y, tile_h, tiles_y);
            for x in 0..width {
                let (tx1, tx2, wx) = neighbours(x, tile_w, tiles_x);
                let v = plane[y * width + x] as usize;

                let top =
                    luts[ty1 * tiles_x + tx1][v] * (1.0 - wx) + luts[ty1 * tiles_x + tx2][v] * wx;
                let bottom =
                    luts[ty2 * tiles_x + tx1][v] * (1.0 - wx) + luts[ty2 * tiles_x + tx2][v] * wx;
                let value = top * (1.0 - wy) + bottom * wy;

                out[y * width + x] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        out
    }

    fn tile_lut(
        &self,
        plane: &[u8],
        width: usize,
        xs: std::ops::Range<usize>,
        ys: std::ops::Range<usize>,
    ) -> [f32; BINS] {
        let mut hist = [0usize; BINS];
        for y in ys.clone() {
            for &v in &plane[y * width + xs.start..y * width + xs.end] {
                hist[v as usize] += 1;
            }
        }
        let area = xs.len() * ys.len();

        let clip = ((self.clip_limit * area as f32 / BINS as f32) as usize).max(1);
        clip_histogram(&mut hist, clip);

        let scale = 255.0 / area as f32;
        let mut lut = [0.0f32; BINS];
        let mut cumulative = 0usize;
        for (bin, count) in hist.iter().enumerate() {
            cumulative += count;
            lut[bin] = (cumulative as f32 * scale).round().min(255.0);
        }
        lut
    }
}

/// Clip every bin at `clip` and redistribute the excess uniformly
fn clip_histogram(hist: &mut [usize; BINS], clip: usize) {
    let mut excess = 0usize;
    for count in hist.iter_mut() {
        if *count > clip {
            excess += *count - clip;
            *count = clip;
        }
    }
    if excess == 0 {
        return;
    }

    let batch = excess / BINS;
    let mut residual = excess % BINS;
    for count in hist.iter_mut() {
        *count += batch;
    }

    if residual > 0 {
        let step = (BINS / residual).max(1);
        let mut bin = 0;
        while bin < BINS && residual > 0 {
            hist[bin] += 1;
            residual -= 1;
            bin += step;
        }
    }
}

/// Integer tile edges covering `len` exactly
fn tile_bounds(len: usize, tiles: usize) -> Vec<usize> {
    (0..=tiles).map(|i| i * len / tiles).collect()
}

/// Two tiles whose centers bracket `pos`, and the weight of the second
fn neighbours(pos: usize, tile_size: f32, tiles: usize) -> (usize, usize, f32) {
    let t = (pos as f32 + 0.5) / tile_size - 0.5;
    let floor = t.floor();
    let weight = t - floor;
    let first = floor.max(0.0) as usize;
    let second = ((floor + 1.0).max(0.0) as usize).min(tiles - 1);
    (first.min(tiles - 1), second, weight)
}
