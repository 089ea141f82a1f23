//! Waterfall color gradient lookup table
//!
//! Fixed 5-stop palette spanning a wide dynamic range. Interpolation is
//! piecewise-linear between adjacent stops, oversampled so that hardware
//! linear filtering does not flicker between scroll steps on some GPUs.

/// Palette stops, darkest to hottest: black, blue, cyan, yellow, red.
pub const PALETTE: [[u8; 3]; 5] = [
    [0, 0, 0],
    [0, 0, 255],
    [0, 200, 255],
    [255, 255, 0],
    [255, 0, 0],
];

/// Color painted where a history row has no data for the current window.
pub const BACKGROUND: [u8; 4] = [119, 119, 119, 255];

/// Texels generated per palette segment.
const STRETCH: usize = 10;

/// Precomputed gradient table mapping normalized magnitude to RGBA color.
pub struct GradientLut {
    texels: Vec<[u8; 4]>,
}

impl GradientLut {
    pub fn new() -> Self {
        let count = (PALETTE.len() - 1) * STRETCH + 1;
        let texels = (0..count)
            .map(|i| Self::color(i as f32 / (count - 1) as f32))
            .collect();
        Self { texels }
    }

    /// Continuous piecewise-linear palette sample; `value` clamped to [0,1].
    pub fn color(value: f32) -> [u8; 4] {
        let scaled = value * (PALETTE.len() - 1) as f32;
        let index = (scaled.floor() as isize).clamp(0, PALETTE.len() as isize - 2) as usize;
        let t1 = (scaled - index as f32).clamp(0.0, 1.0);
        let t0 = 1.0 - t1;
        let c0 = PALETTE[index];
        let c1 = PALETTE[index + 1];
        [
            (c0[0] as f32 * t0 + c1[0] as f32 * t1) as u8,
            (c0[1] as f32 * t0 + c1[1] as f32 * t1) as u8,
            (c0[2] as f32 * t0 + c1[2] as f32 * t1) as u8,
            255,
        ]
    }

    /// Number of texels in the table.
    #[inline]
    pub fn len(&self) -> usize {
        self.texels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    /// Flattened RGBA8 bytes for texture upload (1 column, `len()` rows).
    pub fn texture_data(&self) -> Vec<u8> {
        self.texels.iter().flatten().copied().collect()
    }

    /// Half-texel inset so that 0 and 1 sample texel centers, not edges.
    #[inline]
    pub fn inset_zero(&self) -> f32 {
        0.5 / self.len() as f32
    }

    #[inline]
    pub fn inset_scale(&self) -> f32 {
        1.0 - 2.0 * self.inset_zero()
    }

    /// Table lookup for the CPU rasterizer path.
    pub fn lookup(&self, value: f32) -> [u8; 4] {
        let idx = (value.clamp(0.0, 1.0) * (self.len() - 1) as f32).round() as usize;
        self.texels[idx]
    }
}

impl Default for GradientLut {
    fn default() -> Self {
        Self::new()
    }
}
