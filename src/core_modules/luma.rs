// THEORY:
// The `luma` module is the ground floor of the vision core. Every analysis
// stage downstream (edge detection, motion estimation, lock verification)
// operates on single-channel brightness data, never on raw color frames.
// Converting once per frame and sharing the result keeps the per-pixel work
// in every later stage to a single byte per pixel.
//
// Key architectural principles:
// 1.  **Integer-Only Conversion**: The RGBA -> luma mapping uses the BT.601
//     weights in 8-bit fixed point (`(r*77 + g*150 + b*29) >> 8`). The weights
//     sum to 256, so the result always fits a byte and the conversion is
//     exactly reproducible across platforms.
// 2.  **Immutable After Creation**: A `LumaFrame` is written once by its
//     constructor and only read afterwards. The frame loop holds at most two
//     of them (previous and current) and recycles their backing buffers.
// 3.  **Total Conversion**: A short or malformed input buffer never fails;
//     missing pixels convert to black. Degraded input yields degraded output,
//     not an error path.

/// Fixed-point BT.601 weights. They sum to 256, so `>> 8` renormalizes.
const LUMA_WEIGHT_R: u32 = 77;
const LUMA_WEIGHT_G: u32 = 150;
const LUMA_WEIGHT_B: u32 = 29;

/// A single-channel 8-bit brightness frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaFrame {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl LumaFrame {
    /// Converts an interleaved RGBA buffer into a luma frame.
    /// The alpha channel is ignored; pixels past the end of `rgba` become 0.
    pub fn from_rgba(width: usize, height: usize, rgba: &[u8]) -> Self {
        Self::from_rgba_with(width, height, rgba, Vec::new())
    }

    /// Like [`from_rgba`](Self::from_rgba), but reuses `scratch` as the
    /// backing buffer to avoid a per-frame allocation.
    pub fn from_rgba_with(width: usize, height: usize, rgba: &[u8], scratch: Vec<u8>) -> Self {
        let pixels = width * height;
        let mut data = scratch;
        data.resize(pixels, 0);

        let converted = pixels.min(rgba.len() / 4);
        for (out, px) in data[..converted].iter_mut().zip(rgba.chunks_exact(4)) {
            *out = luma_of(px[0], px[1], px[2]);
        }
        for out in &mut data[converted..] {
            *out = 0;
        }

        Self { width, height, data }
    }

    /// Converts a rectangular region of a larger RGBA frame into its own
    /// luma frame. The region is clipped to the source bounds; clipped or
    /// out-of-range pixels become 0.
    pub fn from_rgba_region(
        rgba: &[u8],
        frame_width: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> Self {
        let mut data = vec![0u8; width * height];
        for row in 0..height {
            let src_row = y + row;
            for col in 0..width {
                let src = ((src_row * frame_width) + x + col) * 4;
                if src + 2 < rgba.len() {
                    data[row * width + col] = luma_of(rgba[src], rgba[src + 1], rgba[src + 2]);
                }
            }
        }
        Self { width, height, data }
    }

    /// Wraps an already-converted luma buffer. Intended for synthetic frames;
    /// the buffer is padded or truncated to `width * height`.
    pub fn from_raw(width: usize, height: usize, mut data: Vec<u8>) -> Self {
        data.resize(width * height, 0);
        Self { width, height, data }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// One full row of brightness values.
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the frame and hands back its backing buffer for recycling.
    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

#[inline]
fn luma_of(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * LUMA_WEIGHT_R + g as u32 * LUMA_WEIGHT_G + b as u32 * LUMA_WEIGHT_B) >> 8) as u8
}
