// Offline diagnostics: renders luma frames (optionally with detected edge
// segments painted over them) to PNG files for threshold tuning. Nothing on
// the per-frame path calls into this module.

use std::fs::File;
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};

use crate::core_modules::edge_segment::EdgeSegment;
use crate::core_modules::luma::LumaFrame;

const EDGE_COLOR: [u8; 4] = [255, 64, 64, 255];

/// Writes a luma frame to a grayscale PNG.
pub fn save_luma(path: &Path, frame: &LumaFrame) -> Result<(), image::ImageError> {
    write_png(path, frame.width(), frame.height(), &expand_rgba(frame))
}

/// Writes a luma frame with edge segments painted over it.
pub fn save_luma_with_edges(
    path: &Path,
    frame: &LumaFrame,
    edges: &[EdgeSegment],
) -> Result<(), image::ImageError> {
    let width = frame.width();
    let mut rgba = expand_rgba(frame);
    if width > 0 {
        for edge in edges {
            if edge.y >= frame.height() {
                continue;
            }
            for x in edge.x_start..=edge.x_end.min(width - 1) {
                let base = (edge.y * width + x) * 4;
                rgba[base..base + 4].copy_from_slice(&EDGE_COLOR);
            }
        }
    }
    write_png(path, width, frame.height(), &rgba)
}

fn expand_rgba(frame: &LumaFrame) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(frame.width() * frame.height() * 4);
    for &v in frame.data() {
        rgba.extend_from_slice(&[v, v, v, 255]);
    }
    rgba
}

fn write_png(path: &Path, width: usize, height: usize, rgba: &[u8]) -> Result<(), image::ImageError> {
    let output = File::create(path)?;
    let encoder = PngEncoder::new(output);
    encoder.write_image(rgba, width as u32, height as u32, ExtendedColorType::Rgba8)?;
    Ok(())
}
