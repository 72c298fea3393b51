//! Garment isolation: background keying followed by a tight crop.
//!
//! Product photos are mostly shot on a flat backdrop, so the background is
//! estimated from the four corners and keyed out with a feathered edge.
//! Photos whose corners disagree are left opaque rather than guessed at.

use image::{imageops, DynamicImage, Rgba, RgbaImage};
use tracing::debug;

/// Max per-channel distance from the backdrop that is keyed fully transparent.
const KEY_TOLERANCE: u8 = 24;
/// Width of the partial-transparency band beyond the tolerance.
const EDGE_FEATHER: u8 = 24;
/// Corners further apart than this mean there is no flat backdrop.
const BACKDROP_SPREAD: u8 = 40;

fn channel_distance(pixel: &Rgba<u8>, background: [u8; 3]) -> u8 {
    (0..3)
        .map(|channel| pixel.0[channel].abs_diff(background[channel]))
        .max()
        .unwrap_or(0)
}

fn estimate_backdrop(image: &RgbaImage) -> Option<[u8; 3]> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return None;
    }

    let corners: Vec<&Rgba<u8>> = [
        (0, 0),
        (width - 1, 0),
        (0, height - 1),
        (width - 1, height - 1),
    ]
    .iter()
    .map(|&(x, y)| image.get_pixel(x, y))
    .filter(|pixel| pixel.0[3] > 0)
    .collect();
    let first = corners.first()?;

    let base = [first.0[0], first.0[1], first.0[2]];
    if corners
        .iter()
        .any(|pixel| channel_distance(pixel, base) > BACKDROP_SPREAD)
    {
        return None;
    }

    let mut sums = [0u32; 3];
    for pixel in &corners {
        for (channel, sum) in sums.iter_mut().enumerate() {
            *sum += u32::from(pixel.0[channel]);
        }
    }
    let count = corners.len() as u32;
    Some(sums.map(|sum| (sum / count) as u8))
}

pub fn remove_background(image: &DynamicImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    let Some(backdrop) = estimate_backdrop(&rgba) else {
        debug!("No uniform backdrop found; keeping image opaque");
        return rgba;
    };

    for pixel in rgba.pixels_mut() {
        let distance = channel_distance(pixel, backdrop);
        let key_alpha = if distance <= KEY_TOLERANCE {
            0
        } else if distance <= KEY_TOLERANCE + EDGE_FEATHER {
            let ramp = u32::from(distance - KEY_TOLERANCE) * 255 / u32::from(EDGE_FEATHER);
            ramp.min(255) as u8
        } else {
            255
        };
        pixel.0[3] = pixel.0[3].min(key_alpha);
    }

    rgba
}

/// Tight bounding box `(x, y, width, height)` of pixels with non-zero alpha.
pub fn content_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }
    bounds.map(|(min_x, min_y, max_x, max_y)| (min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

pub fn crop_to_content(image: RgbaImage) -> RgbaImage {
    match content_bounds(&image) {
        Some((x, y, width, height)) => imageops::crop_imm(&image, x, y, width, height).to_image(),
        None => image,
    }
}

pub fn isolate_subject(image: &DynamicImage) -> DynamicImage {
    DynamicImage::ImageRgba8(crop_to_content(remove_background(image)))
}
