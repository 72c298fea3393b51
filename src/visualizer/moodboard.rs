//! Grid moodboard of the real item photos.
//!
//! Layout is a pure function of the item count: one column for up to two
//! items, a 2x2 grid for up to four, then two columns with as many rows as
//! needed. Each photo is shrunk (never enlarged) to fit its cell, centered
//! and wrapped in a thin neutral frame.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::imaging::{fetch_image, ImageFetcher};
use crate::models::VisualizationItem;

pub const CANVAS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const FRAME_COLOR: Rgb<u8> = Rgb([220, 220, 220]);
pub const FRAME_WIDTH: u32 = 2;
pub const CELL_PADDING: u32 = 20;
pub const INNER_PADDING: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub cols: u32,
    pub rows: u32,
}

impl GridLayout {
    pub fn for_items(count: usize) -> Self {
        let count = u32::try_from(count).unwrap_or(u32::MAX);
        match count {
            0..=2 => GridLayout {
                cols: 1,
                rows: count.max(1),
            },
            3..=4 => GridLayout { cols: 2, rows: 2 },
            _ => GridLayout {
                cols: 2,
                rows: count.div_ceil(2),
            },
        }
    }

    /// Size of one cell for a canvas, padding included between and around cells.
    pub fn cell_size(&self, width: u32, height: u32) -> (u32, u32) {
        let cell_width = width.saturating_sub((self.cols + 1) * CELL_PADDING) / self.cols;
        let cell_height = height.saturating_sub((self.rows + 1) * CELL_PADDING) / self.rows;
        (cell_width.max(1), cell_height.max(1))
    }

    /// Top-left corner of the cell holding item `index`, filled row by row.
    pub fn cell_origin(&self, index: u32, cell: (u32, u32)) -> (i64, i64) {
        let (row, col) = (index / self.cols, index % self.cols);
        let x = CELL_PADDING + col * (cell.0 + CELL_PADDING);
        let y = CELL_PADDING + row * (cell.1 + CELL_PADDING);
        (i64::from(x), i64::from(y))
    }
}

/// Aspect-preserving shrink into `max_width` x `max_height`.
pub fn fit_within(image: DynamicImage, max_width: u32, max_height: u32) -> DynamicImage {
    let (width, height) = image.dimensions();
    let (max_width, max_height) = (max_width.max(1), max_height.max(1));
    if width <= max_width && height <= max_height {
        return image;
    }
    image.resize(max_width, max_height, FilterType::Lanczos3)
}

fn framed(image: &RgbImage) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut frame = RgbImage::from_pixel(
        width + 2 * FRAME_WIDTH,
        height + 2 * FRAME_WIDTH,
        FRAME_COLOR,
    );
    imageops::replace(&mut frame, image, i64::from(FRAME_WIDTH), i64::from(FRAME_WIDTH));
    frame
}

pub async fn compose_moodboard(
    fetcher: &dyn ImageFetcher,
    items: &[VisualizationItem],
    width: u32,
    height: u32,
) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(width.max(1), height.max(1), CANVAS_COLOR);
    let layout = GridLayout::for_items(items.len());
    let cell = layout.cell_size(width, height);
    let target = (
        cell.0.saturating_sub(2 * INNER_PADDING),
        cell.1.saturating_sub(2 * INNER_PADDING),
    );
    debug!(
        items = items.len(),
        cols = layout.cols,
        rows = layout.rows,
        cell_width = cell.0,
        cell_height = cell.1,
        "Composing moodboard"
    );

    for (index, item) in items.iter().enumerate() {
        let photo = fetch_image(fetcher, &item.image_url, false).await;
        let photo = fit_within(photo, target.0, target.1).to_rgb8();
        let (photo_width, photo_height) = photo.dimensions();

        let (cell_x, cell_y) = layout.cell_origin(index as u32, cell);
        let x = cell_x + (i64::from(cell.0) - i64::from(photo_width)) / 2;
        let y = cell_y + (i64::from(cell.1) - i64::from(photo_height)) / 2;
        let offset = i64::from(FRAME_WIDTH);
        imageops::replace(&mut canvas, &framed(&photo), x - offset, y - offset);
    }

    canvas
}

pub fn encode_png_base64(image: &RgbImage) -> Result<String, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(general_purpose::STANDARD.encode(buffer.into_inner()))
}
