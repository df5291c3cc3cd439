//! Geometric normalization — center square crop and fixed-size resize.
//!
//! Applied identically to color and disparity frames so both land on the
//! same 400×400 grid as the upscaled segmentation mask.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Pixel};

/// Side length of every output panel.
pub const TARGET_SIZE: u32 = 400;

/// Crop the longer axis symmetrically so width == height.
///
/// The offset is `(long - short) / 2` rounded down; for an odd difference
/// the extra column (or row) is dropped from the far side.
pub fn center_crop_square<P>(
    frame: &ImageBuffer<P, Vec<P::Subpixel>>,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    let (width, height) = frame.dimensions();
    let side = width.min(height);
    let x = (width - side) / 2;
    let y = (height - side) / 2;
    imageops::crop_imm(frame, x, y, side, side).to_image()
}

/// Scale to exactly `width`×`height`.
pub fn resize<P>(
    frame: &ImageBuffer<P, Vec<P::Subpixel>>,
    width: u32,
    height: u32,
    filter: FilterType,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, filter)
}

/// Center-crop to a square, then resize to `size`×`size`.
pub fn normalize<P>(
    frame: &ImageBuffer<P, Vec<P::Subpixel>>,
    size: u32,
    filter: FilterType,
) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
    P::Subpixel: 'static,
{
    resize(&center_crop_square(frame), size, size, filter)
}
