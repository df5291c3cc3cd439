//! Raw payload decoding — planar/interleaved BGR, disparity, int32 layers.

use depthseg_core::DisparityImage;
use image::{Luma, RgbImage};

/// Convert planar BGR (B plane, G plane, R plane) to an RGB image.
///
/// This is the layout the color camera emits with interleaving disabled.
pub fn planar_bgr_to_rgb(
    planar: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbImage, FrameError> {
    let plane = (width * height) as usize;
    let expected = plane * 3;
    if planar.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: planar.len(),
        });
    }
    let (b, rest) = planar.split_at(plane);
    let (g, r) = rest.split_at(plane);

    let mut rgb = Vec::with_capacity(expected);
    for i in 0..plane {
        rgb.extend_from_slice(&[r[i], g[i], b[i]]);
    }
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: planar.len(),
    })
}

/// Convert packed BGR triplets to an RGB image.
pub fn interleaved_bgr_to_rgb(
    bgr: &[u8],
    width: u32,
    height: u32,
) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 3) as usize;
    if bgr.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: bgr.len(),
        });
    }
    let rgb: Vec<u8> = bgr[..expected]
        .chunks_exact(3)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: bgr.len(),
    })
}

/// 8-bit disparity (one byte per pixel, subpixel mode off).
pub fn disparity_from_u8(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<DisparityImage, FrameError> {
    let expected = (width * height) as usize;
    if data.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(DisparityImage::from_fn(width, height, |x, y| {
        Luma([data[(y * width + x) as usize] as u16])
    }))
}

/// 16-bit little-endian disparity (subpixel mode).
pub fn disparity_from_u16le(
    data: &[u8],
    width: u32,
    height: u32,
) -> Result<DisparityImage, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if data.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: data.len(),
        });
    }
    let values: Vec<u16> = data[..expected]
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    DisparityImage::from_raw(width, height, values).ok_or(FrameError::InvalidLength {
        expected,
        actual: data.len(),
    })
}

/// Network output layer as little-endian int32 values.
pub fn int32_layer_from_le(data: &[u8]) -> Result<Vec<i32>, FrameError> {
    if data.len() % 4 != 0 {
        return Err(FrameError::Misaligned {
            len: data.len(),
            element: 4,
        });
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("buffer of {len} bytes is not a multiple of {element}")]
    Misaligned { len: usize, element: usize },
}
