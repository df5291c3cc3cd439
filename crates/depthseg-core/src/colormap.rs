//! 256-entry color lookup tables for disparity visualization.

use image::{GrayImage, Rgb, RgbImage};

/// Maps 8-bit intensities to colors through a fixed table.
#[derive(Clone)]
pub struct ColorMap {
    lut: [Rgb<u8>; 256],
}

impl ColorMap {
    /// Classic jet: dark blue → cyan → yellow → dark red.
    pub fn jet() -> Self {
        let mut lut = [Rgb([0, 0, 0]); 256];
        for (i, entry) in lut.iter_mut().enumerate() {
            let v = i as f32 / 255.0;
            *entry = Rgb([jet_channel(v, 3.0), jet_channel(v, 2.0), jet_channel(v, 1.0)]);
        }
        Self { lut }
    }

    /// Jet with index 0 forced to black, so zero (invalid) disparity
    /// renders as background instead of blue.
    pub fn jet_black_zero() -> Self {
        let mut map = Self::jet();
        map.lut[0] = Rgb([0, 0, 0]);
        map
    }

    pub fn color(&self, value: u8) -> Rgb<u8> {
        self.lut[value as usize]
    }

    pub fn apply(&self, gray: &GrayImage) -> RgbImage {
        RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
            self.color(gray.get_pixel(x, y).0[0])
        })
    }
}

// Triangular ramp peaking at 4v == center, clipped to [0, 1].
fn jet_channel(v: f32, center: f32) -> u8 {
    let level = (1.5 - (4.0 * v - center).abs()).clamp(0.0, 1.0);
    (level * 255.0).round() as u8
}
