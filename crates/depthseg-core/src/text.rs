//! FPS label rendering with the bundled DejaVu Sans face.

use ab_glyph::{Font, FontRef, InvalidFont, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

static DEJAVU_SANS: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// A font face at a fixed pixel height.
#[derive(Debug, Clone)]
pub struct LabelFont {
    font: FontRef<'static>,
    scale: PxScale,
}

impl LabelFont {
    pub fn bundled(height_px: f32) -> Result<Self, InvalidFont> {
        Ok(Self {
            font: FontRef::try_from_slice(DEJAVU_SANS)?,
            scale: PxScale::from(height_px),
        })
    }

    /// Distance from the top of the line box to the baseline, in pixels.
    pub fn ascent(&self) -> f32 {
        self.font.as_scaled(self.scale).ascent()
    }

    /// Draw `text` anti-aliased with its baseline-left corner at `(x, baseline)`.
    /// Glyph pixels outside the image are clipped.
    pub fn draw(&self, image: &mut RgbImage, text: &str, x: i32, baseline: i32, color: Rgb<u8>) {
        let top = baseline - self.ascent().round() as i32;
        draw_text_mut(image, color, x, top, self.scale, &self.font, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(image: &RgbImage) -> Vec<(u32, u32)> {
        image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0 != [0, 0, 0])
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_bundled_font_loads() {
        let font = LabelFont::bundled(12.0).unwrap();
        let ascent = font.ascent();
        assert!(ascent > 6.0 && ascent < 12.0, "ascent = {ascent}");
    }

    #[test]
    fn test_draw_sits_on_baseline() {
        let font = LabelFont::bundled(12.0).unwrap();
        let mut image = RgbImage::new(80, 30);
        font.draw(&mut image, "10.00", 2, 20, Rgb([255, 255, 255]));

        let pixels = lit(&image);
        assert!(!pixels.is_empty());
        let top = 20 - font.ascent().round() as u32;
        assert!(pixels.iter().all(|&(x, y)| x >= 2 && y >= top && y <= 20));
        assert!(pixels.iter().any(|&(_, y)| y >= 18), "digits reach the baseline");
    }

    #[test]
    fn test_draw_is_clipped() {
        let font = LabelFont::bundled(12.0).unwrap();
        let mut image = RgbImage::new(10, 6);
        font.draw(&mut image, "Fps: 99.99", -3, 4, Rgb([255, 255, 255]));
        font.draw(&mut image, "Fps: 99.99", 50, 50, Rgb([255, 255, 255]));
        assert_eq!(image.dimensions(), (10, 6));
    }

    #[test]
    fn test_antialiased_edges() {
        let font = LabelFont::bundled(24.0).unwrap();
        let mut image = RgbImage::new(60, 30);
        font.draw(&mut image, "0", 2, 24, Rgb([255, 255, 255]));
        let partial = image
            .pixels()
            .filter(|p| p.0[0] > 0 && p.0[0] < 255)
            .count();
        assert!(partial > 0, "coverage blends into the background");
    }
}
