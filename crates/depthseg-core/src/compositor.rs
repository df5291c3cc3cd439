//! Fusion of a synced triple into the three display panels.
//!
//! Panels, left to right:
//!   1. color frame blended with the colored segmentation mask, plus FPS;
//!   2. colorized disparity cut out to the segmented foreground;
//!   3. colorized disparity.

use crate::colormap::ColorMap;
use crate::geometry::{self, TARGET_SIZE};
use crate::segmentation::{self, DecodeError, SegmentationDecoder};
use crate::text::LabelFont;
use crate::types::{DisparityImage, SyncedTriple};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage};
use thiserror::Error;

/// Weight of the colored mask in the blend; the frame keeps weight 1.0.
pub const MASK_WEIGHT: f32 = 0.5;

const FPS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const FPS_TEXT_HEIGHT: f32 = 12.0;
const FPS_ORIGIN_X: i32 = 2;
const FPS_BASELINE_OFFSET: i32 = 4;

#[derive(Error, Debug)]
pub enum CompositeError {
    #[error("decode: {0}")]
    Decode(#[from] DecodeError),
    #[error("max disparity must be positive and finite, got {0}")]
    InvalidMaxDisparity(f32),
    #[error("target size must be non-zero")]
    ZeroTargetSize,
    #[error("segmentation shape must be non-zero")]
    ZeroShape,
    #[error("label font: {0}")]
    Font(#[from] ab_glyph::InvalidFont),
    #[error("panel {name} is {actual:?}, expected {expected:?}")]
    PanelSize {
        name: &'static str,
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Side of every output panel.
    pub target_size: u32,
    /// Side of the square segmentation tensor.
    pub nn_shape: usize,
    /// Largest disparity the stereo engine reports.
    pub max_disparity: f32,
    /// Filter for color and disparity frames.
    pub frame_filter: FilterType,
    /// Filter for masks; nearest keeps class boundaries crisp.
    pub mask_filter: FilterType,
}

impl CompositorConfig {
    pub fn new(nn_shape: usize, max_disparity: f32) -> Self {
        Self {
            target_size: TARGET_SIZE,
            nn_shape,
            max_disparity,
            frame_filter: FilterType::Triangle,
            mask_filter: FilterType::Nearest,
        }
    }
}

/// Derived images for one synced iteration.
#[derive(Debug, Clone)]
pub struct FrameSet {
    /// Cropped color frame before blending.
    pub color: RgbImage,
    /// Color blended with the mask, FPS drawn on top.
    pub fused: RgbImage,
    /// Colorized disparity restricted to the foreground.
    pub cutout: RgbImage,
    /// Colorized disparity.
    pub depth: RgbImage,
}

impl FrameSet {
    /// Concatenate fused, cutout and depth horizontally.
    pub fn panel(&self) -> Result<RgbImage, CompositeError> {
        let expected = self.fused.dimensions();
        for (name, image) in [("cutout", &self.cutout), ("depth", &self.depth)] {
            if image.dimensions() != expected {
                return Err(CompositeError::PanelSize {
                    name,
                    expected,
                    actual: image.dimensions(),
                });
            }
        }

        let (w, h) = expected;
        let mut out = RgbImage::new(w * 3, h);
        for (i, image) in [&self.fused, &self.cutout, &self.depth].into_iter().enumerate() {
            imageops::replace(&mut out, image, (w as usize * i) as i64, 0);
        }
        Ok(out)
    }
}

pub struct Compositor {
    config: CompositorConfig,
    decoder: SegmentationDecoder,
    colormap: ColorMap,
    label: LabelFont,
    disparity_scale: f32,
}

impl Compositor {
    pub fn new(config: CompositorConfig) -> Result<Self, CompositeError> {
        Self::with_decoder(config, SegmentationDecoder::default())
    }

    pub fn with_decoder(
        config: CompositorConfig,
        decoder: SegmentationDecoder,
    ) -> Result<Self, CompositeError> {
        if !(config.max_disparity.is_finite() && config.max_disparity > 0.0) {
            return Err(CompositeError::InvalidMaxDisparity(config.max_disparity));
        }
        if config.target_size == 0 {
            return Err(CompositeError::ZeroTargetSize);
        }
        if config.nn_shape == 0 {
            return Err(CompositeError::ZeroShape);
        }
        let disparity_scale = 255.0 / config.max_disparity;
        Ok(Self {
            config,
            decoder,
            colormap: ColorMap::jet_black_zero(),
            label: LabelFont::bundled(FPS_TEXT_HEIGHT)?,
            disparity_scale,
        })
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Build all four images of a [`FrameSet`] from one synced triple.
    pub fn compose(&self, triple: &SyncedTriple, fps: f64) -> Result<FrameSet, CompositeError> {
        let size = self.config.target_size;

        let layer = &triple.nn.segmentation()?.layer;
        let tensor = segmentation::tensor_from_layer(layer, self.config.nn_shape)?;
        let mask_colors = geometry::resize(
            &self.decoder.decode_color(&tensor)?,
            size,
            size,
            self.config.mask_filter,
        );
        let multiplier = geometry::resize(
            &self.decoder.decode_multiplier(&tensor)?,
            size,
            size,
            self.config.mask_filter,
        );

        let color = geometry::normalize(
            triple.color.color_frame()?,
            size,
            self.config.frame_filter,
        );
        let mut fused = blend(&color, &mask_colors, MASK_WEIGHT);
        self.draw_fps(&mut fused, fps);

        let disparity = geometry::normalize(
            &self.scale_disparity(triple.depth.disparity()?),
            size,
            self.config.frame_filter,
        );
        let depth = self.colormap.apply(&disparity);
        let cutout = self.colormap.apply(&apply_mask(&disparity, &multiplier));

        Ok(FrameSet {
            color,
            fused,
            cutout,
            depth,
        })
    }

    fn draw_fps(&self, frame: &mut RgbImage, fps: f64) {
        let label = format!("Fps: {fps:.2}");
        let baseline = frame.height() as i32 - FPS_BASELINE_OFFSET;
        self.label.draw(frame, &label, FPS_ORIGIN_X, baseline, FPS_COLOR);
    }

    /// Scale raw disparity into 0–255, saturating above max disparity.
    pub fn scale_disparity(&self, raw: &DisparityImage) -> GrayImage {
        GrayImage::from_fn(raw.width(), raw.height(), |x, y| {
            let value = raw.get_pixel(x, y).0[0] as f32 * self.disparity_scale;
            Luma([value as u8])
        })
    }
}

/// `base * 1.0 + overlay * weight`, rounded and saturated per channel.
/// Both images must share dimensions; extra pixels of the larger are ignored.
pub fn blend(base: &RgbImage, overlay: &RgbImage, weight: f32) -> RgbImage {
    let mut out = base.clone();
    for (dst, src) in out.pixels_mut().zip(overlay.pixels()) {
        for c in 0..3 {
            let value = dst.0[c] as f32 + src.0[c] as f32 * weight;
            dst.0[c] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Element-wise product of values and a multiplier mask.
pub fn apply_mask(values: &GrayImage, mask: &GrayImage) -> GrayImage {
    let mut out = values.clone();
    for (dst, m) in out.pixels_mut().zip(mask.pixels()) {
        dst.0[0] = dst.0[0].saturating_mul(m.0[0]);
    }
    out
}
